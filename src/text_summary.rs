//! Text summary builder for CLI output.
//!
//! Formats the status snapshot and the week's ACTIVE windows as plain lines.

use crate::gaps::find_gaps;
use crate::model::{slot_to_time, EntryState, StatusSnapshot, DAY_NAMES};
use crate::schedule::WeeklySchedule;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Lines describing the controller state right now.
pub(crate) fn status_lines(snap: &StatusSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "Current: {} {}{}",
        snap.day_name,
        snap.time,
        if snap.clock_overridden {
            "  [TEST MODE]"
        } else {
            ""
        }
    ));
    lines.push(if snap.slot_active {
        "Status: ACTIVE (apps running)".to_string()
    } else {
        "Status: DARKNESS (apps closed)".to_string()
    });
    lines.push(format!(
        "Apps: {}{}",
        if snap.running { "running" } else { "not running" },
        if snap.launching { " (launching)" } else { "" }
    ));

    lines.push(format!("Apps controlled ({}):", snap.apps.len()));
    for app in &snap.apps {
        let progress = match app.progress {
            Some(EntryState::Started) => "started".to_string(),
            Some(EntryState::Waiting { remaining }) => {
                let left = remaining * app.launch_delay_secs as f64;
                format!("waiting, {left:.0}s left")
            }
            Some(EntryState::Pending) => "pending".to_string(),
            None if snap.running => "running".to_string(),
            None => "-".to_string(),
        };
        lines.push(format!(
            "  [{}s] {}  {}",
            app.launch_delay_secs, app.name, progress
        ));
    }

    if let Some(notice) = snap.notice.as_deref() {
        lines.extend(notice.lines().map(str::to_string));
    }
    lines
}

/// ACTIVE windows of one day as `HH:MM-HH:MM` spans.
fn active_windows(day: &[bool]) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = None;
    for (slot, &on) in day.iter().chain(std::iter::once(&false)).enumerate() {
        match (on, start) {
            (true, None) => start = Some(slot),
            (false, Some(s)) => {
                out.push(format!("{}-{}", slot_to_time(s), slot_to_time(slot)));
                start = None;
            }
            _ => {}
        }
    }
    out
}

/// Full summary: status plus one line per weekday and any gaps.
pub(crate) fn build_text_summary(snap: &StatusSnapshot, schedule: &WeeklySchedule) -> TextSummary {
    let mut lines = status_lines(snap);
    lines.push(String::new());
    lines.push("Week:".to_string());
    for (d, name) in DAY_NAMES.iter().enumerate() {
        let windows = active_windows(schedule.day(d));
        let marker = if d == snap.reading.day { ">" } else { " " };
        if windows.is_empty() {
            lines.push(format!("{marker} {name}: dark all day"));
        } else {
            lines.push(format!("{marker} {name}: {}", windows.join(", ")));
        }
        for gap in find_gaps(schedule, d) {
            lines.push(format!(
                "        gap {} ({}min)",
                gap.span_label(),
                gap.minutes()
            ));
        }
    }
    TextSummary { lines }
}
