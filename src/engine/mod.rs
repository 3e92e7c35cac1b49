//! Schedule-driven lifecycle controller.
//!
//! Each tick compares the schedule cell for the current day/slot with whether
//! the managed apps are running, and opens or closes them on a mismatch.
//! Evaluation only happens when the day/slot changes.

mod sequencer;

pub use sequencer::{LaunchSequencer, Step};

use crate::clock::{ClockMode, ClockSource, WallClock};
use crate::error::PersistenceError;
use crate::gaps::gap_notice;
use crate::model::{
    AppStatus, ClockReading, LaunchMode, ManagedApp, Notice, StatusSnapshot, Transition,
};
use crate::roster::{ProcessControl, ProcessRoster};
use crate::schedule::WeeklySchedule;
use crate::storage::{LoadSource, ScheduleStore};
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What one call to [`LifecycleController::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The day/slot changed, so target vs actual state was compared.
    pub evaluated: Option<ClockReading>,
    pub transitions: Vec<Transition>,
    /// A gap notice expired on this tick.
    pub notice_cleared: bool,
}

pub struct LifecycleController<P, W> {
    schedule: WeeklySchedule,
    store: ScheduleStore,
    roster: ProcessRoster<P>,
    clock: ClockSource<W>,
    sequencer: LaunchSequencer,
    mode: LaunchMode,
    running: bool,
    last_observed: Option<ClockReading>,
    notice: Option<Notice>,
    notice_duration: Duration,
}

impl<P: ProcessControl, W: WallClock> LifecycleController<P, W> {
    pub fn new(
        store: ScheduleStore,
        roster: ProcessRoster<P>,
        clock: ClockSource<W>,
        mode: LaunchMode,
        notice_duration: Duration,
    ) -> Self {
        Self {
            schedule: WeeklySchedule::default(),
            store,
            roster,
            clock,
            sequencer: LaunchSequencer::default(),
            mode,
            // Never assume the apps are up; the first tick opens them if the
            // current slot is ACTIVE.
            running: false,
            last_observed: None,
            notice: None,
            notice_duration,
        }
    }

    pub fn schedule(&self) -> &WeeklySchedule {
        &self.schedule
    }

    pub fn roster(&self) -> &ProcessRoster<P> {
        &self.roster
    }

    pub fn clock(&self) -> &ClockSource<W> {
        &self.clock
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_launching(&self) -> bool {
        self.sequencer.is_launching()
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if self.notice.as_ref().is_some_and(|n| n.is_expired(now)) {
            self.notice = None;
            outcome.notice_cleared = true;
        }

        let reading = self.clock.now();
        if self.last_observed != Some(reading) {
            self.last_observed = Some(reading);
            outcome.evaluated = Some(reading);
            self.evaluate(reading, now, &mut outcome.transitions);
        }

        match self.sequencer.tick(&self.roster, now) {
            Step::Completed { .. } => {
                self.running = true;
                outcome.transitions.push(Transition::LaunchCompleted);
            }
            Step::Idle | Step::Waiting { .. } => {}
        }
        outcome
    }

    fn evaluate(&mut self, reading: ClockReading, now: Instant, out: &mut Vec<Transition>) {
        let target = self.schedule.get(reading.day, reading.slot);
        info!(
            "{} - Slot active: {} - Apps running: {}",
            reading,
            yes_no(target),
            yes_no(self.running)
        );

        if target && !self.running && !self.sequencer.is_launching() {
            if let Some(t) = self.activate(now) {
                out.push(t);
            }
        } else if !target && (self.running || self.sequencer.is_launching()) {
            out.extend(self.deactivate());
        }
    }

    /// Bring the roster up according to the launch mode.
    fn activate(&mut self, now: Instant) -> Option<Transition> {
        if self.roster.is_empty() {
            return None;
        }
        match self.mode {
            LaunchMode::Direct => {
                info!("Opening apps...");
                self.roster.open_all();
                self.running = true;
                Some(Transition::Activated)
            }
            LaunchMode::Staggered => self
                .sequencer
                .start(self.roster.len(), now)
                .then_some(Transition::LaunchStarted),
        }
    }

    /// Abandon any launch in progress and ask every app to quit.
    fn deactivate(&mut self) -> Vec<Transition> {
        let mut out = Vec::new();
        if self.sequencer.abandon() {
            info!("Launch in progress abandoned");
            out.push(Transition::LaunchAbandoned);
        }
        if !self.roster.is_empty() {
            self.roster.stop_all();
            out.push(Transition::Deactivated);
        }
        self.running = false;
        out
    }

    /// Operator "open": start apps now regardless of the schedule. Ignored
    /// while a staggered launch is already underway.
    pub fn force_open(&mut self, now: Instant) -> Option<Transition> {
        if self.sequencer.is_launching() {
            return None;
        }
        self.activate(now)
    }

    /// Operator "close": stop apps now regardless of the schedule.
    pub fn force_close(&mut self) -> Vec<Transition> {
        self.deactivate()
    }

    /// Reload the schedule file. On failure the in-memory schedule stays.
    pub fn reload_schedule(&mut self) -> Result<LoadSource, PersistenceError> {
        match self.store.load(&self.schedule) {
            Ok((schedule, source)) => {
                self.schedule = schedule;
                Ok(source)
            }
            Err(e) => {
                warn!("Schedule load failed, keeping current schedule: {e:#}");
                Err(e)
            }
        }
    }

    pub fn save_schedule(&self) -> Result<(), PersistenceError> {
        self.store.save(&self.schedule).inspect_err(|e| {
            warn!("Schedule save failed: {e:#}");
        })
    }

    /// Replace the roster. A staggered launch in progress is dropped, since
    /// its position refers to the old roster.
    pub fn replace_roster(&mut self, apps: Vec<ManagedApp>) -> Option<Transition> {
        let abandoned = self.sequencer.abandon();
        self.roster.load(apps);
        abandoned.then_some(Transition::LaunchAbandoned)
    }

    /// Switch between live time and test mode. The next tick re-evaluates
    /// whatever reading results.
    pub fn toggle_clock_mode(&mut self) -> ClockMode {
        self.last_observed = None;
        self.clock.toggle_mode()
    }

    pub fn set_clock_override(&mut self, reading: ClockReading) {
        self.clock.set_override(reading);
        self.last_observed = None;
    }

    pub fn step_slot(&mut self, delta: i32) -> Option<ClockReading> {
        let r = self.clock.advance_slot(delta)?;
        self.last_observed = None;
        Some(r)
    }

    pub fn step_day(&mut self, delta: i32) -> Option<ClockReading> {
        let r = self.clock.advance_day(delta)?;
        self.last_observed = None;
        Some(r)
    }

    /// Flip one cell, persist, and raise a gap notice if the cell turned ON.
    pub fn toggle_cell(
        &mut self,
        day: usize,
        slot: usize,
        now: Instant,
    ) -> Result<Option<bool>, PersistenceError> {
        let Some(value) = self.schedule.toggle(day, slot) else {
            return Ok(None);
        };
        info!(
            "Toggled {} to {}",
            ClockReading::new(day, slot),
            if value { "ACTIVE" } else { "INACTIVE" }
        );
        self.after_edit(day, value, now)?;
        Ok(Some(value))
    }

    /// Paint a run of slots on one day, persist once, and check for gaps when
    /// painting ON.
    pub fn paint(
        &mut self,
        day: usize,
        slots: RangeInclusive<usize>,
        value: bool,
        now: Instant,
    ) -> Result<usize, PersistenceError> {
        let written = self.schedule.paint(day, slots, value);
        if written == 0 {
            return Ok(0);
        }
        self.after_edit(day, value, now)?;
        Ok(written)
    }

    fn after_edit(&mut self, day: usize, painted_on: bool, now: Instant) -> Result<(), PersistenceError> {
        if painted_on {
            if let Some(message) = gap_notice(&self.schedule, day) {
                info!("{}", message.replace('\n', " "));
                self.notice = Some(Notice::new(message, now, self.notice_duration));
            }
        }
        self.save_schedule()
    }

    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let reading = self.clock.now();
        let delays: Vec<u64> = self
            .roster
            .apps()
            .iter()
            .map(|a| a.launch_delay_secs)
            .collect();
        let progress = self.sequencer.progress(&delays, now);

        let apps = self
            .roster
            .apps()
            .iter()
            .enumerate()
            .map(|(i, app)| AppStatus {
                identity: app.identity.clone(),
                name: app.display_name().to_string(),
                launch_delay_secs: app.launch_delay_secs,
                progress: progress
                    .as_ref()
                    .and_then(|p| p.entries.get(i).copied()),
            })
            .collect();

        StatusSnapshot {
            generated_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            reading,
            day_name: reading.day_name().to_string(),
            time: reading.time_label(),
            clock_overridden: self.clock.is_overridden(),
            slot_active: self.schedule.get(reading.day, reading.slot),
            running: self.running,
            launching: self.sequencer.is_launching(),
            apps,
            notice: self
                .notice
                .as_ref()
                .filter(|n| !n.is_expired(now))
                .map(|n| n.message.clone()),
        }
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "YES"
    } else {
        "NO"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed::FixedClock;
    use crate::model::EntryState;
    use crate::roster::fake::{Call, FakeProcessControl};
    use time::macros::datetime;

    type TestController = LifecycleController<FakeProcessControl, FixedClock>;

    struct Harness {
        _dir: tempfile::TempDir,
        ctl: TestController,
    }

    fn harness(mode: LaunchMode, apps: &[(u64, &str)]) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        let mut roster = ProcessRoster::new(FakeProcessControl::default());
        roster.load(apps.iter().map(|(d, id)| ManagedApp::new(*id, *d)).collect());
        let clock = ClockSource::new(FixedClock::at(datetime!(2024-06-03 05:00 UTC)));
        let ctl = LifecycleController::new(store, roster, clock, mode, Duration::from_secs(5));
        Harness { _dir: dir, ctl }
    }

    fn at(ctl: &mut TestController, day: usize, slot: usize) {
        // Stepping resets the debounce; set the override directly so repeated
        // readings stay debounced.
        ctl.clock.set_override(ClockReading::new(day, slot));
    }

    #[test]
    fn edge_triggered_activation_and_deactivation() {
        let mut h = harness(LaunchMode::Direct, &[(0, "A"), (0, "B")]);
        h.ctl.schedule.set(2, 10, true);
        let t0 = Instant::now();

        at(&mut h.ctl, 2, 10);
        let first = h.ctl.tick(t0);
        assert_eq!(first.evaluated, Some(ClockReading::new(2, 10)));
        assert_eq!(first.transitions, vec![Transition::Activated]);
        assert!(h.ctl.is_running());

        let repeat = h.ctl.tick(t0 + Duration::from_millis(16));
        assert_eq!(repeat, TickOutcome::default());

        at(&mut h.ctl, 2, 11);
        let dark = h.ctl.tick(t0 + Duration::from_secs(1));
        assert_eq!(dark.transitions, vec![Transition::Deactivated]);
        assert!(!h.ctl.is_running());

        assert_eq!(h.ctl.roster.control().opened(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(
            h.ctl.roster.control().quit_requests(),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn unchanged_reading_is_evaluated_once() {
        let mut h = harness(LaunchMode::Direct, &[(0, "A")]);
        let t0 = Instant::now();
        at(&mut h.ctl, 0, 0);
        assert!(h.ctl.tick(t0).evaluated.is_some());
        for i in 1..10 {
            assert!(h.ctl.tick(t0 + Duration::from_millis(i * 16)).evaluated.is_none());
        }
        // Dark slot, apps not running: nothing to do, and no probing either.
        assert!(h.ctl.roster.control().calls().is_empty());
    }

    #[test]
    fn staggered_activation_marks_running_only_when_complete() {
        let mut h = harness(LaunchMode::Staggered, &[(5, "A"), (0, "B")]);
        h.ctl.schedule.set(0, 20, true);
        let t0 = Instant::now();

        at(&mut h.ctl, 0, 20);
        let out = h.ctl.tick(t0);
        assert_eq!(out.transitions, vec![Transition::LaunchStarted]);
        assert!(h.ctl.is_launching());
        assert!(!h.ctl.is_running());

        let snap = h.ctl.snapshot(t0);
        assert!(snap.launching);
        assert_eq!(snap.apps[0].progress, Some(EntryState::Waiting { remaining: 1.0 }));
        assert_eq!(snap.apps[1].progress, Some(EntryState::Pending));

        let out = h.ctl.tick(t0 + Duration::from_secs(5));
        assert_eq!(out.evaluated, None);
        assert_eq!(out.transitions, vec![Transition::LaunchCompleted]);
        assert!(h.ctl.is_running());
        assert!(!h.ctl.is_launching());
    }

    #[test]
    fn dark_slot_preempts_launch_in_progress() {
        let mut h = harness(LaunchMode::Staggered, &[(0, "A"), (30, "B"), (0, "C")]);
        h.ctl.schedule.set(0, 20, true);
        let t0 = Instant::now();

        at(&mut h.ctl, 0, 20);
        h.ctl.tick(t0);
        assert_eq!(h.ctl.roster.control().opened(), vec!["A".to_string()]);

        at(&mut h.ctl, 0, 21);
        let out = h.ctl.tick(t0 + Duration::from_secs(2));
        assert_eq!(
            out.transitions,
            vec![Transition::LaunchAbandoned, Transition::Deactivated]
        );
        assert!(!h.ctl.is_launching());
        assert!(!h.ctl.is_running());

        // B and C are never opened afterwards.
        h.ctl.tick(t0 + Duration::from_secs(60));
        assert_eq!(h.ctl.roster.control().opened(), vec!["A".to_string()]);
        assert_eq!(h.ctl.roster.control().quit_requests().len(), 3);
    }

    #[test]
    fn active_slot_with_empty_roster_does_nothing() {
        let mut h = harness(LaunchMode::Staggered, &[]);
        h.ctl.schedule.set(0, 0, true);
        at(&mut h.ctl, 0, 0);
        let out = h.ctl.tick(Instant::now());
        assert!(out.evaluated.is_some());
        assert!(out.transitions.is_empty());
        assert!(!h.ctl.is_running());
    }

    #[test]
    fn stepping_test_time_forces_reevaluation() {
        let mut h = harness(LaunchMode::Direct, &[(0, "A")]);
        h.ctl.schedule.set(0, 11, true);
        let t0 = Instant::now();

        assert_eq!(h.ctl.step_slot(1), None);
        h.ctl.set_clock_override(ClockReading::new(0, 10));
        assert_eq!(h.ctl.tick(t0).evaluated, Some(ClockReading::new(0, 10)));

        assert_eq!(h.ctl.step_slot(1), Some(ClockReading::new(0, 11)));
        assert_eq!(h.ctl.tick(t0).transitions, vec![Transition::Activated]);

        assert_eq!(h.ctl.step_day(1), Some(ClockReading::new(1, 11)));
        assert_eq!(h.ctl.tick(t0).transitions, vec![Transition::Deactivated]);
    }

    #[test]
    fn toggling_clock_mode_resets_debounce() {
        let mut h = harness(LaunchMode::Direct, &[]);
        let t0 = Instant::now();
        assert!(h.ctl.tick(t0).evaluated.is_some());
        assert!(h.ctl.tick(t0).evaluated.is_none());

        assert!(matches!(h.ctl.toggle_clock_mode(), ClockMode::Overridden(_)));
        assert_eq!(h.ctl.tick(t0).evaluated, Some(ClockReading::new(0, 10)));

        assert_eq!(h.ctl.toggle_clock_mode(), ClockMode::Live);
        assert!(h.ctl.tick(t0).evaluated.is_some());
    }

    #[test]
    fn manual_open_and_close_ignore_schedule() {
        let mut h = harness(LaunchMode::Direct, &[(0, "A")]);
        let t0 = Instant::now();
        assert_eq!(h.ctl.force_open(t0), Some(Transition::Activated));
        assert!(h.ctl.is_running());
        assert_eq!(h.ctl.force_close(), vec![Transition::Deactivated]);
        assert!(!h.ctl.is_running());
    }

    #[test]
    fn manual_close_stops_staggered_launch() {
        let mut h = harness(LaunchMode::Staggered, &[(10, "A")]);
        let t0 = Instant::now();
        assert_eq!(h.ctl.force_open(t0), Some(Transition::LaunchStarted));
        assert_eq!(h.ctl.force_open(t0), None);
        assert_eq!(
            h.ctl.force_close(),
            vec![Transition::LaunchAbandoned, Transition::Deactivated]
        );
        h.ctl.tick(t0 + Duration::from_secs(20));
        assert!(h.ctl.roster.control().opened().is_empty());
    }

    #[test]
    fn open_failure_still_completes_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ScheduleStore::new(dir.path().join("schedule.json"));
        let mut roster = ProcessRoster::new(FakeProcessControl::failing(&["A"]));
        roster.load(vec![ManagedApp::new("A", 0), ManagedApp::new("B", 0)]);
        let clock = ClockSource::new(FixedClock::at(datetime!(2024-06-03 05:00 UTC)));
        let mut ctl =
            LifecycleController::new(store, roster, clock, LaunchMode::Direct, Duration::from_secs(5));

        assert_eq!(ctl.force_open(Instant::now()), Some(Transition::Activated));
        assert!(ctl.is_running());
        assert!(ctl.roster.control().calls().contains(&Call::Open("B".into())));
    }

    #[test]
    fn edits_persist_and_raise_gap_notice() {
        let mut h = harness(LaunchMode::Direct, &[]);
        let t0 = Instant::now();

        assert_eq!(h.ctl.paint(3, 18..=19, true, t0).expect("paint"), 2);
        assert!(h.ctl.notice().is_none());
        assert_eq!(h.ctl.paint(3, 21..=22, true, t0).expect("paint"), 2);
        let notice = h.ctl.notice().expect("gap at 10:00");
        assert!(notice.message.contains("10:00-10:30 (30min gap)"));

        let (on_disk, _) = h.ctl.store().load(&WeeklySchedule::default()).expect("load");
        assert_eq!(&on_disk, h.ctl.schedule());

        let out = h.ctl.tick(t0 + Duration::from_secs(6));
        assert!(out.notice_cleared);
        assert!(h.ctl.notice().is_none());
    }

    #[test]
    fn toggling_off_does_not_raise_notice() {
        let mut h = harness(LaunchMode::Direct, &[]);
        let t0 = Instant::now();
        h.ctl.paint(1, 0..=47, true, t0).expect("paint");
        assert_eq!(h.ctl.toggle_cell(1, 5, t0).expect("toggle"), Some(false));
        assert!(h.ctl.notice().is_none());
        assert_eq!(h.ctl.toggle_cell(1, 5, t0).expect("toggle"), Some(true));
        assert_eq!(h.ctl.toggle_cell(9, 5, t0).expect("toggle"), None);
    }

    #[test]
    fn reload_failure_keeps_current_schedule() {
        let mut h = harness(LaunchMode::Direct, &[]);
        h.ctl.schedule.set(4, 4, true);
        std::fs::write(h.ctl.store().path(), "not json").expect("write");
        assert!(h.ctl.reload_schedule().is_err());
        assert!(h.ctl.schedule().get(4, 4));
    }

    #[test]
    fn reload_bootstraps_missing_file() {
        let mut h = harness(LaunchMode::Direct, &[]);
        h.ctl.schedule.set(4, 4, true);
        assert_eq!(h.ctl.reload_schedule().expect("load"), LoadSource::Bootstrapped);
        assert_eq!(h.ctl.schedule(), &WeeklySchedule::default());
        assert!(h.ctl.store().path().exists());
    }

    #[test]
    fn replacing_roster_abandons_launch() {
        let mut h = harness(LaunchMode::Staggered, &[(10, "A")]);
        let t0 = Instant::now();
        h.ctl.force_open(t0);
        assert_eq!(
            h.ctl.replace_roster(vec![ManagedApp::new("B", 0)]),
            Some(Transition::LaunchAbandoned)
        );
        assert_eq!(h.ctl.replace_roster(vec![]), None);
    }
}
