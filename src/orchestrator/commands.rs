//! Applying operator commands to the controller.

use super::controller::UiCommand;
use crate::clock::{ClockMode, WallClock};
use crate::engine::LifecycleController;
use crate::gaps::gap_notice;
use crate::model::{ClockReading, ControllerEvent, InfoEvent, RunConfig, Transition, NUM_DAYS};
use crate::roster::ProcessControl;
use crate::storage::{self, LoadSource};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

fn info(tx: &UnboundedSender<ControllerEvent>, ev: InfoEvent) {
    let _ = tx.send(ControllerEvent::Info(ev));
}

pub(crate) fn apply_command<P: ProcessControl, W: WallClock>(
    cfg: &RunConfig,
    ctl: &mut LifecycleController<P, W>,
    cmd: UiCommand,
    now: Instant,
    tx: &UnboundedSender<ControllerEvent>,
) -> Flow {
    let at = ctl.clock().now();
    let transitions: Vec<Transition> = match cmd {
        UiCommand::Quit => return Flow::Quit,
        UiCommand::Open => {
            let t = ctl.force_open(now);
            if t.is_none() {
                let why = if ctl.is_launching() {
                    "Launch already underway"
                } else {
                    "No apps to open"
                };
                info(tx, InfoEvent::Message(why.into()));
            }
            t.into_iter().collect()
        }
        UiCommand::Close => {
            if !ctl.is_running() && !ctl.is_launching() {
                info(
                    tx,
                    InfoEvent::Message("Apps not marked running, sending quit anyway".into()),
                );
            }
            ctl.force_close()
        }
        UiCommand::ReloadSchedule => {
            match ctl.reload_schedule() {
                Ok(LoadSource::File) => info(
                    tx,
                    InfoEvent::ScheduleLoaded {
                        path: ctl.store().path().to_path_buf(),
                    },
                ),
                Ok(LoadSource::Bootstrapped) => info(
                    tx,
                    InfoEvent::ScheduleSaved {
                        path: ctl.store().path().to_path_buf(),
                    },
                ),
                Err(e) => info(tx, InfoEvent::Failed(format!("{e:#}"))),
            }
            Vec::new()
        }
        UiCommand::ReloadRoster => match storage::load_roster(&cfg.roster_path) {
            Ok(apps) => {
                let count = apps.len();
                let t = ctl.replace_roster(apps);
                info(
                    tx,
                    InfoEvent::RosterLoaded {
                        path: cfg.roster_path.clone(),
                        count,
                    },
                );
                t.into_iter().collect()
            }
            Err(e) => {
                info(tx, InfoEvent::Failed(format!("{e:#}")));
                Vec::new()
            }
        },
        UiCommand::Save => {
            match ctl.save_schedule() {
                Ok(()) => info(
                    tx,
                    InfoEvent::ScheduleSaved {
                        path: ctl.store().path().to_path_buf(),
                    },
                ),
                Err(e) => info(tx, InfoEvent::Failed(format!("{e:#}"))),
            }
            Vec::new()
        }
        UiCommand::ToggleClockMode => {
            let mode = ctl.toggle_clock_mode();
            info(
                tx,
                InfoEvent::ClockMode {
                    overridden: matches!(mode, ClockMode::Overridden(_)),
                    at: ctl.clock().now(),
                },
            );
            Vec::new()
        }
        UiCommand::StepSlot(delta) => {
            report_step(tx, ctl.step_slot(delta));
            Vec::new()
        }
        UiCommand::StepDay(delta) => {
            report_step(tx, ctl.step_day(delta));
            Vec::new()
        }
        UiCommand::Toggle { day, slot } => {
            let before = notice_stamp(ctl);
            match ctl.toggle_cell(day, slot, now) {
                Ok(Some(active)) => info(
                    tx,
                    InfoEvent::CellChanged {
                        at: ClockReading::new(day, slot),
                        active,
                    },
                ),
                Ok(None) => info(tx, InfoEvent::Failed("cell out of range".into())),
                Err(e) => info(tx, InfoEvent::Failed(format!("{e:#}"))),
            }
            forward_new_notice(ctl, before, tx);
            Vec::new()
        }
        UiCommand::Paint {
            day,
            from,
            to,
            value,
        } => {
            let before = notice_stamp(ctl);
            match ctl.paint(day, from..=to, value, now) {
                Ok(n) => info(
                    tx,
                    InfoEvent::Message(format!(
                        "Painted {n} slot(s) {}",
                        if value { "ACTIVE" } else { "DARKNESS" }
                    )),
                ),
                Err(e) => info(tx, InfoEvent::Failed(format!("{e:#}"))),
            }
            forward_new_notice(ctl, before, tx);
            Vec::new()
        }
        UiCommand::Status => {
            let _ = tx.send(ControllerEvent::Status(Box::new(ctl.snapshot(now))));
            Vec::new()
        }
        UiCommand::Gaps(day) => {
            let days: Vec<usize> = match day {
                Some(d) => vec![d],
                None => (0..NUM_DAYS).collect(),
            };
            let notices: Vec<String> = days
                .into_iter()
                .filter_map(|d| gap_notice(ctl.schedule(), d))
                .collect();
            if notices.is_empty() {
                info(tx, InfoEvent::Message("No gaps".into()));
            }
            for n in notices {
                let _ = tx.send(ControllerEvent::Notice(n));
            }
            Vec::new()
        }
    };

    for transition in transitions {
        let _ = tx.send(ControllerEvent::Transition { at, transition });
    }
    Flow::Continue
}

fn report_step(tx: &UnboundedSender<ControllerEvent>, stepped: Option<ClockReading>) {
    match stepped {
        Some(r) => info(tx, InfoEvent::Message(format!("Test time: {r}"))),
        None => info(
            tx,
            InfoEvent::Message("Not in test mode (use 'test' first)".into()),
        ),
    }
}

fn notice_stamp<P: ProcessControl, W: WallClock>(
    ctl: &LifecycleController<P, W>,
) -> Option<Instant> {
    ctl.notice().map(|n| n.created_at)
}

fn forward_new_notice<P: ProcessControl, W: WallClock>(
    ctl: &LifecycleController<P, W>,
    before: Option<Instant>,
    tx: &UnboundedSender<ControllerEvent>,
) {
    if let Some(n) = ctl.notice() {
        if Some(n.created_at) != before {
            let _ = tx.send(ControllerEvent::Notice(n.message.clone()));
        }
    }
}
