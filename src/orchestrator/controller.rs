//! Tick loop.
//!
//! Drives the lifecycle controller at a fixed cadence and applies operator
//! commands between ticks. Everything runs on one task, so the controller is
//! never shared.

use super::commands::{apply_command, Flow};
use crate::clock::SystemClock;
use crate::engine::LifecycleController;
use crate::model::{ControllerEvent, InfoEvent, RunConfig};
use crate::roster::SystemProcessControl;
use anyhow::Result;
use std::time::Instant;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tracing::info;

pub(crate) type SystemController = LifecycleController<SystemProcessControl, SystemClock>;

/// Commands sent by the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UiCommand {
    Open,
    Close,
    ReloadSchedule,
    ReloadRoster,
    Save,
    ToggleClockMode,
    StepSlot(i32),
    StepDay(i32),
    Toggle {
        day: usize,
        slot: usize,
    },
    Paint {
        day: usize,
        from: usize,
        to: usize,
        value: bool,
    },
    Status,
    /// Gap report for one day, or the whole week.
    Gaps(Option<usize>),
    Quit,
}

/// Run the schedule loop until Ctrl-C or a `Quit` command.
pub(crate) async fn run_controller(
    cfg: &RunConfig,
    mut ctl: SystemController,
    event_tx: UnboundedSender<ControllerEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut ticker = tokio::time::interval(cfg.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    // Once the console hangs up we keep ticking on the schedule alone.
    let mut commands_open = true;

    info!(
        "Running: {} app(s), {:?} launch, tick every {}",
        ctl.roster().len(),
        cfg.launch_mode,
        humantime::format_duration(cfg.tick_interval)
    );

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(cmd) => {
                        if apply_command(cfg, &mut ctl, cmd, Instant::now(), &event_tx) == Flow::Quit {
                            break;
                        }
                    }
                    None => commands_open = false,
                }
            }
            _ = ticker.tick() => {
                let outcome = ctl.tick(Instant::now());
                let at = ctl.clock().now();
                for transition in outcome.transitions {
                    let _ = event_tx.send(ControllerEvent::Transition { at, transition });
                }
            }
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    let _ = event_tx.send(ControllerEvent::Info(InfoEvent::Failed(format!(
                        "Ctrl-C handler failed: {e}"
                    ))));
                }
                break;
            }
        }
    }

    info!("Shutting down; managed apps are left as they are");
    Ok(())
}
