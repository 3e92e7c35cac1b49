use crate::clock::{ClockSource, SystemClock};
use crate::engine::LifecycleController;
use crate::model::{ClockReading, ControllerEvent, LaunchMode, RunConfig, DAY_NAMES};
use crate::orchestrator::{self, SystemController, UiCommand};
use crate::roster::{ProcessRoster, SystemProcessControl};
use crate::storage::{self, ScheduleStore};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::warn;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "onoffon",
    version,
    about = "Open and close applications on a weekly half-hour schedule"
)]
pub struct Cli {
    /// Directory holding schedule.json and appsToControl.txt
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Schedule file (default: <data-dir>/schedule.json)
    #[arg(long)]
    pub schedule: Option<PathBuf>,

    /// App list file (default: <data-dir>/appsToControl.txt)
    #[arg(long)]
    pub apps: Option<PathBuf>,

    /// How apps are started when a slot turns ACTIVE
    #[arg(long, value_enum, default_value_t = LaunchMode::Staggered)]
    pub launch_mode: LaunchMode,

    /// How often the schedule and launch progress are checked
    #[arg(long, default_value = "200ms")]
    pub tick_interval: humantime::Duration,

    /// How long schedule notices stay visible
    #[arg(long, default_value = "5s")]
    pub notice_duration: humantime::Duration,

    /// Start in test mode at a fixed time, e.g. "Mon 10:30"
    #[arg(long)]
    pub test_time: Option<String>,

    /// Print status as JSON and exit
    #[arg(long)]
    pub json: bool,

    /// Print a text summary of the status and week and exit
    #[arg(long)]
    pub text: bool,

    /// Do not read operator commands from stdin
    #[arg(long)]
    pub no_console: bool,
}

/// Parse "<day> <HH:MM>" for `--test-time`.
fn parse_test_time(s: &str) -> Result<ClockReading> {
    let (day, time) = s
        .trim()
        .split_once(char::is_whitespace)
        .context("expected \"<day> <HH:MM>\"")?;
    let lower = day.to_ascii_lowercase();
    let day = DAY_NAMES
        .iter()
        .position(|d| lower.starts_with(&d.to_ascii_lowercase()))
        .with_context(|| format!("unknown day {day:?}"))?;
    let slot = crate::console::parse_slot(time.trim()).map_err(anyhow::Error::msg)?;
    Ok(ClockReading::new(day, slot))
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<RunConfig> {
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(storage::default_data_dir);
    let tick_interval = Duration::from(args.tick_interval);
    if tick_interval.is_zero() {
        anyhow::bail!("--tick-interval must be greater than zero");
    }
    let test_time = args
        .test_time
        .as_deref()
        .map(parse_test_time)
        .transpose()
        .context("invalid --test-time")?;

    Ok(RunConfig {
        schedule_path: args
            .schedule
            .clone()
            .unwrap_or_else(|| data_dir.join(storage::SCHEDULE_FILE)),
        roster_path: args
            .apps
            .clone()
            .unwrap_or_else(|| data_dir.join(storage::ROSTER_FILE)),
        launch_mode: args.launch_mode,
        tick_interval,
        notice_duration: Duration::from(args.notice_duration),
        test_time,
    })
}

/// Load schedule and roster and assemble the controller. Load failures are
/// logged and leave the defaults in place.
fn build_controller(cfg: &RunConfig, wall: SystemClock) -> SystemController {
    let mut roster = ProcessRoster::new(SystemProcessControl::new());
    match storage::load_roster(&cfg.roster_path) {
        Ok(apps) => {
            roster.load(apps);
        }
        Err(e) => warn!("App list not loaded: {e:#}"),
    }

    let mut ctl = LifecycleController::new(
        ScheduleStore::new(&cfg.schedule_path),
        roster,
        ClockSource::new(wall),
        cfg.launch_mode,
        cfg.notice_duration,
    );
    // Errors are already logged; the all-dark default stays.
    let _ = ctl.reload_schedule();
    if let Some(reading) = cfg.test_time {
        ctl.set_clock_override(reading);
    }
    ctl
}

#[derive(Serialize)]
struct JsonReport<'a> {
    config: &'a RunConfig,
    status: crate::model::StatusSnapshot,
    schedule: Vec<Vec<bool>>,
}

pub async fn run(args: Cli, wall: SystemClock) -> Result<()> {
    if args.json && args.text {
        anyhow::bail!("--json and --text cannot be used together");
    }
    let cfg = build_config(&args)?;
    let ctl = build_controller(&cfg, wall);

    if args.json || args.text {
        return print_once(&args, &cfg, &ctl).await;
    }
    run_loop(&args, &cfg, ctl).await
}

async fn print_once(args: &Cli, cfg: &RunConfig, ctl: &SystemController) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let snapshot = ctl.snapshot(Instant::now());
    if args.json {
        let report = JsonReport {
            config: cfg,
            status: snapshot,
            schedule: ctl.schedule().days().map(|d| d.to_vec()).collect(),
        };
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
    } else {
        let summary = crate::text_summary::build_text_summary(&snapshot, ctl.schedule());
        for line in summary.lines {
            let _ = out_tx.send(OutputLine::Stdout(line));
        }
    }
    drop(out_tx);
    out_handle.await.context("output writer failed")?;
    Ok(())
}

async fn run_loop(args: &Cli, cfg: &RunConfig, ctl: SystemController) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ControllerEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    if args.no_console {
        drop(cmd_tx);
    } else {
        let _ = out_tx.send(OutputLine::Stderr(
            "Type 'help' for commands, 'quit' to exit.".into(),
        ));
        // The console task is never joined: a pending stdin read cannot be
        // cancelled, so it is left to die with the runtime.
        tokio::spawn(crate::console::run_console(cmd_tx, event_tx.clone()));
    }

    let printer_tx = out_tx.clone();
    let mut printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            for line in render_event(ev) {
                let _ = printer_tx.send(line);
            }
        }
    });

    let res = orchestrator::run_controller(cfg, ctl, event_tx, cmd_rx).await;

    // The console may still hold an event sender, so the printer might never
    // see the channel close. Give it a moment to flush, then stop it.
    if tokio::time::timeout(Duration::from_millis(200), &mut printer)
        .await
        .is_err()
    {
        printer.abort();
    }
    drop(out_tx);
    let _ = out_handle.await;
    res
}

fn render_event(ev: ControllerEvent) -> Vec<OutputLine> {
    match ev {
        ControllerEvent::Transition { at, transition } => {
            vec![OutputLine::Stdout(format!("{at}: {transition:?}"))]
        }
        ControllerEvent::Notice(msg) => msg.lines().map(|l| OutputLine::Stdout(l.into())).collect(),
        ControllerEvent::Status(snap) => crate::text_summary::status_lines(&snap)
            .into_iter()
            .map(OutputLine::Stdout)
            .collect(),
        ControllerEvent::Info(info @ crate::model::InfoEvent::Failed(_)) => {
            vec![OutputLine::Stderr(info.to_message())]
        }
        ControllerEvent::Info(info) => vec![OutputLine::Stdout(info.to_message())],
    }
}
