//! Managed applications and the process-control boundary.

use crate::error::{ConfigurationError, ProcessControlError};
use crate::model::ManagedApp;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Roster lines that parsed, plus whatever had to be fixed up or skipped.
#[derive(Debug, Default)]
pub struct ParsedRoster {
    pub apps: Vec<ManagedApp>,
    pub problems: Vec<ConfigurationError>,
}

/// Parse the roster text: one entry per line, either `identity` or
/// `delaySeconds, identity`. Blank lines and `#` comments are skipped.
pub fn parse_roster(text: &str) -> ParsedRoster {
    let mut out = ParsedRoster::default();
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let Some((delay_raw, identity)) = trimmed.split_once(',') else {
            out.apps.push(ManagedApp::new(trimmed, 0));
            continue;
        };

        let identity = identity.trim();
        if identity.is_empty() {
            out.problems
                .push(ConfigurationError::EmptyIdentity { line: line_no });
            continue;
        }

        let delay_raw = delay_raw.trim();
        let delay = match delay_raw.parse::<i64>() {
            Ok(d) if d >= 0 => d as u64,
            Ok(_) => {
                out.problems.push(ConfigurationError::NegativeDelay {
                    line: line_no,
                    raw: delay_raw.to_string(),
                });
                0
            }
            Err(_) => {
                out.problems.push(ConfigurationError::InvalidDelay {
                    line: line_no,
                    raw: delay_raw.to_string(),
                });
                0
            }
        };
        out.apps.push(ManagedApp::new(identity, delay));
    }
    out
}

/// The three operations the controller needs from the platform. Requests are
/// fire-and-forget: implementations must not wait for the application itself.
pub trait ProcessControl {
    /// Is a process for this application running right now?
    fn probe(&self, app: &ManagedApp) -> Result<bool, ProcessControlError>;
    fn open(&self, app: &ManagedApp) -> Result<(), ProcessControlError>;
    /// Ask the application to quit gracefully.
    fn quit(&self, app: &ManagedApp) -> Result<(), ProcessControlError>;
}

/// Upper bound on one `pgrep` run, so a wedged probe cannot stall the tick.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Wait for `child` to exit, killing it once `timeout` has passed.
fn wait_bounded(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Process control backed by `pgrep`, `open`/direct spawn, and
/// `osascript`/`pkill`.
#[derive(Debug)]
pub struct SystemProcessControl {
    // Apps and helpers we spawned but have not reaped yet. On Linux a managed
    // app opened directly is our child, and until reaped its zombie still
    // matches `pgrep`.
    children: Mutex<Vec<Child>>,
    probe_timeout: Duration,
}

impl Default for SystemProcessControl {
    fn default() -> Self {
        Self {
            children: Mutex::new(Vec::new()),
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

impl SystemProcessControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every spawned child that has exited.
    fn reap(&self) {
        if let Ok(mut children) = self.children.lock() {
            children.retain_mut(|c| matches!(c.try_wait(), Ok(None)));
        }
    }

    fn spawn_detached(
        &self,
        action: &'static str,
        app: &ManagedApp,
        mut cmd: Command,
    ) -> Result<(), ProcessControlError> {
        let child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| ProcessControlError::Spawn {
                action,
                identity: app.identity.clone(),
                source,
            })?;
        if let Ok(mut children) = self.children.lock() {
            children.push(child);
        }
        Ok(())
    }
}

impl ProcessControl for SystemProcessControl {
    fn probe(&self, app: &ManagedApp) -> Result<bool, ProcessControlError> {
        self.reap();
        let spawn_err = |source: std::io::Error| ProcessControlError::Spawn {
            action: "probe",
            identity: app.identity.clone(),
            source,
        };
        let mut child = Command::new("pgrep")
            .arg("-x")
            .arg(app.process_name())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_err)?;
        let Some(status) = wait_bounded(&mut child, self.probe_timeout).map_err(spawn_err)? else {
            return Err(ProcessControlError::Timeout {
                action: "probe",
                identity: app.identity.clone(),
                after: self.probe_timeout,
            });
        };
        // pgrep: 0 = match, 1 = no match, anything else is a real failure.
        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(ProcessControlError::Status {
                action: "probe",
                identity: app.identity.clone(),
                status,
            }),
        }
    }

    fn open(&self, app: &ManagedApp) -> Result<(), ProcessControlError> {
        self.reap();
        let cmd = if cfg!(target_os = "macos") {
            let mut c = Command::new("open");
            c.arg(&app.identity);
            c
        } else {
            Command::new(&app.identity)
        };
        self.spawn_detached("open", app, cmd)
    }

    fn quit(&self, app: &ManagedApp) -> Result<(), ProcessControlError> {
        self.reap();
        let cmd = if cfg!(target_os = "macos") {
            let mut c = Command::new("osascript");
            c.arg("-e").arg(format!(
                "tell application \"{}\" to quit",
                app.process_name()
            ));
            c
        } else {
            let mut c = Command::new("pkill");
            c.args(["-TERM", "-x"]).arg(app.process_name());
            c
        };
        self.spawn_detached("quit", app, cmd)
    }
}

/// Ordered list of managed applications plus the means to start and stop them.
pub struct ProcessRoster<P> {
    apps: Vec<ManagedApp>,
    control: P,
}

impl<P: ProcessControl> ProcessRoster<P> {
    pub fn new(control: P) -> Self {
        Self {
            apps: Vec::new(),
            control,
        }
    }

    /// Replace the whole roster.
    pub fn load(&mut self, apps: Vec<ManagedApp>) -> &[ManagedApp] {
        self.apps = apps;
        &self.apps
    }

    pub fn apps(&self) -> &[ManagedApp] {
        &self.apps
    }

    pub fn get(&self, index: usize) -> Option<&ManagedApp> {
        self.apps.get(index)
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    #[cfg(test)]
    pub fn control(&self) -> &P {
        &self.control
    }

    /// A failed probe counts as "not running" so the entry still gets opened.
    pub fn is_running(&self, app: &ManagedApp) -> bool {
        match self.control.probe(app) {
            Ok(running) => running,
            Err(e) => {
                warn!("Probe failed for {}: {}", app.identity, e);
                false
            }
        }
    }

    /// Open `app` unless it is already running. Returns true when an open
    /// request was issued successfully.
    pub fn open_if_needed(&self, app: &ManagedApp) -> bool {
        if self.is_running(app) {
            debug!("{} already running, not opening", app.identity);
            return false;
        }
        info!("  [{}s] Opening {}", app.launch_delay_secs, app.identity);
        match self.control.open(app) {
            Ok(()) => true,
            Err(e) => {
                warn!("Open failed for {}: {}", app.identity, e);
                false
            }
        }
    }

    /// Open every entry at once, in roster order.
    pub fn open_all(&self) -> usize {
        self.apps.iter().filter(|a| self.open_if_needed(a)).count()
    }

    /// Ask every entry to quit, in roster order. Failures are logged and the
    /// pass continues; returns how many requests went out without error.
    pub fn stop_all(&self) -> usize {
        if self.apps.is_empty() {
            return 0;
        }
        info!("Closing apps...");
        let mut sent = 0;
        for app in &self.apps {
            debug!("  quit {}", app.process_name());
            match self.control.quit(app) {
                Ok(()) => sent += 1,
                Err(e) => warn!("Quit failed for {}: {}", app.identity, e),
            }
        }
        sent
    }
}
