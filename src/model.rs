use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const NUM_DAYS: usize = 7;
/// Half-hour slots per day.
pub const NUM_SLOTS: usize = 48;
pub const SLOT_MINUTES: usize = 30;

pub const DAY_NAMES: [&str; NUM_DAYS] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Format a slot boundary as `HH:MM`. `NUM_SLOTS` itself renders as `24:00`.
pub fn slot_to_time(slot: usize) -> String {
    format!("{:02}:{:02}", slot / 2, (slot % 2) * SLOT_MINUTES)
}

/// Slot containing the given wall-clock hour and minute.
pub fn slot_of(hour: u8, minute: u8) -> usize {
    hour as usize * 2 + usize::from(minute >= 30)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockReading {
    /// 0 = Monday .. 6 = Sunday
    pub day: usize,
    /// 0..48
    pub slot: usize,
}

impl ClockReading {
    /// Build a reading, wrapping out-of-range values into the week.
    pub fn new(day: usize, slot: usize) -> Self {
        Self {
            day: day % NUM_DAYS,
            slot: slot % NUM_SLOTS,
        }
    }

    pub fn day_name(&self) -> &'static str {
        DAY_NAMES[self.day]
    }

    pub fn time_label(&self) -> String {
        slot_to_time(self.slot)
    }
}

impl std::fmt::Display for ClockReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.day_name(), self.time_label())
    }
}

/// One entry of the roster: what to open, and how long to wait before opening it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedApp {
    pub identity: String,
    pub launch_delay_secs: u64,
}

impl ManagedApp {
    pub fn new(identity: impl Into<String>, launch_delay_secs: u64) -> Self {
        Self {
            identity: identity.into(),
            launch_delay_secs,
        }
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_secs(self.launch_delay_secs)
    }

    /// Name used to find or quit the running process: the identity cut at its
    /// last `.app`, then reduced to the final path component.
    pub fn process_name(&self) -> &str {
        let base = match self.identity.rfind(".app") {
            Some(pos) => &self.identity[..pos],
            None => self.identity.as_str(),
        };
        match base.rfind('/') {
            Some(pos) => &base[pos + 1..],
            None => base,
        }
    }

    /// Last path component of the identity, as shown to the operator.
    pub fn display_name(&self) -> &str {
        match self.identity.rfind('/') {
            Some(pos) => &self.identity[pos + 1..],
            None => self.identity.as_str(),
        }
    }
}

/// How the controller brings the roster up when the schedule turns ACTIVE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    /// Open every entry at once, ignoring delays.
    Direct,
    /// Open entries one after another, waiting each entry's delay first.
    Staggered,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EntryState {
    Pending,
    /// `remaining` drains from 1.0 to 0.0 over the entry's delay; always 0.0
    /// for a zero delay.
    Waiting { remaining: f64 },
    Started,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchProgress {
    pub current_index: usize,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    pub entries: Vec<EntryState>,
}

/// Transient operator message, e.g. a gap warning.
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub created_at: Instant,
    pub duration: Duration,
}

impl Notice {
    pub fn new(message: String, created_at: Instant, duration: Duration) -> Self {
        Self {
            message,
            created_at,
            duration,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.duration
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub schedule_path: PathBuf,
    pub roster_path: PathBuf,
    pub launch_mode: LaunchMode,
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub notice_duration: Duration,
    #[serde(default)]
    pub test_time: Option<ClockReading>,
}

/// What the controller did on a slot change or a manual command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    /// Every entry was opened at once.
    Activated,
    /// A staggered launch began.
    LaunchStarted,
    /// The last entry of a staggered launch was opened.
    LaunchCompleted,
    /// Stop requests went out to the whole roster.
    Deactivated,
    /// A staggered launch was cut short before reaching its last entry.
    LaunchAbandoned,
}

/// Events emitted by the orchestrator and consumed by output layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControllerEvent {
    Transition {
        at: ClockReading,
        transition: Transition,
    },
    Notice(String),
    Status(Box<StatusSnapshot>),
    Info(InfoEvent),
}

/// Structured info events, rendered for the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    ScheduleSaved { path: PathBuf },
    ScheduleLoaded { path: PathBuf },
    RosterLoaded { path: PathBuf, count: usize },
    ClockMode { overridden: bool, at: ClockReading },
    CellChanged { at: ClockReading, active: bool },
    Failed(String),
}

impl InfoEvent {
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::ScheduleSaved { path } => format!("Saved schedule: {}", path.display()),
            InfoEvent::ScheduleLoaded { path } => format!("Loaded schedule: {}", path.display()),
            InfoEvent::RosterLoaded { path, count } => {
                format!("Loaded {} app(s) from {}", count, path.display())
            }
            InfoEvent::ClockMode { overridden, at } => {
                if *overridden {
                    format!("Test mode ON at {at}")
                } else {
                    format!("Test mode OFF, using real time ({at})")
                }
            }
            InfoEvent::CellChanged { at, active } => format!(
                "{at} is now {}",
                if *active { "ACTIVE" } else { "DARKNESS" }
            ),
            InfoEvent::Failed(msg) => format!("Error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatus {
    pub identity: String,
    pub name: String,
    pub launch_delay_secs: u64,
    pub progress: Option<EntryState>,
}

/// Everything a presentation layer needs to draw the current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub generated_at: String,
    pub reading: ClockReading,
    pub day_name: String,
    pub time: String,
    pub clock_overridden: bool,
    pub slot_active: bool,
    pub running: bool,
    pub launching: bool,
    pub apps: Vec<AppStatus>,
    #[serde(default)]
    pub notice: Option<String>,
}
