//! On-disk state: the schedule JSON file, the roster text file, and where
//! both live by default.

use crate::error::PersistenceError;
use crate::model::{ManagedApp, NUM_DAYS, NUM_SLOTS};
use crate::roster::parse_roster;
use crate::schedule::WeeklySchedule;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SCHEDULE_FILE: &str = "schedule.json";
pub const ROSTER_FILE: &str = "appsToControl.txt";

/// Default base directory for the schedule and roster files.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("onoffon"))
        .unwrap_or_else(|| PathBuf::from("onoffon-data"))
}

#[derive(Serialize)]
struct ScheduleRecord {
    schedule: Vec<Vec<bool>>,
}

/// Outcome of [`ScheduleStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// The file existed and was merged into the prior schedule.
    File,
    /// No file yet; defaults were returned and written out.
    Bootstrapped,
}

/// JSON persistence for [`WeeklySchedule`], shaped as
/// `{ "schedule": [[bool; 48]; 7] }` with day 0 = Monday.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the schedule from disk on top of `prior`.
    ///
    /// Rows or cells missing from the file (or not booleans) keep their value
    /// from `prior`; anything past 7×48 is ignored. A missing file yields an
    /// all-DARKNESS schedule, which is saved right away so the file exists
    /// afterwards.
    pub fn load(
        &self,
        prior: &WeeklySchedule,
    ) -> Result<(WeeklySchedule, LoadSource), PersistenceError> {
        if !self.path.exists() {
            info!(
                "No schedule at {}, writing defaults (all dark)",
                self.path.display()
            );
            let defaults = WeeklySchedule::default();
            self.save(&defaults)?;
            return Ok((defaults, LoadSource::Bootstrapped));
        }

        let raw = std::fs::read_to_string(&self.path).map_err(|source| PersistenceError::Read {
            path: self.path.clone(),
            source,
        })?;
        let json: Value = serde_json::from_str(&raw).map_err(|source| PersistenceError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut merged = prior.clone();
        match json.get("schedule").and_then(Value::as_array) {
            Some(days) => {
                merge_rows(&mut merged, days);
                if days.len() < NUM_DAYS {
                    warn!(
                        "{} has {} day row(s); days {}..{} keep their previous values",
                        self.path.display(),
                        days.len(),
                        days.len(),
                        NUM_DAYS - 1
                    );
                }
                info!("Loaded schedule from {}", self.path.display());
            }
            None => warn!(
                "{} has no \"schedule\" array, keeping previous schedule",
                self.path.display()
            ),
        }
        Ok((merged, LoadSource::File))
    }

    /// Write the whole grid. The file is replaced via a sibling temp file so a
    /// crash mid-write never leaves a truncated schedule behind.
    pub fn save(&self, schedule: &WeeklySchedule) -> Result<(), PersistenceError> {
        let bytes = encode_schedule(schedule)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })?;
        info!("Saved schedule to {}", self.path.display());
        Ok(())
    }
}

fn merge_rows(target: &mut WeeklySchedule, days: &[Value]) {
    for (d, row) in days.iter().take(NUM_DAYS).enumerate() {
        let Some(slots) = row.as_array() else {
            continue;
        };
        for (s, cell) in slots.iter().take(NUM_SLOTS).enumerate() {
            if let Some(v) = cell.as_bool() {
                target.set(d, s, v);
            }
        }
    }
}

/// Pretty JSON with two-space indent, one array per day.
pub fn encode_schedule(schedule: &WeeklySchedule) -> Result<Vec<u8>, PersistenceError> {
    let record = ScheduleRecord {
        schedule: schedule.days().map(|d| d.to_vec()).collect(),
    };
    serde_json::to_vec_pretty(&record).map_err(PersistenceError::Encode)
}

/// Read and parse the roster file. A missing file is an empty roster.
pub fn load_roster(path: &Path) -> Result<Vec<ManagedApp>, PersistenceError> {
    if !path.exists() {
        warn!("No roster file found at {}", path.display());
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed = parse_roster(&text);
    for problem in &parsed.problems {
        warn!("{}: {}", path.display(), problem);
    }
    for app in &parsed.apps {
        info!(
            "App to control: {} (delay: {}s)",
            app.identity, app.launch_delay_secs
        );
    }
    info!("Loaded {} apps from {}", parsed.apps.len(), path.display());
    Ok(parsed.apps)
}
