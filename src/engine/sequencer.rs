use crate::model::{EntryState, LaunchProgress};
use crate::roster::{ProcessControl, ProcessRoster};
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Idle,
    /// Waiting on roster entry `index`; its delay counts from `started_at`.
    Launching { index: usize, started_at: Instant },
}

/// Result of one [`LaunchSequencer::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Idle,
    /// Still inside the launch; `opened` entries were reached this tick.
    Waiting { opened: usize },
    /// The last entry was reached; the sequencer is idle again.
    Completed { opened: usize },
}

/// Opens roster entries one at a time, each after its own delay.
#[derive(Debug)]
pub struct LaunchSequencer {
    state: LaunchState,
}

impl Default for LaunchSequencer {
    fn default() -> Self {
        Self {
            state: LaunchState::Idle,
        }
    }
}

impl LaunchSequencer {
    #[cfg(test)]
    pub fn state(&self) -> LaunchState {
        self.state
    }

    pub fn is_launching(&self) -> bool {
        matches!(self.state, LaunchState::Launching { .. })
    }

    /// Begin a launch. Does nothing (returns false) for an empty roster or
    /// while a launch is already running.
    pub fn start(&mut self, roster_len: usize, now: Instant) -> bool {
        if roster_len == 0 || self.is_launching() {
            return false;
        }
        info!("Starting apps (staggered)...");
        self.state = LaunchState::Launching {
            index: 0,
            started_at: now,
        };
        true
    }

    /// Drop the launch in progress, if any. Returns true when one was dropped.
    pub fn abandon(&mut self) -> bool {
        let was = self.is_launching();
        self.state = LaunchState::Idle;
        was
    }

    /// Open every entry whose delay has run out. An entry reached on this
    /// tick restarts the clock for the next one at `now`, so zero-delay
    /// entries that follow are opened on the same tick.
    pub fn tick<P: ProcessControl>(&mut self, roster: &ProcessRoster<P>, now: Instant) -> Step {
        let mut opened = 0;
        loop {
            let LaunchState::Launching { index, started_at } = self.state else {
                return Step::Idle;
            };
            // Roster shrank under us.
            let Some(app) = roster.get(index) else {
                self.state = LaunchState::Idle;
                return Step::Completed { opened };
            };
            if now.saturating_duration_since(started_at) < app.launch_delay() {
                return Step::Waiting { opened };
            }

            roster.open_if_needed(app);
            opened += 1;

            let next = index + 1;
            if next >= roster.len() {
                self.state = LaunchState::Idle;
                info!("All apps started.");
                return Step::Completed { opened };
            }
            self.state = LaunchState::Launching {
                index: next,
                started_at: now,
            };
        }
    }

    /// Per-entry progress for display; `None` when idle.
    pub fn progress(&self, delays: &[u64], now: Instant) -> Option<LaunchProgress> {
        let LaunchState::Launching { index, started_at } = self.state else {
            return None;
        };
        let elapsed = now.saturating_duration_since(started_at);
        let entries = delays
            .iter()
            .enumerate()
            .map(|(i, &delay)| {
                if i < index {
                    EntryState::Started
                } else if i == index {
                    let remaining = if delay > 0 {
                        ((delay as f64 - elapsed.as_secs_f64()) / delay as f64).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    EntryState::Waiting { remaining }
                } else {
                    EntryState::Pending
                }
            })
            .collect();
        Some(LaunchProgress {
            current_index: index,
            elapsed,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ManagedApp;
    use crate::roster::fake::{Call, FakeProcessControl};
    use std::time::Duration;

    fn roster(entries: &[(u64, &str)]) -> ProcessRoster<FakeProcessControl> {
        let mut r = ProcessRoster::new(FakeProcessControl::default());
        r.load(
            entries
                .iter()
                .map(|(d, id)| ManagedApp::new(*id, *d))
                .collect(),
        );
        r
    }

    fn delays<P: ProcessControl>(r: &ProcessRoster<P>) -> Vec<u64> {
        r.apps().iter().map(|a| a.launch_delay_secs).collect()
    }

    #[test]
    fn staggered_launch_opens_in_order_after_delays() {
        let r = roster(&[(5, "A"), (0, "B")]);
        let t0 = Instant::now();
        let mut seq = LaunchSequencer::default();
        assert!(seq.start(r.len(), t0));

        assert_eq!(seq.tick(&r, t0), Step::Waiting { opened: 0 });
        let p = seq.progress(&delays(&r), t0).expect("launching");
        assert_eq!(p.current_index, 0);
        assert_eq!(
            p.entries,
            vec![EntryState::Waiting { remaining: 1.0 }, EntryState::Pending]
        );
        assert!(r.control().opened().is_empty());

        let t5 = t0 + Duration::from_secs(5);
        assert_eq!(seq.tick(&r, t5), Step::Completed { opened: 2 });
        assert_eq!(r.control().opened(), vec!["A".to_string(), "B".to_string()]);
        assert_eq!(seq.state(), LaunchState::Idle);
        assert!(seq.progress(&delays(&r), t5).is_none());
    }

    #[test]
    fn each_entry_waits_from_when_the_previous_one_opened() {
        let r = roster(&[(0, "A"), (10, "B"), (2, "C")]);
        let t0 = Instant::now();
        let mut seq = LaunchSequencer::default();
        seq.start(r.len(), t0);

        assert_eq!(seq.tick(&r, t0), Step::Waiting { opened: 1 });
        let t4 = t0 + Duration::from_secs(4);
        let p = seq.progress(&delays(&r), t4).expect("launching");
        assert_eq!(p.current_index, 1);
        assert_eq!(p.entries[0], EntryState::Started);
        assert_eq!(p.entries[1], EntryState::Waiting { remaining: 0.6 });
        assert_eq!(p.entries[2], EntryState::Pending);

        let t10 = t0 + Duration::from_secs(10);
        assert_eq!(seq.tick(&r, t10), Step::Waiting { opened: 1 });
        assert_eq!(seq.tick(&r, t10 + Duration::from_secs(1)), Step::Waiting { opened: 0 });
        assert_eq!(
            seq.tick(&r, t10 + Duration::from_secs(2)),
            Step::Completed { opened: 1 }
        );
    }

    #[test]
    fn already_running_entries_are_skipped_but_still_advance() {
        let r = roster(&[(0, "A"), (0, "B")]);
        r.control().mark_running("A");
        let t0 = Instant::now();
        let mut seq = LaunchSequencer::default();
        seq.start(r.len(), t0);
        assert_eq!(seq.tick(&r, t0), Step::Completed { opened: 2 });
        assert_eq!(
            r.control().calls(),
            vec![
                Call::Probe("A".into()),
                Call::Probe("B".into()),
                Call::Open("B".into())
            ]
        );
    }

    #[test]
    fn failed_open_does_not_stop_the_sequence() {
        let mut r = ProcessRoster::new(FakeProcessControl::failing(&["A"]));
        r.load(vec![ManagedApp::new("A", 0), ManagedApp::new("B", 0)]);
        let mut seq = LaunchSequencer::default();
        let t0 = Instant::now();
        seq.start(r.len(), t0);
        assert_eq!(seq.tick(&r, t0), Step::Completed { opened: 2 });
        assert_eq!(r.control().opened(), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn failed_probe_is_treated_as_not_running() {
        let mut r = ProcessRoster::new(FakeProcessControl::failing_probe(&["A"]));
        r.load(vec![ManagedApp::new("A", 0), ManagedApp::new("B", 3)]);
        let mut seq = LaunchSequencer::default();
        let t0 = Instant::now();
        seq.start(r.len(), t0);
        assert_eq!(seq.tick(&r, t0), Step::Waiting { opened: 1 });
        assert_eq!(
            seq.tick(&r, t0 + Duration::from_secs(3)),
            Step::Completed { opened: 1 }
        );
        assert_eq!(
            r.control().calls(),
            vec![
                Call::Probe("A".into()),
                Call::Open("A".into()),
                Call::Probe("B".into()),
                Call::Open("B".into())
            ]
        );
    }

    #[test]
    fn start_refuses_empty_roster_and_double_start() {
        let mut seq = LaunchSequencer::default();
        let t0 = Instant::now();
        assert!(!seq.start(0, t0));
        assert!(seq.start(2, t0));
        assert!(!seq.start(2, t0 + Duration::from_secs(1)));
        assert_eq!(
            seq.state(),
            LaunchState::Launching {
                index: 0,
                started_at: t0
            }
        );
        assert!(seq.abandon());
        assert!(!seq.abandon());
    }

    #[test]
    fn zero_delay_progress_is_zero() {
        let mut seq = LaunchSequencer::default();
        let t0 = Instant::now();
        seq.start(1, t0);
        let p = seq.progress(&[0], t0).expect("launching");
        assert_eq!(p.entries, vec![EntryState::Waiting { remaining: 0.0 }]);
    }
}
