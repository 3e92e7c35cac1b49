//! Current day and slot, either from the wall clock or held by the operator.

use crate::model::{slot_of, ClockReading, NUM_DAYS, NUM_SLOTS};
use time::{OffsetDateTime, UtcOffset};
use tracing::info;

/// Source of wall-clock time.
pub trait WallClock {
    fn now(&self) -> OffsetDateTime;
}

/// Local time from the OS.
///
/// On some platforms the local offset can only be determined while the
/// process is single-threaded, so the offset seen at startup is kept as a
/// fallback for later reads.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    fallback_offset: UtcOffset,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            fallback_offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc().to_offset(self.fallback_offset))
    }
}

/// Day/slot for a point in time, Monday = day 0.
pub fn reading_at(t: OffsetDateTime) -> ClockReading {
    ClockReading::new(
        t.weekday().number_days_from_monday() as usize,
        slot_of(t.hour(), t.minute()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    Live,
    /// Test mode: time stands still until stepped.
    Overridden(ClockReading),
}

#[derive(Debug)]
pub struct ClockSource<W> {
    wall: W,
    mode: ClockMode,
}

impl<W: WallClock> ClockSource<W> {
    pub fn new(wall: W) -> Self {
        Self {
            wall,
            mode: ClockMode::Live,
        }
    }

    pub fn now(&self) -> ClockReading {
        match self.mode {
            ClockMode::Live => self.live(),
            ClockMode::Overridden(r) => r,
        }
    }

    pub fn live(&self) -> ClockReading {
        reading_at(self.wall.now())
    }

    pub fn is_overridden(&self) -> bool {
        matches!(self.mode, ClockMode::Overridden(_))
    }

    /// Switch live ↔ overridden. Entering test mode starts from the current
    /// live reading.
    pub fn toggle_mode(&mut self) -> ClockMode {
        self.mode = match self.mode {
            ClockMode::Live => {
                let r = self.live();
                info!("TEST MODE ON at {r}");
                ClockMode::Overridden(r)
            }
            ClockMode::Overridden(_) => {
                info!("TEST MODE OFF - using real time");
                ClockMode::Live
            }
        };
        self.mode
    }

    pub fn set_override(&mut self, reading: ClockReading) {
        self.mode = ClockMode::Overridden(reading);
    }

    /// Step the overridden slot, wrapping within the day. No-op when live.
    pub fn advance_slot(&mut self, delta: i32) -> Option<ClockReading> {
        let ClockMode::Overridden(r) = &mut self.mode else {
            return None;
        };
        r.slot = wrap(r.slot, delta, NUM_SLOTS);
        info!("Test time: {r}");
        Some(*r)
    }

    /// Step the overridden day, wrapping within the week. No-op when live.
    pub fn advance_day(&mut self, delta: i32) -> Option<ClockReading> {
        let ClockMode::Overridden(r) = &mut self.mode else {
            return None;
        };
        r.day = wrap(r.day, delta, NUM_DAYS);
        info!("Test time: {r}");
        Some(*r)
    }
}

fn wrap(value: usize, delta: i32, modulus: usize) -> usize {
    (value as i64 + delta as i64).rem_euclid(modulus as i64) as usize
}
