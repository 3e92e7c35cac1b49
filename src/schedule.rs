use crate::model::{NUM_DAYS, NUM_SLOTS};
use std::ops::RangeInclusive;

/// Weekly ON/OFF grid: `true` is ACTIVE (apps run), `false` is DARKNESS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    cells: [[bool; NUM_SLOTS]; NUM_DAYS],
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        Self {
            cells: [[false; NUM_SLOTS]; NUM_DAYS],
        }
    }
}

impl WeeklySchedule {
    /// Out-of-range coordinates read as DARKNESS.
    pub fn get(&self, day: usize, slot: usize) -> bool {
        self.cells
            .get(day)
            .and_then(|d| d.get(slot))
            .copied()
            .unwrap_or(false)
    }

    /// Returns false when the coordinates fall outside the grid.
    pub fn set(&mut self, day: usize, slot: usize, value: bool) -> bool {
        match self.cells.get_mut(day).and_then(|d| d.get_mut(slot)) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Flip one cell and return its new value.
    pub fn toggle(&mut self, day: usize, slot: usize) -> Option<bool> {
        let cell = self.cells.get_mut(day)?.get_mut(slot)?;
        *cell = !*cell;
        Some(*cell)
    }

    /// Set a run of slots on one day to the same value. Returns the number of
    /// cells written; slots past the end of the day are ignored.
    pub fn paint(&mut self, day: usize, slots: RangeInclusive<usize>, value: bool) -> usize {
        let Some(row) = self.cells.get_mut(day) else {
            return 0;
        };
        let (start, end) = slots.into_inner();
        let (lo, hi) = (start.min(end), start.max(end).min(NUM_SLOTS - 1));
        if lo >= NUM_SLOTS {
            return 0;
        }
        row[lo..=hi].iter_mut().for_each(|c| *c = value);
        hi - lo + 1
    }

    pub fn day(&self, day: usize) -> &[bool] {
        &self.cells[day]
    }

    pub fn days(&self) -> impl Iterator<Item = &[bool; NUM_SLOTS]> {
        self.cells.iter()
    }

    #[cfg(test)]
    pub fn active_slots(&self, day: usize) -> usize {
        self.cells[day].iter().filter(|c| **c).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_dark() {
        let s = WeeklySchedule::default();
        for d in 0..NUM_DAYS {
            assert_eq!(s.active_slots(d), 0);
        }
    }

    #[test]
    fn toggle_twice_restores_every_cell() {
        let mut s = WeeklySchedule::default();
        s.paint(2, 10..=20, true);
        let before = s.clone();
        for d in 0..NUM_DAYS {
            for slot in 0..NUM_SLOTS {
                s.toggle(d, slot);
                s.toggle(d, slot);
            }
        }
        assert_eq!(s, before);
    }

    #[test]
    fn out_of_range_is_ignored() {
        let mut s = WeeklySchedule::default();
        assert!(!s.set(7, 0, true));
        assert!(!s.set(0, 48, true));
        assert_eq!(s.toggle(0, 99), None);
        assert!(!s.get(9, 9));
    }

    #[test]
    fn paint_accepts_reversed_and_clipped_ranges() {
        let mut s = WeeklySchedule::default();
        assert_eq!(s.paint(0, 20..=18, true), 3);
        assert!(s.get(0, 18) && s.get(0, 19) && s.get(0, 20));
        assert_eq!(s.paint(1, 46..=60, true), 2);
        assert_eq!(s.active_slots(1), 2);
        assert_eq!(s.paint(1, 50..=60, true), 0);
    }
}
