//! Short OFF windows between ON windows. Advisory only: nothing here blocks
//! an edit or a save.

use crate::model::{slot_to_time, DAY_NAMES, SLOT_MINUTES};
use crate::schedule::WeeklySchedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: usize,
    pub len: usize,
}

impl Gap {
    pub fn minutes(&self) -> usize {
        self.len * SLOT_MINUTES
    }

    /// `HH:MM-HH:MM`, end exclusive.
    pub fn span_label(&self) -> String {
        format!(
            "{}-{}",
            slot_to_time(self.start),
            slot_to_time(self.start + self.len)
        )
    }
}

/// Runs of exactly one or two OFF slots with an ON slot directly on both
/// sides. Longer runs are deliberate downtime; the first and last slot can
/// never start a gap.
pub fn find_gaps_in(slots: &[bool]) -> Vec<Gap> {
    let n = slots.len();
    let mut gaps = Vec::new();
    if n < 3 {
        return gaps;
    }

    let mut s = 1;
    while s < n - 1 {
        if !slots[s] && slots[s - 1] {
            if slots[s + 1] {
                gaps.push(Gap { start: s, len: 1 });
            } else if s + 2 < n && slots[s + 2] {
                gaps.push(Gap { start: s, len: 2 });
                s += 1;
            }
        }
        s += 1;
    }
    gaps
}

pub fn find_gaps(schedule: &WeeklySchedule, day: usize) -> Vec<Gap> {
    find_gaps_in(schedule.day(day))
}

/// Operator-facing notice for `day`, or `None` when the day has no gaps.
pub fn gap_notice(schedule: &WeeklySchedule, day: usize) -> Option<String> {
    let gaps = find_gaps(schedule, day);
    if gaps.is_empty() {
        return None;
    }
    let mut msg = format!("NOTICE: {} has gaps:\n", DAY_NAMES[day]);
    for gap in &gaps {
        msg.push_str(&format!(
            "  {} ({}min gap)\n",
            gap.span_label(),
            gap.minutes()
        ));
    }
    msg.push_str("Intentional?");
    Some(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: bool = true;
    const F: bool = false;

    #[test]
    fn single_slot_gap() {
        assert_eq!(find_gaps_in(&[T, T, F, T, T]), vec![Gap { start: 2, len: 1 }]);
    }

    #[test]
    fn two_slot_gap_reported_once() {
        assert_eq!(find_gaps_in(&[T, F, F, T]), vec![Gap { start: 1, len: 2 }]);
    }

    #[test]
    fn boundary_and_long_runs_are_not_gaps() {
        assert!(find_gaps_in(&[F, F, T, T]).is_empty());
        assert!(find_gaps_in(&[T, T, F, F]).is_empty());
        assert!(find_gaps_in(&[T, F, F, F, T]).is_empty());
        assert!(find_gaps_in(&[F, T, F]).is_empty());
        assert!(find_gaps_in(&[]).is_empty());
    }

    #[test]
    fn several_gaps_in_one_day() {
        assert_eq!(
            find_gaps_in(&[T, F, T, F, F, T, F, F, F, T, F, T]),
            vec![
                Gap { start: 1, len: 1 },
                Gap { start: 3, len: 2 },
                Gap { start: 10, len: 1 }
            ]
        );
    }

    #[test]
    fn notice_text() {
        let mut s = WeeklySchedule::default();
        s.paint(2, 18..=35, true);
        s.set(2, 20, false);
        s.paint(2, 30..=31, false);
        let msg = gap_notice(&s, 2).expect("gaps");
        assert_eq!(
            msg,
            "NOTICE: Wed has gaps:\n  10:00-10:30 (30min gap)\n  15:00-16:00 (60min gap)\nIntentional?"
        );
        assert_eq!(gap_notice(&s, 3), None);
    }

    #[test]
    fn gap_ending_at_midnight_renders_24_00() {
        let mut slots = [F; 48];
        slots[45] = T;
        slots[46] = F;
        slots[47] = T;
        let gaps = find_gaps_in(&slots);
        assert_eq!(gaps, vec![Gap { start: 46, len: 1 }]);
        assert_eq!(gaps[0].span_label(), "23:00-23:30");
        assert_eq!(Gap { start: 46, len: 2 }.span_label(), "23:00-24:00");
    }
}
