//! Shift coverage evaluation

use chrono::Duration;

use crate::models::{Shift, TimeWindow, Worker};

/// Whether `shift` fully contains `window`
///
/// The shift is projected onto the calendar day of the window start. An
/// overnight shift ends on the following day, and the instance that started
/// the day before is also tried so early-morning windows are caught.
pub fn shift_covers(shift: &Shift, window: &TimeWindow) -> bool {
    let day = window.start.date_naive();

    if shift.instance_on(day).contains(window) {
        return true;
    }

    shift.is_overnight() && shift.instance_on(day - Duration::days(1)).contains(window)
}

/// Whether the worker's shift covers `window`; no shift covers nothing
pub fn worker_covers(worker: &Worker, window: &TimeWindow) -> bool {
    worker
        .shift
        .as_ref()
        .is_some_and(|shift| shift_covers(shift, window))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, d, h, 0, 0).unwrap()
    }

    fn window(d: u32, h: u32) -> TimeWindow {
        TimeWindow::starting_at(at(d, h), Duration::hours(4))
    }

    #[test]
    fn test_day_shift() {
        let shift = Shift::parse("DAY", "08:00", "17:00").unwrap();
        assert!(shift_covers(&shift, &window(10, 8)));
        assert!(shift_covers(&shift, &window(10, 12)));
        assert!(!shift_covers(&shift, &window(10, 16)));
        assert!(!shift_covers(&shift, &window(10, 4)));
    }

    #[test]
    fn test_overnight_shift() {
        let shift = Shift::parse("NIGHT", "22:00", "06:00").unwrap();
        // 00-04 falls in the instance that started the previous evening
        assert!(shift_covers(&shift, &window(10, 0)));
        assert!(!shift_covers(&shift, &window(10, 4)));
        assert!(!shift_covers(&shift, &window(10, 20)));
    }

    #[test]
    fn test_overnight_window_crossing_midnight() {
        let shift = Shift::parse("NIGHT", "20:00", "08:00").unwrap();
        let crossing = TimeWindow::new(at(10, 22), at(11, 2));
        assert!(shift_covers(&shift, &crossing));
        assert!(shift_covers(&shift, &window(10, 20)));
        assert!(shift_covers(&shift, &window(11, 4)));
    }

    #[test]
    fn test_overnight_shift_off_anchor_windows() {
        let shift = Shift::parse("NIGHT", "22:00", "06:00").unwrap();

        // Same-day instance, window crosses midnight
        assert!(shift_covers(&shift, &window(10, 23)));
        // Instance that started at 22:00 the day before
        assert!(shift_covers(&shift, &window(10, 1)));
        assert!(shift_covers(&shift, &window(10, 2)));

        // Spills past 06:00 or starts before 22:00
        assert!(!shift_covers(&shift, &window(10, 3)));
        assert!(!shift_covers(&shift, &window(10, 21)));
    }

    #[test]
    fn test_window_end_may_equal_shift_end() {
        let shift = Shift::parse("EARLY", "04:00", "08:00").unwrap();
        assert!(shift_covers(&shift, &window(10, 4)));
    }

    #[test]
    fn test_worker_without_shift() {
        let worker = Worker::new("w1");
        assert!(!worker_covers(&worker, &window(10, 8)));
    }
}
