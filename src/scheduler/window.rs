//! Canonical window generation
//!
//! A day is cut into fixed-width windows anchored at midnight UTC. With the
//! default 4 hour width the anchors are 00, 04, 08, 12, 16 and 20.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Lazily yields anchor-aligned window starts inside `[start, end)`
///
/// The iterator walks day by day from the UTC date of `start`, so it is
/// finite, ordered and duplicate-free. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct WindowGenerator {
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
    width_hours: u32,
    day: NaiveDate,
    anchor: u32,
}

impl WindowGenerator {
    /// Generate windows of `width_hours` over `[start, end)`
    ///
    /// `width_hours` must be a positive divisor of 24; config validation
    /// enforces this before an engine is built.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, width_hours: u32) -> Self {
        Self {
            range_start: start,
            range_end: end,
            width_hours: width_hours.clamp(1, 24),
            day: start.date_naive(),
            anchor: 0,
        }
    }

    /// Width of each window
    pub fn width(&self) -> Duration {
        Duration::hours(i64::from(self.width_hours))
    }

    /// Anchor hours in a day
    pub fn anchors(&self) -> impl Iterator<Item = u32> {
        (0..24).step_by(self.width_hours as usize)
    }
}

impl Iterator for WindowGenerator {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let day_start = self.day.and_time(NaiveTime::MIN).and_utc();
            if day_start >= self.range_end {
                return None;
            }

            if self.anchor >= 24 {
                self.day = self.day.succ_opt()?;
                self.anchor = 0;
                continue;
            }

            let slot = day_start + Duration::hours(i64::from(self.anchor));
            self.anchor += self.width_hours;

            if slot >= self.range_end {
                return None;
            }
            if slot >= self.range_start {
                return Some(slot);
            }
        }
    }
}

/// Align `instant` down to the window start containing it
pub fn align_down(instant: DateTime<Utc>, width_hours: u32) -> DateTime<Utc> {
    let width = width_hours.clamp(1, 24);
    let day_start = instant.date_naive().and_time(NaiveTime::MIN).and_utc();
    let hours = (instant - day_start).num_hours() as u32;
    day_start + Duration::hours(i64::from(hours - hours % width))
}
