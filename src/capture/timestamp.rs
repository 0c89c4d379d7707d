//! Capture timestamps with picosecond resolution

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Picosecond ticks per second
pub const PSEC_PER_SEC: u64 = 1_000_000_000_000;

/// Wall-clock capture time: whole seconds since the epoch plus picoseconds.
///
/// Ordering compares seconds first, then ticks. `psec` is always below
/// [`PSEC_PER_SEC`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub sec: u32,
    pub psec: u64,
}

impl Timestamp {
    /// Build a timestamp, carrying whole seconds out of `psec`.
    pub const fn new(sec: u32, psec: u64) -> Self {
        Self {
            sec: sec.wrapping_add((psec / PSEC_PER_SEC) as u32),
            psec: psec % PSEC_PER_SEC,
        }
    }

    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::from_duration(since_epoch)
    }

    /// Interpret `d` as time since the Unix epoch.
    pub fn from_duration(d: Duration) -> Self {
        Self {
            sec: d.as_secs() as u32,
            psec: d.subsec_nanos() as u64 * 1_000,
        }
    }

    /// Shift by `delay`, carrying into seconds when the ticks reach a full second.
    pub fn add_delay(self, delay: Delay) -> Self {
        let mut sec = self.sec.wrapping_add(delay.sec);
        let mut psec = self.psec + delay.psec;
        if psec >= PSEC_PER_SEC {
            sec = sec.wrapping_add(1);
            psec -= PSEC_PER_SEC;
        }
        Self { sec, psec }
    }

    /// Time from `earlier` to `self`, zero when `earlier` is not before it.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        if *self <= earlier {
            return Duration::ZERO;
        }
        let (sec, psec) = if self.psec >= earlier.psec {
            (self.sec - earlier.sec, self.psec - earlier.psec)
        } else {
            (self.sec - earlier.sec - 1, self.psec + PSEC_PER_SEC - earlier.psec)
        };
        Duration::new(sec as u64, (psec / 1_000) as u32)
    }

    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.sec as i64, (self.psec / 1_000) as u32)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:012}", self.sec, self.psec)
    }
}

/// Fixed offset added to every ingested timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delay {
    sec: u32,
    psec: u64,
}

impl Delay {
    pub const ZERO: Delay = Delay { sec: 0, psec: 0 };

    pub fn new(sec: u32, psec: u64) -> Result<Self> {
        if psec >= PSEC_PER_SEC {
            return Err(Error::Config(format!(
                "delay sub-second ticks must be below {PSEC_PER_SEC}, got {psec}"
            )));
        }
        Ok(Self { sec, psec })
    }

    /// Split fractional seconds into seconds and picoseconds.
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs < 0.0 || secs > u32::MAX as f64 {
            return Err(Error::Config(format!("invalid delay {secs}")));
        }
        let whole = secs.floor();
        let psec = ((secs - whole) * PSEC_PER_SEC as f64).round() as u64;
        Ok(Self {
            sec: whole as u32,
            psec: psec.min(PSEC_PER_SEC - 1),
        })
    }

    pub fn from_duration(d: Duration) -> Self {
        Self {
            sec: d.as_secs() as u32,
            psec: d.subsec_nanos() as u64 * 1_000,
        }
    }

    pub fn sec(&self) -> u32 {
        self.sec
    }

    pub fn psec(&self) -> u64 {
        self.psec
    }

    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.psec == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes() {
        let ts = Timestamp::new(10, PSEC_PER_SEC + 5);
        assert_eq!(ts, Timestamp { sec: 11, psec: 5 });
    }

    #[test]
    fn test_duration_since() {
        let later = Timestamp::new(12, 250_000_000_000);
        let earlier = Timestamp::new(10, 750_000_000_000);
        assert_eq!(
            later.saturating_duration_since(earlier),
            Duration::from_millis(1500)
        );
        assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
        assert_eq!(later.saturating_duration_since(later), Duration::ZERO);
    }

    #[test]
    fn test_ordering() {
        assert!(Timestamp::new(1, 999) < Timestamp::new(2, 0));
        assert!(Timestamp::new(2, 1) > Timestamp::new(2, 0));
    }

    #[test]
    fn test_add_delay_carries() {
        let ts = Timestamp::new(100, 600_000_000_000);
        let delay = Delay::new(2, 500_000_000_000).unwrap();
        assert_eq!(ts.add_delay(delay), Timestamp::new(103, 100_000_000_000));
    }

    #[test]
    fn test_add_delay_exact_second_boundary() {
        let ts = Timestamp::new(100, 400_000_000_000);
        let delay = Delay::new(0, 600_000_000_000).unwrap();
        let shifted = ts.add_delay(delay);
        assert_eq!(shifted, Timestamp { sec: 101, psec: 0 });
    }

    #[test]
    fn test_delay_rejects_unnormalized_ticks() {
        assert!(Delay::new(1, PSEC_PER_SEC).is_err());
        assert!(Delay::new(1, PSEC_PER_SEC - 1).is_ok());
    }

    #[test]
    fn test_delay_from_secs_f64_keeps_fraction() {
        let delay = Delay::from_secs_f64(1.25).unwrap();
        assert_eq!(delay.sec(), 1);
        assert_eq!(delay.psec(), 250_000_000_000);

        assert!(Delay::from_secs_f64(-1.0).is_err());
        assert!(Delay::from_secs_f64(f64::NAN).is_err());
        assert!(Delay::from_secs_f64(0.0).unwrap().is_zero());
    }

    #[test]
    fn test_from_duration() {
        let d = Duration::new(5, 1_500);
        assert_eq!(Timestamp::from_duration(d), Timestamp::new(5, 1_500_000));
        assert_eq!(Delay::from_duration(d).psec(), 1_500_000);
    }

    #[test]
    fn test_display_and_datetime() {
        let ts = Timestamp::new(1_700_000_000, 123_000_000);
        assert_eq!(ts.to_string(), "1700000000.000123000000");
        let dt = ts.to_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_nanos(), 123_000);
    }
}
