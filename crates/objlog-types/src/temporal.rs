use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Wall-clock milliseconds since the UNIX epoch naming one generation file.
///
/// Snapshot and journal files are called `<stamp>.map` / `<stamp>.log`; the
/// numeric order of stamps is the order in which generations were written.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationStamp(u64);

impl GenerationStamp {
    /// The stamp of "nothing loaded yet"; smaller than every real stamp.
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(wall_clock_ms())
    }
}

impl fmt::Debug for GenerationStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenerationStamp({}ms)", self.0)
    }
}

impl fmt::Display for GenerationStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenerationStamp {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidStamp(s.to_string()));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidStamp(s.to_string()))
    }
}

/// Issues generation stamps that strictly increase across the lifetime of
/// one store, even when several files are created within the same
/// millisecond.
///
/// The clock remembers the largest stamp it issued or observed. When the wall
/// clock has not yet moved past it, [`GenerationClock::issue`] busy-waits
/// across the tick. Stamps more than [`GenerationClock::MAX_AHEAD_MS`] in the
/// future are refused instead of waited for.
#[derive(Debug, Default)]
pub struct GenerationClock {
    last: GenerationStamp,
}

impl GenerationClock {
    /// Largest lead over the wall clock a stamp may have.
    pub const MAX_AHEAD_MS: u64 = 1_000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Largest stamp issued or observed so far.
    pub fn last(&self) -> GenerationStamp {
        self.last
    }

    /// Record a stamp found on disk so later stamps are issued after it.
    ///
    /// Fails for stamps too far in the future to wait for; the clock is left
    /// unchanged.
    pub fn observe(&mut self, stamp: GenerationStamp) -> Result<(), TypeError> {
        check_ahead(stamp, GenerationStamp::now())?;
        self.last = self.last.max(stamp);
        Ok(())
    }

    /// Issue a stamp strictly greater than every stamp seen so far.
    pub fn issue(&mut self) -> Result<GenerationStamp, TypeError> {
        check_ahead(self.last, GenerationStamp::now())?;
        let stamp = Self::wait_after(self.last);
        self.last = stamp;
        Ok(stamp)
    }

    /// Spin until the wall clock is strictly past `stamp` and return the
    /// new wall-clock reading.
    pub fn wait_after(stamp: GenerationStamp) -> GenerationStamp {
        loop {
            let now = GenerationStamp::now();
            if now > stamp {
                return now;
            }
            std::hint::spin_loop();
        }
    }
}

fn check_ahead(stamp: GenerationStamp, now: GenerationStamp) -> Result<(), TypeError> {
    let ahead_ms = stamp.as_millis().saturating_sub(now.as_millis());
    if ahead_ms > GenerationClock::MAX_AHEAD_MS {
        return Err(TypeError::StampAhead {
            stamp: stamp.as_millis(),
            ahead_ms,
        });
    }
    Ok(())
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_produces_reasonable_timestamp() {
        // After 2020-01-01.
        assert!(GenerationStamp::now().as_millis() > 1_577_836_800_000);
    }

    #[test]
    fn issued_stamps_strictly_increase() {
        let mut clock = GenerationClock::new();
        let mut prev = clock.issue().unwrap();
        for _ in 0..5 {
            let next = clock.issue().unwrap();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn issue_waits_past_observed_future_stamp() {
        let mut clock = GenerationClock::new();
        let ahead = GenerationStamp::from_millis(GenerationStamp::now().as_millis() + 3);
        clock.observe(ahead).unwrap();
        assert!(clock.issue().unwrap() > ahead);
    }

    #[test]
    fn far_future_stamps_are_refused() {
        let mut clock = GenerationClock::new();
        let far = GenerationStamp::from_millis(99_999_999_999_999);
        let err = clock.observe(far).unwrap_err();
        assert!(matches!(err, TypeError::StampAhead { stamp: 99_999_999_999_999, .. }));
        assert_eq!(clock.last(), GenerationStamp::ZERO);
        assert!(clock.issue().is_ok());
    }

    #[test]
    fn observe_never_moves_backwards() {
        let mut clock = GenerationClock::new();
        clock.observe(GenerationStamp::from_millis(50)).unwrap();
        clock.observe(GenerationStamp::from_millis(10)).unwrap();
        assert_eq!(clock.last(), GenerationStamp::from_millis(50));
    }

    #[test]
    fn parse_rejects_non_digits() {
        assert_eq!("1700000000000".parse::<GenerationStamp>().unwrap().as_millis(), 1_700_000_000_000);
        assert!("".parse::<GenerationStamp>().is_err());
        assert!("-5".parse::<GenerationStamp>().is_err());
        assert!("12a".parse::<GenerationStamp>().is_err());
    }
}
