use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The resolution of a data point, which determines the time period it
/// covers. Grounded on the teacher's `Resolution` enum, trimmed to the
/// spec's closed set of {tick, second, minute, hour, daily}.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum Resolution {
    Tick,
    Seconds(u64),
    Minutes(u64),
    Hours(u64),
    Daily,
}

impl Resolution {
    /// Ticks and Daily return zero: ticks have no fixed period, and daily
    /// bars are bounded by the exchange session rather than a fixed duration.
    pub fn as_duration(&self) -> Duration {
        match self {
            Resolution::Tick => Duration::zero(),
            Resolution::Seconds(v) => Duration::seconds(*v as i64),
            Resolution::Minutes(v) => Duration::minutes(*v as i64),
            Resolution::Hours(v) => Duration::hours(*v as i64),
            Resolution::Daily => Duration::zero(),
        }
    }

    pub fn as_seconds(&self) -> i64 {
        self.as_duration().num_seconds()
    }

    pub fn is_greater_or_equal(&self, other: &Resolution) -> bool {
        self.rank() >= other.rank()
    }

    /// Coarseness ranking used to pick a finer base resolution to consolidate
    /// from. Tick is always finest; Daily is always coarsest.
    fn rank(&self) -> i64 {
        match self {
            Resolution::Tick => -1,
            Resolution::Daily => i64::MAX,
            other => other.as_seconds(),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Tick => write!(f, "Tick"),
            Resolution::Seconds(v) => write!(f, "{v}-Second"),
            Resolution::Minutes(v) => write!(f, "{v}-Minute"),
            Resolution::Hours(v) => write!(f, "{v}-Hour"),
            Resolution::Daily => write!(f, "Daily"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_orders_finer_before_coarser() {
        assert!(Resolution::Tick.rank() < Resolution::Seconds(1).rank());
        assert!(Resolution::Seconds(30).rank() < Resolution::Minutes(1).rank());
        assert!(Resolution::Hours(23).rank() < Resolution::Daily.rank());
    }
}
