use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;

/// Single source of truth for simulation time (§4.1). The one legitimate
/// piece of process-wide state; injected through a handle so tests can drive
/// a virtual clock instead of wall time.
#[derive(Debug)]
pub struct Clock {
    utc: DateTime<Utc>,
    zones: DashMap<Tz, ()>,
}

impl Clock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Clock { utc: start, zones: DashMap::new() }
    }

    pub fn utc(&self) -> DateTime<Utc> {
        self.utc
    }

    /// Advances the clock. Fails with [`ConfigError::ClockRegression`] if
    /// `next` is strictly before the current instant.
    pub fn set_utc(&mut self, next: DateTime<Utc>) -> Result<(), ConfigError> {
        if next < self.utc {
            return Err(ConfigError::ClockRegression { current: self.utc, attempted: next });
        }
        self.utc = next;
        Ok(())
    }

    pub fn add_zone(&self, zone: Tz) {
        self.zones.insert(zone, ());
    }

    /// The zone-conversion of the current UTC instant. Always consistent
    /// with `utc()` by construction — there is no separately cached value to
    /// drift out of sync.
    pub fn local_time_in(&self, zone: Tz) -> DateTime<Tz> {
        self.utc.with_timezone(&zone)
    }

    pub fn registered_zones(&self) -> Vec<Tz> {
        self.zones.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn monotonic_advance_succeeds() {
        let mut clock = Clock::new(t("2024-01-01T00:00:00Z"));
        assert!(clock.set_utc(t("2024-01-01T00:01:00Z")).is_ok());
        assert_eq!(clock.utc(), t("2024-01-01T00:01:00Z"));
    }

    #[test]
    fn regression_is_rejected() {
        let mut clock = Clock::new(t("2024-01-01T00:01:00Z"));
        let err = clock.set_utc(t("2024-01-01T00:00:00Z")).unwrap_err();
        assert!(matches!(err, ConfigError::ClockRegression { .. }));
        // state is unchanged on error
        assert_eq!(clock.utc(), t("2024-01-01T00:01:00Z"));
    }

    #[test]
    fn local_time_always_matches_utc_conversion() {
        let mut clock = Clock::new(t("2024-03-10T12:00:00Z"));
        clock.add_zone(chrono_tz::America::New_York);
        clock.set_utc(t("2024-03-10T15:00:00Z")).unwrap();
        let local = clock.local_time_in(chrono_tz::America::New_York);
        assert_eq!(local, chrono_tz::America::New_York.from_utc_datetime(&t("2024-03-10T15:00:00Z").naive_utc()));
    }
}
