use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use engine_core::history::WarmupConfig;
use engine_core::portfolio::DataNormalization;
use serde::{Deserialize, Serialize};

/// `{cash, margin}` account type (§6 recognized config flags).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AccountType {
    #[default]
    Cash,
    Margin,
}

/// Either a fixed bar count or a fixed duration of pre-roll (§6 `warmupBars`
/// | `warmupDuration`). Converted to [`WarmupConfig`] once a run starts.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum WarmupSetting {
    Bars(usize),
    Duration(chrono::Duration),
}

impl From<WarmupSetting> for WarmupConfig {
    fn from(value: WarmupSetting) -> Self {
        match value {
            WarmupSetting::Bars(n) => WarmupConfig::BarCount(n),
            WarmupSetting::Duration(d) => WarmupConfig::Duration(d),
        }
    }
}

/// The recognized configuration surface (§6 "Configuration flags"),
/// constructed directly by the host and deserializable via `serde` in the
/// same style as the teacher's standardized types (§1.1 ambient stack).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub initial_cash: rust_decimal::Decimal,
    pub account_currency: String,
    pub warmup: Option<WarmupSetting>,
    pub live_mode: bool,
    pub brokerage_name: Option<String>,
    pub account_type: AccountType,
    pub data_normalization_mode: DataNormalizationMode,
    #[serde(skip, default = "default_tz")]
    pub time_zone: Tz,
    pub strict_data: bool,
    /// When set, a panic caught from a strategy callback (§7 UserException)
    /// halts the run at the next instant boundary instead of only logging it.
    pub strict_user: bool,
}

fn default_tz() -> Tz {
    chrono_tz::UTC
}

/// `serde`-friendly mirror of [`DataNormalization`] (which does not derive
/// `Serialize`/`Deserialize` since it lives in `engine-core` alongside
/// non-serializable security state).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DataNormalizationMode {
    #[default]
    Raw,
    Adjusted,
    SplitAdjusted,
    TotalReturn,
}

impl From<DataNormalizationMode> for DataNormalization {
    fn from(value: DataNormalizationMode) -> Self {
        match value {
            DataNormalizationMode::Raw => DataNormalization::Raw,
            DataNormalizationMode::Adjusted => DataNormalization::Adjusted,
            DataNormalizationMode::SplitAdjusted => DataNormalization::SplitAdjusted,
            DataNormalizationMode::TotalReturn => DataNormalization::TotalReturn,
        }
    }
}

impl Config {
    pub fn new(start_date: DateTime<Utc>, end_date: DateTime<Utc>, initial_cash: rust_decimal::Decimal) -> Self {
        Config {
            start_date,
            end_date,
            initial_cash,
            account_currency: "USD".to_string(),
            warmup: None,
            live_mode: false,
            brokerage_name: None,
            account_type: AccountType::Cash,
            data_normalization_mode: DataNormalizationMode::Raw,
            time_zone: chrono_tz::UTC,
            strict_data: false,
            strict_user: false,
        }
    }

    /// Refuses to let a run start at all on a malformed date range (§7 ConfigError).
    pub fn validate(&self) -> Result<(), engine_core::error::ConfigError> {
        if self.start_date >= self.end_date {
            return Err(engine_core::error::ConfigError::StartNotBeforeEnd { start: self.start_date, end: self.end_date });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_through_json() {
        let config = Config::new(DateTime::<Utc>::from_timestamp(0, 0).unwrap(), DateTime::<Utc>::from_timestamp(86_400, 0).unwrap(), dec!(100_000));
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.initial_cash, dec!(100_000));
    }
}
