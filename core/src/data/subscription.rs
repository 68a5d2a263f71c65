use crate::data::resolution::Resolution;
use crate::symbol::Symbol;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// The kind of bar a subscription consolidates raw samples into, when its
/// resolution requires consolidation rather than a raw tick/quote stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandleType {
    TimeBar,
    Renko { brick_size_bps: u32 },
}

/// Immutable-after-registration subscription request. Grounded on the
/// teacher's `DataSubscription`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub symbol: Symbol,
    pub resolution: Resolution,
    #[serde(skip, default = "default_tz")]
    pub data_time_zone: Tz,
    #[serde(skip, default = "default_tz")]
    pub exchange_time_zone: Tz,
    pub fill_forward: bool,
    pub extended_hours: bool,
    pub is_internal: bool,
    pub candle_type: Option<CandleType>,
}

fn default_tz() -> Tz {
    chrono_tz::UTC
}

impl SubscriptionConfig {
    pub fn new(symbol: Symbol, resolution: Resolution, exchange_time_zone: Tz) -> Self {
        SubscriptionConfig {
            symbol,
            resolution,
            data_time_zone: exchange_time_zone,
            exchange_time_zone,
            fill_forward: false,
            extended_hours: false,
            is_internal: false,
            candle_type: None,
        }
    }

    pub fn fill_forward(mut self, v: bool) -> Self {
        self.fill_forward = v;
        self
    }

    pub fn extended_hours(mut self, v: bool) -> Self {
        self.extended_hours = v;
        self
    }

    pub fn internal(mut self, v: bool) -> Self {
        self.is_internal = v;
        self
    }
}
