pub mod count_consolidator;
pub mod renko_consolidator;
pub mod time_consolidator;
pub mod trait_def;

pub use count_consolidator::CountConsolidator;
pub use renko_consolidator::RenkoConsolidator;
pub use time_consolidator::{open_time, TimeConsolidator};
pub use trait_def::Consolidator;

use crate::data::base_data::BaseData;
use crate::data::rolling_window::RollingWindow;
use crate::data::subscription::SubscriptionConfig;
use crate::error::DataError;
use chrono::{DateTime, Utc};

/// Closed dispatch over every concrete consolidator kind the core ships.
/// Grounded on the teacher's `ConsolidatorEnum`; kept as a plain enum rather
/// than `Box<dyn Consolidator>` so the merger can hold consolidators by value
/// without indirection (§9 design note).
pub enum ConsolidatorEnum {
    Time(TimeConsolidator),
    Count(CountConsolidator),
    Renko(RenkoConsolidator),
}

impl Consolidator for ConsolidatorEnum {
    fn subscription(&self) -> &SubscriptionConfig {
        match self {
            ConsolidatorEnum::Time(c) => c.subscription(),
            ConsolidatorEnum::Count(c) => c.subscription(),
            ConsolidatorEnum::Renko(c) => c.subscription(),
        }
    }

    fn update(&mut self, data: &BaseData) -> Result<Vec<BaseData>, DataError> {
        match self {
            ConsolidatorEnum::Time(c) => c.update(data),
            ConsolidatorEnum::Count(c) => c.update(data),
            ConsolidatorEnum::Renko(c) => c.update(data),
        }
    }

    fn update_time(&mut self, time: DateTime<Utc>) -> Vec<BaseData> {
        match self {
            ConsolidatorEnum::Time(c) => c.update_time(time),
            ConsolidatorEnum::Count(c) => c.update_time(time),
            ConsolidatorEnum::Renko(c) => c.update_time(time),
        }
    }

    fn history(&self) -> &RollingWindow<BaseData> {
        match self {
            ConsolidatorEnum::Time(c) => c.history(),
            ConsolidatorEnum::Count(c) => c.history(),
            ConsolidatorEnum::Renko(c) => c.history(),
        }
    }

    fn current(&self) -> Option<&BaseData> {
        match self {
            ConsolidatorEnum::Time(c) => c.current(),
            ConsolidatorEnum::Count(c) => c.current(),
            ConsolidatorEnum::Renko(c) => c.current(),
        }
    }

    fn clear(&mut self) {
        match self {
            ConsolidatorEnum::Time(c) => c.clear(),
            ConsolidatorEnum::Count(c) => c.clear(),
            ConsolidatorEnum::Renko(c) => c.clear(),
        }
    }
}

impl ConsolidatorEnum {
    /// Builds the consolidator appropriate for `subscription.candle_type`,
    /// falling back to time-period consolidation when none is set.
    pub fn for_subscription(subscription: SubscriptionConfig, history_to_retain: usize) -> Result<Self, DataError> {
        match subscription.candle_type {
            Some(crate::data::subscription::CandleType::Renko { .. }) => {
                Ok(ConsolidatorEnum::Renko(RenkoConsolidator::new(subscription, history_to_retain)?))
            }
            _ => Ok(ConsolidatorEnum::Time(TimeConsolidator::new(subscription, history_to_retain))),
        }
    }
}
