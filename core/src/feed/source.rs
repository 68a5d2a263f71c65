use crate::data::base_data::BaseData;
use crate::data::subscription::SubscriptionConfig;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// One subscription's lazy, individually time-ordered stream of samples
/// (§4.4). The merger never looks inside a source beyond `peek_end_time`/
/// `next`; this is the seam a live feed, a file-backed reader, or (as here)
/// an in-memory `VecDataSource` all implement identically.
pub trait MarketDataSource {
    fn subscription(&self) -> &SubscriptionConfig;
    /// The `end_time` of the next item without consuming it, or `None` if
    /// the source is exhausted.
    fn peek_end_time(&self) -> Option<DateTime<Utc>>;
    fn next(&mut self) -> Option<BaseData>;
}

/// An in-memory, pre-sorted `MarketDataSource`. Grounded on the teacher's
/// historical `range_data` buffers, which the backtest engine drains the
/// same way: fully materialized ahead of time, then pulled in order.
pub struct VecDataSource {
    subscription: SubscriptionConfig,
    items: VecDeque<BaseData>,
}

impl VecDataSource {
    pub fn new(subscription: SubscriptionConfig, mut items: Vec<BaseData>) -> Self {
        items.sort_by_key(|d| d.end_time());
        VecDataSource { subscription, items: items.into() }
    }
}

impl MarketDataSource for VecDataSource {
    fn subscription(&self) -> &SubscriptionConfig {
        &self.subscription
    }

    fn peek_end_time(&self) -> Option<DateTime<Utc>> {
        self.items.front().map(|d| d.end_time())
    }

    fn next(&mut self) -> Option<BaseData> {
        self.items.pop_front()
    }
}
