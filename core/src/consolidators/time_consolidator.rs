use crate::consolidators::trait_def::Consolidator;
use crate::data::base_data::{BaseData, TradeBar};
use crate::data::resolution::Resolution;
use crate::data::rolling_window::RollingWindow;
use crate::data::subscription::SubscriptionConfig;
use crate::error::DataError;
use chrono::{DateTime, Duration, Timelike, Utc};

/// Epoch-anchored bar-open boundary for `time` under `resolution`. Grounded
/// on the teacher's `candlesticks.rs::open_time`.
pub fn open_time(resolution: Resolution, time: DateTime<Utc>) -> DateTime<Utc> {
    match resolution {
        Resolution::Seconds(interval) => {
            let ts = time.timestamp();
            let rounded = ts - ts.rem_euclid(interval as i64);
            DateTime::from_timestamp(rounded, 0).unwrap()
        }
        Resolution::Minutes(interval) => {
            let minute = (time.minute() as u32 / interval as u32) * interval as u32;
            time.with_minute(minute).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap()
        }
        Resolution::Hours(interval) => {
            let hour = (time.hour() as u32 / interval as u32) * interval as u32;
            time.with_hour(hour).unwrap().with_minute(0).unwrap().with_second(0).unwrap().with_nanosecond(0).unwrap()
        }
        Resolution::Daily => time.date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc(),
        Resolution::Tick => time,
    }
}

/// Aggregates a finer raw stream into [`TradeBar`]s of the subscription's
/// period (§4.3). New bar emitted exactly once the next input's `time >=
/// current.end_time`; never emits a bar with zero contributing samples.
pub struct TimeConsolidator {
    subscription: SubscriptionConfig,
    period: Duration,
    current: Option<TradeBar>,
    /// Mirrors `current` as a `BaseData` so `Consolidator::current()` can
    /// hand back a reference without allocating on every call.
    current_view: Option<BaseData>,
    last_input_time: Option<DateTime<Utc>>,
    history: RollingWindow<BaseData>,
}

impl TimeConsolidator {
    pub fn new(subscription: SubscriptionConfig, history_to_retain: usize) -> Self {
        let period = subscription.resolution.as_duration();
        TimeConsolidator {
            subscription,
            period,
            current: None,
            current_view: None,
            last_input_time: None,
            history: RollingWindow::new(history_to_retain),
        }
    }

    fn sync_view(&mut self) {
        self.current_view = self.current.clone().map(BaseData::TradeBar);
    }

    fn bar_bounds(&self, time: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let open = open_time(self.subscription.resolution, time);
        (open, open + self.period)
    }

    fn value_of(data: &BaseData) -> (rust_decimal::Decimal, rust_decimal::Decimal, rust_decimal::Decimal, rust_decimal::Decimal, rust_decimal::Decimal) {
        match data {
            BaseData::TradeBar(b) => (b.open, b.high, b.low, b.close, b.volume),
            BaseData::Tick(t) => {
                let p = t.last.or(t.bid).or(t.ask).unwrap_or_default();
                (p, p, p, p, rust_decimal::Decimal::ZERO)
            }
            _ => (rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO),
        }
    }

    fn start_new_bar(&mut self, data: &BaseData) {
        let (open, high, low, close, volume) = Self::value_of(data);
        let (time, end_time) = self.bar_bounds(data.time());
        self.current = Some(TradeBar { symbol: data.symbol().clone(), time, end_time, open, high, low, close, volume });
    }
}

impl Consolidator for TimeConsolidator {
    fn subscription(&self) -> &SubscriptionConfig {
        &self.subscription
    }

    fn update(&mut self, data: &BaseData) -> Result<Vec<BaseData>, DataError> {
        if let Some(last) = self.last_input_time {
            if data.time() == last {
                return Err(DataError::DuplicateTimestamp { symbol: data.symbol().ticker.clone(), time: data.time() });
            }
            if data.time() < last {
                return Err(DataError::NonMonotonicEndTime { symbol: data.symbol().ticker.clone(), previous: last, next: data.time() });
            }
        }
        self.last_input_time = Some(data.time());

        let mut completed = Vec::new();
        match &mut self.current {
            None => self.start_new_bar(data),
            Some(bar) => {
                if data.time() >= bar.end_time {
                    let finished = bar.clone();
                    self.history.add(BaseData::TradeBar(finished.clone()));
                    completed.push(BaseData::TradeBar(finished));
                    self.start_new_bar(data);
                } else {
                    let (_, high, low, close, volume) = Self::value_of(data);
                    bar.high = bar.high.max(high);
                    bar.low = bar.low.min(low);
                    bar.close = close;
                    bar.volume += volume;
                }
            }
        }
        self.sync_view();
        Ok(completed)
    }

    fn update_time(&mut self, time: DateTime<Utc>) -> Vec<BaseData> {
        if let Some(bar) = &self.current {
            if time >= bar.end_time {
                let finished = bar.clone();
                self.history.add(BaseData::TradeBar(finished.clone()));
                self.current = None;
                self.current_view = None;
                return vec![BaseData::TradeBar(finished)];
            }
        }
        Vec::new()
    }

    fn history(&self) -> &RollingWindow<BaseData> {
        &self.history
    }

    fn current(&self) -> Option<&BaseData> {
        self.current_view.as_ref()
    }

    fn clear(&mut self) {
        self.current = None;
        self.current_view = None;
        self.last_input_time = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SecurityType, Symbol};
    use rust_decimal_macros::dec;

    fn tick_at(symbol: &Symbol, secs: i64, price: rust_decimal::Decimal) -> BaseData {
        let t = DateTime::from_timestamp(secs, 0).unwrap();
        BaseData::Tick(crate::data::base_data::Tick { symbol: symbol.clone(), time: t, bid: None, ask: None, last: Some(price), exchange: "TEST".into() })
    }

    #[test]
    fn emits_exactly_one_bar_per_boundary_crossing() {
        let symbol = Symbol::new("EURUSD", SecurityType::Forex, "OANDA");
        let config = SubscriptionConfig::new(symbol.clone(), Resolution::Seconds(5), chrono_tz::UTC);
        let mut c = TimeConsolidator::new(config, 10);

        assert!(c.update(&tick_at(&symbol, 0, dec!(1.1))).unwrap().is_empty());
        assert!(c.update(&tick_at(&symbol, 2, dec!(1.2))).unwrap().is_empty());
        let completed = c.update(&tick_at(&symbol, 5, dec!(1.3))).unwrap();
        assert_eq!(completed.len(), 1);
        if let BaseData::TradeBar(bar) = &completed[0] {
            assert_eq!(bar.close, dec!(1.2));
            assert_eq!(bar.high, dec!(1.2));
        } else {
            panic!("expected trade bar");
        }
    }

    #[test]
    fn rejects_duplicate_timestamp() {
        let symbol = Symbol::new("EURUSD", SecurityType::Forex, "OANDA");
        let config = SubscriptionConfig::new(symbol.clone(), Resolution::Seconds(5), chrono_tz::UTC);
        let mut c = TimeConsolidator::new(config, 10);
        c.update(&tick_at(&symbol, 0, dec!(1.1))).unwrap();
        let err = c.update(&tick_at(&symbol, 0, dec!(1.1))).unwrap_err();
        assert!(matches!(err, DataError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn update_time_flushes_without_new_sample() {
        let symbol = Symbol::new("EURUSD", SecurityType::Forex, "OANDA");
        let config = SubscriptionConfig::new(symbol.clone(), Resolution::Seconds(5), chrono_tz::UTC);
        let mut c = TimeConsolidator::new(config, 10);
        c.update(&tick_at(&symbol, 0, dec!(1.1))).unwrap();
        let flushed = c.update_time(DateTime::from_timestamp(5, 0).unwrap());
        assert_eq!(flushed.len(), 1);
    }
}
