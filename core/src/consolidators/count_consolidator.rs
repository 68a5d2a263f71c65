use crate::consolidators::trait_def::Consolidator;
use crate::data::base_data::{BaseData, TradeBar};
use crate::data::rolling_window::RollingWindow;
use crate::data::subscription::SubscriptionConfig;
use crate::error::DataError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Emits a bar after every `ticks_per_bar` input samples; boundaries are
/// value-defined (sample count), not time-aligned. Grounded on the teacher's
/// `CountConsolidator`.
pub struct CountConsolidator {
    subscription: SubscriptionConfig,
    ticks_per_bar: u64,
    counter: u64,
    current: Option<TradeBar>,
    last_input_time: Option<DateTime<Utc>>,
    history: RollingWindow<BaseData>,
}

impl CountConsolidator {
    pub fn new(subscription: SubscriptionConfig, ticks_per_bar: u64, history_to_retain: usize) -> Self {
        CountConsolidator {
            subscription,
            ticks_per_bar,
            counter: 0,
            current: None,
            last_input_time: None,
            history: RollingWindow::new(history_to_retain),
        }
    }

    fn price_of(data: &BaseData) -> Decimal {
        match data {
            BaseData::Tick(t) => t.last.or(t.bid).or(t.ask).unwrap_or_default(),
            BaseData::TradeBar(b) => b.close,
            _ => Decimal::ZERO,
        }
    }

    fn volume_of(data: &BaseData) -> Decimal {
        match data {
            BaseData::TradeBar(b) => b.volume,
            _ => Decimal::ZERO,
        }
    }
}

impl Consolidator for CountConsolidator {
    fn subscription(&self) -> &SubscriptionConfig {
        &self.subscription
    }

    fn update(&mut self, data: &BaseData) -> Result<Vec<BaseData>, DataError> {
        if let Some(last) = self.last_input_time {
            if data.time() == last {
                return Err(DataError::DuplicateTimestamp { symbol: data.symbol().ticker.clone(), time: data.time() });
            }
        }
        self.last_input_time = Some(data.time());

        let price = Self::price_of(data);
        match &mut self.current {
            None => {
                self.current = Some(TradeBar {
                    symbol: data.symbol().clone(),
                    time: data.time(),
                    end_time: data.time(),
                    open: price,
                    high: price,
                    low: price,
                    close: price,
                    volume: Self::volume_of(data),
                });
                self.counter = 1;
            }
            Some(bar) => {
                bar.high = bar.high.max(price);
                bar.low = bar.low.min(price);
                bar.close = price;
                bar.end_time = data.time();
                bar.volume += Self::volume_of(data);
                self.counter += 1;
            }
        }

        if self.counter >= self.ticks_per_bar {
            let mut finished = self.current.take().unwrap();
            if finished.end_time <= finished.time {
                finished.end_time = finished.time + chrono::Duration::nanoseconds(1);
            }
            self.counter = 0;
            self.history.add(BaseData::TradeBar(finished.clone()));
            return Ok(vec![BaseData::TradeBar(finished)]);
        }
        Ok(Vec::new())
    }

    fn history(&self) -> &RollingWindow<BaseData> {
        &self.history
    }

    fn current(&self) -> Option<&BaseData> {
        None
    }

    fn clear(&mut self) {
        self.current = None;
        self.counter = 0;
        self.last_input_time = None;
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::resolution::Resolution;
    use crate::symbol::{SecurityType, Symbol};
    use rust_decimal_macros::dec;

    fn tick_at(symbol: &Symbol, secs: i64, price: Decimal) -> BaseData {
        BaseData::Tick(crate::data::base_data::Tick {
            symbol: symbol.clone(),
            time: DateTime::from_timestamp(secs, 0).unwrap(),
            bid: None,
            ask: None,
            last: Some(price),
            exchange: "TEST".into(),
        })
    }

    #[test]
    fn emits_after_n_ticks_and_never_with_zero_samples() {
        let symbol = Symbol::new("ESZ4", SecurityType::Cfd, "CME");
        let config = SubscriptionConfig::new(symbol.clone(), Resolution::Tick, chrono_tz::UTC);
        let mut c = CountConsolidator::new(config, 3, 5);
        assert!(c.update(&tick_at(&symbol, 0, dec!(100))).unwrap().is_empty());
        assert!(c.update(&tick_at(&symbol, 1, dec!(101))).unwrap().is_empty());
        let out = c.update(&tick_at(&symbol, 2, dec!(99))).unwrap();
        assert_eq!(out.len(), 1);
        if let BaseData::TradeBar(bar) = &out[0] {
            assert_eq!(bar.high, dec!(101));
            assert_eq!(bar.low, dec!(99));
        }
    }
}
