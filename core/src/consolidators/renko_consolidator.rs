use crate::consolidators::trait_def::Consolidator;
use crate::data::base_data::{BaseData, TradeBar};
use crate::data::rolling_window::RollingWindow;
use crate::data::subscription::{CandleType, SubscriptionConfig};
use crate::error::DataError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Value-defined consolidator: emits a brick every time price moves by a
/// fixed amount, independent of elapsed time or sample count. Grounded on
/// the teacher's `RenkoConsolidator` (whose `update` was left `todo!()`);
/// the brick-formation rule itself follows the standard renko construction.
pub struct RenkoConsolidator {
    subscription: SubscriptionConfig,
    brick_size_bps: u32,
    brick_size: Option<Decimal>,
    last_brick_close: Option<Decimal>,
    last_input_time: Option<DateTime<Utc>>,
    history: RollingWindow<BaseData>,
}

impl RenkoConsolidator {
    pub fn new(subscription: SubscriptionConfig, history_to_retain: usize) -> Result<Self, DataError> {
        let brick_size_bps = match subscription.candle_type {
            Some(CandleType::Renko { brick_size_bps }) => brick_size_bps,
            _ => {
                return Err(DataError::MalformedRecord {
                    symbol: subscription.symbol.ticker.clone(),
                    reason: "RenkoConsolidator requires a CandleType::Renko subscription".into(),
                })
            }
        };

        Ok(RenkoConsolidator {
            subscription,
            brick_size_bps,
            brick_size: None,
            last_brick_close: None,
            last_input_time: None,
            history: RollingWindow::new(history_to_retain),
        })
    }

    fn price_of(data: &BaseData) -> Decimal {
        match data {
            BaseData::Tick(t) => t.last.or(t.bid).or(t.ask).unwrap_or_default(),
            BaseData::TradeBar(b) => b.close,
            BaseData::QuoteBar(b) => (b.bid_close + b.ask_close) / Decimal::TWO,
            _ => Decimal::ZERO,
        }
    }

    fn brick(&self, symbol: &crate::symbol::Symbol, time: DateTime<Utc>, open: Decimal, close: Decimal) -> TradeBar {
        TradeBar {
            symbol: symbol.clone(),
            time,
            end_time: time,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: Decimal::ZERO,
        }
    }
}

impl Consolidator for RenkoConsolidator {
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
        let anchor = match self.last_brick_close {
            Some(anchor) => anchor,
            None => {
                self.brick_size = Some((price * Decimal::from(self.brick_size_bps) / Decimal::from(10_000u32)).abs());
                self.last_brick_close = Some(price);
                return Ok(Vec::new());
            }
        };
        let brick_size = self.brick_size.unwrap_or_default();
        if brick_size <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        let mut completed = Vec::new();
        let mut cursor = anchor;
        while price - cursor >= brick_size {
            let next = cursor + brick_size;
            let bar = self.brick(data.symbol(), data.time(), cursor, next);
            self.history.add(BaseData::TradeBar(bar.clone()));
            completed.push(BaseData::TradeBar(bar));
            cursor = next;
        }
        while cursor - price >= brick_size {
            let next = cursor - brick_size;
            let bar = self.brick(data.symbol(), data.time(), cursor, next);
            self.history.add(BaseData::TradeBar(bar.clone()));
            completed.push(BaseData::TradeBar(bar));
            cursor = next;
        }
        self.last_brick_close = Some(cursor);
        Ok(completed)
    }

    fn history(&self) -> &RollingWindow<BaseData> {
        &self.history
    }

    fn current(&self) -> Option<&BaseData> {
        None
    }

    fn clear(&mut self) {
        self.brick_size = None;
        self.last_brick_close = None;
        self.last_input_time = None;
        self.history.clear();
    }
}
