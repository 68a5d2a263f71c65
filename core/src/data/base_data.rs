use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single trade/price bar over `[time, end_time)`. Grounded on the
/// teacher's `Candle`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeBar {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// A two-sided bar built from bid/ask quotes. Grounded on the teacher's
/// `QuoteBar`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuoteBar {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub bid_open: Decimal,
    pub bid_high: Decimal,
    pub bid_low: Decimal,
    pub bid_close: Decimal,
    pub ask_open: Decimal,
    pub ask_high: Decimal,
    pub ask_low: Decimal,
    pub ask_close: Decimal,
}

/// A single trade or quote tick. Grounded on the teacher's `Tick`/`Quote`,
/// merged into one struct since both are instantaneous point samples.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub exchange: String,
}

impl Tick {
    /// Ticks are instantaneous: `end_time == time`.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.time
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelistingType {
    Warning,
    Delisted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dividend {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub distribution: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Split {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    /// `newPrice = oldPrice * factor`, `newQuantity = oldQuantity / factor`:
    /// `0.5` for a 2-for-1 forward split, `2.0` for a 1-for-2 reverse split.
    pub factor: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Delisting {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub kind: DelistingType,
}

/// A user-defined record carrying arbitrary columns. The merger only ever
/// inspects `(symbol, time, end_time)` (§9 design note); the `payload` is
/// opaque to the core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomData {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub type_id: String,
    pub payload: serde_json::Value,
}

/// Closed tagged variant over every kind of market-data record the core
/// moves through its pipeline (§9 design note: "prefer a tagged variant for
/// BaseData subtypes with a small closed set").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum BaseData {
    TradeBar(TradeBar),
    QuoteBar(QuoteBar),
    Tick(Tick),
    Dividend(Dividend),
    Split(Split),
    Delisting(Delisting),
    Custom(CustomData),
}

impl BaseData {
    pub fn symbol(&self) -> &Symbol {
        match self {
            BaseData::TradeBar(b) => &b.symbol,
            BaseData::QuoteBar(b) => &b.symbol,
            BaseData::Tick(b) => &b.symbol,
            BaseData::Dividend(b) => &b.symbol,
            BaseData::Split(b) => &b.symbol,
            BaseData::Delisting(b) => &b.symbol,
            BaseData::Custom(b) => &b.symbol,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        match self {
            BaseData::TradeBar(b) => b.time,
            BaseData::QuoteBar(b) => b.time,
            BaseData::Tick(b) => b.time,
            BaseData::Dividend(b) => b.time,
            BaseData::Split(b) => b.time,
            BaseData::Delisting(b) => b.time,
            BaseData::Custom(b) => b.time,
        }
    }

    /// Invariant: `end_time > time` for every period-bearing variant; point
    /// samples (tick, corporate actions) have `end_time == time`.
    pub fn end_time(&self) -> DateTime<Utc> {
        match self {
            BaseData::TradeBar(b) => b.end_time,
            BaseData::QuoteBar(b) => b.end_time,
            BaseData::Tick(b) => b.end_time(),
            BaseData::Dividend(b) => b.time,
            BaseData::Split(b) => b.time,
            BaseData::Delisting(b) => b.time,
            BaseData::Custom(b) => b.end_time,
        }
    }

    /// The representative scalar value of this record (close/last/distribution/factor).
    pub fn value(&self) -> Decimal {
        match self {
            BaseData::TradeBar(b) => b.close,
            BaseData::QuoteBar(b) => (b.bid_close + b.ask_close) / Decimal::TWO,
            BaseData::Tick(b) => b.last.or(b.bid).or(b.ask).unwrap_or_default(),
            BaseData::Dividend(b) => b.distribution,
            BaseData::Split(b) => b.factor,
            BaseData::Delisting(_) => Decimal::ZERO,
            BaseData::Custom(_) => Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SecurityType;
    use rust_decimal_macros::dec;

    fn bar(time: DateTime<Utc>, end_time: DateTime<Utc>) -> BaseData {
        BaseData::TradeBar(TradeBar {
            symbol: Symbol::new("SPY", SecurityType::Equity, "NYSE"),
            time,
            end_time,
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(0),
        })
    }

    #[test]
    fn end_time_is_after_time() {
        let t0 = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let t1 = t0 + chrono::Duration::minutes(1);
        let b = bar(t0, t1);
        assert!(b.end_time() > b.time());
    }
}
