use crate::data::base_data::{Delisting, Dividend, Split, Tick, TradeBar};
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Immutable snapshot of every subscription's data whose `end_time` equals
/// `t` (§3 Slice, §4.4). Every entry's `end_time()` is `t`; lookup by symbol
/// is O(1) via the backing `HashMap`s.
#[derive(Clone, Debug, Default)]
pub struct Slice {
    pub t: Option<DateTime<Utc>>,
    pub bars: HashMap<Symbol, TradeBar>,
    pub ticks: HashMap<Symbol, Vec<Tick>>,
    pub custom: HashMap<Symbol, Vec<serde_json::Value>>,
    pub splits: Vec<Split>,
    pub dividends: Vec<Dividend>,
    pub delistings: Vec<Delisting>,
    /// (old symbol, new symbol) pairs for ticker-rename events this instant.
    pub symbol_changed_events: Vec<(Symbol, Symbol)>,
}

impl Slice {
    pub fn new(t: DateTime<Utc>) -> Self {
        Slice { t: Some(t), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
            && self.ticks.is_empty()
            && self.custom.is_empty()
            && self.splits.is_empty()
            && self.dividends.is_empty()
            && self.delistings.is_empty()
    }

    pub fn bar(&self, symbol: &Symbol) -> Option<&TradeBar> {
        self.bars.get(symbol)
    }
}
