use crate::data::subscription::SubscriptionConfig;
use crate::symbol::Symbol;
use rust_decimal::Decimal;

/// How a security's price history relates to raw exchange prints (§3
/// Security, §4.6 dividend cash action). `Raw` is the only mode under which
/// a cash dividend is booked; the other three already bake corporate actions
/// into the price series the subscription serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DataNormalization {
    #[default]
    Raw,
    Adjusted,
    SplitAdjusted,
    TotalReturn,
}

impl DataNormalization {
    pub fn is_raw(&self) -> bool {
        matches!(self, DataNormalization::Raw)
    }
}

/// A tradable registered with the run: identity, market data subscription,
/// leverage, and tradability. Grounded on the teacher's `SymbolInfo` plus
/// the per-symbol bookkeeping `Ledger` keeps alongside it.
#[derive(Clone, Debug)]
pub struct Security {
    pub symbol: Symbol,
    pub subscription: SubscriptionConfig,
    pub leverage: Decimal,
    pub tradable: bool,
    pub price: Option<Decimal>,
    pub data_normalization: DataNormalization,
}

impl Security {
    pub fn new(symbol: Symbol, subscription: SubscriptionConfig, leverage: Decimal) -> Self {
        Security { symbol, subscription, leverage, tradable: true, price: None, data_normalization: DataNormalization::default() }
    }

    pub fn with_data_normalization(mut self, mode: DataNormalization) -> Self {
        self.data_normalization = mode;
        self
    }

    pub fn update_price(&mut self, price: Decimal) {
        self.price = Some(price);
    }

    /// Marks this security untradable after universe removal (§4.5): open
    /// orders are the transaction manager's responsibility to cancel,
    /// liquidation remains the strategy's.
    pub fn mark_untradable(&mut self) {
        self.tradable = false;
    }
}
