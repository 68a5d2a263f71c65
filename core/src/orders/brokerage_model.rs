use crate::orders::order::{Order, OrderType};
use crate::portfolio::security::Security;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Policy bundle governing which orders a brokerage accepts, its fee/
/// slippage defaults, and how corporate actions move open orders (§4.8, §9
/// design note: generalizes the teacher's hardcoded `Brokerage` enum
/// behavior — margin/fees baked directly into `Ledger` — into an injectable
/// policy).
pub trait BrokerageModel: Send + Sync {
    fn supports_order_type(&self, order_type: OrderType) -> bool {
        let _ = order_type;
        true
    }

    /// Returns `Err(reason)` to reject a submit before it reaches the FSM (§4.7 Submit).
    fn validate_order(&self, order: &Order, security: &Security) -> Result<(), String> {
        let _ = (order, security);
        Ok(())
    }

    fn fee(&self, order: &Order, fill_qty: Decimal, fill_price: Decimal) -> Decimal;

    fn slippage_bps(&self) -> Decimal {
        Decimal::ZERO
    }

    /// Minutes before session open after which a `marketOnOpen` order may
    /// no longer be submitted for that session (§4.8).
    fn open_auction_cutoff_minutes(&self) -> i64 {
        0
    }

    /// Minutes before session close after which `marketOnClose` fills are
    /// evaluated for the current session (§4.8).
    fn close_auction_cutoff_minutes(&self) -> i64 {
        10
    }

    /// Whether a forward/reverse split scales open orders' quantity/prices (§4.6).
    fn split_adjusts_orders(&self) -> bool {
        true
    }

    /// Reverse splits cancel open orders regardless of `split_adjusts_orders` (§4.6).
    fn cancels_orders_on_reverse_split(&self) -> bool {
        true
    }
}

/// A flat-fee cash-account brokerage with no slippage, used when a strategy
/// never calls `setBrokerageModel`.
pub struct DefaultBrokerageModel {
    pub flat_fee: Decimal,
}

impl Default for DefaultBrokerageModel {
    fn default() -> Self {
        DefaultBrokerageModel { flat_fee: dec!(1) }
    }
}

impl BrokerageModel for DefaultBrokerageModel {
    fn fee(&self, _order: &Order, _fill_qty: Decimal, _fill_price: Decimal) -> Decimal {
        self.flat_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_supports_every_order_type() {
        let model = DefaultBrokerageModel::default();
        assert!(model.supports_order_type(OrderType::StopLimit));
        assert!(model.split_adjusts_orders());
    }
}
