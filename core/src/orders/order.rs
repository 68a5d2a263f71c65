use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

pub type OrderId = u64;

fn sign(d: Decimal) -> Decimal {
    if d > Decimal::ZERO {
        Decimal::ONE
    } else if d < Decimal::ZERO {
        -Decimal::ONE
    } else {
        Decimal::ZERO
    }
}

/// The six order types the core understands (§3 Order, §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    MarketOnOpen,
    MarketOnClose,
}

impl OrderType {
    pub fn requires_limit_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderType::StopMarket | OrderType::StopLimit)
    }

    /// Market-on-open/close orders only allow `quantity`/`tag` updates (§4.7 Update).
    pub fn only_quantity_and_tag_mutable(&self) -> bool {
        matches!(self, OrderType::MarketOnOpen | OrderType::MarketOnClose)
    }
}

/// Order lifecycle state (§4.7). Terminal = {Filled, Canceled, Invalid}.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum OrderStatus {
    New,
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Invalid,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Invalid)
    }
}

/// An `{quantity?, limit?, stop?, tag?}` patch applied to an order (§4.7 Update).
#[derive(Clone, Debug)]
pub struct OrderUpdateRequest {
    pub quantity: Option<Decimal>,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub tag: Option<String>,
    pub time: DateTime<Utc>,
}

/// Grounded on the teacher's `Order`, collapsed to the spec's six order
/// types and signed-quantity convention. `stop_triggered` tracks whether a
/// `StopLimit` order's stop leg has fired, so it behaves as a limit order
/// on subsequent data (§4.8 StopLimit).
#[derive(Clone, Debug)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub tag: String,
    pub created_time: DateTime<Utc>,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub is_async: bool,
    pub stop_triggered: bool,
    pub update_requests: Vec<OrderUpdateRequest>,
}

impl Order {
    /// Invariant: `filled_qty + remaining_qty() == |quantity|` (§3 Order).
    pub fn remaining_qty(&self) -> Decimal {
        self.quantity.abs() - self.filled_qty
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The still-open quantity, signed the same way as `quantity`.
    pub fn remaining_signed(&self) -> Decimal {
        self.remaining_qty() * sign(self.quantity)
    }
}

/// Fires at every observable transition in the order FSM (§6 `onOrderEvent`).
#[derive(Clone, Debug)]
pub enum OrderEvent {
    Submitted { order_id: OrderId, symbol: Symbol },
    PartiallyFilled { order_id: OrderId, symbol: Symbol, fill_qty: Decimal, fill_price: Decimal, fee: Decimal },
    Filled { order_id: OrderId, symbol: Symbol, fill_qty: Decimal, fill_price: Decimal, fee: Decimal },
    Canceled { order_id: OrderId, symbol: Symbol },
    Invalid { order_id: OrderId, symbol: Symbol, reason: String },
    Updated { order_id: OrderId, symbol: Symbol },
}

impl OrderEvent {
    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Submitted { order_id, .. }
            | OrderEvent::PartiallyFilled { order_id, .. }
            | OrderEvent::Filled { order_id, .. }
            | OrderEvent::Canceled { order_id, .. }
            | OrderEvent::Invalid { order_id, .. }
            | OrderEvent::Updated { order_id, .. } => *order_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SecurityType;
    use rust_decimal_macros::dec;

    fn t() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn order(quantity: Decimal) -> Order {
        Order {
            id: 1,
            symbol: Symbol::new("SPY", SecurityType::Equity, "NYSE"),
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
            stop_price: None,
            tag: String::new(),
            created_time: t(),
            status: OrderStatus::Submitted,
            filled_qty: Decimal::ZERO,
            is_async: false,
            stop_triggered: false,
            update_requests: Vec::new(),
        }
    }

    #[test]
    fn remaining_qty_tracks_fills() {
        let mut o = order(dec!(10));
        assert_eq!(o.remaining_qty(), dec!(10));
        o.filled_qty = dec!(4);
        assert_eq!(o.remaining_qty(), dec!(6));
        assert_eq!(o.remaining_signed(), dec!(6));
    }

    #[test]
    fn remaining_signed_follows_sell_side() {
        let mut o = order(dec!(-10));
        o.filled_qty = dec!(3);
        assert_eq!(o.remaining_signed(), dec!(-7));
    }

    #[test]
    fn market_on_open_only_allows_quantity_and_tag_updates() {
        assert!(OrderType::MarketOnOpen.only_quantity_and_tag_mutable());
        assert!(!OrderType::Limit.only_quantity_and_tag_mutable());
    }

    #[test]
    fn order_type_and_status_display_their_variant_name() {
        assert_eq!(OrderType::StopLimit.to_string(), "StopLimit");
        assert_eq!(OrderStatus::PartiallyFilled.to_string(), "PartiallyFilled");
    }
}
