use crate::orders::order::{Order, OrderId, OrderStatus, OrderType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One named `(t, y)` time series within a chart (§6 persisted state layout).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Series {
    pub points: Vec<(DateTime<Utc>, Decimal)>,
}

impl Series {
    pub fn push(&mut self, t: DateTime<Utc>, y: Decimal) {
        self.points.push((t, y));
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Chart {
    pub series: HashMap<String, Series>,
}

/// Win rate / profit factor / risk-reward summary. Grounded on the teacher's
/// `standardized_types/accounts/statistics.rs`, generalized from
/// `Ledger::print`'s formatted string output into a serializable struct.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub win_rate: Decimal,
    pub profit_factor: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_profit: Decimal,
    pub average_win: Decimal,
    pub average_loss: Decimal,
}

impl Statistics {
    /// Recomputes every derived field from closed-trade realized P&L samples.
    pub fn from_realized_pnls(pnls: &[Decimal]) -> Self {
        let mut stats = Statistics { total_trades: pnls.len() as u64, ..Default::default() };
        for &pnl in pnls {
            if pnl > Decimal::ZERO {
                stats.winning_trades += 1;
                stats.gross_profit += pnl;
            } else if pnl < Decimal::ZERO {
                stats.losing_trades += 1;
                stats.gross_loss += -pnl;
            }
            stats.net_profit += pnl;
        }
        if stats.total_trades > 0 {
            stats.win_rate = Decimal::from(stats.winning_trades) / Decimal::from(stats.total_trades);
        }
        if stats.gross_loss > Decimal::ZERO {
            stats.profit_factor = stats.gross_profit / stats.gross_loss;
        }
        if stats.winning_trades > 0 {
            stats.average_win = stats.gross_profit / Decimal::from(stats.winning_trades);
        }
        if stats.losing_trades > 0 {
            stats.average_loss = stats.gross_loss / Decimal::from(stats.losing_trades);
        }
        stats
    }
}

/// One row of the persisted order blotter: an immutable snapshot of an
/// order at the instant it reached a terminal or notable state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub symbol: String,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub created_time: DateTime<Utc>,
}

impl From<&Order> for OrderRecord {
    fn from(order: &Order) -> Self {
        OrderRecord {
            id: order.id,
            symbol: order.symbol.ticker.clone(),
            quantity: order.quantity,
            order_type: order.order_type,
            status: order.status,
            filled_qty: order.filled_qty,
            created_time: order.created_time,
        }
    }
}

/// The persisted backtest output document (§6): `{statistics, equityCurve,
/// orders, charts}`. Timestamps are UTC ISO-8601 and numeric fields are
/// `rust_decimal::Decimal`, both serializing losslessly through `serde_json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BacktestResult {
    pub statistics: Statistics,
    pub equity_curve: Series,
    pub orders: Vec<OrderRecord>,
    pub charts: HashMap<String, Chart>,
}

impl BacktestResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_equity(&mut self, t: DateTime<Utc>, value: Decimal) {
        self.equity_curve.push(t, value);
    }

    pub fn record_order(&mut self, order: &Order) {
        self.orders.push(OrderRecord::from(order));
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn statistics_computes_win_rate_and_profit_factor() {
        let stats = Statistics::from_realized_pnls(&[dec!(100), dec!(-50), dec!(200), dec!(-25)]);
        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 2);
        assert_eq!(stats.win_rate, dec!(0.5));
        assert_eq!(stats.gross_profit, dec!(300));
        assert_eq!(stats.gross_loss, dec!(75));
        assert_eq!(stats.profit_factor, dec!(4));
        assert_eq!(stats.net_profit, dec!(225));
    }

    #[test]
    fn result_serializes_to_json() {
        let mut result = BacktestResult::new();
        result.record_equity(DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap().with_timezone(&Utc), dec!(100_000));
        let json = result.to_json().unwrap();
        assert!(json.contains("equity_curve"));
    }
}
