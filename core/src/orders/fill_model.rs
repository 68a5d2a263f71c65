use crate::data::base_data::TradeBar;
use crate::orders::order::{Order, OrderType};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Extra per-instant context a fill needs beyond the order and its bar:
/// whether this bar is the session's opening bar (`marketOnOpen`) and
/// whether the brokerage's close-auction cutoff has been reached
/// (`marketOnClose`), both computed by the caller from `ExchangeHours`.
#[derive(Clone, Copy, Debug)]
pub struct FillContext<'a> {
    pub bar: &'a TradeBar,
    pub is_session_open_bar: bool,
    pub close_cutoff_reached: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FillResult {
    pub quantity: Decimal,
    pub price: Decimal,
}

/// Optional hook for partial fills (§4.3 "optional partial-fill model may
/// return filledQty < remaining"). The default never partially fills.
pub trait PartialFillPolicy: Send {
    fn filled_quantity(&mut self, remaining: Decimal, bar: &TradeBar) -> Decimal;
}

pub struct FullFillPolicy;

impl PartialFillPolicy for FullFillPolicy {
    fn filled_quantity(&mut self, remaining: Decimal, _bar: &TradeBar) -> Decimal {
        remaining
    }
}

/// Pure function from `(order, security, data event)` to fill events (§4.8).
/// Owns its own seeded RNG (§9 design note: "random state belongs to the
/// FillModel, not global"), extended from the teacher's `order_matching.rs`
/// trigger logic with `marketOnOpen`/`marketOnClose`, which the teacher does
/// not model.
pub struct FillModel {
    #[allow(dead_code)]
    rng: StdRng,
    slippage_bps: Decimal,
    partial_fill: Box<dyn PartialFillPolicy>,
}

impl FillModel {
    pub fn new(seed: u64, slippage_bps: Decimal) -> Self {
        FillModel { rng: StdRng::seed_from_u64(seed), slippage_bps, partial_fill: Box::new(FullFillPolicy) }
    }

    pub fn with_partial_fill_policy(mut self, policy: Box<dyn PartialFillPolicy>) -> Self {
        self.partial_fill = policy;
        self
    }

    fn slippage(&self, price: Decimal, buy: bool) -> Decimal {
        if self.slippage_bps.is_zero() {
            return Decimal::ZERO;
        }
        let adverse = if buy { Decimal::ONE } else { -Decimal::ONE };
        price * self.slippage_bps / dec!(10000) * adverse
    }

    /// Evaluates `order` against `ctx`, mutating `order.stop_triggered` for
    /// stop-limit orders, returning a fill if this instant's data triggers one.
    pub fn try_fill(&mut self, order: &mut Order, ctx: &FillContext) -> Option<FillResult> {
        let remaining = order.remaining_qty();
        if remaining.is_zero() {
            return None;
        }
        let buy = order.quantity > Decimal::ZERO;
        let bar = ctx.bar;

        let price = match order.order_type {
            OrderType::Market => {
                let base = bar.open;
                base + self.slippage(base, buy)
            }
            OrderType::Limit => {
                let limit = order.limit_price?;
                let triggered = if buy { bar.low <= limit } else { bar.high >= limit };
                if !triggered {
                    return None;
                }
                if buy {
                    if bar.open <= limit { bar.open } else { limit }
                } else if bar.open >= limit {
                    bar.open
                } else {
                    limit
                }
            }
            OrderType::StopMarket => {
                let stop = order.stop_price?;
                let triggered = if buy { bar.high >= stop } else { bar.low <= stop };
                if !triggered {
                    return None;
                }
                let base = if buy { bar.open.max(stop) } else { bar.open.min(stop) };
                base + self.slippage(base, buy)
            }
            OrderType::StopLimit => {
                let stop = order.stop_price?;
                let limit = order.limit_price?;
                if !order.stop_triggered {
                    let triggered = if buy { bar.high >= stop } else { bar.low <= stop };
                    if !triggered {
                        return None;
                    }
                    order.stop_triggered = true;
                }
                let limit_triggered = if buy { bar.low <= limit } else { bar.high >= limit };
                if !limit_triggered {
                    return None;
                }
                if buy {
                    if bar.open <= limit { bar.open } else { limit }
                } else if bar.open >= limit {
                    bar.open
                } else {
                    limit
                }
            }
            OrderType::MarketOnOpen => {
                if !ctx.is_session_open_bar {
                    return None;
                }
                bar.open
            }
            OrderType::MarketOnClose => {
                if !ctx.close_cutoff_reached {
                    return None;
                }
                bar.close
            }
        };

        let fill_qty = self.partial_fill.filled_quantity(remaining, bar).min(remaining).max(Decimal::ZERO);
        if fill_qty.is_zero() {
            return None;
        }
        Some(FillResult { quantity: fill_qty, price })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SecurityType, Symbol};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> TradeBar {
        let t0 = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        TradeBar {
            symbol: Symbol::new("SPY", SecurityType::Equity, "NYSE"),
            time: t0,
            end_time: t0 + chrono::Duration::days(1),
            open,
            high,
            low,
            close,
            volume: dec!(0),
        }
    }

    fn order(quantity: Decimal, order_type: OrderType, limit: Option<Decimal>, stop: Option<Decimal>) -> Order {
        let t0 = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        Order {
            id: 1,
            symbol: Symbol::new("SPY", SecurityType::Equity, "NYSE"),
            quantity,
            order_type,
            limit_price: limit,
            stop_price: stop,
            tag: String::new(),
            created_time: t0,
            status: crate::orders::order::OrderStatus::Submitted,
            filled_qty: Decimal::ZERO,
            is_async: false,
            stop_triggered: false,
            update_requests: Vec::new(),
        }
    }

    fn ctx(bar: &TradeBar) -> FillContext<'_> {
        FillContext { bar, is_session_open_bar: false, close_cutoff_reached: false }
    }

    #[test]
    fn market_order_fills_at_open() {
        let mut model = FillModel::new(1, Decimal::ZERO);
        let b = bar(dec!(100), dec!(102), dec!(99), dec!(101));
        let mut o = order(dec!(10), OrderType::Market, None, None);
        let fill = model.try_fill(&mut o, &ctx(&b)).unwrap();
        assert_eq!(fill.price, dec!(100));
        assert_eq!(fill.quantity, dec!(10));
    }

    #[test]
    fn limit_buy_fills_at_open_when_gapped_through() {
        let mut model = FillModel::new(1, Decimal::ZERO);
        let b = bar(dec!(95), dec!(96), dec!(94), dec!(95.5));
        let mut o = order(dec!(10), OrderType::Limit, Some(dec!(99)), None);
        let fill = model.try_fill(&mut o, &ctx(&b)).unwrap();
        assert_eq!(fill.price, dec!(95));
    }

    #[test]
    fn limit_buy_fills_at_limit_when_open_above_it() {
        let mut model = FillModel::new(1, Decimal::ZERO);
        let b = bar(dec!(101), dec!(102), dec!(98), dec!(99));
        let mut o = order(dec!(10), OrderType::Limit, Some(dec!(99)), None);
        let fill = model.try_fill(&mut o, &ctx(&b)).unwrap();
        assert_eq!(fill.price, dec!(99));
    }

    #[test]
    fn limit_buy_does_not_fill_when_low_never_reaches_limit() {
        let mut model = FillModel::new(1, Decimal::ZERO);
        let b = bar(dec!(101), dec!(102), dec!(100), dec!(101));
        let mut o = order(dec!(10), OrderType::Limit, Some(dec!(99)), None);
        assert!(model.try_fill(&mut o, &ctx(&b)).is_none());
    }

    #[test]
    fn stop_limit_stays_pending_until_stop_triggers_then_behaves_as_limit() {
        let mut model = FillModel::new(1, Decimal::ZERO);
        let mut o = order(dec!(10), OrderType::StopLimit, Some(dec!(105)), Some(dec!(103)));

        let before_trigger = bar(dec!(100), dec!(101), dec!(99), dec!(100.5));
        assert!(model.try_fill(&mut o, &ctx(&before_trigger)).is_none());
        assert!(!o.stop_triggered);

        let triggers_but_above_limit = bar(dec!(104), dec!(106), dec!(103.5), dec!(105.5));
        assert!(model.try_fill(&mut o, &ctx(&triggers_but_above_limit)).is_none());
        assert!(o.stop_triggered);

        let fills = bar(dec!(104.5), dec!(105), dec!(103), dec!(104));
        let fill = model.try_fill(&mut o, &ctx(&fills)).unwrap();
        assert_eq!(fill.price, dec!(104.5));
    }

    #[test]
    fn market_on_close_only_fills_past_cutoff() {
        let mut model = FillModel::new(1, Decimal::ZERO);
        let b = bar(dec!(100), dec!(101), dec!(99), dec!(100.5));
        let mut o = order(dec!(10), OrderType::MarketOnClose, None, None);
        let not_yet = FillContext { bar: &b, is_session_open_bar: false, close_cutoff_reached: false };
        assert!(model.try_fill(&mut o, &not_yet).is_none());
        let at_cutoff = FillContext { bar: &b, is_session_open_bar: false, close_cutoff_reached: true };
        let fill = model.try_fill(&mut o, &at_cutoff).unwrap();
        assert_eq!(fill.price, dec!(100.5));
    }
}
