use crate::portfolio::cash_book::{CashBook, Currency};
use crate::portfolio::security::Security;
use crate::symbol::Symbol;
use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn sign(d: Decimal) -> Decimal {
    if d > Decimal::ZERO {
        Decimal::ONE
    } else if d < Decimal::ZERO {
        -Decimal::ONE
    } else {
        Decimal::ZERO
    }
}

/// An open or closed holding in one symbol. Grounded on the teacher's
/// `Position`, collapsed from its `side`+`quantity_open`/`quantity_closed`
/// pair into one signed `quantity` (positive long, negative short) to match
/// the fill-update arithmetic of §4.6 directly.
#[derive(Clone, Debug)]
pub struct Position {
    pub symbol: Symbol,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub realized_pnl: Decimal,
}

impl Position {
    fn flat(symbol: Symbol) -> Self {
        Position { symbol, quantity: Decimal::ZERO, avg_price: Decimal::ZERO, realized_pnl: Decimal::ZERO }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.quantity * (price - self.avg_price)
    }
}

/// Holds every registered `Security`, open `Position`s, and the account's
/// cash balances; applies fills and corporate actions (§4.6). Grounded on
/// the teacher's `Ledger`, generalized to the spec's signed-quantity model.
pub struct Portfolio {
    pub account_currency: Currency,
    pub cash: CashBook,
    pub securities: DashMap<Symbol, Security>,
    pub positions: DashMap<Symbol, Position>,
}

impl Portfolio {
    pub fn new(account_currency: impl Into<Currency>, starting_cash: Decimal) -> Self {
        let account_currency = account_currency.into();
        let cash = CashBook::new();
        cash.set(account_currency.clone(), starting_cash);
        Portfolio { account_currency, cash, securities: DashMap::new(), positions: DashMap::new() }
    }

    pub fn add_security(&self, security: Security) {
        self.securities.insert(security.symbol.clone(), security);
    }

    pub fn mark_price(&self, symbol: &Symbol, price: Decimal) {
        if let Some(mut security) = self.securities.get_mut(symbol) {
            security.update_price(price);
        }
    }

    /// Applies a fill `(qty, price, fee)` in `currency` to `symbol`'s
    /// position per §4.6's extend/reduce/cross rule.
    pub fn on_fill(&self, symbol: &Symbol, qty: Decimal, price: Decimal, fee: Decimal, currency: &str) {
        let mut position = self.positions.entry(symbol.clone()).or_insert_with(|| Position::flat(symbol.clone()));
        let h = position.quantity;

        if h.is_zero() || sign(h) == sign(qty) {
            let new_qty = h + qty;
            let total_basis = h.abs() * position.avg_price + qty.abs() * price;
            position.avg_price = if new_qty.is_zero() { position.avg_price } else { total_basis / new_qty.abs() };
            position.quantity = new_qty;
        } else {
            let closing = h.abs().min(qty.abs());
            let realized = closing * (price - position.avg_price) * sign(h);
            position.realized_pnl += realized;
            let remainder = qty.abs() - closing;
            position.quantity = h + qty;
            if remainder > Decimal::ZERO {
                position.avg_price = price;
            }
        }

        self.cash.add(currency, -(qty * price + fee));
    }

    /// Applies a forward/reverse split with factor `f` (§4.6 Corporate
    /// actions). Reverse splits (`f < 1`) cancel open orders; that
    /// cancellation is the transaction manager's responsibility, triggered
    /// by the caller observing `f < Decimal::ONE` on the returned position.
    pub fn apply_split(&self, symbol: &Symbol, factor: Decimal) {
        if let Some(mut position) = self.positions.get_mut(symbol) {
            position.quantity = (position.quantity / factor).round();
            position.avg_price *= factor;
        }
    }

    /// Credits a cash dividend when holdings are long and data is `raw`
    /// (already-adjusted history takes no cash action, §4.6).
    pub fn apply_dividend(&self, symbol: &Symbol, distribution: Decimal, is_raw_data: bool) {
        if !is_raw_data {
            return;
        }
        if let Some(position) = self.positions.get(symbol) {
            if position.quantity > Decimal::ZERO {
                self.cash.add(self.account_currency.clone(), distribution * position.quantity);
            }
        }
    }

    pub fn total_portfolio_value(&self) -> Decimal {
        let mut total = self.cash.total_in_account_currency();
        for position in self.positions.iter() {
            if let Some(security) = self.securities.get(&position.symbol) {
                if let Some(price) = security.price {
                    total += position.quantity * price;
                }
            }
        }
        total
    }

    fn maintenance_margin(&self, position: &Position) -> Decimal {
        match self.securities.get(&position.symbol) {
            Some(security) => match security.price {
                Some(price) if security.leverage > Decimal::ZERO => position.quantity.abs() * price / security.leverage,
                _ => Decimal::ZERO,
            },
            None => Decimal::ZERO,
        }
    }

    pub fn total_margin_used(&self) -> Decimal {
        self.positions.iter().map(|p| self.maintenance_margin(&p)).sum()
    }

    pub fn margin_remaining(&self) -> Decimal {
        self.total_portfolio_value() - self.total_margin_used()
    }

    /// Fires when remaining margin drops below 5% of total portfolio value
    /// (§4.6 Margin & leverage).
    pub fn margin_call_warning(&self) -> bool {
        self.margin_remaining() < dec!(0.05) * self.total_portfolio_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::resolution::Resolution;
    use crate::data::subscription::SubscriptionConfig;
    use crate::symbol::{SecurityType, Symbol};

    fn spy() -> Symbol {
        Symbol::new("SPY", SecurityType::Equity, "NYSE")
    }

    fn portfolio_with_spy(leverage: Decimal) -> (Portfolio, Symbol) {
        let symbol = spy();
        let portfolio = Portfolio::new("USD", dec!(100_000));
        let subscription = SubscriptionConfig::new(symbol.clone(), Resolution::Daily, chrono_tz::UTC);
        portfolio.add_security(Security::new(symbol.clone(), subscription, leverage));
        (portfolio, symbol)
    }

    #[test]
    fn extending_a_long_position_weights_the_average_price() {
        let (portfolio, symbol) = portfolio_with_spy(dec!(1));
        portfolio.on_fill(&symbol, dec!(10), dec!(100), dec!(1), "USD");
        portfolio.on_fill(&symbol, dec!(10), dec!(110), dec!(1), "USD");
        let position = portfolio.positions.get(&symbol).unwrap();
        assert_eq!(position.quantity, dec!(20));
        assert_eq!(position.avg_price, dec!(105));
    }

    #[test]
    fn crossing_through_flat_realizes_pnl_and_flips_side() {
        let (portfolio, symbol) = portfolio_with_spy(dec!(1));
        portfolio.on_fill(&symbol, dec!(10), dec!(100), dec!(0), "USD");
        // sell 15: closes the 10 long at a 100->110 gain, opens a 5 short at 110
        portfolio.on_fill(&symbol, dec!(-15), dec!(110), dec!(0), "USD");
        let position = portfolio.positions.get(&symbol).unwrap();
        assert_eq!(position.quantity, dec!(-5));
        assert_eq!(position.avg_price, dec!(110));
        assert_eq!(position.realized_pnl, dec!(100));
    }

    #[test]
    fn cash_identity_holds_after_a_fill() {
        let (portfolio, symbol) = portfolio_with_spy(dec!(1));
        let before = portfolio.cash.get("USD");
        portfolio.on_fill(&symbol, dec!(10), dec!(100), dec!(2), "USD");
        let after = portfolio.cash.get("USD");
        assert_eq!(before - after, dec!(1002));
    }

    #[test]
    fn forward_split_scales_quantity_up_and_price_down() {
        let (portfolio, symbol) = portfolio_with_spy(dec!(1));
        portfolio.on_fill(&symbol, dec!(10), dec!(100), dec!(0), "USD");
        portfolio.apply_split(&symbol, dec!(0.5)); // 2-for-1 forward split encoded as 0.5 shares-per-share factor per spec
        let position = portfolio.positions.get(&symbol).unwrap();
        assert_eq!(position.quantity, dec!(20));
        assert_eq!(position.avg_price, dec!(50));
    }

    #[test]
    fn margin_call_warning_fires_when_remaining_margin_is_thin() {
        let (portfolio, symbol) = portfolio_with_spy(dec!(2));
        portfolio.mark_price(&symbol, dec!(100));
        portfolio.on_fill(&symbol, dec!(1900), dec!(100), dec!(0), "USD");
        assert!(portfolio.margin_call_warning());
    }
}
