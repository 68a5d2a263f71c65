use dashmap::DashMap;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub type Currency = String;

/// One currency's balance plus its conversion rate into the account
/// currency (§3 CashBook: `{amount, conversionRate, accountCurrency=true
/// for one}`). The account currency itself always carries `rate == 1`.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Balance {
    amount: Decimal,
    rate: Decimal,
}

/// Per-currency cash balances. Grounded on the teacher's `Ledger::cash_value`/
/// `cash_used`/`cash_available`, generalized from a single-currency `Mutex`
/// to a multi-currency `DashMap` so fee/dividend conversions (§4.6) have
/// somewhere to land.
#[derive(Default)]
pub struct CashBook {
    balances: DashMap<Currency, Balance>,
}

impl CashBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `currency`'s balance, preserving its previously recorded
    /// conversion rate (or defaulting to `1` for a currency seen for the
    /// first time — correct for the account currency, a placeholder for any
    /// other until [`Self::set_with_rate`] supplies the real one).
    pub fn set(&self, currency: impl Into<Currency>, amount: Decimal) {
        let currency = currency.into();
        let rate = self.balances.get(&currency).map(|b| b.rate).unwrap_or(Decimal::ONE);
        self.balances.insert(currency, Balance { amount, rate });
    }

    /// Sets `currency`'s balance and conversion rate into the account
    /// currency together (§6 `setCash(ccy?, amount, rate?)`).
    pub fn set_with_rate(&self, currency: impl Into<Currency>, amount: Decimal, rate: Decimal) {
        self.balances.insert(currency.into(), Balance { amount, rate });
    }

    pub fn get(&self, currency: &str) -> Decimal {
        self.balances.get(currency).map(|b| b.amount).unwrap_or_default()
    }

    pub fn rate(&self, currency: &str) -> Decimal {
        self.balances.get(currency).map(|b| b.rate).unwrap_or(Decimal::ONE)
    }

    pub fn add(&self, currency: impl Into<Currency>, delta: Decimal) {
        let currency = currency.into();
        let mut entry = self.balances.entry(currency).or_insert(Balance { amount: dec!(0), rate: Decimal::ONE });
        entry.amount += delta;
    }

    pub fn total_in(&self, currency: &str) -> Decimal {
        self.get(currency)
    }

    /// Total cash value expressed in the account currency: `Σ amount × rate`
    /// across every currency on the book (§3 CashBook "Total portfolio value").
    pub fn total_in_account_currency(&self) -> Decimal {
        self.balances.iter().map(|b| b.amount * b.rate).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn add_accumulates_and_set_overwrites() {
        let book = CashBook::new();
        book.set("USD", dec!(1000));
        book.add("USD", dec!(-50));
        assert_eq!(book.get("USD"), dec!(950));
        book.set("USD", dec!(0));
        assert_eq!(book.get("USD"), dec!(0));
    }

    #[test]
    fn set_preserves_a_previously_recorded_rate() {
        let book = CashBook::new();
        book.set_with_rate("EUR", dec!(100), dec!(1.1));
        book.set("EUR", dec!(200));
        assert_eq!(book.rate("EUR"), dec!(1.1));
        assert_eq!(book.get("EUR"), dec!(200));
    }

    #[test]
    fn total_in_account_currency_converts_every_balance() {
        let book = CashBook::new();
        book.set_with_rate("USD", dec!(1000), dec!(1));
        book.set_with_rate("EUR", dec!(100), dec!(1.1));
        assert_eq!(book.total_in_account_currency(), dec!(1110));
    }
}
