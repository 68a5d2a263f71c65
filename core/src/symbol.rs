use serde::{Deserialize, Serialize};
use std::fmt;

pub type SymbolName = String;

/// The market a [`Symbol`] trades on, e.g. "NYSE", "NASDAQ", "OANDA", "CME".
pub type Market = String;

/// Closed set of security kinds the core understands. Option/CFD carry enough
/// shape to be addressed but option-chain mechanics are out of scope (§1).
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum SecurityType {
    Equity,
    Forex,
    Cfd,
    Option,
    Base,
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityType::Equity => write!(f, "equity"),
            SecurityType::Forex => write!(f, "forex"),
            SecurityType::Cfd => write!(f, "cfd"),
            SecurityType::Option => write!(f, "option"),
            SecurityType::Base => write!(f, "base"),
        }
    }
}

/// A stable identity that survives ticker renames. Two `Symbol`s are equal and
/// hash equal iff their `SecurityIdentifier`s match, regardless of `ticker`.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub struct SecurityIdentifier(String);

impl SecurityIdentifier {
    pub fn new(security_type: SecurityType, market: &Market, first_ticker: &str) -> Self {
        SecurityIdentifier(format!("{security_type}-{market}-{first_ticker}"))
    }

    /// Derives the canonical option identifier from its underlying's identifier.
    pub fn derive_option(&self, occ_symbol: &str) -> Self {
        SecurityIdentifier(format!("{}-OPT-{}", self.0, occ_symbol))
    }
}

impl fmt::Display for SecurityIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a tradable: `(ticker, SecurityType, market)` plus a stable
/// [`SecurityIdentifier`]. Value-typed, hashable; equality and hashing are
/// delegated to `id` so a renamed ticker is still recognized as the same
/// security.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Symbol {
    pub ticker: SymbolName,
    pub security_type: SecurityType,
    pub market: Market,
    pub id: SecurityIdentifier,
}

impl Symbol {
    pub fn new(ticker: impl Into<SymbolName>, security_type: SecurityType, market: impl Into<Market>) -> Self {
        let ticker = ticker.into();
        let market = market.into();
        let id = SecurityIdentifier::new(security_type, &market, &ticker);
        Symbol { ticker, security_type, market, id }
    }

    /// The canonical option symbol for this underlying, e.g. "AAPL  240119C00190000".
    pub fn option(&self, occ_symbol: impl Into<SymbolName>) -> Symbol {
        let occ_symbol = occ_symbol.into();
        Symbol {
            id: self.id.derive_option(&occ_symbol),
            ticker: occ_symbol,
            security_type: SecurityType::Option,
            market: self.market.clone(),
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ticker)
    }
}

/// One process-wide cache mapping tickers to canonical [`Symbol`]s, so an
/// algorithm run never creates two distinct identities for the same security.
#[derive(Default)]
pub struct SymbolCache {
    by_ticker: dashmap::DashMap<(SymbolName, Market), Symbol>,
}

impl SymbolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a symbol, returning a [`crate::error::ConfigError::DuplicateSymbol`]
    /// if the same (ticker, market) pair was already registered with a
    /// different security type.
    pub fn register(&self, symbol: Symbol) -> Result<Symbol, crate::error::ConfigError> {
        let key = (symbol.ticker.clone(), symbol.market.clone());
        if let Some(existing) = self.by_ticker.get(&key) {
            if existing.security_type != symbol.security_type {
                return Err(crate::error::ConfigError::DuplicateSymbol(symbol.ticker));
            }
            return Ok(existing.clone());
        }
        self.by_ticker.insert(key, symbol.clone());
        Ok(symbol)
    }

    pub fn get(&self, ticker: &str, market: &str) -> Option<Symbol> {
        self.by_ticker.get(&(ticker.to_string(), market.to_string())).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_identifier_not_ticker() {
        let a = Symbol::new("SPY", SecurityType::Equity, "NYSE");
        let mut b = a.clone();
        b.ticker = "SPY.OLD".to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn cache_rejects_conflicting_type_for_same_ticker() {
        let cache = SymbolCache::new();
        cache.register(Symbol::new("MSFT", SecurityType::Equity, "NASDAQ")).unwrap();
        let err = cache.register(Symbol::new("MSFT", SecurityType::Forex, "NASDAQ")).unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::DuplicateSymbol(_)));
    }
}
