use crate::consolidators::{Consolidator, ConsolidatorEnum};
use crate::data::base_data::BaseData;
use crate::data::subscription::SubscriptionConfig;
use crate::error::{ConfigError, DataError};
use crate::symbol::Symbol;
use std::collections::HashMap;

/// Holds every registered `SubscriptionConfig` and, per symbol, the set of
/// consolidators feeding off its raw stream (§4.3). Grounded on the
/// teacher's `subscription_handler.rs`, which keeps the same
/// symbol-to-consolidators fan-out but additionally owns the live data-feed
/// plumbing this crate leaves to `engine-runtime`.
pub struct SubscriptionManager {
    subscriptions: HashMap<Symbol, Vec<SubscriptionConfig>>,
    consolidators: HashMap<Symbol, Vec<ConsolidatorEnum>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        SubscriptionManager { subscriptions: HashMap::new(), consolidators: HashMap::new() }
    }

    /// Registers `config`, rejecting an exact (symbol, resolution, type)
    /// duplicate (§9 "Symbol canonicalization": no silent re-registration).
    pub fn add_subscription(&mut self, config: SubscriptionConfig, history_to_retain: usize) -> Result<(), ConfigError> {
        let existing = self.subscriptions.entry(config.symbol.clone()).or_default();
        if existing.iter().any(|c| c.resolution == config.resolution && c.candle_type == config.candle_type) {
            return Err(ConfigError::DuplicateSymbol(config.symbol.ticker.clone()));
        }

        let consolidator = ConsolidatorEnum::for_subscription(config.clone(), history_to_retain).map_err(|_| ConfigError::UnknownSymbol(config.symbol.ticker.clone()))?;
        self.consolidators.entry(config.symbol.clone()).or_default().push(consolidator);
        existing.push(config);
        Ok(())
    }

    pub fn remove_symbol(&mut self, symbol: &Symbol) {
        self.subscriptions.remove(symbol);
        self.consolidators.remove(symbol);
    }

    pub fn subscriptions_for(&self, symbol: &Symbol) -> &[SubscriptionConfig] {
        self.subscriptions.get(symbol).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_subscribed(&self, symbol: &Symbol) -> bool {
        self.subscriptions.contains_key(symbol)
    }

    /// Feeds `data` into every consolidator registered for its symbol,
    /// returning every newly completed bar across all of them.
    pub fn update(&mut self, data: &BaseData) -> Result<Vec<BaseData>, DataError> {
        let Some(consolidators) = self.consolidators.get_mut(data.symbol()) else { return Ok(Vec::new()) };
        let mut produced = Vec::new();
        for consolidator in consolidators.iter_mut() {
            produced.extend(consolidator.update(data)?);
        }
        Ok(produced)
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
