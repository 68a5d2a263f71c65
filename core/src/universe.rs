use crate::data::resolution::Resolution;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};

/// Coarse per-symbol facts a selector may use to choose its member set
/// without the core knowing anything about the chosen selection metric
/// (§4.5, §9 "black box" Non-goal for indicator-shaped logic).
#[derive(Clone, Debug)]
pub struct CoarseUniverseData {
    pub symbol: Symbol,
    pub price: rust_decimal::Decimal,
    pub dollar_volume: rust_decimal::Decimal,
}

/// A selector's return value for one evaluation. `Unchanged` short-circuits
/// the diff entirely — useful when a selector wants to skip a cycle without
/// being interpreted as "select nothing" (§4.5).
pub enum SelectionResult {
    Select(Vec<Symbol>),
    Unchanged,
}

pub type Selector = Box<dyn Fn(DateTime<Utc>, &[CoarseUniverseData]) -> SelectionResult + Send + Sync>;

pub struct UniverseConfig {
    pub name: String,
    pub resolution: Resolution,
}

/// A named, time-varying member set evaluated on its own schedule (§4.5,
/// §3 Universe). Grounded in the diff-and-dispatch shape of the teacher's
/// securities-changed plumbing, since `fund-forge` itself has no dynamic
/// universe concept — strategies there call `addSecurity` once at startup.
pub struct Universe {
    pub config: UniverseConfig,
    selector: Selector,
    members: Vec<Symbol>,
}

/// Emitted by [`Universe::evaluate`] whenever the member set changes.
#[derive(Clone, Debug, Default)]
pub struct SecuritiesChanged {
    pub added: Vec<Symbol>,
    pub removed: Vec<Symbol>,
}

impl SecuritiesChanged {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl Universe {
    pub fn new(config: UniverseConfig, selector: Selector) -> Self {
        Universe { config, selector, members: Vec::new() }
    }

    pub fn members(&self) -> &[Symbol] {
        &self.members
    }

    /// Runs the selector and diffs against the last-emitted member set
    /// (§4.5). `SelectionResult::Unchanged` returns an empty diff without
    /// touching `members`.
    pub fn evaluate(&mut self, t: DateTime<Utc>, coarse: &[CoarseUniverseData]) -> SecuritiesChanged {
        let selected = match (self.selector)(t, coarse) {
            SelectionResult::Unchanged => return SecuritiesChanged::default(),
            SelectionResult::Select(symbols) => symbols,
        };

        let added: Vec<Symbol> = selected.iter().filter(|s| !self.members.contains(s)).cloned().collect();
        let removed: Vec<Symbol> = self.members.iter().filter(|s| !selected.contains(s)).cloned().collect();
        self.members = selected;
        SecuritiesChanged { added, removed }
    }
}
