use crate::context::AlgorithmContext;
use engine_core::data::Slice;
use engine_core::orders::OrderEvent;
use engine_core::symbol::Symbol;
use engine_core::universe::SecuritiesChanged;
use rust_decimal::Decimal;

/// A synthesized order request the margin-call handler would submit to
/// restore positive margin, exposed for the strategy to optionally override
/// before execution (§4.6 Margin & leverage, §7 MarginCall).
#[derive(Clone, Debug)]
pub struct MarginCallRequest {
    pub symbol: Symbol,
    pub quantity: Decimal,
}

/// The user-authored callback surface (§6 Strategy-facing callbacks).
/// Grounded on the teacher's `FundForgeStrategy`/`on_data_received` dispatch
/// methods, generalized from a bytes-over-channel event loop into a plain
/// trait `engine-runtime::Engine` calls directly on the simulation thread.
/// Every method but `initialize`/`on_data` has a no-op default, matching the
/// teacher's pattern of strategies overriding only the handlers they need.
pub trait Strategy {
    fn initialize(&mut self, ctx: &mut AlgorithmContext);

    fn on_data(&mut self, ctx: &mut AlgorithmContext, slice: &Slice);

    fn on_securities_changed(&mut self, _ctx: &mut AlgorithmContext, _changes: &SecuritiesChanged) {}

    fn on_order_event(&mut self, _ctx: &mut AlgorithmContext, _event: &OrderEvent) {}

    fn on_margin_call(&mut self, _ctx: &mut AlgorithmContext, _requests: &[MarginCallRequest]) {}

    fn on_margin_call_warning(&mut self, _ctx: &mut AlgorithmContext) {}

    fn on_end_of_day(&mut self, _ctx: &mut AlgorithmContext, _symbol: &Symbol) {}

    fn on_brokerage_message(&mut self, _ctx: &mut AlgorithmContext, _message: &str) {}

    fn on_end_of_algorithm(&mut self, _ctx: &mut AlgorithmContext) {}
}
