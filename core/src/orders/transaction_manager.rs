use crate::data::base_data::TradeBar;
use crate::data::slice::Slice;
use crate::error::OrderError;
use crate::orders::brokerage_model::BrokerageModel;
use crate::orders::fill_model::{FillContext, FillModel, FillResult};
use crate::orders::order::{Order, OrderEvent, OrderId, OrderStatus, OrderType, OrderUpdateRequest};
use crate::portfolio::ledger::Portfolio;
use crate::portfolio::security::Security;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

struct OrderRecord {
    order: Order,
    pending_updates: Vec<OrderUpdateRequest>,
    pending_cancel: bool,
}

/// Extra per-symbol context the fill model needs that only the caller (the
/// runtime, via `ExchangeHours`) can compute (§4.8 MarketOnOpen/Close).
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionContext {
    pub is_session_open_bar: bool,
    pub close_cutoff_reached: bool,
}

/// Read-only view plus `enqueue_update`/`enqueue_cancel` façade (§9 design
/// note); shared with [`TransactionManager`], which is the sole drainer of
/// the queue it appends to.
#[derive(Clone)]
pub struct OrderTicket {
    pub order_id: OrderId,
    pub symbol: Symbol,
    orders: Arc<DashMap<OrderId, OrderRecord>>,
}

impl OrderTicket {
    pub fn snapshot(&self) -> Option<Order> {
        self.orders.get(&self.order_id).map(|r| r.order.clone())
    }

    pub fn update_request_count(&self) -> usize {
        self.orders.get(&self.order_id).map(|r| r.order.update_requests.len()).unwrap_or(0)
    }

    pub fn enqueue_update(&self, patch: OrderUpdateRequest) -> Result<(), OrderError> {
        let mut record = self.orders.get_mut(&self.order_id).ok_or_else(|| OrderError::NotFound(self.order_id.to_string()))?;
        if record.order.is_terminal() {
            return Err(OrderError::AlreadyTerminal(self.order_id.to_string()));
        }
        if record.order.order_type.only_quantity_and_tag_mutable() && (patch.limit_price.is_some() || patch.stop_price.is_some()) {
            return Err(OrderError::UnsupportedUpdateField);
        }
        record.pending_updates.push(patch);
        Ok(())
    }

    pub fn enqueue_cancel(&self) -> Result<(), OrderError> {
        let mut record = self.orders.get_mut(&self.order_id).ok_or_else(|| OrderError::NotFound(self.order_id.to_string()))?;
        if record.order.is_terminal() {
            return Err(OrderError::AlreadyTerminal(self.order_id.to_string()));
        }
        record.pending_cancel = true;
        Ok(())
    }
}

/// Owns every [`Order`] and drives it through the FSM (§4.7): submit,
/// queued update/cancel draining, and per-instant fill evaluation.
/// Grounded on the teacher's `order_matching.rs` cache-and-scan loop,
/// generalized to own the order table directly instead of relaying through
/// a channel of `StrategyEvent`s.
pub struct TransactionManager {
    orders: Arc<DashMap<OrderId, OrderRecord>>,
    next_id: AtomicU64,
    fill_model: Mutex<FillModel>,
    brokerage_model: Box<dyn BrokerageModel>,
}

impl TransactionManager {
    pub fn new(fill_model: FillModel, brokerage_model: Box<dyn BrokerageModel>) -> Self {
        TransactionManager { orders: Arc::new(DashMap::new()), next_id: AtomicU64::new(1), fill_model: Mutex::new(fill_model), brokerage_model }
    }

    /// Submits a new order, validating it against the security and
    /// brokerage model (§4.7 Submit). Market orders with `is_async = false`
    /// attempt a synchronous fill against `current_bar` before returning
    /// (§4.7 "Market orders are processed synchronously by default"). Always
    /// returns a ticket, even for a rejected (`Invalid`) order.
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
        &self,
        symbol: Symbol,
        quantity: Decimal,
        order_type: OrderType,
        limit_price: Option<Decimal>,
        stop_price: Option<Decimal>,
        tag: String,
        created_time: DateTime<Utc>,
        is_async: bool,
        security: &Security,
        portfolio: &Portfolio,
        current_bar: Option<&TradeBar>,
    ) -> (OrderTicket, Vec<OrderEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut order = Order {
            id,
            symbol: symbol.clone(),
            quantity,
            order_type,
            limit_price,
            stop_price,
            tag,
            created_time,
            status: OrderStatus::New,
            filled_qty: Decimal::ZERO,
            is_async,
            stop_triggered: false,
            update_requests: Vec::new(),
        };

        let mut events = Vec::new();
        if let Some(reason) = self.validate(&order, security) {
            order.status = OrderStatus::Invalid;
            events.push(OrderEvent::Invalid { order_id: id, symbol: symbol.clone(), reason });
        } else {
            order.status = OrderStatus::Submitted;
            events.push(OrderEvent::Submitted { order_id: id, symbol: symbol.clone() });

            if matches!(order.order_type, OrderType::Market) && !order.is_async {
                if let Some(bar) = current_bar {
                    let ctx = FillContext { bar, is_session_open_bar: false, close_cutoff_reached: false };
                    if let Some(fill) = self.fill_model.lock().unwrap().try_fill(&mut order, &ctx) {
                        events.push(self.apply_fill(&mut order, fill, portfolio));
                    }
                }
            }
        }

        self.orders.insert(id, OrderRecord { order, pending_updates: Vec::new(), pending_cancel: false });
        (OrderTicket { order_id: id, symbol, orders: self.orders.clone() }, events)
    }

    fn validate(&self, order: &Order, security: &Security) -> Option<String> {
        if !security.tradable {
            return Some(OrderError::NotTradable(order.symbol.ticker.clone()).to_string());
        }
        if order.quantity.is_zero() {
            return Some(OrderError::ZeroQuantity.to_string());
        }
        if order.order_type.requires_limit_price() && order.limit_price.is_none() {
            return Some(OrderError::MissingLimitPrice.to_string());
        }
        if order.order_type.requires_stop_price() && order.stop_price.is_none() {
            return Some(OrderError::MissingStopPrice.to_string());
        }
        if !self.brokerage_model.supports_order_type(order.order_type) {
            return Some(OrderError::BrokerageRejected(format!("{:?} not supported", order.order_type)).to_string());
        }
        if let Err(reason) = self.brokerage_model.validate_order(order, security) {
            return Some(OrderError::BrokerageRejected(reason).to_string());
        }
        None
    }

    fn apply_fill(&self, order: &mut Order, fill: FillResult, portfolio: &Portfolio) -> OrderEvent {
        let fee = self.brokerage_model.fee(order, fill.quantity, fill.price);
        let signed_qty = fill.quantity * if order.quantity > Decimal::ZERO { Decimal::ONE } else { -Decimal::ONE };
        portfolio.on_fill(&order.symbol, signed_qty, fill.price, fee, &portfolio.account_currency.clone());
        order.filled_qty += fill.quantity;
        if order.remaining_qty().is_zero() {
            order.status = OrderStatus::Filled;
            OrderEvent::Filled { order_id: order.id, symbol: order.symbol.clone(), fill_qty: fill.quantity, fill_price: fill.price, fee }
        } else {
            order.status = OrderStatus::PartiallyFilled;
            OrderEvent::PartiallyFilled { order_id: order.id, symbol: order.symbol.clone(), fill_qty: fill.quantity, fill_price: fill.price, fee }
        }
    }

    /// Applies queued updates/cancels then evaluates fills for every
    /// non-terminal order against `slice`, in ascending `id` order — both
    /// each symbol's FIFO submission order and, since ids are assigned
    /// globally, a single deterministic cross-symbol order (§4.7 Ordering
    /// guarantees).
    pub fn process_instant(&self, slice: &Slice, portfolio: &Portfolio, session_ctx: impl Fn(&Symbol) -> SessionContext) -> Vec<OrderEvent> {
        let mut ids: Vec<OrderId> = self.orders.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();

        let mut events = Vec::new();
        for id in ids {
            let Some(mut record) = self.orders.get_mut(&id) else { continue };

            for patch in std::mem::take(&mut record.pending_updates) {
                if let Some(q) = patch.quantity {
                    record.order.quantity = q;
                }
                if let Some(l) = patch.limit_price {
                    record.order.limit_price = Some(l);
                }
                if let Some(s) = patch.stop_price {
                    record.order.stop_price = Some(s);
                }
                if let Some(t) = &patch.tag {
                    record.order.tag = t.clone();
                }
                record.order.update_requests.push(patch);
                events.push(OrderEvent::Updated { order_id: id, symbol: record.order.symbol.clone() });
            }

            if record.pending_cancel {
                record.pending_cancel = false;
                if !record.order.is_terminal() {
                    record.order.status = OrderStatus::Canceled;
                    events.push(OrderEvent::Canceled { order_id: id, symbol: record.order.symbol.clone() });
                }
                continue;
            }

            if record.order.is_terminal() {
                continue;
            }

            let Some(bar) = slice.bar(&record.order.symbol) else { continue };
            let sc = session_ctx(&record.order.symbol);
            let ctx = FillContext { bar, is_session_open_bar: sc.is_session_open_bar, close_cutoff_reached: sc.close_cutoff_reached };

            let fill = self.fill_model.lock().unwrap().try_fill(&mut record.order, &ctx);
            if let Some(fill) = fill {
                let event = self.apply_fill(&mut record.order, fill, portfolio);
                events.push(event);
            }
        }
        events
    }

    /// Cancels every non-terminal order on `symbol` (§4.5 universe removal,
    /// §4.6 reverse-split corporate action).
    pub fn cancel_all_for_symbol(&self, symbol: &Symbol) -> Vec<OrderEvent> {
        let mut events = Vec::new();
        for mut entry in self.orders.iter_mut() {
            if &entry.order.symbol == symbol && !entry.order.is_terminal() {
                entry.order.status = OrderStatus::Canceled;
                events.push(OrderEvent::Canceled { order_id: entry.order.id, symbol: symbol.clone() });
            }
        }
        events
    }

    /// Scales every open order on `symbol` by a corporate-action `factor`,
    /// per the brokerage model's split-adjustment policy (§4.6, open
    /// question (c): stop and limit scale by the same factor).
    pub fn apply_split_to_orders(&self, symbol: &Symbol, factor: Decimal) {
        if !self.brokerage_model.split_adjusts_orders() {
            return;
        }
        for mut entry in self.orders.iter_mut() {
            if &entry.order.symbol != symbol || entry.order.is_terminal() {
                continue;
            }
            entry.order.quantity = (entry.order.quantity / factor).round();
            if let Some(l) = entry.order.limit_price {
                entry.order.limit_price = Some(l * factor);
            }
            if let Some(s) = entry.order.stop_price {
                entry.order.stop_price = Some(s * factor);
            }
        }
    }

    pub fn get(&self, id: OrderId) -> Option<Order> {
        self.orders.get(&id).map(|r| r.order.clone())
    }

    /// Swaps the active brokerage policy (§6 `setBrokerageModel`). Intended
    /// to be called during strategy initialization, before any order is
    /// submitted.
    pub fn set_brokerage_model(&mut self, model: Box<dyn BrokerageModel>) {
        self.brokerage_model = model;
    }

    /// Applies a corporate-action split to every open order on `symbol`,
    /// then cancels them outright if this was a reverse split and the
    /// brokerage model says reverse splits invalidate resting orders (§4.6
    /// Corporate actions).
    pub fn apply_corporate_split(&self, symbol: &Symbol, factor: Decimal) -> Vec<OrderEvent> {
        self.apply_split_to_orders(symbol, factor);
        if factor > Decimal::ONE && self.brokerage_model.cancels_orders_on_reverse_split() {
            return self.cancel_all_for_symbol(symbol);
        }
        Vec::new()
    }
}
