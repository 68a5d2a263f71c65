use crate::config::Config;
use crate::context::AlgorithmContext;
use crate::strategy::{MarginCallRequest, Strategy};
use engine_core::data::base_data::{BaseData, DelistingType, TradeBar};
use engine_core::data::Slice;
use engine_core::error::ConfigError;
use engine_core::feed::DataFeedMerger;
use engine_core::orders::OrderEvent;
use engine_core::result::BacktestResult;
use engine_core::symbol::Symbol;
use engine_core::universe::CoarseUniverseData;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use tracing::{info, warn};

/// Drives `ctx`/`strategy` through the control flow described in §2: clock
/// advances, the feed produces a slice, scheduled events fire, universes
/// diff, the strategy observes the slice, then orders are matched against
/// it. Grounded on the teacher's `HistoricalEngine::run_backtest`, collapsed
/// from its buffered/unbuffered channel-relay modes into a single in-process
/// loop since this crate has no GUI/replay consumer to buffer for.
pub struct Engine<S: Strategy> {
    ctx: AlgorithmContext,
    strategy: S,
    last_universe_eval_date: Option<chrono::NaiveDate>,
    last_realized_pnl: HashMap<Symbol, Decimal>,
    last_end_of_day: HashMap<Symbol, chrono::NaiveDate>,
    /// Set once a strategy callback panics while `config.strict_user` is on
    /// (§7 UserException); checked at the next instant boundary.
    halted: bool,
}

impl<S: Strategy> Engine<S> {
    pub fn new(config: Config, strategy: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Engine { ctx: AlgorithmContext::new(config), strategy, last_universe_eval_date: None, last_realized_pnl: HashMap::new(), last_end_of_day: HashMap::new(), halted: false })
    }

    /// Runs `f` and converts a panic into a logged event instead of letting
    /// it unwind through the simulation loop (§7 UserException: "the
    /// simulation loop never lets an exception escape"). Only sets `halted`
    /// when `strict_user` is configured; otherwise the run continues.
    fn dispatch_strategy<F>(&mut self, callback: &str, f: F)
    where
        F: FnOnce(&mut S, &mut AlgorithmContext),
    {
        let strategy = &mut self.strategy;
        let ctx = &mut self.ctx;
        if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(strategy, ctx))) {
            let message = payload.downcast_ref::<&str>().map(|s| s.to_string()).or_else(|| payload.downcast_ref::<String>().cloned()).unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(callback, message, "strategy callback panicked");
            if self.ctx.config.strict_user {
                self.halted = true;
            }
        }
    }

    /// Runs `initialize()` then drives the simulation to completion,
    /// returning the persisted `Result` document (§6).
    pub fn run(mut self) -> BacktestResult {
        info!("initializing strategy");
        self.dispatch_strategy("initialize", |strategy, ctx| strategy.initialize(ctx));

        if self.ctx.feed.is_none() {
            let sources = std::mem::take(&mut self.ctx.pending_sources);
            self.ctx.feed = Some(DataFeedMerger::new(sources));
        }

        let end_date = self.ctx.config.end_date;
        loop {
            let Some(slice) = self.next_slice() else { break };
            let t = slice.t.expect("a produced slice always carries an instant");
            if t > end_date {
                break;
            }

            if let Err(err) = self.ctx.clock.write().unwrap().set_utc(t) {
                warn!(%err, "clock regression observed from feed, ending run");
                break;
            }

            self.update_consolidators_and_prices(&slice);
            self.apply_corporate_actions(&slice);
            self.evaluate_universes(t);

            self.ctx.scheduler.fire_due(t);
            self.drain_pending_order_events();

            self.ctx.is_warming_up = self.ctx.history.is_warming_up(t);
            self.ctx.current_slice = slice.clone();

            if !self.ctx.is_warming_up && !slice.is_empty() {
                self.dispatch_strategy("on_data", |strategy, ctx| strategy.on_data(ctx, &slice));
                self.drain_pending_order_events();
            }

            self.process_orders(&slice);
            self.check_margin();
            self.drain_pending_order_events();

            if !self.ctx.is_warming_up {
                self.ctx.result.record_equity(t, self.ctx.portfolio.total_portfolio_value());
            }

            if self.halted {
                warn!("halting run: strategy callback panicked under strict_user");
                break;
            }
        }

        self.dispatch_strategy("on_end_of_algorithm", |strategy, ctx| strategy.on_end_of_algorithm(ctx));
        self.finalize_result()
    }

    fn next_slice(&mut self) -> Option<Slice> {
        self.ctx.feed.as_mut()?.next_slice()
    }

    /// Feeds every raw sample in `slice` through the subscription manager's
    /// consolidators (§4.3), records produced bars into history (§4.10), and
    /// marks each security's last price (§3 Security).
    fn update_consolidators_and_prices(&mut self, slice: &Slice) {
        for bar in slice.bars.values() {
            self.ctx.portfolio.mark_price(&bar.symbol, bar.close);
            self.ctx.history.record(&bar.symbol, bar.clone());
            if let Ok(produced) = self.ctx.subscription_manager.update(&BaseData::TradeBar(bar.clone())) {
                for item in produced {
                    if let BaseData::TradeBar(consolidated) = item {
                        self.ctx.history.record(&consolidated.symbol, consolidated);
                    }
                }
            }
            self.maybe_dispatch_end_of_day(bar);
        }
        for ticks in slice.ticks.values() {
            for tick in ticks {
                if let Some(price) = tick.last.or(tick.bid).or(tick.ask) {
                    self.ctx.portfolio.mark_price(&tick.symbol, price);
                }
                let _ = self.ctx.subscription_manager.update(&BaseData::Tick(tick.clone()));
            }
        }
    }

    /// Fires `onEndOfDay(symbol)` the first time a bar is observed whose
    /// session has closed (§6 callback surface), at most once per symbol per
    /// calendar day. Symbols with no registered `ExchangeHours` (e.g. a
    /// continuous forex calendar's boundary case) never fire it.
    fn maybe_dispatch_end_of_day(&mut self, bar: &TradeBar) {
        let Some(hours) = self.ctx.exchange_hours.get(&bar.symbol).cloned() else { return };
        let local_start = bar.time.with_timezone(&hours.timezone);
        let local_end = bar.end_time.with_timezone(&hours.timezone);
        if local_end < hours.next_close(local_start) {
            return;
        }

        let date = local_start.date_naive();
        if self.last_end_of_day.get(&bar.symbol) == Some(&date) {
            return;
        }
        self.last_end_of_day.insert(bar.symbol.clone(), date);

        let symbol = bar.symbol.clone();
        self.dispatch_strategy("on_end_of_day", move |strategy, ctx| strategy.on_end_of_day(ctx, &symbol));
    }

    /// Applies splits, dividends, and delistings carried in `slice` (§4.6).
    fn apply_corporate_actions(&mut self, slice: &Slice) {
        for split in &slice.splits {
            self.ctx.portfolio.apply_split(&split.symbol, split.factor);
            for event in self.ctx.transaction_manager.apply_corporate_split(&split.symbol, split.factor) {
                self.dispatch_order_event(event);
            }
        }
        for dividend in &slice.dividends {
            let is_raw = self.ctx.portfolio.securities.get(&dividend.symbol).map(|s| s.data_normalization.is_raw()).unwrap_or(true);
            self.ctx.portfolio.apply_dividend(&dividend.symbol, dividend.distribution, is_raw);
        }
        for delisting in &slice.delistings {
            if delisting.kind == DelistingType::Delisted {
                if let Some(mut security) = self.ctx.portfolio.securities.get_mut(&delisting.symbol) {
                    security.mark_untradable();
                }
                for event in self.ctx.transaction_manager.cancel_all_for_symbol(&delisting.symbol) {
                    self.dispatch_order_event(event);
                }
            }
        }
    }

    /// Evaluates every universe once per calendar day (§4.5 "typically
    /// daily"), diffing against the prior member set. Membership can only
    /// range over securities already registered via `add_security` — minting
    /// a brand-new subscription from inside a universe selector would need
    /// the out-of-scope concrete market-data reader, so `added` re-enables
    /// trading on an already-known security and `removed` disables it.
    fn evaluate_universes(&mut self, t: chrono::DateTime<chrono::Utc>) {
        if self.ctx.universes.is_empty() {
            return;
        }
        let date = t.date_naive();
        if self.last_universe_eval_date == Some(date) {
            return;
        }
        self.last_universe_eval_date = Some(date);

        let coarse: Vec<CoarseUniverseData> = self
            .ctx
            .portfolio
            .securities
            .iter()
            .filter_map(|entry| {
                let price = entry.price?;
                let dollar_volume = self.ctx.current_slice.bar(&entry.symbol).map(|b| b.volume * price).unwrap_or_default();
                Some(CoarseUniverseData { symbol: entry.symbol.clone(), price, dollar_volume })
            })
            .collect();

        let mut aggregate = engine_core::universe::SecuritiesChanged::default();
        for universe in &mut self.ctx.universes {
            let diff = universe.evaluate(t, &coarse);
            aggregate.added.extend(diff.added);
            aggregate.removed.extend(diff.removed);
        }
        if aggregate.is_empty() {
            return;
        }

        for symbol in &aggregate.added {
            if let Some(mut security) = self.ctx.portfolio.securities.get_mut(symbol) {
                security.tradable = true;
            } else {
                warn!(symbol = %symbol, "universe selected a symbol with no registered security; skipping");
            }
        }
        for symbol in &aggregate.removed {
            if let Some(mut security) = self.ctx.portfolio.securities.get_mut(symbol) {
                security.mark_untradable();
            }
            for event in self.ctx.transaction_manager.cancel_all_for_symbol(symbol) {
                self.dispatch_order_event(event);
            }
        }

        self.dispatch_strategy("on_securities_changed", |strategy, ctx| strategy.on_securities_changed(ctx, &aggregate));
    }

    /// Drains queued updates/cancels and evaluates fills for every
    /// non-terminal order against `slice` (§4.7), dispatching each resulting
    /// event to the strategy and recording terminal orders into the result.
    fn process_orders(&mut self, slice: &Slice) {
        let ctx = &self.ctx;
        let events = ctx.transaction_manager.process_instant(slice, &ctx.portfolio, |symbol| ctx.session_context(symbol, slice.bar(symbol)));
        for event in events {
            self.dispatch_order_event(event);
        }
    }

    /// Drains order events queued by a strategy-invoked order primitive
    /// (market/limit/.../liquidate/set_holdings, all of which submit through
    /// `AlgorithmContext::submit` rather than `process_instant`) and
    /// dispatches them the same way as fill-model-driven events.
    fn drain_pending_order_events(&mut self) {
        for event in self.ctx.drain_pending_order_events() {
            self.dispatch_order_event(event);
        }
    }

    fn dispatch_order_event(&mut self, event: OrderEvent) {
        match &event {
            OrderEvent::Filled { order_id, symbol, .. } | OrderEvent::Canceled { order_id, symbol } => {
                if let Some(order) = self.ctx.transaction_manager.get(*order_id) {
                    self.ctx.result.record_order(&order);
                }
                let realized = self.ctx.portfolio.positions.get(symbol).map(|p| p.realized_pnl).unwrap_or_default();
                let previous = self.last_realized_pnl.insert(symbol.clone(), realized).unwrap_or_default();
                if previous != realized {
                    self.ctx.result.statistics = engine_core::result::Statistics::from_realized_pnls(&self.realized_pnl_samples());
                }
            }
            OrderEvent::Invalid { order_id, .. } => {
                if let Some(order) = self.ctx.transaction_manager.get(*order_id) {
                    self.ctx.result.record_order(&order);
                }
            }
            _ => {}
        }
        self.dispatch_strategy("on_order_event", |strategy, ctx| strategy.on_order_event(ctx, &event));
    }

    fn realized_pnl_samples(&self) -> Vec<Decimal> {
        self.ctx.portfolio.positions.iter().map(|p| p.realized_pnl).filter(|p| !p.is_zero()).collect()
    }

    /// Detects a margin call (remaining margin below zero) and offers the
    /// synthesized liquidation requests to the strategy for optional
    /// override before executing them (§4.6, §7 MarginCall). A thinner
    /// shortfall only triggers the non-actionable warning callback.
    fn check_margin(&mut self) {
        if self.ctx.portfolio.margin_remaining() < Decimal::ZERO {
            let requests: Vec<MarginCallRequest> = self
                .ctx
                .portfolio
                .positions
                .iter()
                .filter(|p| !p.is_flat())
                .map(|p| MarginCallRequest { symbol: p.symbol.clone(), quantity: -p.quantity * dec!(0.5) })
                .collect();
            if requests.is_empty() {
                return;
            }
            self.dispatch_strategy("on_margin_call", |strategy, ctx| strategy.on_margin_call(ctx, &requests));
            for request in requests {
                if let Err(err) = self.ctx.market_order(request.symbol.clone(), request.quantity, "margin_call") {
                    warn!(%err, symbol = %request.symbol, "margin call liquidation order rejected");
                }
            }
        } else if self.ctx.portfolio.margin_call_warning() {
            self.dispatch_strategy("on_margin_call_warning", |strategy, ctx| strategy.on_margin_call_warning(ctx));
        }
    }

    fn finalize_result(mut self) -> BacktestResult {
        self.ctx.result.statistics = engine_core::result::Statistics::from_realized_pnls(&self.realized_pnl_samples());
        self.ctx.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use engine_core::data::subscription::SubscriptionConfig;
    use engine_core::data::Resolution;
    use engine_core::feed::VecDataSource;
    use engine_core::symbol::SecurityType;
    use engine_core::time::{DaySession, ExchangeHours};
    use rust_decimal_macros::dec;

    fn t(s: &str) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&chrono::Utc)
    }

    fn nyse() -> ExchangeHours {
        let open = chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let close = chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        let mut sessions = [DaySession::closed(); 7];
        use chrono::Weekday::*;
        for d in [Mon, Tue, Wed, Thu, Fri] {
            sessions[d.num_days_from_sunday() as usize] = DaySession::new(open, close);
        }
        ExchangeHours::new(chrono_tz::America::New_York, sessions)
    }

    fn bar(symbol: &engine_core::symbol::Symbol, open: Decimal, close: Decimal, day: chrono::NaiveDate) -> BaseData {
        let time = day.and_hms_opt(9, 30, 0).unwrap().and_local_timezone(chrono_tz::America::New_York).unwrap().with_timezone(&chrono::Utc);
        let end_time = day.and_hms_opt(16, 0, 0).unwrap().and_local_timezone(chrono_tz::America::New_York).unwrap().with_timezone(&chrono::Utc);
        BaseData::TradeBar(engine_core::data::base_data::TradeBar { symbol: symbol.clone(), time, end_time, open, high: open.max(close), low: open.min(close), close, volume: dec!(1_000_000) })
    }

    struct BuyAndHold {
        bought: bool,
    }

    impl Strategy for BuyAndHold {
        fn initialize(&mut self, ctx: &mut AlgorithmContext) {
            let symbol = spy_symbol();
            ctx.add_security(
                SecurityType::Equity,
                "SPY",
                Resolution::Daily,
                "NYSE",
                false,
                dec!(1),
                false,
                nyse(),
                Box::new(VecDataSource::new(
                    SubscriptionConfig::new(symbol.clone(), Resolution::Daily, nyse().timezone),
                    vec![
                        bar(&symbol, dec!(100), dec!(101), chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
                        bar(&symbol, dec!(102), dec!(103), chrono::NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
                    ],
                )),
            )
            .unwrap();
        }

        fn on_data(&mut self, ctx: &mut AlgorithmContext, _slice: &Slice) {
            if !self.bought {
                self.bought = true;
                ctx.set_holdings(spy_symbol(), dec!(1)).unwrap();
            }
        }
    }

    fn spy_symbol() -> Symbol {
        Symbol::new("SPY", SecurityType::Equity, "NYSE")
    }

    #[test]
    fn buy_and_hold_fills_a_market_order_on_the_first_bar() {
        let config = Config::new(t("2024-01-01T00:00:00Z"), t("2024-01-31T00:00:00Z"), dec!(100_000));
        let engine = Engine::new(config, BuyAndHold { bought: false }).unwrap();
        let result = engine.run();
        assert_eq!(result.equity_curve.points.len(), 2);
        assert_eq!(result.orders.len(), 1);
        assert_eq!(result.orders[0].status, engine_core::orders::OrderStatus::Filled);
    }

    struct EndOfDayCounter {
        count: std::sync::Arc<std::sync::atomic::AtomicU64>,
    }

    impl Strategy for EndOfDayCounter {
        fn initialize(&mut self, ctx: &mut AlgorithmContext) {
            let symbol = spy_symbol();
            ctx.add_security(
                SecurityType::Equity,
                "SPY",
                Resolution::Daily,
                "NYSE",
                false,
                dec!(1),
                false,
                nyse(),
                Box::new(VecDataSource::new(
                    SubscriptionConfig::new(symbol.clone(), Resolution::Daily, nyse().timezone),
                    vec![
                        bar(&symbol, dec!(100), dec!(101), chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
                        bar(&symbol, dec!(102), dec!(103), chrono::NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
                    ],
                )),
            )
            .unwrap();
        }

        fn on_data(&mut self, _ctx: &mut AlgorithmContext, _slice: &Slice) {}

        fn on_end_of_day(&mut self, _ctx: &mut AlgorithmContext, symbol: &Symbol) {
            assert_eq!(*symbol, spy_symbol());
            self.count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn end_of_day_fires_once_per_session_close() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicU64::new(0));
        let config = Config::new(t("2024-01-01T00:00:00Z"), t("2024-01-31T00:00:00Z"), dec!(100_000));
        let engine = Engine::new(config, EndOfDayCounter { count: count.clone() }).unwrap();
        engine.run();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
