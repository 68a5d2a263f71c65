use crate::config::Config;
use engine_core::data::base_data::TradeBar;
use engine_core::data::{Resolution, Slice, SubscriptionConfig};
use engine_core::error::{ConfigError, OrderError};
use engine_core::feed::{DataFeedMerger, MarketDataSource};
use engine_core::history::{HistoryProvider, WarmupConfig};
use engine_core::orders::brokerage_model::BrokerageModel;
use engine_core::orders::fill_model::FillModel;
use engine_core::orders::{Order, OrderTicket, OrderType, SessionContext, TransactionManager};
use engine_core::portfolio::{Portfolio, Security};
use engine_core::result::BacktestResult;
use engine_core::scheduler::{DateRule, ScheduledAction, Scheduler, TimeRule};
use engine_core::symbol::{SecurityIdentifier, SecurityType, Symbol, SymbolCache};
use engine_core::time::{Clock, ExchangeHours};
use engine_core::universe::{Selector, Universe, UniverseConfig};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Everything `setSecurityInitializer` may mutate about a freshly created
/// [`Security`] before it joins the portfolio (§6).
pub type SecurityInitializer = Box<dyn Fn(&mut Security) + Send + Sync>;

/// The strategy-facing API surface (§6 "Strategy-facing API (host → core)").
/// Owns every piece of per-run state a strategy's `initialize`/`on_*`
/// callbacks touch. Grounded on the teacher's `fund_forge_strategy.rs`
/// public methods, generalized from direct-to-broker message sends into
/// calls against the in-process `engine-core` components below.
pub struct AlgorithmContext {
    pub(crate) clock: Arc<RwLock<Clock>>,
    pub(crate) symbols: SymbolCache,
    pub(crate) portfolio: Arc<Portfolio>,
    pub(crate) transaction_manager: Arc<TransactionManager>,
    pub(crate) subscription_manager: engine_core::subscription_manager::SubscriptionManager,
    pub(crate) scheduler: Scheduler,
    pub(crate) history: HistoryProvider,
    pub(crate) universes: Vec<Universe>,
    pub(crate) exchange_hours: HashMap<Symbol, ExchangeHours>,
    pub(crate) config: Config,
    pub(crate) current_slice: Slice,
    pub(crate) feed: Option<DataFeedMerger>,
    pub(crate) pending_sources: Vec<Box<dyn MarketDataSource + Send>>,
    pub(crate) security_initializer: Option<SecurityInitializer>,
    pub(crate) benchmark: Option<Symbol>,
    pub(crate) result: BacktestResult,
    pub(crate) is_warming_up: bool,
    pub(crate) default_leverage: Decimal,
    pub(crate) next_history_capacity: usize,
    /// Every [`engine_core::orders::OrderEvent`] raised by an order primitive
    /// called directly from strategy code (§6), queued here since those
    /// primitives take `&self` and the engine's dispatch loop is the only
    /// place with a `&mut AlgorithmContext` to hand the strategy's
    /// `on_order_event` callback.
    pub(crate) pending_order_events: Arc<Mutex<Vec<engine_core::orders::OrderEvent>>>,
}

impl AlgorithmContext {
    pub fn new(config: Config) -> Self {
        let start = config.start_date;
        let warmup: Option<WarmupConfig> = config.warmup.map(Into::into);
        let account_currency = config.account_currency.clone();
        let initial_cash = config.initial_cash;
        AlgorithmContext {
            clock: Arc::new(RwLock::new(Clock::new(start))),
            symbols: SymbolCache::new(),
            portfolio: Arc::new(Portfolio::new(account_currency, initial_cash)),
            transaction_manager: Arc::new(TransactionManager::new(FillModel::new(1, Decimal::ZERO), Box::new(engine_core::orders::brokerage_model::DefaultBrokerageModel::default()))),
            subscription_manager: engine_core::subscription_manager::SubscriptionManager::new(),
            scheduler: Scheduler::new(),
            history: HistoryProvider::new(start, warmup, 512),
            universes: Vec::new(),
            exchange_hours: HashMap::new(),
            config,
            current_slice: Slice::default(),
            feed: None,
            pending_sources: Vec::new(),
            security_initializer: None,
            benchmark: None,
            result: BacktestResult::new(),
            is_warming_up: true,
            default_leverage: Decimal::ONE,
            next_history_capacity: 512,
            pending_order_events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    // ---- §6 registration / configuration primitives -----------------

    /// Registers a tradable security plus the market-data source that feeds
    /// it. `exchange_hours` drives both session arithmetic (§4.2) and the
    /// clock's per-zone views (§4.1). The data-reading side of `source` is
    /// entirely the host's responsibility (§1 out-of-scope collaborator);
    /// this crate only ever calls `MarketDataSource::{peek_end_time,next}`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_security(
        &mut self,
        security_type: SecurityType,
        ticker: &str,
        resolution: Resolution,
        market: &str,
        fill_forward: bool,
        leverage: Decimal,
        extended_hours: bool,
        exchange_hours: ExchangeHours,
        source: Box<dyn MarketDataSource + Send>,
    ) -> Result<Symbol, ConfigError> {
        let symbol = self.symbols.register(Symbol::new(ticker, security_type, market))?;
        let subscription = SubscriptionConfig::new(symbol.clone(), resolution, exchange_hours.timezone).fill_forward(fill_forward).extended_hours(extended_hours);
        self.subscription_manager.add_subscription(subscription.clone(), self.next_history_capacity)?;

        let mut security = Security::new(symbol.clone(), subscription, leverage).with_data_normalization(self.config.data_normalization_mode.into());
        if let Some(initializer) = &self.security_initializer {
            initializer(&mut security);
        }
        self.portfolio.add_security(security);

        self.clock.write().unwrap().add_zone(exchange_hours.timezone);
        self.exchange_hours.insert(symbol.clone(), exchange_hours.clone());
        self.scheduler.register_exchange_hours(symbol.clone(), exchange_hours.clone());

        match &mut self.feed {
            Some(feed) => {
                feed.register_exchange_hours(symbol.clone(), exchange_hours);
                feed.add_source(source);
            }
            None => self.pending_sources.push(source),
        }

        Ok(symbol)
    }

    /// Derives the canonical option symbol for `underlying` (§3 Symbol).
    pub fn option_symbol(&self, underlying: &Symbol, occ_symbol: &str) -> Symbol {
        underlying.option(occ_symbol)
    }

    pub fn security_identifier(&self, security_type: SecurityType, market: &str, ticker: &str) -> SecurityIdentifier {
        SecurityIdentifier::new(security_type, &market.to_string(), ticker)
    }

    /// Registers a named, time-varying member set (§3 Universe, §4.5).
    pub fn add_universe(&mut self, name: impl Into<String>, resolution: Resolution, selector: Selector) {
        self.universes.push(Universe::new(UniverseConfig { name: name.into(), resolution }, selector));
    }

    pub fn set_start_date(&mut self, t: DateTimeUtc) {
        self.config.start_date = t;
        self.history = HistoryProvider::new(t, self.config.warmup.map(Into::into), self.next_history_capacity);
    }

    pub fn set_end_date(&mut self, t: DateTimeUtc) {
        self.config.end_date = t;
    }

    /// `setCash(ccy?, amount, rate?)` (§6): sets or tops up one currency's
    /// balance, optionally recording its conversion rate against the
    /// account currency.
    pub fn set_cash(&mut self, currency: Option<&str>, amount: Decimal, rate: Option<Decimal>) {
        let currency = currency.unwrap_or(&self.config.account_currency);
        match rate {
            Some(rate) => self.portfolio.cash.set_with_rate(currency.to_string(), amount, rate),
            None => self.portfolio.cash.set(currency.to_string(), amount),
        }
    }

    pub fn set_warmup(&mut self, warmup: crate::config::WarmupSetting) {
        self.config.warmup = Some(warmup);
        self.history = HistoryProvider::new(self.config.start_date, Some(warmup.into()), self.next_history_capacity);
    }

    pub fn set_benchmark(&mut self, symbol: Symbol) {
        self.benchmark = Some(symbol);
    }

    pub fn set_brokerage_model(&mut self, model: Box<dyn BrokerageModel>) {
        Arc::get_mut(&mut self.transaction_manager)
            .expect("set_brokerage_model must be called during initialize(), before any ticket clones escape to schedule closures")
            .set_brokerage_model(model);
    }

    pub fn set_security_initializer(&mut self, initializer: SecurityInitializer) {
        self.security_initializer = Some(initializer);
    }

    /// `schedule.on(dateRule, timeRule, action)` (§4.9, §6).
    pub fn schedule_on(&mut self, date_rule: DateRule, time_rule: TimeRule, action: ScheduledAction) {
        let from = self.clock.read().unwrap().utc();
        self.scheduler.on(date_rule, time_rule, action, from);
    }

    // ---- §4.10 history -------------------------------------------------

    pub fn history(&self, symbol: &Symbol, n: usize) -> Vec<TradeBar> {
        self.history.history(symbol, n, self.clock.read().unwrap().utc())
    }

    pub fn history_by_duration(&self, symbol: &Symbol, duration: chrono::Duration) -> Vec<TradeBar> {
        self.history.history_by_duration(symbol, duration, self.clock.read().unwrap().utc())
    }

    pub fn is_warming_up(&self) -> bool {
        self.is_warming_up
    }

    // ---- accessors strategies and schedule closures may clone ---------

    pub fn portfolio(&self) -> Arc<Portfolio> {
        self.portfolio.clone()
    }

    pub fn transaction_manager(&self) -> Arc<TransactionManager> {
        self.transaction_manager.clone()
    }

    pub fn clock_handle(&self) -> Arc<RwLock<Clock>> {
        self.clock.clone()
    }

    pub fn utc_now(&self) -> DateTimeUtc {
        self.clock.read().unwrap().utc()
    }

    pub fn current_slice(&self) -> &Slice {
        &self.current_slice
    }

    pub fn total_portfolio_value(&self) -> Decimal {
        self.portfolio.total_portfolio_value()
    }

    pub fn order(&self, id: engine_core::orders::OrderId) -> Option<Order> {
        self.transaction_manager.get(id)
    }

    /// Drains every order event raised by a strategy-invoked order primitive
    /// since the last drain (§9 design note: the engine is the sole
    /// dispatcher of `onOrderEvent`).
    pub(crate) fn drain_pending_order_events(&self) -> Vec<engine_core::orders::OrderEvent> {
        std::mem::take(&mut *self.pending_order_events.lock().unwrap())
    }

    // ---- §6 order primitives -------------------------------------------

    pub(crate) fn session_context(&self, symbol: &Symbol, bar: Option<&TradeBar>) -> SessionContext {
        let Some(hours) = self.exchange_hours.get(symbol) else { return SessionContext::default() };
        let Some(bar) = bar else { return SessionContext::default() };
        let local = bar.time.with_timezone(&hours.timezone);
        let is_session_open_bar = hours.is_open(local, false) && !hours.is_open((bar.time - chrono::Duration::seconds(1)).with_timezone(&hours.timezone), false);
        let close = hours.next_close(local);
        let cutoff_minutes = 10; // DefaultBrokerageModel::close_auction_cutoff_minutes, absent a per-security override
        let close_cutoff_reached = bar.end_time.with_timezone(&hours.timezone) >= close - chrono::Duration::minutes(cutoff_minutes);
        SessionContext { is_session_open_bar, close_cutoff_reached }
    }

    fn submit(&self, symbol: Symbol, quantity: Decimal, order_type: OrderType, limit: Option<Decimal>, stop: Option<Decimal>, tag: &str, is_async: bool) -> Result<OrderTicket, OrderError> {
        let security = self.portfolio.securities.get(&symbol).ok_or_else(|| OrderError::NotTradable(symbol.ticker.clone()))?;
        let bar = self.current_slice.bar(&symbol);
        let (ticket, events) = self.transaction_manager.submit(symbol, quantity, order_type, limit, stop, tag.to_string(), self.utc_now(), is_async, &security, &self.portfolio, bar);
        let invalid_reason = events.iter().find_map(|event| match event {
            engine_core::orders::OrderEvent::Invalid { reason, .. } => Some(reason.clone()),
            _ => None,
        });
        self.pending_order_events.lock().unwrap().extend(events);
        if let Some(reason) = invalid_reason {
            return Err(OrderError::BrokerageRejected(reason));
        }
        Ok(ticket)
    }

    pub fn market_order(&self, symbol: Symbol, quantity: Decimal, tag: &str) -> Result<OrderTicket, OrderError> {
        self.submit(symbol, quantity, OrderType::Market, None, None, tag, false)
    }

    pub fn market_order_async(&self, symbol: Symbol, quantity: Decimal, tag: &str) -> Result<OrderTicket, OrderError> {
        self.submit(symbol, quantity, OrderType::Market, None, None, tag, true)
    }

    pub fn limit_order(&self, symbol: Symbol, quantity: Decimal, limit_price: Decimal, tag: &str) -> Result<OrderTicket, OrderError> {
        self.submit(symbol, quantity, OrderType::Limit, Some(limit_price), None, tag, true)
    }

    pub fn stop_market_order(&self, symbol: Symbol, quantity: Decimal, stop_price: Decimal, tag: &str) -> Result<OrderTicket, OrderError> {
        self.submit(symbol, quantity, OrderType::StopMarket, None, Some(stop_price), tag, true)
    }

    pub fn stop_limit_order(&self, symbol: Symbol, quantity: Decimal, stop_price: Decimal, limit_price: Decimal, tag: &str) -> Result<OrderTicket, OrderError> {
        self.submit(symbol, quantity, OrderType::StopLimit, Some(limit_price), Some(stop_price), tag, true)
    }

    pub fn market_on_open_order(&self, symbol: Symbol, quantity: Decimal, tag: &str) -> Result<OrderTicket, OrderError> {
        self.submit(symbol, quantity, OrderType::MarketOnOpen, None, None, tag, true)
    }

    pub fn market_on_close_order(&self, symbol: Symbol, quantity: Decimal, tag: &str) -> Result<OrderTicket, OrderError> {
        self.submit(symbol, quantity, OrderType::MarketOnClose, None, None, tag, true)
    }

    /// Flattens one symbol's position, or every open position when `symbol`
    /// is `None` (§6 `liquidate(symbol?)`).
    pub fn liquidate(&self, symbol: Option<Symbol>) -> Vec<OrderTicket> {
        let targets: Vec<Symbol> = match symbol {
            Some(s) => vec![s],
            None => self.portfolio.positions.iter().filter(|p| !p.is_flat()).map(|p| p.symbol.clone()).collect(),
        };
        targets
            .into_iter()
            .filter_map(|symbol| {
                let qty = self.portfolio.positions.get(&symbol).map(|p| p.quantity).unwrap_or_default();
                if qty.is_zero() {
                    return None;
                }
                self.market_order(symbol, -qty, "liquidate").ok()
            })
            .collect()
    }

    /// Computes a market order to reach `|fraction| · totalPortfolioValue`
    /// notional in `symbol` (§6 `setHoldings`). Positive `fraction` means
    /// long, negative means short.
    pub fn set_holdings(&self, symbol: Symbol, fraction: Decimal) -> Result<Option<OrderTicket>, OrderError> {
        let security = self.portfolio.securities.get(&symbol).ok_or_else(|| OrderError::NotTradable(symbol.ticker.clone()))?;
        let price = security.price.ok_or_else(|| OrderError::NotTradable(symbol.ticker.clone()))?;
        drop(security);

        let target_notional = fraction * self.portfolio.total_portfolio_value();
        let target_qty = (target_notional / price).round();
        let current_qty = self.portfolio.positions.get(&symbol).map(|p| p.quantity).unwrap_or_default();
        let delta = target_qty - current_qty;
        if delta.is_zero() {
            return Ok(None);
        }
        self.market_order(symbol, delta, "set_holdings").map(Some)
    }
}

type DateTimeUtc = chrono::DateTime<chrono::Utc>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::TimeZone;
    use engine_core::data::subscription::SubscriptionConfig as _SC;
    use engine_core::feed::VecDataSource;
    use rust_decimal_macros::dec;

    fn t(s: &str) -> DateTimeUtc {
        DateTimeUtc::parse_from_rfc3339(s).unwrap().with_timezone(&chrono::Utc)
    }

    fn nyse() -> ExchangeHours {
        let open = chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let close = chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        let mut sessions = [engine_core::time::DaySession::closed(); 7];
        for d in [chrono::Weekday::Mon, chrono::Weekday::Tue, chrono::Weekday::Wed, chrono::Weekday::Thu, chrono::Weekday::Fri] {
            sessions[d.num_days_from_sunday() as usize] = engine_core::time::DaySession::new(open, close);
        }
        ExchangeHours::new(chrono_tz::America::New_York, sessions)
    }

    fn ctx_with_spy() -> (AlgorithmContext, Symbol) {
        let config = Config::new(t("2024-01-01T00:00:00Z"), t("2024-12-31T00:00:00Z"), dec!(100_000));
        let mut ctx = AlgorithmContext::new(config);
        let symbol = ctx
            .add_security(
                SecurityType::Equity,
                "SPY",
                Resolution::Daily,
                "NYSE",
                false,
                dec!(1),
                false,
                nyse(),
                Box::new(VecDataSource::new(_SC::new(Symbol::new("SPY", SecurityType::Equity, "NYSE"), Resolution::Daily, nyse().timezone), Vec::new())),
            )
            .unwrap();
        ctx.feed = Some(DataFeedMerger::new(std::mem::take(&mut ctx.pending_sources)));
        (ctx, symbol)
    }

    #[test]
    fn add_security_registers_subscription_and_tradable_security() {
        let (ctx, symbol) = ctx_with_spy();
        assert!(ctx.subscription_manager.is_subscribed(&symbol));
        assert!(ctx.portfolio.securities.get(&symbol).unwrap().tradable);
    }

    #[test]
    fn set_holdings_computes_the_notional_delta() {
        let (mut ctx, symbol) = ctx_with_spy();
        ctx.portfolio.mark_price(&symbol, dec!(100));
        let bar = TradeBar { symbol: symbol.clone(), time: t("2024-01-02T00:00:00Z"), end_time: t("2024-01-03T00:00:00Z"), open: dec!(100), high: dec!(101), low: dec!(99), close: dec!(100), volume: dec!(0) };
        ctx.current_slice = Slice::new(t("2024-01-03T00:00:00Z"));
        ctx.current_slice.bars.insert(symbol.clone(), bar);

        let ticket = ctx.set_holdings(symbol.clone(), dec!(1)).unwrap().unwrap();
        assert_eq!(ticket.snapshot().unwrap().quantity, dec!(1000));
    }

    #[test]
    fn liquidate_with_no_position_returns_no_tickets() {
        let (ctx, symbol) = ctx_with_spy();
        assert!(ctx.liquidate(Some(symbol)).is_empty());
    }
}
