//! Single-security buy-and-hold strategy exercising `engine-runtime` end to
//! end (spec scenario S1): SPY daily bars, `setHoldings(SPY, 1.0)` on the
//! first bar the strategy sees, then hold. Grounded on the teacher's
//! `example_test_strategy`, trimmed from its async channel-driven event loop
//! down to the `Strategy` trait `engine-runtime::Engine` calls directly.

use chrono::{Datelike, NaiveDate};
use engine_core::data::base_data::{BaseData, TradeBar};
use engine_core::data::{Resolution, Slice};
use engine_core::feed::VecDataSource;
use engine_core::orders::OrderEvent;
use engine_core::symbol::{SecurityType, Symbol};
use engine_core::time::{DaySession, ExchangeHours};
use engine_core::universe::SecuritiesChanged;
use engine_runtime::{AlgorithmContext, Config, Engine, Strategy};
use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::info;

struct BuyAndHold {
    symbol: Symbol,
    holdings_set: bool,
}

impl BuyAndHold {
    fn new(symbol: Symbol) -> Self {
        BuyAndHold { symbol, holdings_set: false }
    }
}

impl Strategy for BuyAndHold {
    fn initialize(&mut self, ctx: &mut AlgorithmContext) {
        ctx.add_security(
            SecurityType::Equity,
            &self.symbol.ticker,
            Resolution::Daily,
            "NYSE",
            false,
            Decimal::ONE,
            false,
            nyse_hours(),
            Box::new(VecDataSource::new(
                engine_core::data::SubscriptionConfig::new(self.symbol.clone(), Resolution::Daily, nyse_hours().timezone),
                spy_daily_bars(&self.symbol),
            )),
        )
        .expect("SPY registers cleanly on a fresh run");
    }

    fn on_data(&mut self, ctx: &mut AlgorithmContext, _slice: &Slice) {
        if self.holdings_set {
            return;
        }
        self.holdings_set = true;
        match ctx.set_holdings(self.symbol.clone(), Decimal::ONE) {
            Ok(Some(_)) => info!(symbol = %self.symbol, "set_holdings(1.0) submitted"),
            Ok(None) => info!(symbol = %self.symbol, "set_holdings(1.0) required no change"),
            Err(err) => tracing::warn!(%err, "set_holdings rejected"),
        }
    }

    fn on_order_event(&mut self, _ctx: &mut AlgorithmContext, event: &OrderEvent) {
        info!(?event, "order event");
    }

    fn on_securities_changed(&mut self, _ctx: &mut AlgorithmContext, _changes: &SecuritiesChanged) {}
}

fn nyse_hours() -> ExchangeHours {
    let open = chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let close = chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap();
    let mut sessions = [DaySession::closed(); 7];
    use chrono::Weekday::*;
    for day in [Mon, Tue, Wed, Thu, Fri] {
        sessions[day.num_days_from_sunday() as usize] = DaySession::new(open, close);
    }
    ExchangeHours::new(chrono_tz::America::New_York, sessions)
}

/// The week of 2013-10-07 through 2013-10-11 (S1), five trading days, prices
/// loosely tracking SPY's actual close that week.
fn spy_daily_bars(symbol: &Symbol) -> Vec<BaseData> {
    let sessions = [
        (2013, 10, 7, "163.08", "162.49"),
        (2013, 10, 8, "162.39", "160.38"),
        (2013, 10, 9, "160.23", "160.34"),
        (2013, 10, 10, "163.28", "164.75"),
        (2013, 10, 11, "165.40", "166.10"),
    ];
    sessions
        .into_iter()
        .map(|(y, m, d, open, close)| {
            let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
            let time = date.and_hms_opt(9, 30, 0).unwrap().and_local_timezone(chrono_tz::America::New_York).unwrap().with_timezone(&chrono::Utc);
            let end_time = date.and_hms_opt(16, 0, 0).unwrap().and_local_timezone(chrono_tz::America::New_York).unwrap().with_timezone(&chrono::Utc);
            let open = Decimal::from_str(open).unwrap();
            let close = Decimal::from_str(close).unwrap();
            BaseData::TradeBar(TradeBar {
                symbol: symbol.clone(),
                time,
                end_time,
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: Decimal::from(80_000_000u64),
            })
        })
        .collect()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let start = NaiveDate::from_ymd_opt(2013, 10, 7).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
    let end = NaiveDate::from_ymd_opt(2013, 10, 12).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
    let config = Config::new(start, end, Decimal::from(100_000));

    let symbol = Symbol::new("SPY", SecurityType::Equity, "NYSE");
    let engine = Engine::new(config, BuyAndHold::new(symbol)).expect("start strictly precedes end");
    let result = engine.run();

    info!(orders = result.orders.len(), equity_points = result.equity_curve.points.len(), "backtest complete");
    println!("{}", result.to_json().expect("BacktestResult always serializes"));
}
