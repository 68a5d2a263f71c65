use crate::data::base_data::{BaseData, TradeBar};
use crate::data::rolling_window::RollingWindow;
use crate::data::subscription::SubscriptionConfig;
use crate::symbol::Symbol;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Pre-roll configuration: either a fixed bar count or a fixed duration
/// before `startDate` (§4.10).
#[derive(Clone, Copy, Debug)]
pub enum WarmupConfig {
    BarCount(usize),
    Duration(Duration),
}

/// Serves historical windows to indicators and user code, and tracks the
/// `isWarmingUp` flag (§4.10). Grounded on the teacher's
/// `consolidators_trait.rs::warmup` (walk a wider-resolution base
/// subscription backward from `to_time`, feeding every consolidator) and
/// `history_handler.rs`.
pub struct HistoryProvider {
    warmup: Option<WarmupConfig>,
    start_date: DateTime<Utc>,
    capacity: usize,
    windows: HashMap<Symbol, RollingWindow<TradeBar>>,
}

impl HistoryProvider {
    pub fn new(start_date: DateTime<Utc>, warmup: Option<WarmupConfig>, history_capacity: usize) -> Self {
        HistoryProvider { warmup, start_date, capacity: history_capacity, windows: HashMap::new() }
    }

    /// The instant warm-up replay must begin from, given `start_date` and
    /// the configured pre-roll, if it is duration-based. Bar-count warm-up
    /// has no fixed start instant — the feed simply keeps consolidator state
    /// live for `BarCount` bars before the first slice is delivered to the
    /// strategy.
    pub fn warmup_start(&self) -> DateTime<Utc> {
        match self.warmup {
            Some(WarmupConfig::Duration(d)) => self.start_date - d,
            _ => self.start_date,
        }
    }

    /// Whether `t` still falls within the warm-up region, during which user
    /// `OnData` callbacks are suppressed but consolidators/indicators update
    /// normally (§4.4 Warm-up interaction).
    pub fn is_warming_up(&self, t: DateTime<Utc>) -> bool {
        t < self.start_date
    }

    /// Records a bar into `symbol`'s bounded rolling history. Called for
    /// every bar the feed produces, warm-up or live, so `history()` can
    /// serve a window that spans the warm-up/live boundary transparently.
    pub fn record(&mut self, symbol: &Symbol, bar: TradeBar) {
        let capacity = self.capacity;
        self.windows.entry(symbol.clone()).or_insert_with(|| RollingWindow::new(capacity)).add(bar);
    }

    /// The most recent `n` bars for `symbol`, oldest first, never including
    /// data beyond `as_of` (§4.10 "must not peek beyond current clock").
    pub fn history(&self, symbol: &Symbol, n: usize, as_of: DateTime<Utc>) -> Vec<TradeBar> {
        let Some(window) = self.windows.get(symbol) else { return Vec::new() };
        let mut bars: Vec<TradeBar> = window.history().iter().filter(|b| b.end_time <= as_of).take(n).cloned().collect();
        bars.reverse();
        bars
    }

    /// The history window spanning the last `duration` up to `as_of`.
    pub fn history_by_duration(&self, symbol: &Symbol, duration: Duration, as_of: DateTime<Utc>) -> Vec<TradeBar> {
        let Some(window) = self.windows.get(symbol) else { return Vec::new() };
        let cutoff = as_of - duration;
        let mut bars: Vec<TradeBar> = window.history().iter().filter(|b| b.end_time <= as_of && b.end_time > cutoff).cloned().collect();
        bars.reverse();
        bars
    }
}

/// Replays `subscription`'s warm-up region (`[warmup_start, start_date)`)
/// from an already-materialized, time-ordered bar sequence, recording each
/// bar into `history` without surfacing it to the strategy. Returns the
/// bars actually consumed so a caller can continue the live feed from
/// the remainder (§4.4 Warm-up interaction, §4.10).
pub fn replay_warmup(subscription: &SubscriptionConfig, bars: Vec<BaseData>, history: &mut HistoryProvider) -> usize {
    let start = history.warmup_start();
    let mut consumed = 0;
    for item in bars {
        if item.end_time() > history.start_date {
            break;
        }
        if item.time() < start {
            continue;
        }
        if let BaseData::TradeBar(bar) = item {
            history.record(&subscription.symbol, bar);
            consumed += 1;
        }
    }
    consumed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::resolution::Resolution;
    use crate::symbol::SecurityType;
    use rust_decimal_macros::dec;

    fn t(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn spy() -> Symbol {
        Symbol::new("SPY", SecurityType::Equity, "NYSE")
    }

    fn bar(time: DateTime<Utc>, close: rust_decimal::Decimal) -> TradeBar {
        TradeBar { symbol: spy(), time, end_time: time + Duration::days(1), open: close, high: close, low: close, close, volume: dec!(0) }
    }

    #[test]
    fn duration_warmup_starts_before_start_date() {
        let history = HistoryProvider::new(t("2024-01-10T00:00:00Z"), Some(WarmupConfig::Duration(Duration::days(5))), 20);
        assert_eq!(history.warmup_start(), t("2024-01-05T00:00:00Z"));
    }

    #[test]
    fn is_warming_up_flips_false_at_start_date() {
        let history = HistoryProvider::new(t("2024-01-10T00:00:00Z"), None, 20);
        assert!(history.is_warming_up(t("2024-01-09T00:00:00Z")));
        assert!(!history.is_warming_up(t("2024-01-10T00:00:00Z")));
    }

    #[test]
    fn history_never_includes_bars_beyond_as_of() {
        let mut history = HistoryProvider::new(t("2024-01-10T00:00:00Z"), None, 20);
        history.record(&spy(), bar(t("2024-01-01T00:00:00Z"), dec!(100)));
        history.record(&spy(), bar(t("2024-01-02T00:00:00Z"), dec!(101)));
        history.record(&spy(), bar(t("2024-01-03T00:00:00Z"), dec!(102)));

        let window = history.history(&spy(), 5, t("2024-01-02T00:00:00Z") + Duration::days(1));
        assert_eq!(window.len(), 2);
        assert_eq!(window.last().unwrap().close, dec!(101));
    }

    #[test]
    fn replay_warmup_only_consumes_the_pre_roll_region() {
        let mut history = HistoryProvider::new(t("2024-01-03T00:00:00Z"), Some(WarmupConfig::BarCount(2)), 20);
        let subscription = SubscriptionConfig::new(spy(), Resolution::Daily, chrono_tz::UTC);
        let bars = vec![
            BaseData::TradeBar(bar(t("2024-01-01T00:00:00Z"), dec!(100))),
            BaseData::TradeBar(bar(t("2024-01-02T00:00:00Z"), dec!(101))),
            BaseData::TradeBar(bar(t("2024-01-03T00:00:00Z"), dec!(102))),
        ];
        let consumed = replay_warmup(&subscription, bars, &mut history);
        assert_eq!(consumed, 2);
    }
}
