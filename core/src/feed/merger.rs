use crate::data::base_data::{BaseData, TradeBar};
use crate::data::resolution::Resolution;
use crate::data::slice::Slice;
use crate::feed::source::MarketDataSource;
use crate::symbol::Symbol;
use crate::time::exchange_hours::ExchangeHours;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// One pending item in the merge heap: the next `end_time` a source would
/// produce, plus enough to break ties deterministically.
struct HeapEntry {
    end_time: DateTime<Utc>,
    /// Position of the owning source in `DataFeedMerger::sources`, doubling
    /// as the "subscription insertion order" tie-break (§4.4 algorithm).
    source_idx: usize,
    symbol_key: String,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.end_time == other.end_time && self.source_idx == other.source_idx
    }
}
impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) behaves as a min-heap keyed
        // by (end_time, insertion order, symbol hash).
        other
            .end_time
            .cmp(&self.end_time)
            .then_with(|| other.source_idx.cmp(&self.source_idx))
            .then_with(|| other.symbol_key.cmp(&self.symbol_key))
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// K-way merges every registered subscription's stream into time-ordered
/// `Slice`s (§4.4). Grounded on the teacher's `SubscriptionHandler`'s
/// per-symbol fan-out, generalized into an explicit min-heap merge.
pub struct DataFeedMerger {
    sources: Vec<Box<dyn MarketDataSource + Send>>,
    heap: BinaryHeap<HeapEntry>,
    last_bar: HashMap<Symbol, TradeBar>,
    next_due: HashMap<usize, DateTime<Utc>>,
    exchange_hours: HashMap<Symbol, ExchangeHours>,
    /// Indices of sources retired via [`Self::deactivate_symbol`] (§4.5
    /// universe removal): the merger keeps draining their heap entries to
    /// stay deterministic but never pulls another sample from them.
    retired: std::collections::HashSet<usize>,
}

impl DataFeedMerger {
    pub fn new(sources: Vec<Box<dyn MarketDataSource + Send>>) -> Self {
        let mut heap = BinaryHeap::new();
        for (idx, source) in sources.iter().enumerate() {
            if let Some(end_time) = source.peek_end_time() {
                heap.push(HeapEntry { end_time, source_idx: idx, symbol_key: source.subscription().symbol.id.to_string() });
            }
        }
        DataFeedMerger { sources, heap, last_bar: HashMap::new(), next_due: HashMap::new(), exchange_hours: HashMap::new(), retired: std::collections::HashSet::new() }
    }

    pub fn register_exchange_hours(&mut self, symbol: Symbol, hours: ExchangeHours) {
        self.exchange_hours.insert(symbol, hours);
    }

    /// Registers a new subscription's source mid-run (§4.5 universe
    /// addition): assigned the next `source_idx`, so its tie-break order is
    /// "after every source known at construction time", matching the
    /// insertion-order tie-break rule for sources added at any other time.
    pub fn add_source(&mut self, source: Box<dyn MarketDataSource + Send>) {
        let idx = self.sources.len();
        if let Some(end_time) = source.peek_end_time() {
            self.heap.push(HeapEntry { end_time, source_idx: idx, symbol_key: source.subscription().symbol.id.to_string() });
        }
        self.sources.push(source);
    }

    /// Retires every source for `symbol` (§4.5 universe removal): no further
    /// samples are pulled from it, and its pending heap entry is dropped so a
    /// feed left with only retired sources reports exhaustion instead of
    /// emitting an empty slice forever.
    pub fn deactivate_symbol(&mut self, symbol: &Symbol) {
        for (idx, source) in self.sources.iter().enumerate() {
            if &source.subscription().symbol == symbol {
                self.retired.insert(idx);
            }
        }
        let retired = &self.retired;
        self.heap = self.heap.drain().filter(|entry| !retired.contains(&entry.source_idx)).collect();
    }

    fn session_open(&self, symbol: &Symbol, t: DateTime<Utc>, extended: bool) -> bool {
        match self.exchange_hours.get(symbol) {
            Some(hours) => hours.is_open(t.with_timezone(&hours.timezone), extended),
            None => true,
        }
    }

    fn insert_into_slice(slice: &mut Slice, data: BaseData) {
        match data {
            BaseData::TradeBar(bar) => {
                slice.bars.insert(bar.symbol.clone(), bar);
            }
            BaseData::Tick(tick) => {
                slice.ticks.entry(tick.symbol.clone()).or_default().push(tick);
            }
            BaseData::Split(split) => slice.splits.push(split),
            BaseData::Dividend(dividend) => slice.dividends.push(dividend),
            BaseData::Delisting(delisting) => slice.delistings.push(delisting),
            BaseData::Custom(custom) => {
                slice.custom.entry(custom.symbol.clone()).or_default().push(custom.payload);
            }
            BaseData::QuoteBar(_) => {}
        }
    }

    /// Synthesizes a fill-forward bar into `slice` for every fill-forward
    /// subscription that produced no real sample this round and whose
    /// session-valid grid slot has been reached (§4.4 Fill-forward, open
    /// question (b)).
    fn fill_forward(&mut self, slice: &mut Slice, touched: &[usize], t: DateTime<Utc>) {
        for idx in 0..self.sources.len() {
            if touched.contains(&idx) || self.retired.contains(&idx) {
                continue;
            }
            let subscription = self.sources[idx].subscription().clone();
            if !subscription.fill_forward || matches!(subscription.resolution, Resolution::Tick) {
                continue;
            }
            let due = *self.next_due.get(&idx).unwrap_or(&t);
            if due > t {
                continue;
            }
            if !self.session_open(&subscription.symbol, t, subscription.extended_hours) {
                continue;
            }
            if let Some(last) = self.last_bar.get(&subscription.symbol).cloned() {
                let synthesized = TradeBar {
                    symbol: subscription.symbol.clone(),
                    time: t - subscription.resolution.as_duration(),
                    end_time: t,
                    open: last.close,
                    high: last.close,
                    low: last.close,
                    close: last.close,
                    volume: rust_decimal::Decimal::ZERO,
                };
                slice.bars.entry(subscription.symbol.clone()).or_insert_with(|| synthesized.clone());
                self.last_bar.insert(subscription.symbol.clone(), synthesized);
            }
            self.next_due.insert(idx, t + subscription.resolution.as_duration());
        }
    }

    /// Pops the next time-ordered `Slice`, or `None` once every source is
    /// exhausted.
    pub fn next_slice(&mut self) -> Option<Slice> {
        let t = self.heap.peek()?.end_time;
        let mut touched = Vec::new();
        while let Some(top) = self.heap.peek() {
            if top.end_time != t {
                break;
            }
            let entry = self.heap.pop().unwrap();
            touched.push(entry.source_idx);
        }

        let mut slice = Slice::new(t);
        for &idx in &touched {
            if self.retired.contains(&idx) {
                continue;
            }
            if let Some(data) = self.sources[idx].next() {
                if let BaseData::TradeBar(bar) = &data {
                    self.last_bar.insert(bar.symbol.clone(), bar.clone());
                }
                self.next_due.insert(idx, t + self.sources[idx].subscription().resolution.as_duration());
                Self::insert_into_slice(&mut slice, data);
            }
            if let Some(next_end_time) = self.sources[idx].peek_end_time() {
                self.heap.push(HeapEntry {
                    end_time: next_end_time,
                    source_idx: idx,
                    symbol_key: self.sources[idx].subscription().symbol.id.to_string(),
                });
            }
        }

        self.fill_forward(&mut slice, &touched, t);
        Some(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::subscription::SubscriptionConfig;
    use crate::symbol::{SecurityType, Symbol};
    use rust_decimal_macros::dec;

    fn bar(symbol: &Symbol, time: DateTime<Utc>, end_time: DateTime<Utc>, close: rust_decimal::Decimal) -> BaseData {
        BaseData::TradeBar(TradeBar { symbol: symbol.clone(), time, end_time, open: close, high: close, low: close, close, volume: dec!(0) })
    }

    #[test]
    fn merges_two_subscriptions_in_time_order() {
        let spy = Symbol::new("SPY", SecurityType::Equity, "NYSE");
        let qqq = Symbol::new("QQQ", SecurityType::Equity, "NASDAQ");
        let t0 = DateTime::from_timestamp(0, 0).unwrap();
        let t1 = DateTime::from_timestamp(60, 0).unwrap();
        let t2 = DateTime::from_timestamp(120, 0).unwrap();

        let spy_source = VecDataSource::new(
            SubscriptionConfig::new(spy.clone(), Resolution::Minutes(1), chrono_tz::UTC),
            vec![bar(&spy, t0, t1, dec!(100)), bar(&spy, t1, t2, dec!(101))],
        );
        let qqq_source = VecDataSource::new(
            SubscriptionConfig::new(qqq.clone(), Resolution::Minutes(1), chrono_tz::UTC),
            vec![bar(&qqq, t0, t1, dec!(200))],
        );

        let mut merger = DataFeedMerger::new(vec![Box::new(spy_source), Box::new(qqq_source)]);

        let first = merger.next_slice().unwrap();
        assert_eq!(first.t, Some(t1));
        assert_eq!(first.bars.len(), 2);

        let second = merger.next_slice().unwrap();
        assert_eq!(second.t, Some(t2));
        assert_eq!(second.bars.len(), 1);
        assert!(second.bar(&spy).is_some());

        assert!(merger.next_slice().is_none());
    }

    #[test]
    fn fill_forward_synthesizes_from_last_close_when_enabled() {
        let spy = Symbol::new("SPY", SecurityType::Equity, "NYSE");
        let qqq = Symbol::new("QQQ", SecurityType::Equity, "NASDAQ");
        let t0 = DateTime::from_timestamp(0, 0).unwrap();
        let t1 = DateTime::from_timestamp(60, 0).unwrap();
        let t2 = DateTime::from_timestamp(120, 0).unwrap();
        let t3 = DateTime::from_timestamp(180, 0).unwrap();

        // SPY has a real sample every minute; QQQ is fill-forward and skips t2.
        let spy_config = SubscriptionConfig::new(spy.clone(), Resolution::Minutes(1), chrono_tz::UTC);
        let spy_source = VecDataSource::new(spy_config, vec![bar(&spy, t0, t1, dec!(50)), bar(&spy, t1, t2, dec!(51)), bar(&spy, t2, t3, dec!(52))]);

        let qqq_config = SubscriptionConfig::new(qqq.clone(), Resolution::Minutes(1), chrono_tz::UTC).fill_forward(true);
        let qqq_source = VecDataSource::new(qqq_config, vec![bar(&qqq, t0, t1, dec!(100)), bar(&qqq, t2, t3, dec!(105))]);

        let mut merger = DataFeedMerger::new(vec![Box::new(spy_source), Box::new(qqq_source)]);

        let first = merger.next_slice().unwrap();
        assert_eq!(first.t, Some(t1));
        assert_eq!(first.bar(&qqq).unwrap().close, dec!(100));

        let second = merger.next_slice().unwrap();
        assert_eq!(second.t, Some(t2));
        // QQQ produced nothing real at t2; fill-forward clones its last close.
        assert_eq!(second.bar(&qqq).unwrap().close, dec!(100));
        assert_eq!(second.bar(&spy).unwrap().close, dec!(51));

        let third = merger.next_slice().unwrap();
        assert_eq!(third.t, Some(t3));
        assert_eq!(third.bar(&qqq).unwrap().close, dec!(105));
    }

    #[test]
    fn add_source_joins_the_merge_without_disturbing_existing_sources() {
        let spy = Symbol::new("SPY", SecurityType::Equity, "NYSE");
        let qqq = Symbol::new("QQQ", SecurityType::Equity, "NASDAQ");
        let t0 = DateTime::from_timestamp(0, 0).unwrap();
        let t1 = DateTime::from_timestamp(60, 0).unwrap();

        let spy_source = VecDataSource::new(SubscriptionConfig::new(spy.clone(), Resolution::Minutes(1), chrono_tz::UTC), vec![bar(&spy, t0, t1, dec!(100))]);
        let mut merger = DataFeedMerger::new(vec![Box::new(spy_source)]);

        let qqq_source = VecDataSource::new(SubscriptionConfig::new(qqq.clone(), Resolution::Minutes(1), chrono_tz::UTC), vec![bar(&qqq, t0, t1, dec!(200))]);
        merger.add_source(Box::new(qqq_source));

        let slice = merger.next_slice().unwrap();
        assert_eq!(slice.bars.len(), 2);
        assert!(slice.bar(&qqq).is_some());
    }

    #[test]
    fn deactivated_symbol_stops_producing_slices() {
        let spy = Symbol::new("SPY", SecurityType::Equity, "NYSE");
        let t0 = DateTime::from_timestamp(0, 0).unwrap();
        let t1 = DateTime::from_timestamp(60, 0).unwrap();
        let t2 = DateTime::from_timestamp(120, 0).unwrap();

        let spy_source = VecDataSource::new(
            SubscriptionConfig::new(spy.clone(), Resolution::Minutes(1), chrono_tz::UTC),
            vec![bar(&spy, t0, t1, dec!(100)), bar(&spy, t1, t2, dec!(101))],
        );
        let mut merger = DataFeedMerger::new(vec![Box::new(spy_source)]);
        merger.deactivate_symbol(&spy);

        assert!(merger.next_slice().is_none());
    }
}
