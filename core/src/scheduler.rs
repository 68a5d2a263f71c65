use crate::symbol::Symbol;
use crate::time::exchange_hours::ExchangeHours;
use chrono::{DateTime, Datelike, Duration, Utc};
use std::collections::HashMap;

/// Which days a scheduled event is eligible to fire on (§4.9).
pub enum DateRule {
    EveryDay,
    /// Trading days of `symbol`'s calendar only.
    EveryTradingDay(Symbol),
    On(chrono::NaiveDate),
    /// First trading day of each month, optionally gated by a symbol's calendar.
    MonthStart(Option<Symbol>),
}

/// What time of day, within an eligible date, an event fires (§4.9).
pub enum TimeRule {
    At { hour: u32, minute: u32 },
    Every(Duration),
    AfterMarketOpen { symbol: Symbol, offset_minutes: i64 },
    BeforeMarketClose { symbol: Symbol, offset_minutes: i64 },
}

pub type ScheduledAction = Box<dyn FnMut(DateTime<Utc>) + Send>;

struct ScheduledEvent {
    date_rule: DateRule,
    time_rule: TimeRule,
    action: ScheduledAction,
    next_trigger: DateTime<Utc>,
    registration_order: u64,
}

/// Fires `(DateRule, TimeRule, action)` events synchronized with the clock
/// (§4.9). Grounded on the teacher's `TimedEventHandler`, a registered-event
/// table drained against the advancing clock; the `DateRule`×`TimeRule`
/// cross product is an original addition since the teacher's handler only
/// supports an absolute-time firing list.
pub struct Scheduler {
    events: Vec<ScheduledEvent>,
    next_registration_order: u64,
    exchange_hours: HashMap<Symbol, ExchangeHours>,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler { events: Vec::new(), next_registration_order: 0, exchange_hours: HashMap::new() }
    }

    pub fn register_exchange_hours(&mut self, symbol: Symbol, hours: ExchangeHours) {
        self.exchange_hours.insert(symbol, hours);
    }

    /// Registers `(date_rule, time_rule, action)`, computing its first
    /// `next_trigger` no earlier than `from`.
    pub fn on(&mut self, date_rule: DateRule, time_rule: TimeRule, action: ScheduledAction, from: DateTime<Utc>) {
        let order = self.next_registration_order;
        self.next_registration_order += 1;
        let next_trigger = Self::compute_next_trigger(&date_rule, &time_rule, from, &self.exchange_hours);
        self.events.push(ScheduledEvent { date_rule, time_rule, action, next_trigger, registration_order: order });
    }

    fn satisfies_date_rule(date_rule: &DateRule, date: chrono::NaiveDate, exchange_hours: &HashMap<Symbol, ExchangeHours>) -> bool {
        match date_rule {
            DateRule::EveryDay => true,
            DateRule::EveryTradingDay(symbol) => match exchange_hours.get(symbol) {
                Some(hours) => {
                    let local = date.and_hms_opt(12, 0, 0).unwrap().and_local_timezone(hours.timezone).single();
                    local.map(|t| hours.is_open(t, false)).unwrap_or(false)
                }
                None => true,
            },
            DateRule::On(target) => date == *target,
            DateRule::MonthStart(symbol) => {
                if date.day() != 1 {
                    return false;
                }
                match symbol {
                    Some(symbol) => Self::satisfies_date_rule(&DateRule::EveryTradingDay(symbol.clone()), date, exchange_hours),
                    None => true,
                }
            }
        }
    }

    fn time_of_day(time_rule: &TimeRule, date: chrono::NaiveDate, exchange_hours: &HashMap<Symbol, ExchangeHours>) -> Option<DateTime<Utc>> {
        match time_rule {
            TimeRule::At { hour, minute } => {
                Some(date.and_hms_opt(*hour, *minute, 0).unwrap().and_local_timezone(Utc).single().unwrap())
            }
            TimeRule::Every(_) => None,
            TimeRule::AfterMarketOpen { symbol, offset_minutes } => {
                let hours = exchange_hours.get(symbol)?;
                let local_midnight = date.and_hms_opt(0, 0, 0).unwrap().and_local_timezone(hours.timezone).single()?;
                let open = hours.next_open(local_midnight - Duration::seconds(1));
                if open.date_naive() != date {
                    return None;
                }
                Some((open + Duration::minutes(*offset_minutes)).with_timezone(&Utc))
            }
            TimeRule::BeforeMarketClose { symbol, offset_minutes } => {
                let hours = exchange_hours.get(symbol)?;
                let local_midnight = date.and_hms_opt(0, 0, 0).unwrap().and_local_timezone(hours.timezone).single()?;
                let close = hours.next_close(local_midnight - Duration::seconds(1));
                if close.date_naive() != date {
                    return None;
                }
                Some((close - Duration::minutes(*offset_minutes)).with_timezone(&Utc))
            }
        }
    }

    fn compute_next_trigger(
        date_rule: &DateRule,
        time_rule: &TimeRule,
        from: DateTime<Utc>,
        exchange_hours: &HashMap<Symbol, ExchangeHours>,
    ) -> DateTime<Utc> {
        if let TimeRule::Every(period) = time_rule {
            return from + *period;
        }

        let mut date = from.date_naive();
        for _ in 0..400 {
            if Self::satisfies_date_rule(date_rule, date, exchange_hours) {
                if let Some(candidate) = Self::time_of_day(time_rule, date, exchange_hours) {
                    if candidate > from {
                        return candidate;
                    }
                }
            }
            date += Duration::days(1);
        }
        from + Duration::days(400)
    }

    /// Fires every event whose `next_trigger <= clock`, in ascending
    /// `(next_trigger, registration_order)` order (§4.9, open question (a)),
    /// recomputing each fired event's `next_trigger` afterward.
    pub fn fire_due(&mut self, clock: DateTime<Utc>) {
        loop {
            let due_idx = self
                .events
                .iter()
                .enumerate()
                .filter(|(_, e)| e.next_trigger <= clock)
                .min_by_key(|(_, e)| (e.next_trigger, e.registration_order))
                .map(|(idx, _)| idx);

            let Some(idx) = due_idx else { break };
            let fire_time = self.events[idx].next_trigger;
            (self.events[idx].action)(fire_time);
            let next = Self::compute_next_trigger(&self.events[idx].date_rule, &self.events[idx].time_rule, fire_time, &self.exchange_hours);
            self.events[idx].next_trigger = next;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SecurityType;
    use std::sync::{Arc, Mutex};

    fn t(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn at_fires_once_per_day_at_the_configured_time() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = fired.clone();
        let mut scheduler = Scheduler::new();
        scheduler.on(
            DateRule::EveryDay,
            TimeRule::At { hour: 9, minute: 30 },
            Box::new(move |t| fired_clone.lock().unwrap().push(t)),
            t("2024-01-01T00:00:00Z"),
        );

        scheduler.fire_due(t("2024-01-01T09:00:00Z"));
        assert!(fired.lock().unwrap().is_empty());

        scheduler.fire_due(t("2024-01-01T09:30:00Z"));
        assert_eq!(fired.lock().unwrap().len(), 1);

        scheduler.fire_due(t("2024-01-01T09:30:00Z"));
        assert_eq!(fired.lock().unwrap().len(), 1, "must not refire at the same instant");

        scheduler.fire_due(t("2024-01-02T09:30:00Z"));
        assert_eq!(fired.lock().unwrap().len(), 2);
    }

    #[test]
    fn ties_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for name in ["first", "second"] {
            let order_clone = order.clone();
            scheduler.on(
                DateRule::On(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
                TimeRule::At { hour: 0, minute: 0 },
                Box::new(move |_t| order_clone.lock().unwrap().push(name)),
                t("2023-12-31T00:00:00Z"),
            );
        }
        scheduler.fire_due(t("2024-01-01T00:00:00Z"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn every_reschedules_relative_to_its_own_last_firing() {
        let fired = Arc::new(Mutex::new(0));
        let fired_clone = fired.clone();
        let mut scheduler = Scheduler::new();
        scheduler.on(
            DateRule::EveryDay,
            TimeRule::Every(Duration::minutes(5)),
            Box::new(move |_t| *fired_clone.lock().unwrap() += 1),
            t("2024-01-01T00:00:00Z"),
        );
        scheduler.fire_due(t("2024-01-01T00:05:00Z"));
        assert_eq!(*fired.lock().unwrap(), 1);
        scheduler.fire_due(t("2024-01-01T00:06:00Z"));
        assert_eq!(*fired.lock().unwrap(), 1, "next trigger is 5 minutes after the last firing, not from registration");
        scheduler.fire_due(t("2024-01-01T00:10:00Z"));
        assert_eq!(*fired.lock().unwrap(), 2);
    }

    #[test]
    fn month_start_only_fires_on_the_first_of_the_month() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = fired.clone();
        let mut scheduler = Scheduler::new();
        scheduler.on(
            DateRule::MonthStart(None),
            TimeRule::At { hour: 0, minute: 0 },
            Box::new(move |t| fired_clone.lock().unwrap().push(t)),
            t("2024-01-01T00:00:00Z"),
        );
        scheduler.fire_due(t("2024-01-15T00:00:00Z"));
        assert_eq!(fired.lock().unwrap().len(), 1);
        scheduler.fire_due(t("2024-02-01T00:00:00Z"));
        assert_eq!(fired.lock().unwrap().len(), 2);
    }

    #[test]
    fn after_market_open_uses_the_symbols_exchange_calendar() {
        let symbol = Symbol::new("SPY", SecurityType::Equity, "NYSE");
        let mut scheduler = Scheduler::new();
        let open = chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        let close = chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap();
        let mut sessions = [crate::time::exchange_hours::DaySession::closed(); 7];
        for d in [chrono::Weekday::Mon, chrono::Weekday::Tue, chrono::Weekday::Wed, chrono::Weekday::Thu, chrono::Weekday::Fri] {
            sessions[d.num_days_from_sunday() as usize] = crate::time::exchange_hours::DaySession::new(open, close);
        }
        scheduler.register_exchange_hours(symbol.clone(), ExchangeHours::new(chrono_tz::America::New_York, sessions));

        let fired = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = fired.clone();
        scheduler.on(
            DateRule::EveryTradingDay(symbol.clone()),
            TimeRule::AfterMarketOpen { symbol, offset_minutes: 5 },
            Box::new(move |t| fired_clone.lock().unwrap().push(t)),
            t("2024-01-02T00:00:00Z"), // a Tuesday
        );
        scheduler.fire_due(t("2024-01-02T14:36:00Z")); // 9:35 + 1 minute buffer in NY = 14:36 UTC (EST, UTC-5)
        assert_eq!(fired.lock().unwrap().len(), 1);
    }
}
