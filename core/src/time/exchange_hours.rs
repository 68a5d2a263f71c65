use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};

/// A single weekday's trading session, open/close in exchange local time.
/// `None` on either side means the exchange does not trade that day.
/// Grounded on the teacher's `TradingHours`/`DaySession`.
#[derive(Debug, Clone, Copy)]
pub struct DaySession {
    pub open: Option<NaiveTime>,
    pub close: Option<NaiveTime>,
}

impl DaySession {
    pub fn closed() -> Self {
        DaySession { open: None, close: None }
    }

    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        DaySession { open: Some(open), close: Some(close) }
    }
}

/// Per-market, per-security-type calendar (§4.2). Holiday and early-close
/// tables are consulted before the weekly schedule.
#[derive(Debug, Clone)]
pub struct ExchangeHours {
    pub timezone: Tz,
    sessions: [DaySession; 7], // indexed by Weekday::num_days_from_sunday
    holidays: HashSet<NaiveDate>,
    early_closes: HashMap<NaiveDate, NaiveTime>,
}

impl ExchangeHours {
    pub fn new(timezone: Tz, sessions: [DaySession; 7]) -> Self {
        ExchangeHours { timezone, sessions, holidays: HashSet::new(), early_closes: HashMap::new() }
    }

    /// A continuous 24x5 calendar, Sunday 17:00 through Friday 17:00 local,
    /// the conventional forex/CFD week.
    pub fn forex_24x5(timezone: Tz) -> Self {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap();
        let open_5pm = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        let mut sessions = [DaySession::closed(); 7];
        sessions[Weekday::Sun.num_days_from_sunday() as usize] = DaySession::new(open_5pm, end_of_day);
        for d in [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu] {
            sessions[d.num_days_from_sunday() as usize] = DaySession::new(midnight, end_of_day);
        }
        sessions[Weekday::Fri.num_days_from_sunday() as usize] = DaySession::new(midnight, open_5pm);
        ExchangeHours::new(timezone, sessions)
    }

    pub fn with_holiday(mut self, date: NaiveDate) -> Self {
        self.holidays.insert(date);
        self
    }

    pub fn with_early_close(mut self, date: NaiveDate, close: NaiveTime) -> Self {
        self.early_closes.insert(date, close);
        self
    }

    fn session_for(&self, date: NaiveDate) -> DaySession {
        if self.holidays.contains(&date) {
            return DaySession::closed();
        }
        let mut session = self.sessions[date.weekday().num_days_from_sunday() as usize];
        if let Some(early_close) = self.early_closes.get(&date) {
            session.close = Some(*early_close);
        }
        session
    }

    /// Is the exchange open at local instant `t`? `extended` widens the
    /// window to the full calendar day when the regular session is closed,
    /// approximating pre/post-market trading for security types that allow it.
    pub fn is_open(&self, t: DateTime<Tz>, extended: bool) -> bool {
        let date = t.date_naive();
        let session = self.session_for(date);
        match (session.open, session.close) {
            (Some(open), Some(close)) => {
                let time = t.time();
                if open <= close {
                    time >= open && time < close
                } else {
                    // session crosses midnight (not used by forex_24x5 but kept general)
                    time >= open || time < close
                }
            }
            _ => extended && !self.holidays.contains(&date),
        }
    }

    /// Next session open strictly after `t`.
    pub fn next_open(&self, t: DateTime<Tz>) -> DateTime<Tz> {
        let mut cursor = t;
        for _ in 0..14 {
            let date = cursor.date_naive();
            let session = self.session_for(date);
            if let Some(open) = session.open {
                let candidate = date.and_time(open).and_local_timezone(self.timezone).single();
                if let Some(candidate) = candidate {
                    if candidate > t {
                        return candidate;
                    }
                }
            }
            cursor = (date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap().and_local_timezone(self.timezone).single().unwrap();
        }
        cursor
    }

    /// Next session close strictly after `t`.
    pub fn next_close(&self, t: DateTime<Tz>) -> DateTime<Tz> {
        let mut cursor = t;
        for _ in 0..14 {
            let date = cursor.date_naive();
            let session = self.session_for(date);
            if let Some(close) = session.close {
                let candidate = date.and_time(close).and_local_timezone(self.timezone).single();
                if let Some(candidate) = candidate {
                    if candidate > t {
                        return candidate;
                    }
                }
            }
            cursor = (date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap().and_local_timezone(self.timezone).single().unwrap();
        }
        cursor
    }

    /// Rounds `t` down to the start of its `period`-aligned bucket within the
    /// session, epoch-anchored (matches the consolidator's bar-boundary rule).
    pub fn round_down_to_session(&self, t: DateTime<Tz>, period: Duration) -> DateTime<Tz> {
        if period.is_zero() {
            return t;
        }
        let period_secs = period.num_seconds().max(1);
        let epoch_secs = t.timestamp();
        let floored = epoch_secs - epoch_secs.rem_euclid(period_secs);
        t.timezone().timestamp_opt(floored, 0).single().unwrap_or(t)
    }
}
