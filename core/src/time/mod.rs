pub mod clock;
pub mod exchange_hours;

pub use clock::Clock;
pub use exchange_hours::{DaySession, ExchangeHours};
