use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that refuse to let a run start at all (§7 ConfigError).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("start date {start} is not before end date {end}")]
    StartNotBeforeEnd { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error("no default market configured for security type {0}")]
    MissingMarketDefault(String),
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    #[error("unknown time zone: {0}")]
    UnknownTimeZone(String),
    #[error("the simulation clock may not move backwards: current={current} attempted={attempted}")]
    ClockRegression { current: DateTime<Utc>, attempted: DateTime<Utc> },
    #[error("symbol {0} is already registered with this run")]
    DuplicateSymbol(String),
}

/// Per-sample data errors (§7 DataError). Never fatal; logged and the sample dropped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("malformed record for {symbol}: {reason}")]
    MalformedRecord { symbol: String, reason: String },
    #[error("duplicate timestamp within subscription for {symbol} at {time}")]
    DuplicateTimestamp { symbol: String, time: DateTime<Utc> },
    #[error("non-increasing end_time within subscription for {symbol}: previous={previous} next={next}")]
    NonMonotonicEndTime {
        symbol: String,
        previous: DateTime<Utc>,
        next: DateTime<Utc>,
    },
}

/// Order submission / update / cancel rejection (§7 OrderRejection).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("symbol {0} is not tradable")]
    NotTradable(String),
    #[error("order quantity must be non-zero")]
    ZeroQuantity,
    #[error("limit price is required for this order type")]
    MissingLimitPrice,
    #[error("stop price is required for this order type")]
    MissingStopPrice,
    #[error("order {0} not found")]
    NotFound(String),
    #[error("order {0} is already in a terminal state")]
    AlreadyTerminal(String),
    #[error("brokerage rejected the order: {0}")]
    BrokerageRejected(String),
    #[error("insufficient margin to accept order")]
    InsufficientMargin,
    #[error("market-on-open/close orders only allow updating quantity and tag")]
    UnsupportedUpdateField,
}

/// Live-mode brokerage errors (§7 BrokerageError), categorized by severity.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerageError {
    #[error("information: {0}")]
    Information(String),
    #[error("warning: {0}")]
    Warning(String),
    #[error("runtime error: {0}")]
    RuntimeError(String),
    #[error("disconnected: {0}")]
    Disconnect(String),
}

impl BrokerageError {
    pub fn stops_algorithm(&self) -> bool {
        matches!(self, BrokerageError::RuntimeError(_))
    }

    pub fn pauses_submissions(&self) -> bool {
        matches!(self, BrokerageError::Disconnect(_))
    }
}
