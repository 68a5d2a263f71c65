pub mod brokerage_model;
pub mod fill_model;
pub mod order;
pub mod transaction_manager;

pub use brokerage_model::{BrokerageModel, DefaultBrokerageModel};
pub use fill_model::{FillContext, FillModel, FillResult, FullFillPolicy, PartialFillPolicy};
pub use order::{Order, OrderEvent, OrderId, OrderStatus, OrderType, OrderUpdateRequest};
pub use transaction_manager::{OrderTicket, SessionContext, TransactionManager};
