pub mod base_data;
pub mod resolution;
pub mod rolling_window;
pub mod slice;
pub mod subscription;

pub use base_data::BaseData;
pub use resolution::Resolution;
pub use rolling_window::RollingWindow;
pub use slice::Slice;
pub use subscription::{CandleType, SubscriptionConfig};
