pub mod merger;
pub mod source;

pub use merger::DataFeedMerger;
pub use source::{MarketDataSource, VecDataSource};
