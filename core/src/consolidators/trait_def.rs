use crate::data::base_data::BaseData;
use crate::data::rolling_window::RollingWindow;
use crate::data::subscription::SubscriptionConfig;
use crate::error::DataError;
use chrono::{DateTime, Utc};

/// Stateful aggregator producing coarser bars from a finer, time-ordered
/// stream of [`BaseData`] (§4.3). Implementations emit a bar exactly once
/// the boundary rule for that implementation is crossed, and never emit a
/// bar built from zero contributing samples.
pub trait Consolidator {
    fn subscription(&self) -> &SubscriptionConfig;

    /// Feeds one sample. Returns zero or more newly completed bars (more
    /// than one is possible if a gap spans multiple boundaries and the
    /// implementation back-fills — time-based consolidators never do this;
    /// it is kept in the contract for tick/value-based variants that may).
    fn update(&mut self, data: &BaseData) -> Result<Vec<BaseData>, DataError>;

    /// Advances the consolidator's notion of "now" without a new sample,
    /// used by the merger to flush a partially-built bar once its
    /// `end_time` boundary has been crossed by the clock alone.
    fn update_time(&mut self, _time: DateTime<Utc>) -> Vec<BaseData> {
        Vec::new()
    }

    fn history(&self) -> &RollingWindow<BaseData>;

    fn current(&self) -> Option<&BaseData>;

    fn clear(&mut self);
}
