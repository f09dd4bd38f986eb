//! Bounded in-memory packet cache with windowed query service.
//!
//! A capped per-channel collection of data packets fed by a broadcast
//! subscriber and served by a router endpoint; interpolated queries are
//! healed across gaps by the Wiggins weighted-average-slopes spline.

mod capped_collection;
mod circular_buffer;
mod messages;
mod service;
mod wiggins;

pub use capped_collection::CappedCollection;
pub use messages::{
    BulkDataRequest, BulkDataResponse, DataRequest, DataResponse, InterpolatedRequest,
    InterpolatedResponse, ReturnCode, SensorRequest, SensorResponse,
};
pub use service::{PacketCacheService, PacketCacheServiceOptions};
pub use wiggins::{WigginsInterpolator, DEFAULT_GAP_TOLERANCE_MICROS};
