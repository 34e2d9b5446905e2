//! Visitor location acquisition
//!
//! - Platform: device positioning contract (one-shot fix, watch, clear)
//! - Refinement: the monotonic accuracy rule
//! - Acquirer: quick fix, refinement and IP fallback state machine
//! - IP: server-side fallback client

pub mod acquirer;
pub mod ip;
pub mod platform;
pub mod refinement;

pub use acquirer::{AcquisitionSnapshot, AcquisitionState, GeolocationAcquirer};
pub use ip::{HttpIpLocator, IpLocator};
pub use platform::{
    Position, PositionError, PositionErrorCode, PositionOptions, PositionResult, PositionSource,
    PositionWatch, WatchId,
};
pub use refinement::{Refinement, RefinementTracker};
