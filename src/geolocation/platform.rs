//! Device positioning abstraction
//!
//! Mirrors the browser/mobile geolocation contract: a one-shot position
//! request, a continuous watch identified by a [`WatchId`], and an explicit
//! `clear_watch` to release the subscription.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::models::{GeoPoint, LocationSource, UserLocation};

pub type PositionResult<T> = std::result::Result<T, PositionError>;

/// Options passed with every position request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Option<Duration>,
    /// Oldest cached position the platform may return
    pub maximum_age: Duration,
}

/// A platform position report
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy,
            timestamp: Utc::now(),
        }
    }

    /// Convert to a [`UserLocation`], rejecting coordinates outside the valid range
    pub fn to_user_location(&self, source: LocationSource) -> PositionResult<UserLocation> {
        let point = GeoPoint::new(self.latitude, self.longitude).map_err(|e| {
            PositionError::new(PositionErrorCode::PositionUnavailable, e.to_string())
        })?;
        let mut location = UserLocation::new(point, source).with_accuracy(Some(self.accuracy));
        location.acquired_at = self.timestamp;
        Ok(location)
    }
}

/// Platform error codes, numbered as the web geolocation API numbers them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionErrorCode {
    PermissionDenied = 1,
    PositionUnavailable = 2,
    Timeout = 3,
}

impl PositionErrorCode {
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => PositionErrorCode::PermissionDenied,
            3 => PositionErrorCode::Timeout,
            _ => PositionErrorCode::PositionUnavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionError {
    pub code: PositionErrorCode,
    pub message: String,
}

impl PositionError {
    pub fn new<S: Into<String>>(code: PositionErrorCode, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout() -> Self {
        Self::new(PositionErrorCode::Timeout, "position request timed out")
    }

    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.code == PositionErrorCode::PermissionDenied
    }
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({}): {}", self.code, self.code as u8, self.message)
    }
}

impl std::error::Error for PositionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u32);

/// An active position subscription. Must be released with [`PositionSource::clear_watch`].
#[derive(Debug)]
pub struct PositionWatch {
    pub id: WatchId,
    pub updates: mpsc::Receiver<PositionResult<Position>>,
}

/// Device positioning capability
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Whether the platform can position at all
    fn is_available(&self) -> bool {
        true
    }

    async fn current_position(&self, options: PositionOptions) -> PositionResult<Position>;

    async fn watch_position(&self, options: PositionOptions) -> PositionResult<PositionWatch>;

    fn clear_watch(&self, id: WatchId);
}
