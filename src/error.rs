//! Error types and handling for the directions library

use serde::Serialize;
use thiserror::Error;

/// Why the visitor's position could not be determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeolocationFailure {
    /// The visitor refused location access
    PermissionDenied,
    /// Neither the device nor the IP fallback produced a position
    Unavailable,
}

/// Main error type for the directions library
#[derive(Error, Debug)]
pub enum DirectionsError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Upstream service communication errors (directions proxy, Overpass, geocoders)
    #[error("API error: {message}")]
    Api { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Location acquisition gave up
    #[error("Geolocation error: {kind:?}")]
    Geolocation { kind: GeolocationFailure },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl DirectionsError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new geolocation error
    pub fn geolocation(kind: GeolocationFailure) -> Self {
        Self::Geolocation { kind }
    }

    /// Short message suitable for the inline advisory shown next to the map
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            DirectionsError::Config { .. } => {
                "Configuration error. Please check your config file and service URLs.".to_string()
            }
            DirectionsError::Api { .. } => {
                "Unable to reach the directions services. Showing estimates only.".to_string()
            }
            DirectionsError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            DirectionsError::Geolocation {
                kind: GeolocationFailure::PermissionDenied,
            } => "Location permission denied. Allow location access or search for a place."
                .to_string(),
            DirectionsError::Geolocation {
                kind: GeolocationFailure::Unavailable,
            } => "Could not determine your location.".to_string(),
            DirectionsError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for DirectionsError {
    fn from(err: reqwest::Error) -> Self {
        Self::api(err.to_string())
    }
}

impl From<reqwest_middleware::Error> for DirectionsError {
    fn from(err: reqwest_middleware::Error) -> Self {
        Self::api(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = DirectionsError::config("missing base url");
        assert!(matches!(config_err, DirectionsError::Config { .. }));

        let api_err = DirectionsError::api("connection failed");
        assert!(matches!(api_err, DirectionsError::Api { .. }));

        let validation_err = DirectionsError::validation("invalid coordinates");
        assert!(matches!(validation_err, DirectionsError::Validation { .. }));
    }

    #[test]
    fn test_geolocation_messages_are_distinct() {
        let denied = DirectionsError::geolocation(GeolocationFailure::PermissionDenied);
        let unavailable = DirectionsError::geolocation(GeolocationFailure::Unavailable);

        assert!(denied.user_message().contains("permission denied"));
        assert_eq!(
            unavailable.user_message(),
            "Could not determine your location."
        );
    }

    #[test]
    fn test_user_messages() {
        let api_err = DirectionsError::api("test");
        assert!(api_err.user_message().contains("estimates only"));

        let validation_err = DirectionsError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DirectionsError = io_err.into();
        assert!(matches!(err, DirectionsError::Io { .. }));
    }
}
