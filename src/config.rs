//! Configuration management for the directions service
//!
//! Handles loading configuration from files, environment variables,
//! and provides validation for all configuration settings.

use crate::DirectionsError;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectionsConfig {
    /// Upstream service endpoints
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    /// Location acquisition tuning
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    /// Nearest airport lookup
    #[serde(default)]
    pub airports: AirportsConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

/// Upstream endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Base URL of the web app hosting `/api/directions`, `/api/geolocate` and `/api/monastery-geocode`
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
    /// Overpass interpreter endpoint
    #[serde(default = "default_overpass_url")]
    pub overpass_url: String,
    /// Nominatim base URL for place search
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Retries for POI and geocoding lookups. Directions are never retried.
    #[serde(default = "default_lookup_retries")]
    pub lookup_retries: u32,
}

/// Location acquisition tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    /// Timeout of the quick, low accuracy fix
    #[serde(default = "default_quick_timeout_ms")]
    pub quick_timeout_ms: u64,
    /// Maximum age of a cached position accepted for the quick fix
    #[serde(default = "default_quick_max_age_ms")]
    pub quick_max_age_ms: u64,
    /// Refinement stops once accuracy is at or below this radius
    #[serde(default = "default_target_accuracy")]
    pub target_accuracy_meters: f64,
    /// Minimum improvement before a watch update replaces the current fix
    #[serde(default = "default_accuracy_margin")]
    pub accuracy_margin_meters: f64,
    /// Refinement window
    #[serde(default = "default_refine_window_ms")]
    pub refine_window_ms: u64,
    /// Hard stop for the whole refinement phase
    #[serde(default = "default_refine_hard_timeout_ms")]
    pub refine_hard_timeout_ms: u64,
}

/// Nearest airport lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirportsConfig {
    /// Search radius around the destination
    #[serde(default = "default_airport_radius")]
    pub search_radius_km: u32,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty or json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

// Default value functions
fn default_app_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_overpass_url() -> String {
    "https://overpass-api.de/api/interpreter".to_string()
}

fn default_nominatim_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_timeout() -> u32 {
    15
}

fn default_lookup_retries() -> u32 {
    2
}

fn default_quick_timeout_ms() -> u64 {
    3_000
}

fn default_quick_max_age_ms() -> u64 {
    30_000
}

fn default_target_accuracy() -> f64 {
    25.0
}

fn default_accuracy_margin() -> f64 {
    5.0
}

fn default_refine_window_ms() -> u64 {
    8_000
}

fn default_refine_hard_timeout_ms() -> u64 {
    9_000
}

fn default_airport_radius() -> u32 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            app_base_url: default_app_base_url(),
            overpass_url: default_overpass_url(),
            nominatim_url: default_nominatim_url(),
            timeout_seconds: default_timeout(),
            lookup_retries: default_lookup_retries(),
        }
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            quick_timeout_ms: default_quick_timeout_ms(),
            quick_max_age_ms: default_quick_max_age_ms(),
            target_accuracy_meters: default_target_accuracy(),
            accuracy_margin_meters: default_accuracy_margin(),
            refine_window_ms: default_refine_window_ms(),
            refine_hard_timeout_ms: default_refine_hard_timeout_ms(),
        }
    }
}

impl Default for AirportsConfig {
    fn default() -> Self {
        Self {
            search_radius_km: default_airport_radius(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointsConfig::default(),
            geolocation: GeolocationConfig::default(),
            airports: AirportsConfig::default(),
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl EndpointsConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.timeout_seconds))
    }
}

impl GeolocationConfig {
    #[must_use]
    pub fn quick_timeout(&self) -> Duration {
        Duration::from_millis(self.quick_timeout_ms)
    }

    #[must_use]
    pub fn quick_max_age(&self) -> Duration {
        Duration::from_millis(self.quick_max_age_ms)
    }

    #[must_use]
    pub fn refine_window(&self) -> Duration {
        Duration::from_millis(self.refine_window_ms)
    }

    #[must_use]
    pub fn refine_hard_timeout(&self) -> Duration {
        Duration::from_millis(self.refine_hard_timeout_ms)
    }
}

impl DirectionsConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("config.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // MONASTERY_ENDPOINTS__APP_BASE_URL overrides endpoints.app_base_url
        builder = builder.add_source(
            Environment::with_prefix("MONASTERY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .with_context(|| "Failed to build configuration")?;

        let mut config: DirectionsConfig = settings
            .try_deserialize()
            .with_context(|| "Failed to deserialize configuration")?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("monastery-directions").join("config.toml"))
    }

    /// Apply default values to missing configuration fields
    pub fn apply_defaults(&mut self) {
        if self.endpoints.app_base_url.is_empty() {
            self.endpoints.app_base_url = default_app_base_url();
        }
        if self.endpoints.overpass_url.is_empty() {
            self.endpoints.overpass_url = default_overpass_url();
        }
        if self.endpoints.nominatim_url.is_empty() {
            self.endpoints.nominatim_url = default_nominatim_url();
        }
        if self.endpoints.timeout_seconds == 0 {
            self.endpoints.timeout_seconds = default_timeout();
        }
        if self.geolocation.quick_timeout_ms == 0 {
            self.geolocation.quick_timeout_ms = default_quick_timeout_ms();
        }
        if self.geolocation.refine_window_ms == 0 {
            self.geolocation.refine_window_ms = default_refine_window_ms();
        }
        if self.geolocation.refine_hard_timeout_ms == 0 {
            self.geolocation.refine_hard_timeout_ms = default_refine_hard_timeout_ms();
        }
        if self.airports.search_radius_km == 0 {
            self.airports.search_radius_km = default_airport_radius();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        self.endpoints.app_base_url = self.endpoints.app_base_url.trim_end_matches('/').to_string();
        self.endpoints.nominatim_url = self.endpoints.nominatim_url.trim_end_matches('/').to_string();
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<()> {
        self.validate_urls()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    fn validate_urls(&self) -> Result<()> {
        let urls = [
            ("endpoints.app_base_url", &self.endpoints.app_base_url),
            ("endpoints.overpass_url", &self.endpoints.overpass_url),
            ("endpoints.nominatim_url", &self.endpoints.nominatim_url),
        ];
        for (name, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(DirectionsError::config(format!(
                    "{name} must be a valid HTTP or HTTPS URL"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Validate numeric configuration ranges
    fn validate_numeric_ranges(&self) -> Result<()> {
        if self.endpoints.timeout_seconds > 120 {
            return Err(DirectionsError::config("Request timeout cannot exceed 120 seconds").into());
        }

        if self.endpoints.lookup_retries > 5 {
            return Err(DirectionsError::config("Lookup retries cannot exceed 5").into());
        }

        let geo = &self.geolocation;
        if !(geo.target_accuracy_meters.is_finite() && geo.target_accuracy_meters > 0.0) {
            return Err(DirectionsError::config("Target accuracy must be a positive number").into());
        }

        if !(geo.accuracy_margin_meters.is_finite() && geo.accuracy_margin_meters >= 0.0) {
            return Err(DirectionsError::config("Accuracy margin cannot be negative").into());
        }

        if geo.refine_hard_timeout_ms < geo.refine_window_ms {
            return Err(DirectionsError::config(
                "Refinement hard timeout cannot be shorter than the refinement window",
            )
            .into());
        }

        if self.airports.search_radius_km > 1000 {
            return Err(DirectionsError::config("Airport search radius cannot exceed 1000 km").into());
        }

        Ok(())
    }

    /// Validate string configuration values
    fn validate_string_values(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(DirectionsError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            ))
            .into());
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(DirectionsError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}
