//! Configuration types for talking to the conversion service.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via its
//! [`ClientConfigBuilder`]. The service base URL is the only value normally
//! taken from the environment (`PDF2XLSX_API_URL`); everything else has a
//! sensible default.

use crate::error::Pdf2XlsxError;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Environment variable holding the conversion service base URL.
pub const API_URL_ENV: &str = "PDF2XLSX_API_URL";

/// Base URL used when neither the builder nor the environment supplies one.
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Configuration for a conversion client.
///
/// # Example
/// ```rust
/// use edgequake_pdf2xlsx::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://convert.example.com")
///     .request_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.convert_url().unwrap().as_str(), "https://convert.example.com/api/convert");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Service base URL, e.g. `http://localhost:5000`.
    pub base_url: String,

    /// Multipart field name carrying the PDF. Default: `file`.
    pub field_name: String,

    /// Whole-request timeout in seconds. Default: 300.
    ///
    /// Table extraction on a long PDF can take minutes; the service reports no
    /// intermediate progress, so this is the only bound on a stuck episode.
    pub request_timeout_secs: u64,

    /// TCP connect timeout in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Cadence of the synthetic progress ticker in milliseconds. Default: 500.
    pub tick_interval_ms: u64,

    /// Highest percentage the ticker may report while the request is pending. Default: 90.
    pub progress_ceiling: f64,

    /// Upper (exclusive) bound of each random progress increment. Default: 10.
    pub max_increment: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            field_name: "file".to_string(),
            request_timeout_secs: 300,
            connect_timeout_secs: 10,
            tick_interval_ms: 500,
            progress_ceiling: 90.0,
            max_increment: 10.0,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default configuration with `base_url` taken from `PDF2XLSX_API_URL` when set.
    pub fn from_env() -> Result<Self, Pdf2XlsxError> {
        let mut builder = Self::builder();
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                builder = builder.base_url(url);
            }
        }
        builder.build()
    }

    /// `POST` target for conversions.
    pub fn convert_url(&self) -> Result<Url, Pdf2XlsxError> {
        self.endpoint("api/convert")
    }

    /// `GET` target for the health probe.
    pub fn health_url(&self) -> Result<Url, Pdf2XlsxError> {
        self.endpoint("health")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Check every constraint [`ClientConfigBuilder::build`] enforces.
    ///
    /// Needed for configs assembled field by field or deserialised.
    pub fn validate(&self) -> Result<(), Pdf2XlsxError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            Pdf2XlsxError::InvalidConfig(format!("base URL '{}' is not valid: {}", self.base_url, e))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Pdf2XlsxError::InvalidConfig(format!(
                "base URL must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.field_name.is_empty() {
            return Err(Pdf2XlsxError::InvalidConfig(
                "multipart field name must not be empty".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(Pdf2XlsxError::InvalidConfig(
                "tick interval must be ≥ 1 ms".into(),
            ));
        }
        if !self.has_valid_ceiling() {
            return Err(Pdf2XlsxError::InvalidConfig(format!(
                "progress ceiling must be strictly between 0 and 100, got {}",
                self.progress_ceiling
            )));
        }
        if !self.has_valid_increment() {
            return Err(Pdf2XlsxError::InvalidConfig(format!(
                "max increment must be positive, got {}",
                self.max_increment
            )));
        }
        Ok(())
    }

    /// Replace invalid progress settings with their defaults.
    ///
    /// Endpoints and timeouts are left alone; they fail loudly where used.
    pub fn with_valid_progress(mut self) -> Self {
        let defaults = Self::default();
        if self.tick_interval_ms == 0 {
            warn!("tick interval of 0 ms; using {} ms", defaults.tick_interval_ms);
            self.tick_interval_ms = defaults.tick_interval_ms;
        }
        if !self.has_valid_ceiling() {
            warn!(
                "progress ceiling {} out of range; using {}",
                self.progress_ceiling, defaults.progress_ceiling
            );
            self.progress_ceiling = defaults.progress_ceiling;
        }
        if !self.has_valid_increment() {
            warn!(
                "max increment {} is not positive; using {}",
                self.max_increment, defaults.max_increment
            );
            self.max_increment = defaults.max_increment;
        }
        self
    }

    fn has_valid_ceiling(&self) -> bool {
        self.progress_ceiling > 0.0 && self.progress_ceiling < 100.0
    }

    fn has_valid_increment(&self) -> bool {
        self.max_increment > 0.0 && self.max_increment.is_finite()
    }

    fn endpoint(&self, path: &str) -> Result<Url, Pdf2XlsxError> {
        // A trailing slash makes `join` append instead of replacing the last segment.
        let base = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        Url::parse(&base)
            .and_then(|u| u.join(path))
            .map_err(|e| {
                Pdf2XlsxError::InvalidConfig(format!("base URL '{}' is not valid: {}", self.base_url, e))
            })
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim().to_string();
        self
    }

    pub fn field_name(mut self, name: impl Into<String>) -> Self {
        self.config.field_name = name.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs.max(1);
        self
    }

    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.config.tick_interval_ms = ms;
        self
    }

    pub fn progress_ceiling(mut self, percent: f64) -> Self {
        self.config.progress_ceiling = percent;
        self
    }

    pub fn max_increment(mut self, percent: f64) -> Self {
        self.config.max_increment = percent;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, Pdf2XlsxError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
