//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for the server, sessions, rate limiting, paging and CORS.
//! Every section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub feed: FeedConfig,
    pub cors: CorsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// This is intentionally string-based so the caller can read the file
    /// however it sees fit.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.auth.session_timeout_hours == 0 {
            warnings.push("auth.session_timeout_hours is 0; sessions expire immediately".into());
        }

        if self.auth.min_password_length < 6 {
            warnings.push(format!(
                "auth.min_password_length {} is weak; 8 or more is recommended",
                self.auth.min_password_length
            ));
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            warnings.push(format!(
                "auth.bcrypt_cost {} is outside bcrypt's valid range 4..=31",
                self.auth.bcrypt_cost
            ));
        }

        if self.rate_limit.auth_requests_per_minute == 0 {
            warnings.push("rate_limit.auth_requests_per_minute is 0; using 30".into());
        }

        if self.feed.default_page_size > self.feed.max_page_size {
            warnings.push(format!(
                "feed.default_page_size {} exceeds feed.max_page_size {}",
                self.feed.default_page_size, self.feed.max_page_size
            ));
        }

        if self.cors.allowed_origins.iter().any(|o| o == "*") {
            warnings.push(
                "cors.allowed_origins contains '*'; credentialed requests need explicit origins"
                    .into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: PathBuf::from("./data/agora.db"),
        }
    }
}

/// Session and password settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_timeout_hours: u64,
    pub cookie_name: String,
    pub cookie_secure: bool,
    pub min_password_length: usize,
    pub bcrypt_cost: u32,
    pub sweep_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_timeout_hours: 24,
            cookie_name: "agora_session".into(),
            cookie_secure: false,
            min_password_length: 8,
            bcrypt_cost: 12,
            sweep_interval_secs: 600,
        }
    }
}

/// Request throttling for the unauthenticated auth endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub auth_requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_requests_per_minute: 30,
        }
    }
}

/// Paging defaults for list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl FeedConfig {
    /// Resolve a requested page size against the configured default and cap.
    pub fn page_size(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(n) if n > 0 => n.min(self.max_page_size),
            _ => self.default_page_size,
        }
    }
}

/// Cross-origin settings for the browser frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".into()],
        }
    }
}
