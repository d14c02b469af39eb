//! Site configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ATELIER_BASE_URL` - Public origin of the site (pages are cached from here)
//! - `CMS_ENDPOINT` - GraphQL endpoint of the headless CMS
//! - `ASSET_CDN_HOST` - Host of the CMS asset CDN (the only host the proxy serves)
//!
//! ## Optional
//! - `ATELIER_DATABASE_URL` - sqlite database for caches and records (default: sqlite://atelier.db)
//! - `ATELIER_HOST` - Bind address (default: 127.0.0.1)
//! - `ATELIER_PORT` - Listen port (default: 3000)
//! - `CMS_TOKEN` - Bearer token for the CMS content API
//! - `OFFLINE_CACHE_VERSION` - Suffix of the named caches (default: v1)
//! - `OFFLINE_PRECACHE` - Comma-separated shell URLs cached at install (default: /,/offline)
//! - `OFFLINE_SKIP_WAITING` - Activate a new cache worker immediately (default: true)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error event sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance trace sample rate (default: 0.1)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Site application configuration.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// sqlite connection URL for the offline cache store
    pub database_url: String,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public origin of the site
    pub base_url: Url,
    /// Headless CMS configuration
    pub cms: CmsConfig,
    /// Offline cache configuration
    pub offline: OfflineConfig,
    /// Sentry error tracking configuration
    pub sentry: SentryConfig,
}

/// Headless CMS API configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct CmsConfig {
    /// GraphQL content API endpoint
    pub endpoint: String,
    /// Bearer token for the content API (public CMS stages need none)
    pub token: Option<SecretString>,
}

impl std::fmt::Debug for CmsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Offline cache configuration.
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// Host of the asset CDN whose files are routed through the proxy
    pub cdn_host: String,
    /// Version suffix of the named caches; bumping it prunes old caches
    pub cache_version: String,
    /// Shell URLs cached when the worker installs
    pub precache: Vec<String>,
    /// Activate a freshly installed worker without waiting
    pub skip_waiting: bool,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            cdn_host: String::new(),
            cache_version: "v1".to_string(),
            precache: vec!["/".to_string(), "/offline".to_string()],
            skip_waiting: true,
        }
    }
}

/// Sentry error tracking configuration.
#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.1,
        }
    }
}

impl SiteConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the CMS token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_env_or_default("ATELIER_DATABASE_URL", "sqlite://atelier.db");
        let host = parse_env("ATELIER_HOST", "127.0.0.1")?;
        let port = parse_env("ATELIER_PORT", "3000")?;
        let base_url = get_required_env("ATELIER_BASE_URL")?;
        let base_url = Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("ATELIER_BASE_URL".to_string(), e.to_string()))?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            cms: CmsConfig::from_env()?,
            offline: OfflineConfig::from_env()?,
            sentry: SentryConfig::from_env()?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CmsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let token = match get_optional_env("CMS_TOKEN") {
            Some(value) => {
                validate_secret_strength(&value, "CMS_TOKEN")?;
                Some(SecretString::from(value))
            }
            None => None,
        };

        Ok(Self {
            endpoint: get_required_env("CMS_ENDPOINT")?,
            token,
        })
    }
}

impl OfflineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let precache = get_optional_env("OFFLINE_PRECACHE").map_or(defaults.precache, |value| {
            parse_list(&value)
        });

        Ok(Self {
            cdn_host: get_required_env("ASSET_CDN_HOST")?,
            cache_version: get_env_or_default("OFFLINE_CACHE_VERSION", &defaults.cache_version),
            precache,
            skip_waiting: parse_env("OFFLINE_SKIP_WAITING", "true")?,
        })
    }
}

impl SentryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dsn: get_optional_env("SENTRY_DSN"),
            environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Split a comma-separated list, dropping empty items.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_edges() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength() {
        assert!(matches!(
            validate_secret_strength("your-cms-token", "CMS_TOKEN"),
            Err(ConfigError::InsecureSecret(_, _))
        ));
        assert!(validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "CMS_TOKEN").is_err());
        assert!(validate_secret_strength("eyJ0eXAiOiJKV1QiLCJhbGciOi9kR7", "CMS_TOKEN").is_ok());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_list("/, /offline,,/about "), vec!["/", "/offline", "/about"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn test_offline_defaults() {
        let offline = OfflineConfig::default();
        assert_eq!(offline.cache_version, "v1");
        assert_eq!(offline.precache, vec!["/", "/offline"]);
        assert!(offline.skip_waiting);
    }

    #[test]
    fn test_cms_config_debug_redacts_token() {
        let config = CmsConfig {
            endpoint: "https://cms.test/graphql".to_string(),
            token: Some(SecretString::from("super_secret_cms_token")),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("https://cms.test/graphql"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_cms_token"));
    }

    #[test]
    fn test_socket_addr() {
        let config = SiteConfig {
            database_url: "sqlite::memory:".to_string(),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: Url::parse("http://localhost:3000").unwrap(),
            cms: CmsConfig {
                endpoint: "http://cms.test/graphql".to_string(),
                token: None,
            },
            offline: OfflineConfig::default(),
            sentry: SentryConfig::default(),
        };
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }
}
