//! Delivery configuration

use crate::{DeliveryError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for failed load attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Default retry budget for descriptors that do not set one
    pub max_retries: u32,
    /// Delay unit; attempt `k` waits `base_backoff * multiplier^k`
    pub base_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Upper bound on a single backoff delay
    pub max_backoff: Duration,
    /// Add jitter to backoff
    pub jitter: bool,
    /// Maximum relative jitter added on top of the delay (0.3 = up to +30%)
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
            jitter: false,
            jitter_ratio: 0.3,
        }
    }
}

/// Request cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied by `RequestCache::set`
    pub default_ttl: Duration,
    /// Period of the background cleanup pass
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Byte budgets per resource category
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub script_bytes: u64,
    pub style_bytes: u64,
    pub image_bytes: u64,
    pub total_bytes: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            script_bytes: 250_000,
            style_bytes: 50_000,
            image_bytes: 500_000,
            total_bytes: 1_000_000,
        }
    }
}

/// Component classification used by the adaptive policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Components that load on every connection tier
    pub critical_components: Vec<String>,
    /// Components worth loading early when the connection allows it
    pub important_components: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            critical_components: vec!["header".into(), "navigation".into(), "hero".into()],
            important_components: vec!["stories".into(), "products-grid".into()],
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Enable gzip/brotli
    pub compression: bool,
    /// User agent string
    pub user_agent: String,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            compression: true,
            user_agent: format!("storefront-delivery/{}", env!("CARGO_PKG_VERSION")),
            headers: Vec::new(),
        }
    }
}

/// Top-level delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum number of loads executing at once
    pub max_concurrent: usize,
    /// Per-attempt timeout; expiry counts as a transient failure
    pub fetch_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
    /// Request cache configuration
    pub cache: CacheConfig,
    /// Loads slower than this are logged as slow
    pub slow_resource_threshold: Duration,
    /// Minimum spacing between scroll-driven window recomputations
    pub scroll_throttle: Duration,
    /// Performance budgets
    pub budget: BudgetConfig,
    /// Adaptive policy configuration
    pub policy: PolicyConfig,
    /// HTTP transport configuration
    pub http: HttpConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            fetch_timeout: Duration::from_secs(10),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            slow_resource_threshold: Duration::from_secs(1),
            scroll_throttle: Duration::from_millis(16),
            budget: BudgetConfig::default(),
            policy: PolicyConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl DeliveryConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DeliveryError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loader cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(DeliveryError::Configuration(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(DeliveryError::Configuration(
                "fetch_timeout must be non-zero".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(DeliveryError::Configuration(
                "retry multiplier below 1.0 would shrink backoff".into(),
            ));
        }
        Ok(())
    }

    /// Set maximum concurrent loads
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set per-attempt timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set retry configuration
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set default cache TTL
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.default_ttl = ttl;
        self
    }

    /// Add a header sent with every HTTP request
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http.headers.push((key.into(), value.into()));
        self
    }
}
