//! Resource descriptors and per-resource runtime state

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Kind of loadable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Script,
    Style,
    Data,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Script => "script",
            ResourceKind::Style => "style",
            ResourceKind::Data => "data",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loading priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Needed for first paint
    Critical = 0,
    /// Needed soon
    High = 1,
    /// Standard priority
    Medium = 2,
    /// Prefetch/background
    Low = 3,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Deterministic id for a descriptor: `"{kind}-{url}"` with every
/// character outside `[A-Za-z0-9]` replaced by `-`.
pub fn resource_id(kind: ResourceKind, url: &str) -> String {
    let sanitized: String = url
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}-{}", kind, sanitized)
}

/// Immutable declaration of a loadable resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Absolute URL
    pub url: String,
    /// Resource kind
    pub kind: ResourceKind,
    /// Priority
    #[serde(default)]
    pub priority: Priority,
    /// How long a loaded payload stays fresh; `None` means forever
    #[serde(default)]
    pub ttl: Option<Duration>,
    /// Retry budget; `None` uses the registry's configured default
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl ResourceDescriptor {
    /// Create a descriptor with medium priority, no TTL and the registry's retry budget
    pub fn new(kind: ResourceKind, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            priority: Priority::default(),
            ttl: None,
            max_retries: None,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Image, url)
    }

    pub fn script(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Script, url)
    }

    pub fn style(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Style, url)
    }

    pub fn data(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Data, url)
    }

    /// Set priority
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Id derived from kind and URL
    pub fn id(&self) -> String {
        resource_id(self.kind, &self.url)
    }
}

/// Image container formats recognised by the image loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Svg,
}

/// Decoded result of a successful load
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Image { format: ImageFormat, bytes: Bytes },
    Script(String),
    Style(String),
    Data(serde_json::Value),
}

impl Payload {
    /// Kind this payload was loaded as
    pub fn kind(&self) -> ResourceKind {
        match self {
            Payload::Image { .. } => ResourceKind::Image,
            Payload::Script(_) => ResourceKind::Script,
            Payload::Style(_) => ResourceKind::Style,
            Payload::Data(_) => ResourceKind::Data,
        }
    }

    /// Approximate size in bytes, used for budget tracking
    pub fn size(&self) -> u64 {
        match self {
            Payload::Image { bytes, .. } => bytes.len() as u64,
            Payload::Script(s) | Payload::Style(s) => s.len() as u64,
            Payload::Data(v) => v.to_string().len() as u64,
        }
    }

    /// JSON value for `Data` payloads
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Data(v) => Some(v),
            _ => None,
        }
    }
}

/// Load status of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Pending,
    Loading,
    Loaded,
    Error,
}

/// Runtime record for one registered descriptor
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    /// Registered id
    pub id: String,
    /// Descriptor the entry was registered with
    pub descriptor: ResourceDescriptor,
    /// Current status
    pub status: ResourceStatus,
    /// Payload from the last successful load
    pub data: Option<Payload>,
    /// Duration of the last successful load
    pub load_duration: Duration,
    /// Failed attempts since the last success
    pub error_count: u32,
    /// When the payload was stored
    pub last_loaded_at: Option<Instant>,
    pub(crate) generation: u64,
}

impl ResourceEntry {
    pub(crate) fn new(id: String, descriptor: ResourceDescriptor, generation: u64) -> Self {
        Self {
            id,
            descriptor,
            status: ResourceStatus::Pending,
            data: None,
            load_duration: Duration::ZERO,
            error_count: 0,
            last_loaded_at: None,
            generation,
        }
    }

    /// Loaded and within TTL at `now`
    pub fn is_fresh(&self, now: Instant) -> bool {
        if self.status != ResourceStatus::Loaded || self.data.is_none() {
            return false;
        }
        match (self.descriptor.ttl, self.last_loaded_at) {
            (None, _) => true,
            (Some(ttl), Some(loaded_at)) => now.saturating_duration_since(loaded_at) <= ttl,
            (Some(_), None) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_sanitizes_url() {
        assert_eq!(
            resource_id(ResourceKind::Image, "https://cdn.shop/a.png"),
            "image-https---cdn-shop-a-png"
        );
        let d = ResourceDescriptor::script("/js/app.js");
        assert_eq!(d.id(), "script--js-app-js");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::Medium < Priority::Low);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_descriptor_json_defaults() {
        let d: ResourceDescriptor =
            serde_json::from_str(r#"{ "url": "/api/products", "kind": "data" }"#).unwrap();
        assert_eq!(d.kind, ResourceKind::Data);
        assert_eq!(d.priority, Priority::Medium);
        assert_eq!(d.max_retries, None);
        assert!(d.ttl.is_none());
    }

    #[test]
    fn test_entry_freshness_respects_ttl() {
        let now = Instant::now();
        let mut entry = ResourceEntry::new(
            "data-x".into(),
            ResourceDescriptor::data("x").with_ttl(Duration::from_secs(60)),
            0,
        );
        assert!(!entry.is_fresh(now));

        entry.status = ResourceStatus::Loaded;
        entry.data = Some(Payload::Data(serde_json::json!({ "ok": true })));
        entry.last_loaded_at = Some(now);

        assert!(entry.is_fresh(now + Duration::from_secs(60)));
        assert!(!entry.is_fresh(now + Duration::from_secs(61)));
    }
}
