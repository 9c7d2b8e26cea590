//! Application-scoped delivery context

use crate::{
    detect, AdaptivePolicy, BudgetMonitor, Capabilities, CleanupHandle, ClientConfig, Clock,
    DeliveryConfig, DeliveryError, HintSource, HttpTransport, ImageFormat, Payload,
    RegistryConfig, RequestCache, ResourceDescriptor, ResourceRegistry, Result, TokioClock,
    Transport, VirtualList,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 1x1 transparent GIF served when an image cannot be loaded
const PLACEHOLDER_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

/// Placeholder image payload
pub fn placeholder_image() -> Payload {
    Payload::Image {
        format: ImageFormat::Gif,
        bytes: Bytes::from_static(PLACEHOLDER_GIF),
    }
}

/// Owns every delivery component for the lifetime of the UI tree.
///
/// Capabilities are snapshotted once at construction. The periodic cache
/// cleanup runs until `shutdown` is called or the context is dropped.
pub struct DeliveryContext {
    config: DeliveryConfig,
    capabilities: Capabilities,
    policy: AdaptivePolicy,
    cache: Arc<RequestCache<serde_json::Value>>,
    registry: ResourceRegistry,
    budget: Arc<BudgetMonitor>,
    clock: Arc<dyn Clock>,
    cleanup: CleanupHandle,
}

impl DeliveryContext {
    /// Build a context over the HTTP transport. Must run inside a tokio runtime.
    pub fn http(config: DeliveryConfig, hints: &dyn HintSource) -> Result<Self> {
        let transport = HttpTransport::new(ClientConfig::from(&config))?;
        Self::new(config, Arc::new(transport), hints)
    }

    /// Build a context over any transport. Must run inside a tokio runtime.
    pub fn new(
        config: DeliveryConfig,
        transport: Arc<dyn Transport>,
        hints: &dyn HintSource,
    ) -> Result<Self> {
        Self::with_clock(config, transport, hints, Arc::new(TokioClock))
    }

    /// Build a context with an explicit clock
    pub fn with_clock(
        config: DeliveryConfig,
        transport: Arc<dyn Transport>,
        hints: &dyn HintSource,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let capabilities = detect(hints);
        info!(
            "Delivery context: {:?} link, {:.1} GiB, {} cores",
            capabilities.connection_tier, capabilities.device_memory_gib, capabilities.logical_cores
        );

        let policy = AdaptivePolicy::new(config.policy.clone());
        let cache = Arc::new(RequestCache::with_clock(&config.cache, clock.clone()));
        let cleanup = cache.spawn_cleanup(config.cache.cleanup_interval);
        let budget = Arc::new(BudgetMonitor::new(&config.budget));

        let registry =
            ResourceRegistry::with_clock(RegistryConfig::from(&config), transport, clock.clone());
        registry.attach_budget(budget.clone());

        Ok(Self {
            config,
            capabilities,
            policy,
            cache,
            registry,
            budget,
            clock,
            cleanup,
        })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn policy(&self) -> &AdaptivePolicy {
        &self.policy
    }

    pub fn cache(&self) -> &Arc<RequestCache<serde_json::Value>> {
        &self.cache
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn budget(&self) -> &BudgetMonitor {
        &self.budget
    }

    /// Whether a named component should be loaded on this runtime
    pub fn should_load_component(&self, name: &str) -> bool {
        self.policy.should_load_component(name, &self.capabilities)
    }

    /// Load an image at the width and quality suited to this runtime
    pub async fn load_image(&self, url: &str) -> Result<Payload> {
        let url = match self.policy.image_variant(url, &self.capabilities) {
            Ok(variant) => variant,
            Err(DeliveryError::InvalidUrl(_)) => {
                debug!("Not rewriting relative image URL {}", url);
                url.to_string()
            }
            Err(e) => return Err(e),
        };

        let id = self.registry.ensure_registered(ResourceDescriptor::image(url));
        self.registry.load(&id).await
    }

    /// Like `load_image`, but a failure yields the placeholder image
    pub async fn load_image_or_placeholder(&self, url: &str) -> Payload {
        match self.load_image(url).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Image {} unavailable, using placeholder: {}", url, e);
                placeholder_image()
            }
        }
    }

    /// Fetch a JSON document, memoized in the request cache
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        if let Some(value) = self.cache.get(url) {
            return Ok(value);
        }

        let descriptor = ResourceDescriptor::data(url).with_ttl(self.config.cache.default_ttl);
        let id = self.registry.ensure_registered(descriptor);

        match self.registry.load(&id).await? {
            Payload::Data(value) => {
                self.cache.set(url, value.clone());
                Ok(value)
            }
            other => Err(DeliveryError::Decode {
                kind: crate::ResourceKind::Data,
                message: format!("expected JSON, got {} payload", other.kind()),
            }),
        }
    }

    /// Virtual list tracker using the configured scroll throttle
    pub fn virtual_list(
        &self,
        item_height: f64,
        container_height: f64,
        total_items: usize,
    ) -> Result<VirtualList> {
        VirtualList::new(
            item_height,
            container_height,
            total_items,
            self.config.scroll_throttle,
            self.clock.clone(),
        )
    }

    /// Stop background work and reject pending loads
    pub fn shutdown(&mut self) {
        self.cleanup.shutdown();
        self.registry.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::sniff_image;

    #[test]
    fn test_placeholder_is_a_gif() {
        match placeholder_image() {
            Payload::Image { format, bytes } => {
                assert_eq!(format, ImageFormat::Gif);
                assert_eq!(sniff_image(&bytes), Some(ImageFormat::Gif));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
