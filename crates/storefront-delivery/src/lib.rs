//! Adaptive Resource Delivery for Storefront Front-Ends
//!
//! This crate decides what to load, at what quality, and in what order:
//!
//! - **Capability Detection**: Connection tier, memory, and cores from runtime hints
//! - **Adaptive Policy**: Image width/quality and component gating per capability
//! - **Request Cache**: TTL-bounded memoization with periodic cleanup
//! - **Loading Queue**: Bounded concurrency with retry and exponential backoff
//! - **Virtual Windows**: Visible-slice arithmetic for long scrolling lists
//! - **Budgets**: Byte accounting against per-category performance budgets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      DeliveryContext                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐      │
//! │  │  Capability  │ -> │   Adaptive   │ -> │   Resource   │      │
//! │  │  Detector    │    │   Policy     │    │   Registry   │      │
//! │  └──────────────┘    └──────────────┘    └──────────────┘      │
//! │                                                 │   ↑          │
//! │                                          FIFO   │   │ backoff  │
//! │                                                 ↓   │          │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐      │
//! │  │   Request    │    │   Budget     │ <- │  KindLoader  │      │
//! │  │   Cache      │    │   Monitor    │    │ + Transport  │      │
//! │  └──────────────┘    └──────────────┘    └──────────────┘      │
//! │                                                                  │
//! │  ┌──────────────┐    ┌──────────────┐                          │
//! │  │ VirtualList  │ <- │  Throttle    │   (scroll events)        │
//! │  └──────────────┘    └──────────────┘                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod budget;
mod cache;
mod capability;
mod client;
mod clock;
mod config;
mod context;
mod error;
mod fetcher;
mod policy;
mod registry;
mod resource;
mod throttle;
mod timing;
mod virtual_list;

pub use budget::{BudgetCategory, BudgetMetrics, BudgetMonitor, BudgetReport};
pub use cache::{CacheRecord, CacheStats, CleanupHandle, RequestCache};
pub use capability::{detect, Capabilities, ConnectionTier, HintSource, StaticHints, SystemHints};
pub use client::{ClientConfig, HttpTransport, Transport};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{
    BudgetConfig, CacheConfig, DeliveryConfig, HttpConfig, PolicyConfig, RetryConfig,
};
pub use context::{placeholder_image, DeliveryContext};
pub use error::{DeliveryError, Result};
pub use fetcher::{sniff_image, KindLoader};
pub use policy::{AdaptivePolicy, ComponentClass, ImageQuality};
pub use registry::{backoff_delay, RegistryConfig, ResourceRegistry, ResourceStats};
pub use resource::{
    resource_id, ImageFormat, Payload, Priority, ResourceDescriptor, ResourceEntry, ResourceKind,
    ResourceStatus,
};
pub use throttle::{Debouncer, Throttle};
pub use timing::{measure, SLOW_OPERATION};
pub use virtual_list::{compute_window, VirtualList, VisibleWindow, DEFAULT_OVERSCAN};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        AdaptivePolicy, Capabilities, DeliveryConfig, DeliveryContext, DeliveryError, Payload,
        Priority, RequestCache, ResourceDescriptor, ResourceKind, ResourceRegistry, Result,
        VirtualList,
    };
}
