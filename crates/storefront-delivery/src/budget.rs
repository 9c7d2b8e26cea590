//! Performance budget tracking for delivered bytes

use crate::{BudgetConfig, ResourceKind};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Budgeted resource category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetCategory {
    Script,
    Style,
    Image,
}

impl BudgetCategory {
    /// Classify a URL by extension. Unrecognised URLs count as script.
    pub fn from_url(url: &str) -> Self {
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url)
            .to_ascii_lowercase();

        const IMAGE_EXTENSIONS: [&str; 7] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".avif"];

        if IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            BudgetCategory::Image
        } else if path.contains(".css") {
            BudgetCategory::Style
        } else {
            BudgetCategory::Script
        }
    }

    fn from_kind(kind: ResourceKind) -> Option<Self> {
        match kind {
            ResourceKind::Image => Some(BudgetCategory::Image),
            ResourceKind::Script => Some(BudgetCategory::Script),
            ResourceKind::Style => Some(BudgetCategory::Style),
            ResourceKind::Data => None,
        }
    }
}

/// Bytes observed so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BudgetMetrics {
    pub script: u64,
    pub style: u64,
    pub image: u64,
    pub total: u64,
}

/// Snapshot of usage against budgets
#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport {
    pub metrics: BudgetMetrics,
    pub budgets: BudgetMetrics,
    pub within_budget: bool,
}

/// Accumulates delivered bytes and warns when a category exceeds its budget
pub struct BudgetMonitor {
    budgets: BudgetMetrics,
    script: AtomicU64,
    style: AtomicU64,
    image: AtomicU64,
    total: AtomicU64,
}

impl BudgetMonitor {
    pub fn new(config: &BudgetConfig) -> Self {
        Self {
            budgets: BudgetMetrics {
                script: config.script_bytes,
                style: config.style_bytes,
                image: config.image_bytes,
                total: config.total_bytes,
            },
            script: AtomicU64::new(0),
            style: AtomicU64::new(0),
            image: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Track a transfer classified by URL
    pub fn track_url(&self, url: &str, bytes: u64) {
        self.track(Some(BudgetCategory::from_url(url)), bytes);
    }

    /// Track a transfer of a known kind; data payloads count toward the total only
    pub fn track_kind(&self, kind: ResourceKind, bytes: u64) {
        self.track(BudgetCategory::from_kind(kind), bytes);
    }

    fn track(&self, category: Option<BudgetCategory>, bytes: u64) {
        if let Some(category) = category {
            let (counter, budget) = match category {
                BudgetCategory::Script => (&self.script, self.budgets.script),
                BudgetCategory::Style => (&self.style, self.budgets.style),
                BudgetCategory::Image => (&self.image, self.budgets.image),
            };
            let used = counter.fetch_add(bytes, Ordering::Relaxed) + bytes;
            if used > budget {
                warn!(
                    "Performance budget exceeded for {:?}: {} / {} bytes",
                    category, used, budget
                );
            }
        }

        let total = self.total.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if total > self.budgets.total {
            warn!(
                "Total performance budget exceeded: {} / {} bytes",
                total, self.budgets.total
            );
        }
    }

    /// Current usage
    pub fn metrics(&self) -> BudgetMetrics {
        BudgetMetrics {
            script: self.script.load(Ordering::Relaxed),
            style: self.style.load(Ordering::Relaxed),
            image: self.image.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }

    /// Usage against budgets
    pub fn report(&self) -> BudgetReport {
        let metrics = self.metrics();
        BudgetReport {
            metrics,
            budgets: self.budgets,
            within_budget: metrics.total <= self.budgets.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_classification() {
        assert_eq!(BudgetCategory::from_url("/_next/app.js"), BudgetCategory::Script);
        assert_eq!(BudgetCategory::from_url("/styles/main.css?v=2"), BudgetCategory::Style);
        assert_eq!(BudgetCategory::from_url("https://cdn/p.WEBP"), BudgetCategory::Image);
        assert_eq!(BudgetCategory::from_url("/api/products"), BudgetCategory::Script);
    }

    #[test]
    fn test_report_tracks_total() {
        let monitor = BudgetMonitor::new(&BudgetConfig {
            total_bytes: 1_000,
            ..Default::default()
        });
        monitor.track_kind(ResourceKind::Image, 600);
        monitor.track_kind(ResourceKind::Data, 300);
        assert!(monitor.report().within_budget);

        monitor.track_url("/app.css", 200);
        let report = monitor.report();
        assert!(!report.within_budget);
        assert_eq!(report.metrics.image, 600);
        assert_eq!(report.metrics.style, 200);
        assert_eq!(report.metrics.total, 1_100);
    }
}
