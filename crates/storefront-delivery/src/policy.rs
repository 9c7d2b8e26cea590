//! Adaptive delivery policy driven by detected capabilities

use crate::{Capabilities, ConnectionTier, PolicyConfig, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Image quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageQuality {
    Low,
    Medium,
    High,
}

impl ImageQuality {
    /// Encoder quality (0-100) requested from the image CDN
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            ImageQuality::Low => 40,
            ImageQuality::Medium => 65,
            ImageQuality::High => 85,
        }
    }
}

/// How essential a named UI component is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentClass {
    Critical,
    Important,
    Optional,
}

/// Decides what to fetch and at which fidelity
#[derive(Debug, Clone, Default)]
pub struct AdaptivePolicy {
    config: PolicyConfig,
}

impl AdaptivePolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// First matching rule wins: slow link or <2 GiB is low,
    /// medium link or <4 GiB is medium, anything else high.
    pub fn image_quality(&self, caps: &Capabilities) -> ImageQuality {
        if caps.connection_tier == ConnectionTier::Slow || caps.device_memory_gib < 2.0 {
            ImageQuality::Low
        } else if caps.connection_tier == ConnectionTier::Medium || caps.device_memory_gib < 4.0 {
            ImageQuality::Medium
        } else {
            ImageQuality::High
        }
    }

    /// Target image width in pixels
    pub fn optimal_image_pixel_width(&self, caps: &Capabilities) -> u32 {
        match caps.connection_tier {
            ConnectionTier::Slow => 400,
            ConnectionTier::Medium => 800,
            ConnectionTier::Fast => 1200,
        }
    }

    /// Classify a component by name
    pub fn component_class(&self, name: &str) -> ComponentClass {
        if self.config.critical_components.iter().any(|c| c == name) {
            ComponentClass::Critical
        } else if self.config.important_components.iter().any(|c| c == name) {
            ComponentClass::Important
        } else {
            ComponentClass::Optional
        }
    }

    /// Critical components always load; the rest only off slow links
    pub fn should_load_component(&self, name: &str, caps: &Capabilities) -> bool {
        self.component_class(name) == ComponentClass::Critical
            || caps.connection_tier != ConnectionTier::Slow
    }

    /// Rewrite an image URL with `w` and `q` query parameters for a resizing CDN.
    /// Existing `w`/`q` parameters are replaced.
    pub fn image_variant(&self, url: &str, caps: &Capabilities) -> Result<String> {
        let mut parsed = Url::parse(url)?;
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| k != "w" && k != "q")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let width = self.optimal_image_pixel_width(caps).to_string();
        let quality = self.image_quality(caps).jpeg_quality().to_string();

        parsed
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("w", &width)
            .append_pair("q", &quality);

        Ok(parsed.into())
    }
}
