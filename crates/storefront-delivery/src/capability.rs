//! Runtime capability detection

use serde::{Deserialize, Serialize};
use sysinfo::System;

const DEFAULT_MEMORY_GIB: f64 = 4.0;
const DEFAULT_CORES: u32 = 4;

/// Coarse network speed classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTier {
    Slow,
    Medium,
    Fast,
}

impl ConnectionTier {
    /// Map a Network Information API `effectiveType` string onto a tier.
    /// Unknown values count as fast.
    pub fn from_effective_type(effective_type: &str) -> Self {
        match effective_type.trim().to_ascii_lowercase().as_str() {
            "slow-2g" | "2g" => ConnectionTier::Slow,
            "3g" => ConnectionTier::Medium,
            _ => ConnectionTier::Fast,
        }
    }
}

/// Snapshot of the runtime's network and device capability
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub connection_tier: ConnectionTier,
    pub device_memory_gib: f64,
    pub logical_cores: u32,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            connection_tier: ConnectionTier::Fast,
            device_memory_gib: DEFAULT_MEMORY_GIB,
            logical_cores: DEFAULT_CORES,
        }
    }
}

impl Capabilities {
    pub fn new(connection_tier: ConnectionTier, device_memory_gib: f64, logical_cores: u32) -> Self {
        Self {
            connection_tier,
            device_memory_gib,
            logical_cores,
        }
    }
}

/// Platform-provided hints. Every hint is optional.
pub trait HintSource: Send + Sync {
    /// Effective connection type (`"slow-2g"`, `"2g"`, `"3g"`, `"4g"`)
    fn effective_type(&self) -> Option<String>;
    /// Device memory in GiB
    fn device_memory_gib(&self) -> Option<f64>;
    /// Logical core count
    fn logical_cores(&self) -> Option<u32>;
}

/// Classify the runtime. Absent or nonsensical hints fall back to
/// fast / 4 GiB / 4 cores.
pub fn detect(hints: &dyn HintSource) -> Capabilities {
    let defaults = Capabilities::default();

    let connection_tier = hints
        .effective_type()
        .map(|t| ConnectionTier::from_effective_type(&t))
        .unwrap_or(defaults.connection_tier);
    let device_memory_gib = hints
        .device_memory_gib()
        .filter(|m| m.is_finite() && *m > 0.0)
        .unwrap_or(defaults.device_memory_gib);
    let logical_cores = hints
        .logical_cores()
        .filter(|c| *c > 0)
        .unwrap_or(defaults.logical_cores);

    Capabilities {
        connection_tier,
        device_memory_gib,
        logical_cores,
    }
}

/// Explicitly supplied hints (embedders forwarding client hints, tests)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticHints {
    pub effective_type: Option<String>,
    pub device_memory_gib: Option<f64>,
    pub logical_cores: Option<u32>,
}

impl StaticHints {
    pub fn with_effective_type(mut self, effective_type: impl Into<String>) -> Self {
        self.effective_type = Some(effective_type.into());
        self
    }

    pub fn with_device_memory(mut self, gib: f64) -> Self {
        self.device_memory_gib = Some(gib);
        self
    }

    pub fn with_logical_cores(mut self, cores: u32) -> Self {
        self.logical_cores = Some(cores);
        self
    }
}

impl HintSource for StaticHints {
    fn effective_type(&self) -> Option<String> {
        self.effective_type.clone()
    }

    fn device_memory_gib(&self) -> Option<f64> {
        self.device_memory_gib
    }

    fn logical_cores(&self) -> Option<u32> {
        self.logical_cores
    }
}

/// Hints read from the host machine
#[derive(Debug, Clone, Default)]
pub struct SystemHints {
    /// The host cannot observe link quality, so the tier is supplied by the caller
    pub effective_type: Option<String>,
}

impl SystemHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_effective_type(mut self, effective_type: impl Into<String>) -> Self {
        self.effective_type = Some(effective_type.into());
        self
    }
}

impl HintSource for SystemHints {
    fn effective_type(&self) -> Option<String> {
        self.effective_type.clone()
    }

    fn device_memory_gib(&self) -> Option<f64> {
        let mut system = System::new();
        system.refresh_memory();
        match system.total_memory() {
            0 => None,
            bytes => Some(bytes as f64 / (1024.0 * 1024.0 * 1024.0)),
        }
    }

    fn logical_cores(&self) -> Option<u32> {
        std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u32)
    }
}
