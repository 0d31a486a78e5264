//! One-shot device capability detection
//!
//! The profile is detected once and read-only afterwards; hosts with better
//! platform knowledge (browser shells, mobile embedders) inject a
//! [`DeviceInfo`] instead of relying on detection.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static DETECTED: Lazy<DeviceProfile> = Lazy::new(|| DeviceProfile::from_info(DeviceInfo::probe()));

/// Coarse device capability class
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DeviceTier {
    Low,
    Mid,
    High,
    Extreme,
}

/// GPU renderer class, as far as the host can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GpuFamily {
    Integrated,
    Discrete,
    Software,
    Unknown,
}

/// Raw device facts supplied by the host or probed from the platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub memory_gb: f64,
    pub cores: usize,
    pub pixel_ratio: f64,
    pub gpu_family: GpuFamily,
    pub max_canvas_dimension: u32,
    pub is_mobile: bool,
}

impl DeviceInfo {
    /// Synchronous best-effort probe. Core count comes from the platform;
    /// memory and GPU facts fall back to conservative defaults when the
    /// host supplies nothing better.
    pub fn probe() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);

        Self {
            memory_gb: 8.0,
            cores,
            pixel_ratio: 1.0,
            gpu_family: GpuFamily::Unknown,
            max_canvas_dimension: 16_384,
            is_mobile: false,
        }
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::probe()
    }
}

/// Read-only device profile derived from [`DeviceInfo`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub tier: DeviceTier,
    pub memory_gb: f64,
    pub cores: usize,
    pub gpu_family: GpuFamily,
    pub max_canvas_dimension: u32,
    pub pixel_ratio: f64,
    pub is_mobile: bool,
}

impl DeviceProfile {
    /// The process-wide detected profile.
    pub fn detect() -> &'static DeviceProfile {
        &DETECTED
    }

    pub fn from_info(info: DeviceInfo) -> Self {
        let tier = if info.memory_gb >= 16.0 && info.cores >= 6 {
            DeviceTier::Extreme
        } else if info.memory_gb >= 8.0 && info.cores >= 4 {
            DeviceTier::High
        } else if info.memory_gb >= 4.0 && info.cores >= 2 {
            DeviceTier::Mid
        } else {
            DeviceTier::Low
        };

        Self {
            tier,
            memory_gb: info.memory_gb,
            cores: info.cores,
            gpu_family: info.gpu_family,
            max_canvas_dimension: info.max_canvas_dimension,
            pixel_ratio: info.pixel_ratio,
            is_mobile: info.is_mobile,
        }
    }

    /// Concurrent rasterizer invocations the coordinator may run.
    pub fn permit_count(&self) -> usize {
        match self.tier {
            DeviceTier::Extreme => 8,
            DeviceTier::High => 6,
            DeviceTier::Mid => 4,
            DeviceTier::Low => 2,
        }
    }

    /// Memory-derived cap on any rendered scale.
    pub fn max_scale(&self) -> f64 {
        if self.memory_gb >= 8.0 {
            64.0
        } else if self.memory_gb >= 4.0 {
            32.0
        } else {
            16.0
        }
    }

    /// Largest tile edge in device pixels the rasterizer may be asked for.
    /// One value per profile; every cap computation reads it from here.
    pub fn max_tile_pixels(&self) -> u32 {
        match self.tier {
            DeviceTier::Extreme | DeviceTier::High => 8_192,
            DeviceTier::Mid | DeviceTier::Low => 4_096,
        }
    }

    /// Byte budgets for the hot/warm/cold cache tiers.
    pub fn cache_budgets(&self) -> (usize, usize, usize) {
        let mb = 1024 * 1024;
        match self.tier {
            DeviceTier::Extreme => (256 * mb, 512 * mb, 256 * mb),
            DeviceTier::High => (128 * mb, 256 * mb, 128 * mb),
            DeviceTier::Mid => (64 * mb, 128 * mb, 64 * mb),
            DeviceTier::Low => (32 * mb, 48 * mb, 32 * mb),
        }
    }

    /// Profile for a specific tier, used by tests and presets.
    pub fn for_tier(tier: DeviceTier) -> Self {
        let (memory_gb, cores) = match tier {
            DeviceTier::Extreme => (16.0, 8),
            DeviceTier::High => (8.0, 4),
            DeviceTier::Mid => (4.0, 2),
            DeviceTier::Low => (2.0, 2),
        };
        Self::from_info(DeviceInfo {
            memory_gb,
            cores,
            pixel_ratio: 1.0,
            gpu_family: GpuFamily::Unknown,
            max_canvas_dimension: 16_384,
            is_mobile: false,
        })
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::detect().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_thresholds() {
        let extreme = DeviceProfile::for_tier(DeviceTier::Extreme);
        assert_eq!(extreme.tier, DeviceTier::Extreme);
        assert_eq!(extreme.permit_count(), 8);
        assert_eq!(extreme.max_tile_pixels(), 8_192);

        let low = DeviceProfile::for_tier(DeviceTier::Low);
        assert_eq!(low.tier, DeviceTier::Low);
        assert_eq!(low.permit_count(), 2);
        assert_eq!(low.max_tile_pixels(), 4_096);
        assert_eq!(low.max_scale(), 16.0);
    }

    #[test]
    fn test_borderline_memory_lands_in_lower_tier() {
        let info = DeviceInfo {
            memory_gb: 7.9,
            cores: 8,
            pixel_ratio: 2.0,
            gpu_family: GpuFamily::Discrete,
            max_canvas_dimension: 16_384,
            is_mobile: false,
        };
        let profile = DeviceProfile::from_info(info);
        assert_eq!(profile.tier, DeviceTier::Mid);
        assert_eq!(profile.max_scale(), 32.0);
    }

    #[test]
    fn test_detect_is_stable() {
        let a = DeviceProfile::detect();
        let b = DeviceProfile::detect();
        assert_eq!(a, b);
    }
}
