//! Configuration system for renderer behavior and performance tuning
//!
//! Mirrors the preset structure used across the crate: a nested options
//! struct per subsystem plus unified `low_resource` / `high_performance` /
//! `for_testing` presets that tune all subsystems at once.

use serde::{Deserialize, Serialize};

use crate::core::constants::{FINE_GRAINED_TIERS, POWER_OF_TWO_TIERS, ULTRA_FINE_TIERS};
use crate::viewport::SpeedZoneTable;

/// Recognized scale set used to quantize render resolution.
///
/// One set is chosen per renderer instance and never mixed at runtime; the
/// cache-key quantum (0.01) is independent of the tier set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TierSet {
    /// Coarse steps, maximal cache reuse
    PowerOfTwo,
    /// Steps spaced ~1.5x apart
    FineGrained,
    /// Steps spaced ~1.25x apart, smoothest perceived zoom
    UltraFine,
    /// Caller-supplied ascending tier list
    Custom(Vec<f64>),
}

impl TierSet {
    pub fn tiers(&self) -> &[f64] {
        match self {
            Self::PowerOfTwo => &POWER_OF_TWO_TIERS,
            Self::FineGrained => &FINE_GRAINED_TIERS,
            Self::UltraFine => &ULTRA_FINE_TIERS,
            Self::Custom(tiers) => tiers,
        }
    }
}

impl Default for TierSet {
    fn default() -> Self {
        Self::FineGrained
    }
}

/// How rendered quality degrades with distance from the focal point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityFalloff {
    None,
    Linear,
    Quadratic,
}

impl Default for QualityFalloff {
    fn default() -> Self {
        Self::None
    }
}

/// Scale-resolution options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub tier_set: TierSet,
    /// Render at the exact quantized scale instead of the nearest tier.
    /// Tier mode maximizes cache reuse; exact mode avoids large CSS
    /// upscaling at extreme zoom.
    pub use_exact_scale: bool,
    pub quality_falloff: QualityFalloff,
    /// Radius (in tiles) over which the falloff is applied
    pub falloff_radius: f64,
    /// Document-level zoom ceiling
    pub max_zoom: f64,
    /// Largest CSS stretch the compositor will accept before the renderer
    /// must produce a sharper tile
    pub max_css_stretch: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            tier_set: TierSet::default(),
            use_exact_scale: false,
            quality_falloff: QualityFalloff::None,
            falloff_radius: 4.0,
            max_zoom: 32.0,
            max_css_stretch: 4.0,
        }
    }
}

/// Prefetch options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchConfig {
    /// Expand the prefetch window with scroll velocity
    pub adaptive: bool,
    pub speed_zones: SpeedZoneTable,
    /// Hard cap on prefetch tiles per pass
    pub max_prefetch_tiles: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            adaptive: true,
            speed_zones: SpeedZoneTable::default(),
            max_prefetch_tiles: 256,
        }
    }
}

/// Gesture state-machine timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Input silence after which a gesture is considered ended
    pub gesture_end_delay_ms: u64,
    /// Dwell in SETTLING before rendering starts
    pub settling_delay_ms: u64,
    /// Pause between intermediate progressive phases
    pub intermediate_delay_ms: u64,
    /// Window after entering RENDERING during which opposite-direction zoom
    /// events are treated as trackpad rebound artifacts
    pub rebound_window_ms: u64,
    /// Progressive tiers whose ratio to the current scale is at or below
    /// this are skipped
    pub skip_intermediate_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gesture_end_delay_ms: 300,
            settling_delay_ms: 200,
            intermediate_delay_ms: 50,
            rebound_window_ms: 150,
            skip_intermediate_threshold: 1.2,
        }
    }
}

/// Retry-queue limits for requests dropped from the semaphore queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub cooldown_ms: u64,
    pub ttl_ms: u64,
    pub max_entries: usize,
    /// Retry is skipped while the semaphore queue is fuller than this
    pub saturation_threshold: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            cooldown_ms: 500,
            ttl_ms: 5_000,
            max_entries: 64,
            saturation_threshold: 0.8,
        }
    }
}

/// Coordinator queue limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Waiter cap across all semaphore lanes
    pub max_queue_size: usize,
    /// Queue occupancy above which only viewport tiles are accepted
    pub viewport_only_threshold: f64,
    /// Per-page tile cap during a single scheduling pass
    pub max_tiles_per_page: usize,
    pub retry: RetryConfig,
    pub enable_content_type_detection: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 50,
            viewport_only_threshold: 0.75,
            max_tiles_per_page: 128,
            retry: RetryConfig::default(),
            enable_content_type_detection: true,
        }
    }
}

/// Unified configuration for the whole rendering core
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RendererConfig {
    pub scale: ScaleConfig,
    pub prefetch: PrefetchConfig,
    pub orchestrator: OrchestratorConfig,
    pub coordinator: CoordinatorConfig,
}

/// Unified configuration presets that affect all subsystems
impl RendererConfig {
    /// Low resource configuration for mobile or constrained environments
    pub fn low_resource() -> Self {
        Self {
            scale: ScaleConfig {
                tier_set: TierSet::PowerOfTwo,
                max_zoom: 16.0,
                ..Default::default()
            },
            prefetch: PrefetchConfig {
                adaptive: false,
                max_prefetch_tiles: 48,
                ..Default::default()
            },
            orchestrator: OrchestratorConfig::default(),
            coordinator: CoordinatorConfig {
                max_queue_size: 24,
                max_tiles_per_page: 48,
                retry: RetryConfig {
                    max_attempts: 1,
                    max_entries: 16,
                    ..Default::default()
                },
                enable_content_type_detection: false,
                ..Default::default()
            },
        }
    }

    /// High performance configuration for desktop applications
    pub fn high_performance() -> Self {
        Self {
            scale: ScaleConfig {
                tier_set: TierSet::UltraFine,
                max_zoom: 64.0,
                ..Default::default()
            },
            prefetch: PrefetchConfig {
                adaptive: true,
                max_prefetch_tiles: 512,
                ..Default::default()
            },
            orchestrator: OrchestratorConfig::default(),
            coordinator: CoordinatorConfig {
                max_queue_size: 128,
                max_tiles_per_page: 256,
                retry: RetryConfig {
                    max_attempts: 3,
                    max_entries: 128,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// Testing configuration with reduced resources and timeouts
    pub fn for_testing() -> Self {
        Self {
            scale: ScaleConfig::default(),
            prefetch: PrefetchConfig::default(),
            orchestrator: OrchestratorConfig {
                gesture_end_delay_ms: 30,
                settling_delay_ms: 20,
                intermediate_delay_ms: 0,
                rebound_window_ms: 15,
                ..Default::default()
            },
            coordinator: CoordinatorConfig {
                max_queue_size: 8,
                retry: RetryConfig {
                    max_attempts: 1,
                    cooldown_ms: 10,
                    ttl_ms: 500,
                    max_entries: 8,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }
}
