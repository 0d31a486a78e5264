//! Shared constants for scale quantization and gesture timing

use std::time::Duration;

/// Quantum applied to every scale that becomes part of a cache key.
pub const SCALE_QUANTUM: f64 = 0.01;

/// Absolute ceiling on any rendered scale, regardless of device.
pub const GPU_SAFE_MAX_SCALE: f64 = 64.0;

/// Zoom at which full-page rendering hands over to adaptive rendering.
pub const FULL_TO_ADAPTIVE_ZOOM: f64 = 1.5;

/// Zoom at which adaptive rendering hands over to tiled rendering.
pub const ADAPTIVE_TO_TILED_ZOOM: f64 = 4.0;

/// Beyond this zoom the tile coordinate math is no longer trustworthy and
/// the renderer reverts to full-page mode.
pub const MAX_TILED_ZOOM: f64 = 32.0;

/// Hysteresis band around the render-mode thresholds.
pub const MODE_HYSTERESIS: f64 = 0.1;

/// Minimum interval between two epoch increments.
pub const EPOCH_MIN_INTERVAL: Duration = Duration::from_micros(16_667);

/// Session counters wrap at this modulus; ages are compared modularly.
pub const SESSION_MODULO: u32 = 10_000;

/// Recognized tile edge lengths, largest first.
pub const TILE_SIZES: [u32; 3] = [512, 256, 128];

/// Power-of-two tier set: maximal cache reuse, coarse steps.
pub const POWER_OF_TWO_TIERS: [f64; 9] = [0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0];

/// Fine-grained tier set spaced roughly 1.5x apart.
pub const FINE_GRAINED_TIERS: [f64; 17] = [
    0.25, 0.375, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0, 24.0, 32.0, 48.0, 64.0,
];

/// Ultra-fine tier set spaced roughly 1.25x apart.
pub const ULTRA_FINE_TIERS: [f64; 25] = [
    0.25, 0.3, 0.4, 0.5, 0.65, 0.8, 1.0, 1.25, 1.6, 2.0, 2.5, 3.2, 4.0, 5.0, 6.4, 8.0, 10.0, 12.8,
    16.0, 20.0, 25.6, 32.0, 40.0, 51.2, 64.0,
];
