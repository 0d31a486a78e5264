//! Pure scale math: tier selection, capping, and adaptive tile sizing
//!
//! Tiers exist to maximize cache reuse; exact mode exists for crisp
//! rendering at extreme zoom where the nearest tier would require large CSS
//! upscaling. Every cap decision in the crate goes through
//! [`ScaleModel::apply_scale_caps`] so that no two layers can disagree about
//! the maximum scale.

use crate::core::config::TierSet;
use crate::core::constants::{GPU_SAFE_MAX_SCALE, TILE_SIZES};
use crate::core::coords::quantize_scale;
use crate::device::DeviceProfile;

/// Result of resolving a zoom to a recognized tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierTarget {
    pub tier: f64,
    pub css_stretch: f64,
}

/// Result of resolving a zoom to an exact quantized scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExactTarget {
    pub scale: f64,
    pub css_stretch: f64,
    pub was_capped: bool,
}

/// Pure functions mapping (zoom, dpr, caps) to rendered resolutions
#[derive(Debug, Clone)]
pub struct ScaleModel {
    tiers: Vec<f64>,
    device: DeviceProfile,
}

impl ScaleModel {
    pub fn new(tier_set: &TierSet, device: DeviceProfile) -> Self {
        Self {
            tiers: tier_set.tiers().to_vec(),
            device,
        }
    }

    pub fn tiers(&self) -> &[f64] {
        &self.tiers
    }

    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    /// Clamp non-finite or non-positive zoom to a safe value.
    fn sanitize_zoom(zoom: f64) -> f64 {
        if !zoom.is_finite() || zoom <= 0.0 {
            log::warn!("invalid zoom {zoom}, clamping to 1.0");
            1.0
        } else {
            zoom
        }
    }

    /// The single capping function. Applies, in order: the GPU-safe
    /// absolute maximum, the device-memory cap, the per-tile pixel cap,
    /// and the document zoom ceiling. Returns the capped scale and whether
    /// any cap took effect.
    pub fn apply_scale_caps(
        &self,
        raw: f64,
        dpr: f64,
        max_zoom: Option<f64>,
        tile_size: u32,
    ) -> (f64, bool) {
        let mut scale = raw;

        scale = scale.min(GPU_SAFE_MAX_SCALE);
        scale = scale.min(self.device.max_scale());
        scale = scale.min(self.device.max_tile_pixels() as f64 / tile_size as f64);
        if let Some(max_zoom) = max_zoom {
            scale = scale.min(max_zoom * dpr);
        }

        (scale, scale < raw)
    }

    /// Smallest recognized tier that covers `zoom * dpr`, after caps.
    ///
    /// `css_stretch` is the factor the compositor must scale the rendered
    /// tile by so it appears at the requested zoom.
    pub fn target_tier(&self, zoom: f64, dpr: f64, max_zoom: Option<f64>) -> TierTarget {
        let zoom = Self::sanitize_zoom(zoom);
        let raw = zoom * dpr;
        let tile_size = self.adaptive_tile_size(zoom, dpr);

        let uncapped = self
            .tiers
            .iter()
            .copied()
            .find(|&t| t >= raw)
            .unwrap_or_else(|| *self.tiers.last().expect("tier set must not be empty"));

        let (capped, was_capped) = self.apply_scale_caps(uncapped, dpr, max_zoom, tile_size);

        // A cap below the chosen tier snaps down to the largest tier that
        // still fits, so the result stays a recognized tier.
        let tier = if was_capped {
            self.tiers
                .iter()
                .copied()
                .rev()
                .find(|&t| t <= capped)
                .unwrap_or(capped)
        } else {
            uncapped
        };

        TierTarget {
            tier,
            css_stretch: raw / tier,
        }
    }

    /// The exact quantized scale for `zoom * dpr`, after caps.
    pub fn exact_target(&self, zoom: f64, dpr: f64, max_zoom: Option<f64>) -> ExactTarget {
        let zoom = Self::sanitize_zoom(zoom);
        let raw = zoom * dpr;
        let tile_size = self.adaptive_tile_size(zoom, dpr);

        let (capped, was_capped) = self.apply_scale_caps(raw, dpr, max_zoom, tile_size);
        let scale = quantize_scale(capped);

        ExactTarget {
            scale,
            css_stretch: raw / scale,
            was_capped,
        }
    }

    /// Largest tile edge whose worst-case pixel count stays under the
    /// device budget at this zoom; higher zoom yields smaller tiles. Ties
    /// break to the larger size.
    pub fn adaptive_tile_size(&self, zoom: f64, dpr: f64) -> u32 {
        let zoom = Self::sanitize_zoom(zoom);
        let raw = (zoom * dpr).min(GPU_SAFE_MAX_SCALE);
        let target = self
            .tiers
            .iter()
            .copied()
            .find(|&t| t >= raw)
            .unwrap_or_else(|| *self.tiers.last().expect("tier set must not be empty"));

        let budget = self.device.max_tile_pixels() as f64;
        TILE_SIZES
            .iter()
            .copied()
            .find(|&size| size as f64 * target <= budget)
            .unwrap_or(*TILE_SIZES.last().expect("tile sizes must not be empty"))
    }

    /// Recognized tiers strictly between `current` and `target`, ascending.
    pub fn progressive_tiers(&self, current: f64, target: f64) -> Vec<f64> {
        self.tiers
            .iter()
            .copied()
            .filter(|&t| t > current && t < target)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceTier;

    fn model() -> ScaleModel {
        ScaleModel::new(&TierSet::FineGrained, DeviceProfile::for_tier(DeviceTier::High))
    }

    #[test]
    fn test_target_tier_covers_zoom() {
        let m = model();
        let target = m.target_tier(3.0, 2.0, None);
        assert_eq!(target.tier, 6.0);
        assert_eq!(target.css_stretch, 1.0);

        let target = m.target_tier(2.6, 2.0, None);
        assert_eq!(target.tier, 6.0);
        assert!(target.css_stretch < 1.0);
    }

    #[test]
    fn test_target_tier_zero_zoom_clamps() {
        let m = model();
        let target = m.target_tier(0.0, 2.0, None);
        assert!(target.tier.is_finite());
        assert!(target.css_stretch.is_finite());
        assert!(target.tier >= 2.0);
    }

    #[test]
    fn test_target_tier_respects_max_zoom() {
        let m = model();
        let target = m.target_tier(30.0, 2.0, Some(8.0));
        // Cap is 8 * 2 = 16; the largest tier at or below it is 16.
        assert_eq!(target.tier, 16.0);
        assert!(target.css_stretch > 1.0);
    }

    #[test]
    fn test_exact_target_quantizes_and_is_idempotent() {
        let m = model();
        let dpr = 2.0;
        let first = m.exact_target(3.333333, dpr, Some(32.0));
        let again = m.exact_target(first.scale / dpr, dpr, Some(32.0));
        assert_eq!(first.scale, again.scale);
    }

    #[test]
    fn test_exact_target_reports_capping() {
        let m = model();
        let capped = m.exact_target(100.0, 2.0, None);
        assert!(capped.was_capped);
        assert!(capped.scale <= GPU_SAFE_MAX_SCALE);

        let free = m.exact_target(2.0, 1.0, None);
        assert!(!free.was_capped);
        assert_eq!(free.scale, 2.0);
    }

    #[test]
    fn test_adaptive_tile_size_shrinks_with_zoom() {
        let m = model();
        let low = m.adaptive_tile_size(1.0, 1.0);
        let high = m.adaptive_tile_size(32.0, 2.0);
        assert!(low >= high);
        assert!(TILE_SIZES.contains(&low));
        assert!(TILE_SIZES.contains(&high));
    }

    #[test]
    fn test_adaptive_tile_size_boundary_prefers_larger() {
        // 8192-pixel budget: at a target tier of 16, both 512 and 256 fit
        // (512 * 16 = 8192 exactly); the larger size must win the tie.
        let m = model();
        assert_eq!(m.adaptive_tile_size(16.0, 1.0), 512);
    }

    #[test]
    fn test_progressive_tiers_strictly_between() {
        let m = model();
        let tiers = m.progressive_tiers(2.0, 16.0);
        assert_eq!(tiers, vec![3.0, 4.0, 6.0, 8.0, 12.0]);
        assert!(m.progressive_tiers(16.0, 2.0).is_empty());
        assert!(m.progressive_tiers(4.0, 4.0).is_empty());
    }

    #[test]
    fn test_caps_apply_in_every_path() {
        let low = ScaleModel::new(&TierSet::PowerOfTwo, DeviceProfile::for_tier(DeviceTier::Low));
        // Low tier: memory cap 16, tile-pixel budget 4096.
        let target = low.target_tier(40.0, 2.0, None);
        assert!(target.tier <= 16.0);

        let exact = low.exact_target(40.0, 2.0, None);
        assert!(exact.scale <= 16.0);
        assert!(exact.was_capped);
    }
}
