//! Request and result types shared across the render pipeline

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::tiered::CachedTile;
use crate::core::coords::{DocumentId, TileCoordinate};

/// Priority for render requests (higher number = more urgent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RenderPriority {
    /// Offscreen prefetch and background upgrades
    Low = 0,
    /// Near-viewport tiles
    Medium = 1,
    /// Viewport tiles slightly ahead of the scroll
    High = 2,
    /// Tiles under the focal point or viewport center (highest priority)
    Critical = 3,
}

impl RenderPriority {
    pub const COUNT: usize = 4;

    /// Lane index, highest priority first.
    pub fn lane(&self) -> usize {
        RenderPriority::Critical as usize - *self as usize
    }

    pub fn all_descending() -> [RenderPriority; 4] {
        [
            RenderPriority::Critical,
            RenderPriority::High,
            RenderPriority::Medium,
            RenderPriority::Low,
        ]
    }
}

/// A unit of work for the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum RenderRequest {
    Tile {
        tile: TileCoordinate,
        priority: RenderPriority,
        document: DocumentId,
        session_id: u32,
        scale_epoch: u64,
        render_params_id: u64,
        css_stretch: Option<f64>,
    },
    Page {
        page: u32,
        scale: f64,
        priority: RenderPriority,
        document: DocumentId,
        session_id: u32,
    },
}

impl RenderRequest {
    pub fn priority(&self) -> RenderPriority {
        match self {
            Self::Tile { priority, .. } | Self::Page { priority, .. } => *priority,
        }
    }

    pub fn session_id(&self) -> u32 {
        match self {
            Self::Tile { session_id, .. } | Self::Page { session_id, .. } => *session_id,
        }
    }
}

/// Failure kinds for render requests. These are carried inside
/// [`RenderResult`]; no public coordinator call ever propagates one as an
/// `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("Aborted")]
    Aborted,

    #[error("Dropped")]
    Dropped,

    #[error("rasterizer failed: {0}")]
    Rasterizer(String),

    #[error("page classification failed: {0}")]
    Classification(String),

    #[error("jpeg extraction failed: {0}")]
    JpegExtraction(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Outcome of one render request
#[derive(Debug, Clone)]
pub struct RenderResult {
    pub success: bool,
    pub data: Option<CachedTile>,
    pub from_cache: bool,
    pub is_fallback: bool,
    /// Scale the returned bitmap was actually rendered at
    pub actual_scale: Option<f64>,
    /// Factor the compositor must stretch the bitmap by
    pub css_stretch: Option<f64>,
    /// Coordinates of the served tile when it comes from a different grid
    pub fallback_tile: Option<TileCoordinate>,
    pub scale_epoch: u64,
    pub render_params_id: u64,
    pub error: Option<RenderError>,
}

impl RenderResult {
    pub fn rendered(data: CachedTile, scale: f64, scale_epoch: u64, render_params_id: u64) -> Self {
        Self {
            success: true,
            data: Some(data),
            from_cache: false,
            is_fallback: false,
            actual_scale: Some(scale),
            css_stretch: Some(1.0),
            fallback_tile: None,
            scale_epoch,
            render_params_id,
            error: None,
        }
    }

    pub fn from_cache(data: CachedTile, scale: f64, scale_epoch: u64, render_params_id: u64) -> Self {
        Self {
            from_cache: true,
            ..Self::rendered(data, scale, scale_epoch, render_params_id)
        }
    }

    pub fn fallback(
        data: CachedTile,
        actual_scale: f64,
        css_stretch: f64,
        fallback_tile: TileCoordinate,
        scale_epoch: u64,
        render_params_id: u64,
    ) -> Self {
        Self {
            success: true,
            data: Some(data),
            from_cache: true,
            is_fallback: true,
            actual_scale: Some(actual_scale),
            css_stretch: Some(css_stretch),
            fallback_tile: Some(fallback_tile),
            scale_epoch,
            render_params_id,
            error: None,
        }
    }

    pub fn failed(error: RenderError, scale_epoch: u64, render_params_id: u64) -> Self {
        Self {
            success: false,
            data: None,
            from_cache: false,
            is_fallback: false,
            actual_scale: None,
            css_stretch: None,
            fallback_tile: None,
            scale_epoch,
            render_params_id,
            error: Some(error),
        }
    }
}

/// Notification that a tile for `page` landed in the cache
#[derive(Debug, Clone, PartialEq)]
pub struct TileReady {
    pub document: DocumentId,
    pub page: u32,
    pub priority: RenderPriority,
    pub scale_epoch: u64,
}

/// Cooperative cancellation flag shared between a request and its owner.
///
/// Abort is checked before acquiring a permit, after acquiring, and by
/// rasterizers that support it.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Whether two handles control the same request.
    pub fn ptr_eq(&self, other: &AbortHandle) -> bool {
        Arc::ptr_eq(&self.aborted, &other.aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(RenderPriority::Critical > RenderPriority::High);
        assert!(RenderPriority::High > RenderPriority::Medium);
        assert!(RenderPriority::Medium > RenderPriority::Low);
    }

    #[test]
    fn test_lane_indices() {
        assert_eq!(RenderPriority::Critical.lane(), 0);
        assert_eq!(RenderPriority::High.lane(), 1);
        assert_eq!(RenderPriority::Medium.lane(), 2);
        assert_eq!(RenderPriority::Low.lane(), 3);
    }

    #[test]
    fn test_abort_handle_is_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_aborted());
        handle.abort();
        assert!(clone.is_aborted());
    }
}
