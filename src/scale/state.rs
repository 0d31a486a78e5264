//! Single-writer authority on scale state
//!
//! One manager exists per open document. It consumes the zoom gesture
//! stream, owns the monotonic epoch that stamps every render request, and
//! publishes a [`ScaleState`] stream to subscribers. The compositor and the
//! viewport strategy read from here; nothing else writes scale.

use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::Instant;

use fxhash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::core::config::{QualityFalloff, ScaleConfig};
use crate::core::constants::{
    ADAPTIVE_TO_TILED_ZOOM, EPOCH_MIN_INTERVAL, FULL_TO_ADAPTIVE_ZOOM, MAX_TILED_ZOOM,
    MODE_HYSTERESIS,
};
use crate::core::coords::{quantize_scale, scale_key, DocumentId, TileCoordinate};
use crate::core::geometry::Point;
use crate::device::DeviceProfile;
use crate::render::types::RenderPriority;
use crate::scale::model::ScaleModel;
use crate::zoom::events::{GestureKind, ZoomState};

/// Coarse rendering strategy, selected by zoom with hysteresis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderMode {
    FullPage,
    Adaptive,
    Tiled,
}

/// Where the zoom gesture currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GesturePhase {
    Idle,
    Active,
    Settling,
}

/// Published scale state
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleState {
    /// Canonical per-document rendering scale (zoom * dpr, capped)
    pub scale: f64,
    /// Monotonic counter stamping every render request
    pub epoch: u64,
    pub render_mode: RenderMode,
    pub gesture_phase: GesturePhase,
    pub css_stretch: f64,
    /// The recognized tier backing `scale`, when tier mode is active
    pub scale_tier: Option<f64>,
    /// Frozen at idle -> active, released at the return to idle
    pub committed_scale: f64,
    pub pending_scale: f64,
    pub committed_render_mode: RenderMode,
    pub pending_render_mode: RenderMode,
    /// Gesture pivot in document coordinates
    pub focal_point: Option<Point>,
}

/// Atomic read of the fields a render request must be stamped with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleSnapshot {
    pub scale: f64,
    pub epoch: u64,
    pub dpr: f64,
    pub render_mode: RenderMode,
    pub css_stretch: f64,
    pub render_params_id: u64,
}

/// Hash of the scale/layout parameters that must stay constant across one
/// render batch.
pub fn render_params_id(epoch: u64, scale: f64, dpr: f64, mode: RenderMode) -> u64 {
    let mut hasher = FxHasher::default();
    epoch.hash(&mut hasher);
    scale_key(scale).hash(&mut hasher);
    scale_key(dpr).hash(&mut hasher);
    mode.hash(&mut hasher);
    hasher.finish()
}

struct StateInner {
    document: DocumentId,
    state: ScaleState,
    zoom: f64,
    gesture_kind: GestureKind,
    last_epoch_bump: Option<Instant>,
    epoch_dirty: bool,
}

type Listener = Box<dyn Fn(&ScaleState) + Send + Sync>;

pub struct ScaleStateManager {
    config: ScaleConfig,
    model: ScaleModel,
    dpr: f64,
    inner: Mutex<StateInner>,
    listeners: Mutex<Vec<Listener>>,
}

impl ScaleStateManager {
    pub fn new(
        document: impl Into<DocumentId>,
        dpr: f64,
        config: ScaleConfig,
        device: DeviceProfile,
    ) -> Self {
        let model = ScaleModel::new(&config.tier_set, device);
        let initial = model.exact_target(1.0, dpr, Some(config.max_zoom));

        let state = ScaleState {
            scale: initial.scale,
            epoch: 0,
            render_mode: RenderMode::FullPage,
            gesture_phase: GesturePhase::Idle,
            css_stretch: initial.css_stretch,
            scale_tier: None,
            committed_scale: initial.scale,
            pending_scale: initial.scale,
            committed_render_mode: RenderMode::FullPage,
            pending_render_mode: RenderMode::FullPage,
            focal_point: None,
        };

        Self {
            config,
            model,
            dpr,
            inner: Mutex::new(StateInner {
                document: document.into(),
                state,
                zoom: 1.0,
                gesture_kind: GestureKind::Programmatic,
                last_epoch_bump: None,
                epoch_dirty: false,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn document(&self) -> DocumentId {
        self.inner.lock().expect("scale state poisoned").document.clone()
    }

    pub fn dpr(&self) -> f64 {
        self.dpr
    }

    pub fn model(&self) -> &ScaleModel {
        &self.model
    }

    /// Subscribe to scale-state changes. Listener panics are isolated and
    /// cannot corrupt manager state.
    pub fn subscribe(&self, listener: impl Fn(&ScaleState) + Send + Sync + 'static) {
        self.listeners
            .lock()
            .expect("listener list poisoned")
            .push(Box::new(listener));
    }

    fn notify(&self, state: &ScaleState) {
        let listeners = self.listeners.lock().expect("listener list poisoned");
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                log::warn!("scale-state listener panicked");
            }
        }
    }

    /// Render mode for `zoom` given the current mode, with hysteresis:
    /// upward transitions require exceeding the threshold by the hysteresis
    /// band, downward transitions require falling below it by the band.
    fn next_mode(current: RenderMode, zoom: f64) -> RenderMode {
        if zoom >= MAX_TILED_ZOOM {
            // Tile coordinate math is unreliable out here.
            return RenderMode::FullPage;
        }

        let up = 1.0 + MODE_HYSTERESIS;
        let down = 1.0 - MODE_HYSTERESIS;

        match current {
            RenderMode::FullPage => {
                if zoom > ADAPTIVE_TO_TILED_ZOOM * up {
                    RenderMode::Tiled
                } else if zoom > FULL_TO_ADAPTIVE_ZOOM * up {
                    RenderMode::Adaptive
                } else {
                    RenderMode::FullPage
                }
            }
            RenderMode::Adaptive => {
                if zoom > ADAPTIVE_TO_TILED_ZOOM * up {
                    RenderMode::Tiled
                } else if zoom < FULL_TO_ADAPTIVE_ZOOM * down {
                    RenderMode::FullPage
                } else {
                    RenderMode::Adaptive
                }
            }
            RenderMode::Tiled => {
                if zoom < FULL_TO_ADAPTIVE_ZOOM * down {
                    RenderMode::FullPage
                } else if zoom < ADAPTIVE_TO_TILED_ZOOM * down {
                    RenderMode::Adaptive
                } else {
                    RenderMode::Tiled
                }
            }
        }
    }

    /// Drive the manager from one gesture-stream event.
    ///
    /// Recomputes scale, stretch, mode and phase; commits at gesture start,
    /// releases when the gesture has fully settled; bumps the epoch iff
    /// scale or mode changed and the rate limit permits.
    pub fn sync_from_zoom(&self, zoom_state: &ZoomState) {
        let mut inner = self.inner.lock().expect("scale state poisoned");
        let now = zoom_state.timestamp;

        let zoom = if zoom_state.zoom.is_finite() && zoom_state.zoom > 0.0 {
            zoom_state.zoom
        } else {
            log::warn!("invalid zoom {} in gesture stream, clamping", zoom_state.zoom);
            1.0
        };

        inner.zoom = zoom;
        inner.gesture_kind = zoom_state.kind;

        // Phase transitions. Scale and mode are frozen in `committed_*` at
        // idle -> active and released only once the gesture returns to idle
        // (via finish_settling).
        let prev_phase = inner.state.gesture_phase;
        match (prev_phase, zoom_state.gesture_active) {
            (GesturePhase::Idle, true) => {
                inner.state.committed_scale = inner.state.scale;
                inner.state.committed_render_mode = inner.state.render_mode;
                inner.state.gesture_phase = GesturePhase::Active;
            }
            (GesturePhase::Settling, true) => {
                inner.state.gesture_phase = GesturePhase::Active;
            }
            (GesturePhase::Active, false) => {
                inner.state.gesture_phase = GesturePhase::Settling;
            }
            _ => {}
        }

        let mode = Self::next_mode(inner.state.pending_render_mode, zoom);

        let (scale, css_stretch, tier) = if self.config.use_exact_scale {
            let exact = self.model.exact_target(zoom, self.dpr, Some(self.config.max_zoom));
            (exact.scale, exact.css_stretch, None)
        } else {
            let target = self.model.target_tier(zoom, self.dpr, Some(self.config.max_zoom));
            (target.tier, target.css_stretch, Some(target.tier))
        };

        let scale_changed = scale_key(scale) != scale_key(inner.state.pending_scale);
        let mode_changed = mode != inner.state.pending_render_mode;

        inner.state.pending_scale = scale;
        inner.state.pending_render_mode = mode;
        inner.state.scale = scale;
        inner.state.render_mode = mode;
        inner.state.css_stretch = css_stretch;
        inner.state.scale_tier = tier;

        if zoom_state.kind != GestureKind::Programmatic {
            inner.state.focal_point = zoom_state.focal_point;
        }

        if scale_changed || mode_changed {
            inner.epoch_dirty = true;
        }
        Self::flush_epoch(&mut inner, now);

        let changed =
            scale_changed || mode_changed || prev_phase != inner.state.gesture_phase;
        if changed {
            let state = inner.state.clone();
            drop(inner);
            self.notify(&state);
        }
    }

    fn flush_epoch(inner: &mut StateInner, now: Instant) {
        if !inner.epoch_dirty {
            return;
        }
        let allowed = match inner.last_epoch_bump {
            Some(last) => now.duration_since(last) >= EPOCH_MIN_INTERVAL,
            None => true,
        };
        if allowed {
            inner.state.epoch += 1;
            inner.last_epoch_bump = Some(now);
            inner.epoch_dirty = false;
        }
    }

    /// Called by the orchestrator when settling completes: the gesture is
    /// over, commitments are released.
    pub fn finish_settling(&self) {
        let mut inner = self.inner.lock().expect("scale state poisoned");
        if inner.state.gesture_phase != GesturePhase::Settling {
            return;
        }
        inner.state.gesture_phase = GesturePhase::Idle;
        inner.state.committed_scale = inner.state.pending_scale;
        inner.state.committed_render_mode = inner.state.pending_render_mode;
        let state = inner.state.clone();
        drop(inner);
        self.notify(&state);
    }

    /// Point the manager at a different document; invalidates all
    /// outstanding work by bumping the epoch.
    pub fn swap_document(&self, document: impl Into<DocumentId>) {
        let mut inner = self.inner.lock().expect("scale state poisoned");
        inner.document = document.into();
        inner.state.epoch += 1;
        inner.last_epoch_bump = Some(Instant::now());
        inner.epoch_dirty = false;
    }

    /// Atomic read of the request-stamping fields.
    pub fn capture_snapshot(&self) -> ScaleSnapshot {
        let inner = self.inner.lock().expect("scale state poisoned");
        let s = &inner.state;
        ScaleSnapshot {
            scale: s.scale,
            epoch: s.epoch,
            dpr: self.dpr,
            render_mode: s.render_mode,
            css_stretch: s.css_stretch,
            render_params_id: render_params_id(s.epoch, s.scale, self.dpr, s.render_mode),
        }
    }

    pub fn current_state(&self) -> ScaleState {
        self.inner.lock().expect("scale state poisoned").state.clone()
    }

    pub fn current_epoch(&self) -> u64 {
        self.inner.lock().expect("scale state poisoned").state.epoch
    }

    /// True iff `epoch` is still the current epoch; the compositor gates
    /// stale tiles with this at draw time.
    pub fn validate_epoch(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    /// Stricter variant comparing the full render-parameter hash.
    pub fn validate_render_params(&self, id: u64) -> bool {
        self.capture_snapshot().render_params_id == id
    }

    /// Radial focal-point priority: within one tile of the focal point a
    /// tile is critical, within two high, within four medium, otherwise low.
    /// Without an active zoom-type focal point everything is medium.
    pub fn tile_priority(&self, tile: &TileCoordinate, page_origin: Point) -> RenderPriority {
        let inner = self.inner.lock().expect("scale state poisoned");

        let focal = match (inner.state.focal_point, inner.gesture_kind) {
            (Some(focal), GestureKind::Pinch)
            | (Some(focal), GestureKind::Wheel)
            | (Some(focal), GestureKind::DoubleTap) => focal,
            _ => return RenderPriority::Medium,
        };

        let distance = Self::focal_distance_tiles(tile, page_origin, focal);
        if distance <= 1.0 {
            RenderPriority::Critical
        } else if distance <= 2.0 {
            RenderPriority::High
        } else if distance <= 4.0 {
            RenderPriority::Medium
        } else {
            RenderPriority::Low
        }
    }

    /// Scale a tile should render at, with optional quality falloff for
    /// tiles far from the focal point, compensated by a per-tile stretch.
    pub fn tile_scale(&self, tile: &TileCoordinate, page_origin: Point) -> (f64, f64) {
        let inner = self.inner.lock().expect("scale state poisoned");
        let base = inner.state.scale;
        let raw = inner.zoom * self.dpr;

        let focal = match inner.state.focal_point {
            Some(focal) if self.config.quality_falloff != QualityFalloff::None => focal,
            _ => return (base, raw / base),
        };

        let distance = Self::focal_distance_tiles(tile, page_origin, focal);
        let normalized = (distance / self.config.falloff_radius).min(1.0);
        let factor = match self.config.quality_falloff {
            QualityFalloff::None => 1.0,
            QualityFalloff::Linear => 1.0 - 0.5 * normalized,
            QualityFalloff::Quadratic => 1.0 - 0.5 * normalized * normalized,
        };

        let scale = quantize_scale((base * factor).max(0.25));
        let stretch = (raw / scale).min(self.config.max_css_stretch);
        (scale, stretch)
    }

    /// Distance from the focal point to the tile center, in tile units.
    fn focal_distance_tiles(tile: &TileCoordinate, page_origin: Point, focal: Point) -> f64 {
        let region = tile.page_region();
        let center = Point::new(
            page_origin.x + region.x + region.width / 2.0,
            page_origin.y + region.y + region.height / 2.0,
        );
        center.distance_to(&focal) / region.width.max(f64::EPSILON)
    }
}
