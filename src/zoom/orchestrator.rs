//! Gesture state machine governing when renders may run
//!
//! ```text
//! IDLE --zoom input--> ZOOMING --quiet ~300ms--> SETTLING --~200ms--> RENDERING --complete--> IDLE
//!                         ^                          |
//!                         +------- resume -----------+
//! ```
//!
//! The orchestrator owns the gesture state machine; the scale manager owns
//! scale, epoch and focal point. Compositor render paths consult
//! [`ZoomOrchestrator::can_render`]. The machine is clocked by
//! [`ZoomOrchestrator::tick`], which the host calls from its frame loop.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::config::OrchestratorConfig;
use crate::render::types::AbortHandle;
use crate::scale::state::ScaleStateManager;
use crate::zoom::events::{ZoomSnapshot, ZoomState};

/// Gesture state-machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomPhase {
    Idle,
    Zooming,
    Settling,
    Rendering,
}

/// Which render pass is in flight during RENDERING
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhaseKind {
    Intermediate,
    Final,
}

type MassAbortHook = Box<dyn Fn(f64, Option<f64>) + Send + Sync>;

struct OrchestratorInner {
    phase: ZoomPhase,
    snapshot: Option<ZoomSnapshot>,
    last_input: Option<Instant>,
    settling_entered: Option<Instant>,
    rendering_entered: Option<Instant>,
    last_zoom: f64,
    /// Sign of the most recent zoom delta, for rebound suppression
    last_direction: f64,
    phase_abort: Option<AbortHandle>,
    render_phase: Option<RenderPhaseKind>,
}

pub struct ZoomOrchestrator {
    config: OrchestratorConfig,
    scale_manager: Arc<ScaleStateManager>,
    inner: Mutex<OrchestratorInner>,
    mass_abort: Mutex<Option<MassAbortHook>>,
}

impl ZoomOrchestrator {
    pub fn new(config: OrchestratorConfig, scale_manager: Arc<ScaleStateManager>) -> Self {
        Self {
            config,
            scale_manager,
            inner: Mutex::new(OrchestratorInner {
                phase: ZoomPhase::Idle,
                snapshot: None,
                last_input: None,
                settling_entered: None,
                rendering_entered: None,
                last_zoom: 1.0,
                last_direction: 0.0,
                phase_abort: None,
                render_phase: None,
            }),
            mass_abort: Mutex::new(None),
        }
    }

    /// Install the hook fired when a gesture starts with a large scale
    /// jump; typically wired to the coordinator's scale-change abort.
    pub fn on_mass_abort(&self, hook: impl Fn(f64, Option<f64>) + Send + Sync + 'static) {
        *self.mass_abort.lock().expect("orchestrator poisoned") = Some(Box::new(hook));
    }

    /// Feed one gesture-stream event through the state machine and into the
    /// scale manager.
    pub fn handle_zoom(&self, event: &ZoomState) {
        let now = event.timestamp;
        let mut mass_abort_args = None;

        {
            let mut inner = self.inner.lock().expect("orchestrator poisoned");
            let delta = event.zoom - inner.last_zoom;
            let direction = if delta > 0.0 {
                1.0
            } else if delta < 0.0 {
                -1.0
            } else {
                0.0
            };

            // Rebound suppression: right after rendering starts, an
            // opposite-direction zoom event is most likely a trackpad
            // artifact and is dropped.
            if inner.phase == ZoomPhase::Rendering {
                let rebound_window = Duration::from_millis(self.config.rebound_window_ms);
                let in_window = inner
                    .rendering_entered
                    .map(|at| now.duration_since(at) < rebound_window)
                    .unwrap_or(false);
                if in_window && direction != 0.0 && direction == -inner.last_direction {
                    log::debug!("suppressing rebound zoom event ({} -> {})", inner.last_zoom, event.zoom);
                    return;
                }
            }

            match inner.phase {
                ZoomPhase::Idle => {
                    inner.snapshot = Some(ZoomSnapshot::capture(event));
                    inner.phase = ZoomPhase::Zooming;

                    // A jump of more than one tier invalidates pending work.
                    let current = self.scale_manager.capture_snapshot().scale;
                    let requested = event.zoom * self.scale_manager.dpr();
                    let ratio = if current > 0.0 {
                        (requested / current).max(current / requested)
                    } else {
                        f64::INFINITY
                    };
                    if ratio > 1.5 {
                        mass_abort_args = Some((requested, Some(current)));
                    }
                }
                ZoomPhase::Settling => {
                    // Resume: keep the original snapshot and focal point,
                    // abort only the phase controller.
                    if let Some(abort) = inner.phase_abort.take() {
                        abort.abort();
                    }
                    inner.phase = ZoomPhase::Zooming;
                    inner.settling_entered = None;
                }
                ZoomPhase::Rendering => {
                    // A fresh gesture interrupts the render phase.
                    if let Some(abort) = inner.phase_abort.take() {
                        abort.abort();
                    }
                    inner.render_phase = None;
                    inner.snapshot = Some(ZoomSnapshot::capture(event));
                    inner.phase = ZoomPhase::Zooming;
                }
                ZoomPhase::Zooming => {}
            }

            inner.last_input = Some(now);
            if direction != 0.0 {
                inner.last_direction = direction;
            }
            inner.last_zoom = event.zoom;
        }

        if let Some((new_scale, old_scale)) = mass_abort_args {
            if let Some(hook) = self.mass_abort.lock().expect("orchestrator poisoned").as_ref() {
                hook(new_scale, old_scale);
            }
        }

        self.scale_manager.sync_from_zoom(event);
    }

    /// Advance the clock. Returns the new phase when a transition fired.
    pub fn tick(&self, now: Instant) -> Option<ZoomPhase> {
        let transition = {
            let mut inner = self.inner.lock().expect("orchestrator poisoned");
            match inner.phase {
                ZoomPhase::Zooming => {
                    let quiet = Duration::from_millis(self.config.gesture_end_delay_ms);
                    let is_quiet = inner
                        .last_input
                        .map(|at| now.duration_since(at) >= quiet)
                        .unwrap_or(false);
                    if is_quiet {
                        inner.phase = ZoomPhase::Settling;
                        inner.settling_entered = Some(now);
                        Some(ZoomPhase::Settling)
                    } else {
                        None
                    }
                }
                ZoomPhase::Settling => {
                    let settle = Duration::from_millis(self.config.settling_delay_ms);
                    let settled = inner
                        .settling_entered
                        .map(|at| now.duration_since(at) >= settle)
                        .unwrap_or(false);
                    if settled {
                        inner.phase = ZoomPhase::Rendering;
                        inner.rendering_entered = Some(now);
                        Some(ZoomPhase::Rendering)
                    } else {
                        None
                    }
                }
                ZoomPhase::Idle | ZoomPhase::Rendering => None,
            }
        };

        if transition == Some(ZoomPhase::Rendering) {
            // The gesture is over; release the scale commitments.
            self.scale_manager.finish_settling();
        }
        transition
    }

    /// Convenience tick with the real clock.
    pub fn update(&self) -> Option<ZoomPhase> {
        self.tick(Instant::now())
    }

    /// Renders may only run while idle or in the render phase.
    pub fn can_render(&self) -> bool {
        let phase = self.phase();
        phase == ZoomPhase::Idle || phase == ZoomPhase::Rendering
    }

    pub fn phase(&self) -> ZoomPhase {
        self.inner.lock().expect("orchestrator poisoned").phase
    }

    /// The camera snapshot captured at gesture start, stable for the whole
    /// gesture including settling resumes.
    pub fn snapshot(&self) -> Option<ZoomSnapshot> {
        self.inner.lock().expect("orchestrator poisoned").snapshot.clone()
    }

    /// Begin a render pass; the returned handle aborts just this pass.
    pub fn start_render_phase(&self, kind: RenderPhaseKind) -> AbortHandle {
        let mut inner = self.inner.lock().expect("orchestrator poisoned");
        if let Some(previous) = inner.phase_abort.take() {
            previous.abort();
        }
        let handle = AbortHandle::new();
        inner.phase_abort = Some(handle.clone());
        inner.render_phase = Some(kind);
        handle
    }

    /// Complete the current render pass; finishing the final pass returns
    /// the machine to idle.
    pub fn complete_render_phase(&self) {
        let mut inner = self.inner.lock().expect("orchestrator poisoned");
        let finished = inner.render_phase.take();
        inner.phase_abort = None;
        if inner.phase == ZoomPhase::Rendering && finished == Some(RenderPhaseKind::Final) {
            inner.phase = ZoomPhase::Idle;
            inner.snapshot = None;
        }
    }

    pub fn render_phase(&self) -> Option<RenderPhaseKind> {
        self.inner.lock().expect("orchestrator poisoned").render_phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ScaleConfig;
    use crate::core::geometry::Point;
    use crate::device::{DeviceProfile, DeviceTier};
    use crate::zoom::events::GestureKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator() -> ZoomOrchestrator {
        let manager = Arc::new(ScaleStateManager::new(
            "doc",
            2.0,
            ScaleConfig::default(),
            DeviceProfile::for_tier(DeviceTier::High),
        ));
        ZoomOrchestrator::new(OrchestratorConfig::default(), manager)
    }

    fn pinch(zoom: f64, at: Instant) -> ZoomState {
        ZoomState::new(zoom, at)
            .active(GestureKind::Pinch)
            .with_focal_point(Point::new(100.0, 100.0))
    }

    #[test]
    fn test_full_phase_cycle() {
        let orch = orchestrator();
        let t0 = Instant::now();
        assert_eq!(orch.phase(), ZoomPhase::Idle);
        assert!(orch.can_render());

        orch.handle_zoom(&pinch(2.0, t0));
        assert_eq!(orch.phase(), ZoomPhase::Zooming);
        assert!(!orch.can_render());

        // Not quiet yet.
        assert_eq!(orch.tick(t0 + Duration::from_millis(100)), None);
        assert_eq!(orch.phase(), ZoomPhase::Zooming);

        // 300ms of silence ends the gesture.
        assert_eq!(
            orch.tick(t0 + Duration::from_millis(310)),
            Some(ZoomPhase::Settling)
        );
        assert!(!orch.can_render());

        // 200ms later rendering may start.
        assert_eq!(
            orch.tick(t0 + Duration::from_millis(520)),
            Some(ZoomPhase::Rendering)
        );
        assert!(orch.can_render());

        orch.start_render_phase(RenderPhaseKind::Final);
        orch.complete_render_phase();
        assert_eq!(orch.phase(), ZoomPhase::Idle);
    }

    #[test]
    fn test_resume_from_settling_keeps_snapshot() {
        let orch = orchestrator();
        let t0 = Instant::now();

        orch.handle_zoom(&pinch(2.0, t0));
        let original = orch.snapshot().unwrap();

        orch.tick(t0 + Duration::from_millis(310));
        assert_eq!(orch.phase(), ZoomPhase::Settling);

        // Input during settling resumes the same gesture.
        orch.handle_zoom(&pinch(2.5, t0 + Duration::from_millis(320)));
        assert_eq!(orch.phase(), ZoomPhase::Zooming);
        let resumed = orch.snapshot().unwrap();
        assert_eq!(resumed.zoom, original.zoom);
        assert_eq!(resumed.focal_point, original.focal_point);
    }

    #[test]
    fn test_intermediate_phase_does_not_return_to_idle() {
        let orch = orchestrator();
        let t0 = Instant::now();
        orch.handle_zoom(&pinch(2.0, t0));
        orch.tick(t0 + Duration::from_millis(310));
        orch.tick(t0 + Duration::from_millis(520));
        assert_eq!(orch.phase(), ZoomPhase::Rendering);

        orch.start_render_phase(RenderPhaseKind::Intermediate);
        orch.complete_render_phase();
        assert_eq!(orch.phase(), ZoomPhase::Rendering);

        orch.start_render_phase(RenderPhaseKind::Final);
        orch.complete_render_phase();
        assert_eq!(orch.phase(), ZoomPhase::Idle);
    }

    #[test]
    fn test_mass_abort_on_large_jump() {
        let orch = orchestrator();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        orch.on_mass_abort(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Scale starts at 2 (zoom 1 * dpr 2); zoom 8 requests scale 16.
        orch.handle_zoom(&pinch(8.0, Instant::now()));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_small_jump_preserves_work() {
        let orch = orchestrator();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        orch.on_mass_abort(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // zoom 1.2 -> scale 2.4 vs current 2.0: ratio 1.2, under the bar.
        orch.handle_zoom(&pinch(1.2, Instant::now()));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rebound_suppression() {
        let orch = orchestrator();
        let t0 = Instant::now();

        // Zoom in, settle, start rendering.
        orch.handle_zoom(&pinch(2.0, t0));
        orch.handle_zoom(&pinch(4.0, t0 + Duration::from_millis(50)));
        orch.tick(t0 + Duration::from_millis(360));
        orch.tick(t0 + Duration::from_millis(570));
        assert_eq!(orch.phase(), ZoomPhase::Rendering);

        // Opposite-direction event inside the rebound window is dropped.
        orch.handle_zoom(&pinch(3.8, t0 + Duration::from_millis(580)));
        assert_eq!(orch.phase(), ZoomPhase::Rendering);

        // Same-direction input is a genuine new gesture.
        orch.handle_zoom(&pinch(4.5, t0 + Duration::from_millis(590)));
        assert_eq!(orch.phase(), ZoomPhase::Zooming);
    }

    #[test]
    fn test_phase_abort_handle_fires_on_restart() {
        let orch = orchestrator();
        let t0 = Instant::now();
        orch.handle_zoom(&pinch(2.0, t0));
        orch.tick(t0 + Duration::from_millis(310));
        orch.tick(t0 + Duration::from_millis(520));

        let handle = orch.start_render_phase(RenderPhaseKind::Intermediate);
        assert!(!handle.is_aborted());

        // A new gesture aborts the in-flight phase controller.
        orch.handle_zoom(&pinch(6.0, t0 + Duration::from_millis(900)));
        assert!(handle.is_aborted());
    }
}
