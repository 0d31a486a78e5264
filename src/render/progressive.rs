//! Progressive tile refinement across scale tiers
//!
//! For a logical tile position the renderer walks an ascending tier ladder
//! from the best cached scale up to the target, yielding each completed
//! tier so the compositor can sharpen the screen incrementally. Per-tier
//! failures are logged and skipped; aborting ends the stream immediately.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::{self, StreamExt};

use crate::cache::tiered::CachedTile;
use crate::core::config::OrchestratorConfig;
use crate::core::coords::{TileCoordinate, TilePosition};
use crate::prelude::HashMap;
use crate::render::coordinator::RenderCoordinator;
use crate::render::types::{AbortHandle, RenderPriority};
use crate::runtime::async_utils::async_delay;
use crate::scale::model::ScaleModel;

/// One completed tier of a progressive sequence
#[derive(Debug, Clone)]
pub struct ProgressiveUpdate {
    pub tile: TileCoordinate,
    pub scale: f64,
    pub data: CachedTile,
    pub is_final: bool,
    /// Stretch that makes this tier appear at the target scale
    pub css_scale_factor: f64,
}

type ActiveMap = Arc<Mutex<HashMap<TilePosition, AbortHandle>>>;

pub struct ProgressiveRenderer {
    coordinator: Arc<RenderCoordinator>,
    model: ScaleModel,
    skip_intermediate_threshold: f64,
    intermediate_delay: Duration,
    active: ActiveMap,
}

impl ProgressiveRenderer {
    pub fn new(coordinator: Arc<RenderCoordinator>, config: &OrchestratorConfig) -> Self {
        let model = coordinator.scale_manager().model().clone();
        Self {
            coordinator,
            model,
            skip_intermediate_threshold: config.skip_intermediate_threshold,
            intermediate_delay: Duration::from_millis(config.intermediate_delay_ms),
            active: Arc::new(Mutex::new(HashMap::default())),
        }
    }

    /// The ascending tier ladder from the best cached scale to the target.
    /// Tiers that would improve on their predecessor by less than the skip
    /// threshold are dropped; the target itself is always last.
    fn plan(&self, cached: Option<f64>, target: f64) -> Vec<f64> {
        // With a cold cache there is no point climbing the whole ladder;
        // two tiers below the target gives the compositor something fast.
        let base = cached.unwrap_or(target / 4.0);
        if base >= target {
            return Vec::new();
        }

        let mut plan = Vec::new();
        let mut current = base;
        for tier in self.model.progressive_tiers(base, target) {
            if tier / current <= self.skip_intermediate_threshold {
                continue;
            }
            plan.push(tier);
            current = tier;
        }
        plan.push(target);
        plan
    }

    /// Drive one tile position from its best cached tier up to
    /// `target_tier`, yielding every completed tier on the returned stream.
    pub fn render_tile_progressive(
        &self,
        position: TilePosition,
        tile_size: u32,
        target_tier: f64,
        abort: Option<AbortHandle>,
    ) -> UnboundedReceiver<ProgressiveUpdate> {
        let (tx, rx) = unbounded();
        let abort = abort.unwrap_or_default();
        self.active
            .lock()
            .expect("progressive state poisoned")
            .insert(position.clone(), abort.clone());

        let cached = self
            .coordinator
            .cache()
            .best_scale_at(&position, tile_size);
        let plan = self.plan(cached, target_tier);
        let coordinator = self.coordinator.clone();
        let delay = self.intermediate_delay;
        let active = self.active.clone();

        crate::runtime::spawn(async move {
            run_sequence(
                coordinator,
                position.clone(),
                tile_size,
                plan,
                target_tier,
                delay,
                abort.clone(),
                tx,
            )
            .await;

            let mut active = active.lock().expect("progressive state poisoned");
            let is_ours = active
                .get(&position)
                .map(|current| current.ptr_eq(&abort))
                .unwrap_or(false);
            if is_ours {
                active.remove(&position);
            }
        });

        rx
    }

    /// Batched variant: all tiles advance through one tier before any tile
    /// moves to the next, at most `max_concurrent` rasterizing at once.
    pub fn render_batch_progressive(
        &self,
        positions: Vec<TilePosition>,
        tile_size: u32,
        target_tier: f64,
        max_concurrent: usize,
        abort: Option<AbortHandle>,
    ) -> UnboundedReceiver<ProgressiveUpdate> {
        let (tx, rx) = unbounded();
        let abort = abort.unwrap_or_default();
        {
            let mut active = self.active.lock().expect("progressive state poisoned");
            for position in &positions {
                active.insert(position.clone(), abort.clone());
            }
        }

        // One shared ladder, from the worst-covered tile upward.
        let lowest_cached = positions
            .iter()
            .filter_map(|p| self.coordinator.cache().best_scale_at(p, tile_size))
            .fold(None, |acc: Option<f64>, s| {
                Some(acc.map_or(s, |a| a.min(s)))
            });
        let plan = self.plan(lowest_cached, target_tier);
        let coordinator = self.coordinator.clone();

        crate::runtime::spawn(async move {
            for (index, scale) in plan.iter().enumerate() {
                if abort.is_aborted() {
                    break;
                }
                let is_final = index + 1 == plan.len();
                let priority = if is_final {
                    RenderPriority::High
                } else {
                    RenderPriority::Medium
                };

                stream::iter(positions.clone())
                    .for_each_concurrent(max_concurrent.max(1), |position| {
                        let coordinator = coordinator.clone();
                        let tx = tx.clone();
                        let abort = abort.clone();
                        let scale = *scale;
                        async move {
                            if abort.is_aborted() {
                                return;
                            }
                            let tile = TileCoordinate::new(
                                position.document.clone(),
                                position.page,
                                position.tile_x,
                                position.tile_y,
                                scale,
                                tile_size,
                            );
                            let result =
                                coordinator.request_tile_exact(tile.clone(), priority).await;
                            match result.data {
                                Some(data) if result.success && !abort.is_aborted() => {
                                    let _ = tx.unbounded_send(ProgressiveUpdate {
                                        tile,
                                        scale,
                                        data,
                                        is_final,
                                        css_scale_factor: target_tier / scale,
                                    });
                                }
                                _ => {
                                    if let Some(error) = result.error {
                                        log::warn!(
                                            "progressive tier {scale} failed for {:?}: {error}",
                                            position
                                        );
                                    }
                                }
                            }
                        }
                    })
                    .await;
            }
        });

        rx
    }

    /// Abort the progressive sequence for one tile position.
    pub fn cancel(&self, position: &TilePosition) {
        let mut active = self.active.lock().expect("progressive state poisoned");
        if let Some(abort) = active.remove(position) {
            abort.abort();
        }
    }

    /// Abort every outstanding sequence.
    pub fn cancel_all(&self) {
        let mut active = self.active.lock().expect("progressive state poisoned");
        for (_, abort) in active.drain() {
            abort.abort();
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().expect("progressive state poisoned").len()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_sequence(
    coordinator: Arc<RenderCoordinator>,
    position: TilePosition,
    tile_size: u32,
    plan: Vec<f64>,
    target_tier: f64,
    delay: Duration,
    abort: AbortHandle,
    tx: UnboundedSender<ProgressiveUpdate>,
) {
    for (index, scale) in plan.iter().enumerate() {
        if abort.is_aborted() {
            break;
        }
        let is_final = index + 1 == plan.len();
        let priority = if is_final {
            RenderPriority::High
        } else {
            RenderPriority::Medium
        };

        let tile = TileCoordinate::new(
            position.document.clone(),
            position.page,
            position.tile_x,
            position.tile_y,
            *scale,
            tile_size,
        );

        let result = coordinator.request_tile_exact(tile.clone(), priority).await;
        if abort.is_aborted() {
            break;
        }

        match result.data {
            Some(data) if result.success => {
                let update = ProgressiveUpdate {
                    tile,
                    scale: *scale,
                    data,
                    is_final,
                    css_scale_factor: target_tier / scale,
                };
                if tx.unbounded_send(update).is_err() {
                    // Receiver gone; nobody is watching this sequence.
                    break;
                }
            }
            _ => {
                if let Some(error) = result.error {
                    log::warn!("progressive tier {scale} failed for {:?}: {error}", position);
                }
            }
        }

        if !is_final && !delay.is_zero() {
            async_delay(delay).await;
        }
    }
}
