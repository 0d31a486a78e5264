//! Central render queue: deduplication, prioritized concurrency, fallbacks
//!
//! Every request funnels through here. The coordinator deduplicates by the
//! quantized cache key, supersedes stale scales per grid position, bounds
//! rasterizer concurrency with the prioritized semaphore, serves cached
//! fallbacks immediately, writes results into the tiered cache and emits
//! tile-ready notifications. No call ever propagates an error: every
//! request resolves with a [`RenderResult`].

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::channel::oneshot;
use futures::future::{FutureExt, Shared};

use crate::cache::classification::PageClassification;
use crate::cache::tiered::{CacheTier, CachedTile, TieredTileCache};
use crate::core::config::CoordinatorConfig;
use crate::core::constants::SESSION_MODULO;
use crate::core::coords::{quantize_scale, scale_key, DocumentId, TileCoordinate, TilePosition};
use crate::device::DeviceProfile;
use crate::diagnostics::{RenderStats, StatsSnapshot};
use crate::prelude::HashMap;
use crate::render::retry::RetryQueue;
use crate::render::semaphore::{Acquisition, PrioritySemaphore};
use crate::render::types::{
    AbortHandle, RenderError, RenderPriority, RenderRequest, RenderResult, TileReady,
};
use crate::scale::state::{GesturePhase, ScaleSnapshot, ScaleStateManager};
use crate::traits::{PageAnalyzer, TileRasterizer};
use crate::zoom::orchestrator::{ZoomOrchestrator, ZoomPhase};

/// Zoom at which even critical requests should take a cached fallback
/// rather than wait for the rasterizer.
const FALLBACK_ALWAYS_SCALE: f64 = 8.0;

/// Derived queue policy, recomputed when the gesture phase or the zoom
/// crosses a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemaphorePolicy {
    pub max_queue_size: usize,
    pub viewport_only_threshold: f64,
    pub max_tiles_per_page: usize,
}

impl SemaphorePolicy {
    pub fn derive(phase: GesturePhase, zoom: f64, config: &CoordinatorConfig) -> Self {
        // During a gesture the queue shrinks so stale work cannot pile up;
        // deep zoom halves the per-page tile budget.
        let max_queue_size = match phase {
            GesturePhase::Idle => config.max_queue_size,
            GesturePhase::Active => (config.max_queue_size / 2).max(4),
            GesturePhase::Settling => (config.max_queue_size * 3 / 4).max(4),
        };
        let max_tiles_per_page = if zoom >= 8.0 {
            (config.max_tiles_per_page / 2).max(16)
        } else {
            config.max_tiles_per_page
        };
        Self {
            max_queue_size,
            viewport_only_threshold: config.viewport_only_threshold,
            max_tiles_per_page,
        }
    }
}

struct ActiveRequest {
    scale_q: u32,
    session_id: u32,
    abort: AbortHandle,
}

type SharedResult = Shared<oneshot::Receiver<RenderResult>>;

struct CoordinatorState {
    in_flight: HashMap<TileCoordinate, SharedResult>,
    active_by_position: HashMap<TilePosition, ActiveRequest>,
    current_session: u32,
    retry: RetryQueue,
    policy: SemaphorePolicy,
}

pub struct RenderCoordinator {
    document: DocumentId,
    config: CoordinatorConfig,
    device: DeviceProfile,
    scale_manager: Arc<ScaleStateManager>,
    orchestrator: Arc<ZoomOrchestrator>,
    cache: Arc<TieredTileCache>,
    rasterizer: Arc<dyn TileRasterizer>,
    analyzer: Option<Arc<dyn PageAnalyzer>>,
    semaphore: PrioritySemaphore,
    state: Mutex<CoordinatorState>,
    tile_ready_tx: Sender<TileReady>,
    tile_ready_rx: Receiver<TileReady>,
    stats: Arc<RenderStats>,
}

impl RenderCoordinator {
    pub fn new(
        document: impl Into<DocumentId>,
        config: CoordinatorConfig,
        device: DeviceProfile,
        scale_manager: Arc<ScaleStateManager>,
        orchestrator: Arc<ZoomOrchestrator>,
        cache: Arc<TieredTileCache>,
        rasterizer: Arc<dyn TileRasterizer>,
        analyzer: Option<Arc<dyn PageAnalyzer>>,
    ) -> Arc<Self> {
        let semaphore = PrioritySemaphore::new(device.permit_count(), config.max_queue_size);
        let (tile_ready_tx, tile_ready_rx) = unbounded();
        let policy = SemaphorePolicy::derive(GesturePhase::Idle, 1.0, &config);
        let retry = RetryQueue::new(config.retry.clone());

        Arc::new(Self {
            document: document.into(),
            config,
            device,
            scale_manager,
            orchestrator,
            cache,
            rasterizer,
            analyzer,
            semaphore,
            state: Mutex::new(CoordinatorState {
                in_flight: HashMap::default(),
                active_by_position: HashMap::default(),
                current_session: 0,
                retry,
                policy,
            }),
            tile_ready_tx,
            tile_ready_rx,
            stats: Arc::new(RenderStats::default()),
        })
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    pub fn cache(&self) -> &Arc<TieredTileCache> {
        &self.cache
    }

    pub fn scale_manager(&self) -> &Arc<ScaleStateManager> {
        &self.scale_manager
    }

    pub fn semaphore(&self) -> &PrioritySemaphore {
        &self.semaphore
    }

    pub fn stats(&self) -> &Arc<RenderStats> {
        &self.stats
    }

    /// Receiver side of the tile-ready notification stream; the compositor
    /// polls this to trigger repaints.
    pub fn tile_ready_receiver(&self) -> Receiver<TileReady> {
        self.tile_ready_rx.clone()
    }

    /// Advance the session counter; one session per scroll/zoom tick.
    pub fn begin_session(&self) -> u32 {
        let mut state = self.state.lock().expect("coordinator poisoned");
        state.current_session = (state.current_session + 1) % SESSION_MODULO;
        state.current_session
    }

    pub fn current_session(&self) -> u32 {
        self.state.lock().expect("coordinator poisoned").current_session
    }

    /// Recompute the queue policy after a gesture-phase or zoom change.
    pub fn update_policy(&self, phase: GesturePhase, zoom: f64) {
        let policy = SemaphorePolicy::derive(phase, zoom, &self.config);
        let changed = {
            let mut state = self.state.lock().expect("coordinator poisoned");
            let changed = state.policy != policy;
            state.policy = policy;
            changed
        };
        if changed {
            self.semaphore.set_max_queue_size(policy.max_queue_size);
        }
    }

    pub fn policy(&self) -> SemaphorePolicy {
        self.state.lock().expect("coordinator poisoned").policy
    }

    /// Dispatch a prebuilt request to the tile or page path.
    pub async fn request(self: &Arc<Self>, request: RenderRequest) -> RenderResult {
        match request {
            RenderRequest::Tile { tile, priority, .. } => self.request_tile(tile, priority).await,
            RenderRequest::Page {
                page,
                scale,
                priority,
                ..
            } => self.request_page(page, scale, priority).await,
        }
    }

    /// Build a stamped tile request from the current scale snapshot.
    pub fn make_tile_request(&self, tile: TileCoordinate, priority: RenderPriority) -> RenderRequest {
        let snapshot = self.scale_manager.capture_snapshot();
        RenderRequest::Tile {
            document: tile.document.clone(),
            session_id: self.current_session(),
            scale_epoch: snapshot.epoch,
            render_params_id: snapshot.render_params_id,
            css_stretch: (snapshot.css_stretch != 1.0).then_some(snapshot.css_stretch),
            tile,
            priority,
        }
    }

    /// Render (or fetch) one tile. Always resolves; never panics or throws.
    pub async fn request_tile(
        self: &Arc<Self>,
        tile: TileCoordinate,
        priority: RenderPriority,
    ) -> RenderResult {
        self.request_tile_inner(tile, priority, true, 1.0, 0).await
    }

    /// Like [`request_tile`](Self::request_tile) but never serves a
    /// different-scale fallback; progressive sequences use this so each
    /// tier is actually rasterized.
    pub async fn request_tile_exact(
        self: &Arc<Self>,
        tile: TileCoordinate,
        priority: RenderPriority,
    ) -> RenderResult {
        self.request_tile_inner(tile, priority, false, 1.0, 0).await
    }

    /// Prefetch entry point: `quality` below 1.0 rasterizes at a reduced
    /// scale with a compensating stretch. The cache key stays at the tile's
    /// lookup scale; only the pixels are coarser.
    pub async fn request_prefetch_tile(
        self: &Arc<Self>,
        tile: TileCoordinate,
        priority: RenderPriority,
        quality: f64,
    ) -> RenderResult {
        let quality = if quality.is_finite() {
            quality.clamp(0.1, 1.0)
        } else {
            1.0
        };
        self.request_tile_inner(tile, priority, true, quality, 0).await
    }

    async fn request_tile_inner(
        self: &Arc<Self>,
        tile: TileCoordinate,
        priority: RenderPriority,
        allow_fallback: bool,
        quality: f64,
        attempt: u32,
    ) -> RenderResult {
        let snapshot = self.scale_manager.capture_snapshot();

        let tile = match self.normalize(tile, &snapshot) {
            Ok(tile) => tile,
            Err(error) => {
                return RenderResult::failed(error, snapshot.epoch, snapshot.render_params_id)
            }
        };

        // In-flight dedup on the full quantized key.
        let existing = {
            let state = self.state.lock().expect("coordinator poisoned");
            state.in_flight.get(&tile).cloned()
        };
        if let Some(shared) = existing {
            return match shared.await {
                Ok(result) => result,
                Err(_) => RenderResult::failed(
                    RenderError::Aborted,
                    snapshot.epoch,
                    snapshot.render_params_id,
                ),
            };
        }

        // Exact cache hit resolves immediately.
        if let Some(cached) = self.cache.get(&tile) {
            return RenderResult::from_cache(
                cached,
                tile.scale(),
                snapshot.epoch,
                snapshot.render_params_id,
            );
        }

        // Fallback path: anything non-critical takes the best cached
        // approximation right away, as do critical requests at deep zoom or
        // against a saturated queue. The exact tile is then upgraded in the
        // background at low priority.
        if allow_fallback && self.should_serve_fallback(priority, &snapshot) {
            if let Some(hit) = self.cache.get_best_available(&tile) {
                RenderStats::bump(&self.stats.fallbacks_served);
                self.spawn_background(tile.clone(), RenderPriority::Low, 0);

                return RenderResult::fallback(
                    hit.data,
                    hit.actual_scale,
                    hit.css_stretch,
                    hit.fallback_tile,
                    snapshot.epoch,
                    snapshot.render_params_id,
                );
            }
        }

        let abort = AbortHandle::new();
        let (sender, receiver) = oneshot::channel();
        let shared = receiver.shared();

        let existing_in_flight = {
            let mut state = self.state.lock().expect("coordinator poisoned");

            // Re-check dedup under the lock (racing requests).
            if let Some(existing) = state.in_flight.get(&tile).cloned() {
                Some(existing)
            } else {
                // A newer scale for the same grid position supersedes the old
                // in-flight request; the same scale rides along with it.
                let position = tile.position();
                if let Some(active) = state.active_by_position.get(&position) {
                    if active.scale_q != tile.scale_q {
                        log::debug!(
                            "scale change supersedes in-flight render at {:?} ({} -> {})",
                            position,
                            active.scale_q,
                            tile.scale_q
                        );
                        active.abort.abort();
                    }
                }

                let session_id = state.current_session;
                state.in_flight.insert(tile.clone(), shared.clone());
                state.active_by_position.insert(
                    position,
                    ActiveRequest {
                        scale_q: tile.scale_q,
                        session_id,
                        abort: abort.clone(),
                    },
                );
                None
            }
        };

        if let Some(existing) = existing_in_flight {
            return match existing.await {
                Ok(result) => result,
                Err(_) => RenderResult::failed(
                    RenderError::Aborted,
                    snapshot.epoch,
                    snapshot.render_params_id,
                ),
            };
        }
        self.stats.in_flight.fetch_add(1, Ordering::Relaxed);

        let executor = self.clone();
        let task_tile = tile.clone();
        crate::runtime::spawn(async move {
            let result = executor
                .execute(task_tile.clone(), priority, abort.clone(), snapshot, quality, attempt)
                .await;
            executor.finish(&task_tile, &abort);
            let _ = sender.send(result);
        });

        match shared.await {
            Ok(result) => result,
            Err(_) => RenderResult::failed(
                RenderError::Aborted,
                snapshot.epoch,
                snapshot.render_params_id,
            ),
        }
    }

    /// Render a whole page, for modes below the tiling threshold.
    pub async fn request_page(
        self: &Arc<Self>,
        page: u32,
        scale: f64,
        priority: RenderPriority,
    ) -> RenderResult {
        let snapshot = self.scale_manager.capture_snapshot();
        let scale = quantize_scale(scale);
        if !scale.is_finite() || scale <= 0.0 {
            return RenderResult::failed(
                RenderError::InvalidInput(format!("page scale {scale}")),
                snapshot.epoch,
                snapshot.render_params_id,
            );
        }

        if let Some(cached) = self.cache.full_page(&self.document, page, scale) {
            return RenderResult::from_cache(cached, scale, snapshot.epoch, snapshot.render_params_id);
        }

        let acquisition = self.semaphore.acquire(priority).await;
        let _permit = match acquisition {
            Acquisition::Acquired(permit) => permit,
            Acquisition::NotAcquired => {
                RenderStats::bump(&self.stats.dropped);
                return RenderResult::failed(
                    RenderError::Dropped,
                    snapshot.epoch,
                    snapshot.render_params_id,
                );
            }
        };

        match self
            .rasterizer
            .render_page(page, scale, self.document.clone())
            .await
        {
            Ok(bitmap) => {
                self.cache
                    .set_full_page(&self.document, page, scale, bitmap.clone());
                RenderStats::bump(&self.stats.completed);
                self.emit_tile_ready(page, priority, snapshot.epoch);
                RenderResult::rendered(bitmap, scale, snapshot.epoch, snapshot.render_params_id)
            }
            Err(err) => {
                RenderStats::bump(&self.stats.raster_failures);
                log::error!("page render failed for page {page}: {err}");
                RenderResult::failed(
                    RenderError::Rasterizer(err.to_string()),
                    snapshot.epoch,
                    snapshot.render_params_id,
                )
            }
        }
    }

    /// Issue a request without awaiting it. Kept out of the async request
    /// path so the spawned block does not capture the requesting future's
    /// own type.
    fn spawn_background(self: &Arc<Self>, tile: TileCoordinate, priority: RenderPriority, attempt: u32) {
        let coordinator = self.clone();
        crate::runtime::spawn(async move {
            let _ = coordinator
                .request_tile_inner(tile, priority, false, 1.0, attempt)
                .await;
        });
    }

    fn normalize(
        &self,
        mut tile: TileCoordinate,
        _snapshot: &ScaleSnapshot,
    ) -> Result<TileCoordinate, RenderError> {
        if tile.document != self.document {
            log::warn!(
                "request for foreign document {:?}, rewriting to {:?}",
                tile.document,
                self.document
            );
            tile.document = self.document.clone();
        }
        if tile.scale_q == 0 {
            return Err(RenderError::InvalidInput("zero tile scale".into()));
        }
        if tile.tile_size == 0 {
            return Err(RenderError::InvalidInput("zero tile size".into()));
        }
        Ok(tile)
    }

    fn should_serve_fallback(&self, priority: RenderPriority, snapshot: &ScaleSnapshot) -> bool {
        if priority != RenderPriority::Critical {
            return true;
        }
        let policy = self.policy();
        snapshot.scale >= FALLBACK_ALWAYS_SCALE
            || self.semaphore.saturation() > policy.viewport_only_threshold
    }

    async fn execute(
        self: &Arc<Self>,
        tile: TileCoordinate,
        priority: RenderPriority,
        abort: AbortHandle,
        snapshot: ScaleSnapshot,
        quality: f64,
        attempt: u32,
    ) -> RenderResult {
        let acquisition = self.semaphore.acquire(priority).await;
        let _permit = match acquisition {
            Acquisition::Acquired(permit) => permit,
            Acquisition::NotAcquired => {
                RenderStats::bump(&self.stats.dropped);
                self.queue_retry(&tile, priority, attempt);
                return RenderResult::failed(
                    RenderError::Dropped,
                    snapshot.epoch,
                    snapshot.render_params_id,
                );
            }
        };

        if abort.is_aborted() {
            return self.aborted_result(&tile, &snapshot);
        }

        let rendered = self.render_with_strategy(&tile, quality).await;

        let bitmap = match rendered {
            Ok(bitmap) => bitmap,
            Err(err) => {
                RenderStats::bump(&self.stats.raster_failures);
                log::error!("rasterizer failed for {:?}: {err}", tile.position());
                return RenderResult::failed(
                    RenderError::Rasterizer(err.to_string()),
                    snapshot.epoch,
                    snapshot.render_params_id,
                );
            }
        };

        // Aborted mid-render: the bitmap is discarded, the cache untouched
        // and no tile-ready fires.
        if abort.is_aborted() {
            return self.aborted_result(&tile, &snapshot);
        }

        let tier = match priority {
            RenderPriority::Critical | RenderPriority::High => CacheTier::Hot,
            RenderPriority::Medium => CacheTier::Warm,
            RenderPriority::Low => CacheTier::Cold,
        };
        self.cache.set(tile.clone(), bitmap.clone(), tier);
        RenderStats::bump(&self.stats.completed);
        self.emit_tile_ready(tile.page, priority, snapshot.epoch);

        RenderResult::rendered(bitmap, tile.scale(), snapshot.epoch, snapshot.render_params_id)
    }

    /// Pick a render path from the page classification: scanned pages slice
    /// the extracted JPEG, vector-heavy pages render reduced and stretch,
    /// everything else renders normally. A prefetch quality below 1.0 also
    /// takes the reduced-scale path. Every failure falls through to the
    /// standard render.
    async fn render_with_strategy(
        self: &Arc<Self>,
        tile: &TileCoordinate,
        quality: f64,
    ) -> crate::Result<CachedTile> {
        let classification = if self.config.enable_content_type_detection && self.analyzer.is_some()
        {
            self.classify(tile.page).await
        } else {
            None
        };

        if let Some(cls) = &classification {
            if cls.is_scanned() {
                match self.jpeg_fast_path(tile).await {
                    Ok(bitmap) => return Ok(bitmap),
                    Err(err) => {
                        RenderStats::bump(&self.stats.jpeg_failures);
                        log::warn!("jpeg fast path failed for page {}: {err}", tile.page);
                    }
                }
            }
        }

        let vector_heavy = classification
            .as_ref()
            .map(|cls| cls.is_vector_heavy())
            .unwrap_or(false);
        let reduction = if vector_heavy { quality * 0.5 } else { quality };

        if reduction < 1.0 {
            let reduced = quantize_scale((tile.scale() * reduction).max(0.25));
            if reduced < tile.scale() {
                let reduced_tile = tile.at_scale(reduced);
                let factor = tile.scale() / reduced;
                match self
                    .rasterizer
                    .render_tile(reduced_tile, self.document.clone())
                    .await
                {
                    Ok(bitmap) => return Ok(bitmap.with_css_scale_factor(factor)),
                    Err(err) => {
                        log::warn!("reduced-scale render failed for page {}: {err}", tile.page);
                    }
                }
            }
        }

        self.rasterizer
            .render_tile(tile.clone(), self.document.clone())
            .await
    }

    async fn classify(self: &Arc<Self>, page: u32) -> Option<PageClassification> {
        if let Some(cached) = self.cache.page_classification(&self.document, page) {
            return Some(cached);
        }
        let analyzer = self.analyzer.as_ref()?;
        match analyzer.classify_page(self.document.clone(), page).await {
            Ok(classification) => {
                self.cache
                    .set_page_classification(&self.document, page, classification.clone());
                Some(classification)
            }
            Err(err) => {
                RenderStats::bump(&self.stats.classification_failures);
                log::warn!("classification failed for page {page}: {err}");
                None
            }
        }
    }

    /// Serve a tile region of the page's extracted JPEG. The compositor
    /// crops using the target rect recorded on the tile.
    async fn jpeg_fast_path(self: &Arc<Self>, tile: &TileCoordinate) -> crate::Result<CachedTile> {
        let analyzer = self
            .analyzer
            .as_ref()
            .ok_or_else(|| crate::VellumError::Render("no analyzer".into()))?;

        let slice = match self.cache.jpeg_slice(&self.document, tile.page) {
            Some(slice) => slice,
            None => {
                let slice = analyzer
                    .extract_jpeg(self.document.clone(), tile.page)
                    .await?;
                self.cache.set_jpeg_slice(&self.document, tile.page, slice.clone());
                slice
            }
        };

        let mut bitmap = CachedTile::png((*slice.bytes).clone(), slice.width, slice.height);
        bitmap.optimized = true;
        bitmap.target_width = Some(tile.tile_size);
        bitmap.target_height = Some(tile.tile_size);
        Ok(bitmap)
    }

    /// An aborted request still tries to hand the compositor something.
    fn aborted_result(&self, tile: &TileCoordinate, snapshot: &ScaleSnapshot) -> RenderResult {
        RenderStats::bump(&self.stats.aborted);
        if let Some(hit) = self.cache.get_best_available(tile) {
            let mut result = RenderResult::fallback(
                hit.data,
                hit.actual_scale,
                hit.css_stretch,
                hit.fallback_tile,
                snapshot.epoch,
                snapshot.render_params_id,
            );
            result.error = Some(RenderError::Aborted);
            return result;
        }
        RenderResult::failed(RenderError::Aborted, snapshot.epoch, snapshot.render_params_id)
    }

    fn queue_retry(&self, tile: &TileCoordinate, priority: RenderPriority, attempt: u32) {
        let mut state = self.state.lock().expect("coordinator poisoned");
        state
            .retry
            .push(tile.clone(), priority, attempt, Instant::now());
    }

    fn finish(&self, tile: &TileCoordinate, abort: &AbortHandle) {
        let mut state = self.state.lock().expect("coordinator poisoned");
        state.in_flight.remove(tile);

        let position = tile.position();
        let is_ours = state
            .active_by_position
            .get(&position)
            .map(|active| active.abort.ptr_eq(abort))
            .unwrap_or(false);
        if is_ours {
            state.active_by_position.remove(&position);
        }
        drop(state);
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    fn emit_tile_ready(&self, page: u32, priority: RenderPriority, scale_epoch: u64) {
        // Low-priority completions stay silent, and nothing fires while a
        // gesture is still moving; the settle-time render pass repaints.
        let phase = self.orchestrator.phase();
        let quiet = phase == ZoomPhase::Zooming || phase == ZoomPhase::Settling;
        if quiet || priority == RenderPriority::Low {
            return;
        }
        RenderStats::bump(&self.stats.tile_ready_emitted);
        let _ = self.tile_ready_tx.send(TileReady {
            document: self.document.clone(),
            page,
            priority,
            scale_epoch,
        });
    }

    /// Modular age of a session id relative to the current session.
    fn session_age(current: u32, session: u32) -> u32 {
        (current + SESSION_MODULO - session) % SESSION_MODULO
    }

    /// Sessions worth keeping at a given scale: high-scale tiles render
    /// slowly, so their window is much wider.
    pub fn adaptive_keep_recent(scale: f64) -> u32 {
        if scale >= 16.0 {
            40
        } else if scale >= 8.0 {
            24
        } else if scale >= 4.0 {
            12
        } else {
            6
        }
    }

    /// Abort in-flight requests whose session is older than `keep_recent`
    /// sessions (modular arithmetic handles counter wrap). The semaphore
    /// queue is left alone: current-session waiters must survive.
    pub fn abort_stale_sessions(&self, keep_recent: u32) {
        let state = self.state.lock().expect("coordinator poisoned");
        let current = state.current_session;
        let mut aborted = 0;
        for active in state.active_by_position.values() {
            if Self::session_age(current, active.session_id) > keep_recent {
                active.abort.abort();
                aborted += 1;
            }
        }
        if aborted > 0 {
            log::debug!("aborted {aborted} stale-session renders (keep_recent={keep_recent})");
        }
    }

    /// Scale-change mass abort: on a >= 2x jump, abort every in-flight
    /// request whose scale differs from the new scale by more than 50%,
    /// clear the semaphore queue once and drop the retry queue.
    pub fn abort_stale_scale_tiles(&self, new_scale: f64, old_scale: Option<f64>) {
        let old = old_scale.unwrap_or_else(|| self.scale_manager.capture_snapshot().scale);
        if old <= 0.0 || new_scale <= 0.0 {
            return;
        }
        let ratio = (new_scale / old).max(old / new_scale);
        if ratio < 2.0 {
            return;
        }

        {
            let mut state = self.state.lock().expect("coordinator poisoned");
            let new_q = scale_key(new_scale) as f64;
            for active in state.active_by_position.values() {
                let diff = (active.scale_q as f64 - new_q).abs() / new_q;
                if diff > 0.5 {
                    active.abort.abort();
                }
            }
            state.retry.clear();
        }
        self.semaphore.clear_queue();
        log::debug!("mass abort for scale change {old} -> {new_scale}");
    }

    /// Resolve every queued waiter as not-acquired; used on major view
    /// changes.
    pub fn clear_queue(&self) {
        self.semaphore.clear_queue();
    }

    /// Re-issue retryable shed requests. Never runs during active or
    /// settling gestures, and skips entirely while the queue is saturated.
    pub fn pump_retries(self: &Arc<Self>, now: Instant) {
        let phase = self.orchestrator.phase();
        if phase == ZoomPhase::Zooming || phase == ZoomPhase::Settling {
            return;
        }

        let ready = {
            let mut state = self.state.lock().expect("coordinator poisoned");
            let saturation = self.semaphore.saturation();
            state.retry.drain_ready(now, saturation)
        };

        for entry in ready {
            RenderStats::bump(&self.stats.retries);
            self.spawn_background(entry.tile, entry.priority, entry.attempts + 1);
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.stats.in_flight.load(Ordering::Relaxed)
    }

    pub fn retry_queue_len(&self) -> usize {
        self.state.lock().expect("coordinator poisoned").retry.len()
    }

    /// Full observable state for diagnostics and tests.
    pub fn diagnostics(&self) -> StatsSnapshot {
        let state = self.state.lock().expect("coordinator poisoned");
        StatsSnapshot {
            cache: self.cache.stats(),
            in_flight: self.stats.in_flight.load(Ordering::Relaxed),
            waiting_by_priority: self.semaphore.waiting_by_priority(),
            retry_queue_len: state.retry.len(),
            gesture_phase: self.scale_manager.current_state().gesture_phase,
            current_epoch: self.scale_manager.current_epoch(),
            max_queue_size: self.semaphore.max_queue_size(),
            completed: self.stats.completed.load(Ordering::Relaxed),
            aborted: self.stats.aborted.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            raster_failures: self.stats.raster_failures.load(Ordering::Relaxed),
            fallbacks_served: self.stats.fallbacks_served.load(Ordering::Relaxed),
            retries: self.stats.retries.load(Ordering::Relaxed),
            tile_ready_emitted: self.stats.tile_ready_emitted.load(Ordering::Relaxed),
        }
    }
}
