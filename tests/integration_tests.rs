//! End-to-end scheduler scenarios against a mock rasterizer
//!
//! These tests drive the full stack: gesture stream -> orchestrator ->
//! scale manager -> coordinator -> cache, with rasterization replaced by a
//! deterministic in-process mock.

#![cfg(feature = "tokio-runtime")]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::StreamExt;

use vellum::cache::tiered::{CacheTier, CachedTile, TieredTileCache};
use vellum::core::config::RendererConfig;
use vellum::core::coords::{DocumentId, TileCoordinate, TilePosition};
use vellum::core::geometry::{PageLayout, Point};
use vellum::device::{DeviceProfile, DeviceTier};
use vellum::render::coordinator::RenderCoordinator;
use vellum::render::progressive::ProgressiveRenderer;
use vellum::render::types::{RenderError, RenderPriority};
use vellum::scale::state::ScaleStateManager;
use vellum::traits::{BoxFuture, TileRasterizer};
use vellum::viewport::strategy::{ScrollStrategy, ViewportStrategy};
use vellum::viewport::Viewport;
use vellum::zoom::events::{GestureKind, ZoomState};
use vellum::zoom::orchestrator::{ZoomOrchestrator, ZoomPhase};

/// Deterministic rasterizer with optional latency and failure injection
struct MockRasterizer {
    delay: Duration,
    fail_pages: Vec<u32>,
    calls: AtomicU64,
    rendered: Mutex<Vec<TileCoordinate>>,
}

impl MockRasterizer {
    fn instant() -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail_pages: Vec::new(),
            calls: AtomicU64::new(0),
            rendered: Mutex::new(Vec::new()),
        })
    }

    fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_pages: Vec::new(),
            calls: AtomicU64::new(0),
            rendered: Mutex::new(Vec::new()),
        })
    }

    fn failing(pages: Vec<u32>) -> Arc<Self> {
        Arc::new(Self {
            delay: Duration::ZERO,
            fail_pages: pages,
            calls: AtomicU64::new(0),
            rendered: Mutex::new(Vec::new()),
        })
    }

    fn rendered_tiles(&self) -> Vec<TileCoordinate> {
        self.rendered.lock().unwrap().clone()
    }
}

impl TileRasterizer for MockRasterizer {
    fn render_tile(
        &self,
        tile: TileCoordinate,
        _document: DocumentId,
    ) -> BoxFuture<'_, vellum::Result<CachedTile>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_pages.contains(&tile.page) {
                return Err(format!("synthetic failure on page {}", tile.page).into());
            }
            self.rendered.lock().unwrap().push(tile.clone());
            Ok(CachedTile::rgba(
                vec![(tile.scale_q % 251) as u8; 64],
                tile.tile_size,
                tile.tile_size,
            ))
        })
    }

    fn render_page(
        &self,
        page: u32,
        _scale: f64,
        _document: DocumentId,
    ) -> BoxFuture<'_, vellum::Result<CachedTile>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pages.contains(&page) {
                return Err(format!("synthetic failure on page {page}").into());
            }
            Ok(CachedTile::rgba(vec![page as u8; 64], 612, 792))
        })
    }
}

struct Stack {
    manager: Arc<ScaleStateManager>,
    orchestrator: Arc<ZoomOrchestrator>,
    cache: Arc<TieredTileCache>,
    coordinator: Arc<RenderCoordinator>,
    config: RendererConfig,
}

fn stack(tier: DeviceTier, rasterizer: Arc<MockRasterizer>) -> Stack {
    let config = RendererConfig::for_testing();
    let device = DeviceProfile::for_tier(tier);
    let manager = Arc::new(ScaleStateManager::new(
        "doc",
        2.0,
        config.scale.clone(),
        device.clone(),
    ));
    let orchestrator = Arc::new(ZoomOrchestrator::new(
        config.orchestrator.clone(),
        manager.clone(),
    ));
    let cache = Arc::new(TieredTileCache::new(&device));
    let coordinator = RenderCoordinator::new(
        "doc",
        config.coordinator.clone(),
        device,
        manager.clone(),
        orchestrator.clone(),
        cache.clone(),
        rasterizer,
        None,
    );
    Stack {
        manager,
        orchestrator,
        cache,
        coordinator,
        config,
    }
}

fn pinch(zoom: f64, at: Instant) -> ZoomState {
    ZoomState::new(zoom, at)
        .active(GestureKind::Pinch)
        .with_focal_point(Point::new(32.0, 32.0))
}

fn release(zoom: f64, at: Instant) -> ZoomState {
    ZoomState::new(zoom, at).with_focal_point(Point::new(32.0, 32.0))
}

fn settle(stack: &Stack, t0: Instant) {
    // Quiet window then settling delay, with margin for the test preset.
    let quiet = t0 + Duration::from_millis(stack.config.orchestrator.gesture_end_delay_ms + 5);
    assert_eq!(stack.orchestrator.tick(quiet), Some(ZoomPhase::Settling));
    let settled = quiet + Duration::from_millis(stack.config.orchestrator.settling_delay_ms + 5);
    assert_eq!(stack.orchestrator.tick(settled), Some(ZoomPhase::Rendering));
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within budget");
}

/// Pure zoom-in to a steady state: visible tiles exist at the final tier,
/// the stretch is 1.0 and no stale epoch survives.
#[tokio::test]
async fn test_zoom_in_settles_at_final_tier() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer);
    let t0 = Instant::now();

    stack.orchestrator.handle_zoom(&pinch(4.0, t0));
    stack
        .orchestrator
        .handle_zoom(&pinch(8.0, t0 + Duration::from_millis(40)));
    stack
        .orchestrator
        .handle_zoom(&release(16.0, t0 + Duration::from_millis(80)));
    settle(&stack, t0 + Duration::from_millis(80));

    assert!(stack.orchestrator.can_render());
    let state = stack.manager.current_state();
    // zoom 16 * dpr 2 = 32, a recognized tier: no CSS stretching needed.
    assert_eq!(state.scale, 32.0);
    assert!((state.css_stretch - 1.0).abs() < 1e-9);

    // Schedule the visible tiles at the settled scale.
    let strategy = ScrollStrategy::new(
        stack.config.scale.clone(),
        DeviceProfile::for_tier(DeviceTier::High),
        stack.config.prefetch.speed_zones.clone(),
        stack.config.prefetch.max_prefetch_tiles,
    );
    let pages = vec![PageLayout::new(0, 0.0, 0.0, 612.0, 792.0)];
    let viewport = Viewport::new(0.0, 0.0, 48.0, 48.0);
    let visible = strategy.visible_tiles(&viewport, &pages, 16.0, 2.0, &"doc".into(), None);
    assert!(!visible.is_empty());
    assert!(visible.iter().all(|t| t.scale() == 32.0));

    let snapshot = stack.manager.capture_snapshot();
    let results = join_all(
        visible
            .iter()
            .map(|tile| stack.coordinator.request_tile(tile.clone(), RenderPriority::High)),
    )
    .await;

    for result in &results {
        assert!(result.success);
        assert_eq!(result.actual_scale, Some(32.0));
        assert_eq!(result.scale_epoch, snapshot.epoch);
        // Every emitted epoch is still current: nothing stale was drawn.
        assert!(stack.manager.validate_epoch(result.scale_epoch));
    }
    for tile in &visible {
        assert!(stack.cache.get(tile).is_some());
    }
}

/// Progressive refinement yields strictly increasing scales and marks the
/// last tier final.
#[tokio::test]
async fn test_progressive_scales_strictly_increase() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer);
    let progressive = ProgressiveRenderer::new(
        stack.coordinator.clone(),
        &stack.config.orchestrator,
    );

    let position = TilePosition {
        document: "doc".into(),
        page: 0,
        tile_x: 0,
        tile_y: 0,
    };
    let updates: Vec<_> = progressive
        .render_tile_progressive(position, 256, 16.0, None)
        .collect()
        .await;

    assert!(updates.len() >= 2);
    for pair in updates.windows(2) {
        assert!(pair[0].scale < pair[1].scale);
    }
    let last = updates.last().unwrap();
    assert!(last.is_final);
    assert_eq!(last.scale, 16.0);
    assert!((last.css_scale_factor - 1.0).abs() < 1e-9);
    for update in &updates[..updates.len() - 1] {
        assert!(!update.is_final);
        assert!(update.css_scale_factor > 1.0);
    }
}

/// Cache miss with a coarser tile available: the coordinator answers
/// immediately with a stretched fallback and upgrades in the background.
#[tokio::test]
async fn test_fallback_then_background_upgrade() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer);

    // Only a scale-8 rendering of the page corner exists.
    let coarse = TileCoordinate::new("doc", 0, 0, 0, 8.0, 256);
    stack
        .cache
        .set(coarse, CachedTile::rgba(vec![8; 64], 256, 256), CacheTier::Warm);

    let wanted = TileCoordinate::new("doc", 0, 1, 1, 32.0, 256);
    let result = stack
        .coordinator
        .request_tile(wanted.clone(), RenderPriority::Medium)
        .await;

    assert!(result.success);
    assert!(result.is_fallback);
    assert_eq!(result.actual_scale, Some(8.0));
    assert_eq!(result.css_stretch, Some(4.0));
    let fallback_tile = result.fallback_tile.as_ref().unwrap();
    assert_eq!(fallback_tile.scale(), 8.0);
    // The fallback's region contains the requested region.
    assert!(fallback_tile
        .page_region()
        .inflate(1e-6)
        .contains_rect(&wanted.page_region()));

    // The low-priority background upgrade lands the exact tile.
    let cache = stack.cache.clone();
    let exact = wanted.clone();
    wait_until(move || cache.contains(&exact)).await;

    let fresh = stack
        .coordinator
        .request_tile(wanted, RenderPriority::Medium)
        .await;
    assert!(fresh.from_cache);
    assert!(!fresh.is_fallback);
    assert_eq!(fresh.actual_scale, Some(32.0));
}

/// Rapid pinch reversal: the scale-change mass abort kills mismatched
/// in-flight work and the retry queue stays empty during the gesture.
#[tokio::test]
async fn test_rapid_pinch_reversal_aborts_stale_scales() {
    let rasterizer = MockRasterizer::slow(Duration::from_millis(80));
    let stack = stack(DeviceTier::High, rasterizer.clone());

    let mass_aborts = Arc::new(AtomicU64::new(0));
    let counter = mass_aborts.clone();
    let coordinator = stack.coordinator.clone();
    stack.orchestrator.on_mass_abort(move |new_scale, old_scale| {
        counter.fetch_add(1, Ordering::SeqCst);
        coordinator.abort_stale_scale_tiles(new_scale, old_scale);
    });

    let t0 = Instant::now();
    // Zoom 1 -> 8 fires the mass abort on gesture start (2 -> 16).
    stack.orchestrator.handle_zoom(&pinch(8.0, t0));
    assert_eq!(mass_aborts.load(Ordering::SeqCst), 1);

    // Issue slow renders at the gesture's scale.
    let pending: Vec<_> = (0..4)
        .map(|x| {
            let coordinator = stack.coordinator.clone();
            let tile = TileCoordinate::new("doc", 0, x, 0, 16.0, 256);
            tokio::spawn(async move { coordinator.request_tile(tile, RenderPriority::High).await })
        })
        .collect();

    // Let the executors start, then reverse the pinch hard: 16 -> 4.
    tokio::time::sleep(Duration::from_millis(10)).await;
    stack.coordinator.abort_stale_scale_tiles(4.0, Some(16.0));

    let mut aborted = 0;
    for handle in pending {
        let result = handle.await.unwrap();
        if !result.success {
            assert_eq!(result.error, Some(RenderError::Aborted));
            aborted += 1;
        }
    }
    assert!(aborted > 0, "reversal aborted none of the in-flight renders");

    // Mid-gesture nothing may sit in the retry queue.
    assert_eq!(stack.coordinator.retry_queue_len(), 0);
    assert_eq!(stack.coordinator.semaphore().waiting(), 0);
}

/// Queue overflow: with a small lane cap, surplus low-priority requests
/// resolve as Dropped and permits are conserved throughout.
#[tokio::test]
async fn test_queue_overflow_drops_extras() {
    let rasterizer = MockRasterizer::slow(Duration::from_millis(40));
    // Low tier: 2 permits; testing preset: queue cap 8.
    let stack = stack(DeviceTier::Low, rasterizer);

    let tiles: Vec<_> = (0..30)
        .map(|x| TileCoordinate::new("doc", 0, x, 0, 4.0, 256))
        .collect();
    let results = join_all(
        tiles
            .iter()
            .map(|tile| stack.coordinator.request_tile(tile.clone(), RenderPriority::Low)),
    )
    .await;

    let succeeded = results.iter().filter(|r| r.success).count();
    let dropped = results
        .iter()
        .filter(|r| r.error == Some(RenderError::Dropped))
        .count();

    // 2 run immediately, 8 wait their turn, the rest are shed.
    assert_eq!(succeeded, 10);
    assert_eq!(dropped, 20);
    assert_eq!(results.len(), succeeded + dropped);

    // Permits all returned, queue empty.
    assert_eq!(stack.coordinator.semaphore().available_permits(), 2);
    assert_eq!(stack.coordinator.semaphore().waiting(), 0);

    let diag = stack.coordinator.diagnostics();
    assert_eq!(diag.dropped, 20);
    assert!(diag.retry_queue_len <= stack.config.coordinator.retry.max_entries);
}

/// A rasterizer failure is surfaced in the result, never cached, and the
/// next request tries again.
#[tokio::test]
async fn test_rasterizer_failure_not_cached() {
    let rasterizer = MockRasterizer::failing(vec![3]);
    let stack = stack(DeviceTier::High, rasterizer.clone());

    let tile = TileCoordinate::new("doc", 3, 0, 0, 4.0, 256);
    let result = stack
        .coordinator
        .request_tile(tile.clone(), RenderPriority::High)
        .await;
    assert!(!result.success);
    assert!(matches!(result.error, Some(RenderError::Rasterizer(_))));
    assert!(stack.cache.get(&tile).is_none());

    let retry = stack
        .coordinator
        .request_tile(tile, RenderPriority::High)
        .await;
    assert!(!retry.success);
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 2);
}

/// Tile-ready notifications are gated: silent while the gesture moves,
/// silent for low priority, emitted once rendering or idle.
#[tokio::test]
async fn test_tile_ready_gating() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer);
    let ready = stack.coordinator.tile_ready_receiver();

    // Mid-gesture completions stay silent.
    let t0 = Instant::now();
    stack.orchestrator.handle_zoom(&pinch(2.0, t0));
    assert_eq!(stack.orchestrator.phase(), ZoomPhase::Zooming);
    let during = TileCoordinate::new("doc", 0, 0, 0, 4.0, 256);
    stack
        .coordinator
        .request_tile(during, RenderPriority::High)
        .await;
    assert!(ready.try_recv().is_err());

    // Settle into the render phase; high-priority completions notify.
    stack.orchestrator.handle_zoom(&release(2.0, t0 + Duration::from_millis(10)));
    settle(&stack, t0 + Duration::from_millis(10));
    let after = TileCoordinate::new("doc", 0, 1, 0, 4.0, 256);
    stack
        .coordinator
        .request_tile(after, RenderPriority::High)
        .await;
    let event = ready.try_recv().expect("tile-ready after settle");
    assert_eq!(event.page, 0);
    assert_eq!(event.priority, RenderPriority::High);

    // Low-priority completions never notify.
    let low = TileCoordinate::new("doc", 0, 2, 0, 4.0, 256);
    stack
        .coordinator
        .request_tile(low, RenderPriority::Low)
        .await;
    assert!(ready.try_recv().is_err());
}

/// Duplicate concurrent requests collapse into one rasterization.
#[tokio::test]
async fn test_in_flight_deduplication() {
    let rasterizer = MockRasterizer::slow(Duration::from_millis(30));
    let stack = stack(DeviceTier::High, rasterizer.clone());

    let tile = TileCoordinate::new("doc", 0, 5, 5, 4.0, 256);
    let results = join_all((0..6).map(|_| {
        stack
            .coordinator
            .request_tile(tile.clone(), RenderPriority::High)
    }))
    .await;

    assert!(results.iter().all(|r| r.success));
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 1);
}

/// A newer scale for the same grid position supersedes the older
/// in-flight request.
#[tokio::test]
async fn test_scale_change_supersedes_position() {
    let rasterizer = MockRasterizer::slow(Duration::from_millis(60));
    let stack = stack(DeviceTier::High, rasterizer);

    let old_tile = TileCoordinate::new("doc", 0, 7, 7, 4.0, 256);
    let old_request = {
        let coordinator = stack.coordinator.clone();
        let tile = old_tile.clone();
        tokio::spawn(async move { coordinator.request_tile(tile, RenderPriority::High).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let new_tile = old_tile.at_scale(8.0);
    let new_result = stack
        .coordinator
        .request_tile(new_tile, RenderPriority::High)
        .await;
    assert!(new_result.success);

    let old_result = old_request.await.unwrap();
    // The superseded request was aborted (it may still carry a fallback).
    assert_eq!(old_result.error, Some(RenderError::Aborted));
}

/// Stale-session abort: old sessions die, the current session survives,
/// and the semaphore queue is left alone.
#[tokio::test]
async fn test_stale_session_abort() {
    let rasterizer = MockRasterizer::slow(Duration::from_millis(80));
    let stack = stack(DeviceTier::High, rasterizer);

    stack.coordinator.begin_session();
    let old_tile = TileCoordinate::new("doc", 0, 0, 0, 4.0, 256);
    let old_request = {
        let coordinator = stack.coordinator.clone();
        let tile = old_tile.clone();
        tokio::spawn(async move { coordinator.request_tile(tile, RenderPriority::High).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Several scroll ticks later, a fresh request arrives.
    for _ in 0..4 {
        stack.coordinator.begin_session();
    }
    let fresh_tile = TileCoordinate::new("doc", 0, 9, 0, 4.0, 256);
    let fresh_request = {
        let coordinator = stack.coordinator.clone();
        let tile = fresh_tile.clone();
        tokio::spawn(async move { coordinator.request_tile(tile, RenderPriority::High).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    stack.coordinator.abort_stale_sessions(2);

    let old_result = old_request.await.unwrap();
    assert_eq!(old_result.error, Some(RenderError::Aborted));

    let fresh_result = fresh_request.await.unwrap();
    assert!(fresh_result.success);
    assert!(fresh_result.error.is_none());
}

/// Epoch staleness: a zoom change after a render invalidates the epoch the
/// result was stamped with.
#[tokio::test]
async fn test_epoch_invalidation_after_zoom() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer);

    let tile = TileCoordinate::new("doc", 0, 0, 0, 2.0, 256);
    let result = stack
        .coordinator
        .request_tile(tile, RenderPriority::High)
        .await;
    assert!(stack.manager.validate_epoch(result.scale_epoch));

    // The zoom moves on; the old stamp is now stale and the compositor
    // would skip the bitmap.
    stack.orchestrator.handle_zoom(&pinch(6.0, Instant::now()));
    assert!(!stack.manager.validate_epoch(result.scale_epoch));
}

/// A reduced-quality prefetch renders coarser pixels but is cached under
/// the lookup-scale key with a compensating stretch factor.
#[tokio::test]
async fn test_prefetch_quality_reduces_rendered_scale() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer.clone());

    let tile = TileCoordinate::new("doc", 0, 2, 2, 8.0, 256);
    let result = stack
        .coordinator
        .request_prefetch_tile(tile.clone(), RenderPriority::Low, 0.5)
        .await;
    assert!(result.success);

    // The rasterizer saw the reduced scale...
    let rendered = rasterizer.rendered_tiles();
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].scale(), 4.0);

    // ...but the cache entry lives under the requested scale, with the
    // upscale factor recorded on the bitmap.
    let cached = stack.cache.get(&tile).expect("cached under lookup key");
    assert_eq!(cached.css_scale_factor, Some(2.0));
}

/// A prebuilt request dispatches through the same paths and carries the
/// stamp of the snapshot it was built from.
#[tokio::test]
async fn test_prebuilt_request_dispatch() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer);

    let tile = TileCoordinate::new("doc", 0, 3, 2, 4.0, 256);
    let request = stack
        .coordinator
        .make_tile_request(tile.clone(), RenderPriority::Medium);
    let stamped_epoch = match &request {
        vellum::render::types::RenderRequest::Tile { scale_epoch, .. } => *scale_epoch,
        _ => unreachable!(),
    };

    let result = stack.coordinator.request(request).await;
    assert!(result.success);
    assert_eq!(result.scale_epoch, stamped_epoch);
    assert!(stack.cache.get(&tile).is_some());
}

/// Full-page requests flow through the page cache.
#[tokio::test]
async fn test_page_render_and_cache() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer.clone());

    let result = stack
        .coordinator
        .request_page(2, 1.5, RenderPriority::High)
        .await;
    assert!(result.success);
    assert!(!result.from_cache);

    let again = stack
        .coordinator
        .request_page(2, 1.5, RenderPriority::High)
        .await;
    assert!(again.from_cache);
    assert_eq!(rasterizer.calls.load(Ordering::SeqCst), 1);
}

/// After a reversal settles, newly scheduled tiles are at the final tier
/// only.
#[tokio::test]
async fn test_settled_scale_drives_new_requests() {
    let rasterizer = MockRasterizer::instant();
    let stack = stack(DeviceTier::High, rasterizer.clone());
    let t0 = Instant::now();

    stack.orchestrator.handle_zoom(&pinch(8.0, t0));
    stack
        .orchestrator
        .handle_zoom(&release(2.0, t0 + Duration::from_millis(30)));
    settle(&stack, t0 + Duration::from_millis(30));

    // zoom 2 * dpr 2 = 4.
    let state = stack.manager.current_state();
    assert_eq!(state.scale, 4.0);

    let strategy = ScrollStrategy::new(
        stack.config.scale.clone(),
        DeviceProfile::for_tier(DeviceTier::High),
        stack.config.prefetch.speed_zones.clone(),
        stack.config.prefetch.max_prefetch_tiles,
    );
    let pages = vec![PageLayout::new(0, 0.0, 0.0, 612.0, 792.0)];
    let viewport = Viewport::new(0.0, 0.0, 300.0, 300.0);
    let visible = strategy.visible_tiles(&viewport, &pages, 2.0, 2.0, &"doc".into(), None);

    join_all(
        visible
            .iter()
            .map(|tile| stack.coordinator.request_tile(tile.clone(), RenderPriority::High)),
    )
    .await;

    let rendered = rasterizer.rendered_tiles();
    assert!(!rendered.is_empty());
    assert!(rendered.iter().all(|t| t.scale() == 4.0));
}
