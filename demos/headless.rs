use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use vellum::cache::tiered::{CachedTile, TieredTileCache};
use vellum::core::config::RendererConfig;
use vellum::core::coords::{DocumentId, TileCoordinate};
use vellum::core::geometry::{PageLayout, Point};
use vellum::device::DeviceProfile;
use vellum::render::coordinator::RenderCoordinator;
use vellum::render::types::RenderPriority;
use vellum::scale::state::ScaleStateManager;
use vellum::traits::{BoxFuture, TileRasterizer};
use vellum::viewport::strategy::{ScrollStrategy, ViewportStrategy};
use vellum::viewport::Viewport;
use vellum::zoom::events::{GestureKind, ZoomState};
use vellum::zoom::orchestrator::{ZoomOrchestrator, ZoomPhase};

/// Stand-in rasterizer producing flat-color tiles after a short delay
struct SyntheticRasterizer;

impl TileRasterizer for SyntheticRasterizer {
    fn render_tile(
        &self,
        tile: TileCoordinate,
        _document: DocumentId,
    ) -> BoxFuture<'_, vellum::Result<CachedTile>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(3)).await;
            Ok(CachedTile::rgba(
                vec![(tile.scale_q % 251) as u8; 256],
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
            tokio::time::sleep(Duration::from_millis(8)).await;
            Ok(CachedTile::rgba(vec![page as u8; 256], 612, 792))
        })
    }
}

/// Example of driving the rendering core without any UI
#[tokio::main]
async fn main() -> vellum::Result<()> {
    env_logger::init();

    println!("📄 Vellum Headless Example");
    println!("==========================");

    let config = RendererConfig::default();
    let device = DeviceProfile::detect().clone();
    println!("✅ Device profile:");
    println!("   Tier: {:?}", device.tier);
    println!("   Cores: {}", device.cores);
    println!("   Permits: {}", device.permit_count());
    println!("   Max tile pixels: {}", device.max_tile_pixels());

    let manager = Arc::new(ScaleStateManager::new(
        "demo-doc",
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
        "demo-doc",
        config.coordinator.clone(),
        device.clone(),
        manager.clone(),
        orchestrator.clone(),
        cache.clone(),
        Arc::new(SyntheticRasterizer),
        None,
    );

    {
        let coordinator = coordinator.clone();
        orchestrator.on_mass_abort(move |new_scale, old_scale| {
            coordinator.abort_stale_scale_tiles(new_scale, old_scale);
        });
    }

    // A three-page document, stacked vertically.
    let pages: Vec<PageLayout> = (0..3)
        .map(|i| PageLayout::new(i, 0.0, i as f64 * 802.0, 612.0, 792.0))
        .collect();
    println!("✅ Document layout: {} pages", pages.len());

    // Simulate a pinch from 100% to 400%.
    println!("\n🔍 Simulating pinch gesture 1.0 -> 4.0:");
    let start = Instant::now();
    for (i, zoom) in [1.5, 2.0, 3.0, 4.0].iter().enumerate() {
        let event = ZoomState::new(*zoom, start + Duration::from_millis(i as u64 * 30))
            .active(GestureKind::Pinch)
            .with_focal_point(Point::new(306.0, 396.0));
        orchestrator.handle_zoom(&event);
        println!("   zoom {:.1} -> phase {:?}", zoom, orchestrator.phase());
    }

    // Wait out the quiet and settling windows.
    loop {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if let Some(phase) = orchestrator.update() {
            println!("   phase transition -> {:?}", phase);
            if phase == ZoomPhase::Rendering {
                break;
            }
        }
    }

    let snapshot = manager.capture_snapshot();
    println!("\n📐 Settled scale state:");
    println!("   Scale: {}", snapshot.scale);
    println!("   Epoch: {}", snapshot.epoch);
    println!("   CSS stretch: {:.3}", snapshot.css_stretch);
    println!("   Mode: {:?}", snapshot.render_mode);

    // Schedule and render the visible tiles.
    let strategy = ScrollStrategy::new(
        config.scale.clone(),
        device,
        config.prefetch.speed_zones.clone(),
        config.prefetch.max_prefetch_tiles,
    );
    let viewport = Viewport::new(0.0, 0.0, 306.0, 396.0);
    let visible = strategy.visible_tiles(&viewport, &pages, 4.0, 2.0, &"demo-doc".into(), None);
    println!("\n🧩 Rendering {} visible tiles:", visible.len());

    coordinator.begin_session();
    let results = join_all(
        visible
            .iter()
            .map(|tile| coordinator.request_tile(tile.clone(), RenderPriority::High)),
    )
    .await;
    let ok = results.iter().filter(|r| r.success).count();
    println!("   {} of {} tiles rendered", ok, results.len());

    // Scroll fast downward and prefetch.
    println!("\n🚀 Prefetch for a fast downward scroll:");
    let scrolling = Viewport::new(0.0, 400.0, 612.0, 792.0).with_velocity(Point::new(0.0, 800.0));
    let prefetch = strategy.prefetch_tiles(&scrolling, &pages, 4.0, 2.0, &"demo-doc".into(), None);
    println!("   {} prefetch candidates", prefetch.len());
    if let Some(first) = prefetch.first() {
        println!(
            "   hottest: page {} ({}, {}) priority {:?} quality {:.2}",
            first.tile.page, first.tile.tile_x, first.tile.tile_y, first.priority, first.quality
        );
    }

    let upgrades = join_all(
        prefetch
            .iter()
            .take(32)
            .map(|p| coordinator.request_prefetch_tile(p.tile.clone(), p.priority, p.quality)),
    )
    .await;
    println!("   {} prefetch tiles resolved", upgrades.len());

    // Final statistics.
    let diag = coordinator.diagnostics();
    println!("\n📊 Scheduler statistics:");
    println!("   Completed: {}", diag.completed);
    println!("   From-cache fallbacks: {}", diag.fallbacks_served);
    println!("   Dropped: {}", diag.dropped);
    println!("   Aborted: {}", diag.aborted);
    println!(
        "   Cache hits (hot/warm/cold): {}/{}/{}",
        diag.cache.hot_hits, diag.cache.warm_hits, diag.cache.cold_hits
    );
    println!("   Cache misses: {}", diag.cache.misses);
    println!("   Current epoch: {}", diag.current_epoch);
    println!("   Cache bytes: {}", cache.bytes());

    println!("\n✅ Headless example completed successfully!");
    println!("   This demonstrates the scheduling core without a UI or a real rasterizer.");

    Ok(())
}
