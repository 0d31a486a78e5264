//! Visible-tile computation and velocity-aware prefetch
//!
//! Two strategies coexist: [`ScrollStrategy`] for continuous scrolling
//! documents and [`PaginatedStrategy`] for page-at-a-time viewing. Both
//! derive the tile grid from the adaptive tile size and the quantized
//! lookup scale, so the tiles they emit always match the coordinator's
//! dedup keys and the cache keys.

use crate::core::config::ScaleConfig;
use crate::core::coords::{DocumentId, TileCoordinate};
use crate::core::geometry::{PageLayout, Point, Rect};
use crate::device::DeviceProfile;
use crate::render::types::RenderPriority;
use crate::scale::model::ScaleModel;
use crate::viewport::{SpeedZoneTable, Viewport};

/// A prefetch candidate with its scheduling metadata
#[derive(Debug, Clone, PartialEq)]
pub struct PrioritizedTile {
    pub tile: TileCoordinate,
    pub priority: RenderPriority,
    /// Distance from the viewport center (or focal point), in viewport
    /// units (or tile units under a focal override)
    pub distance: f64,
    /// Multiplier on the rendered scale; never applied to the lookup scale
    pub quality: f64,
}

/// Computes visible and prefetch tiles for a viewport
pub trait ViewportStrategy: Send + Sync {
    /// Tiles intersecting the viewport, sorted by distance from the focal
    /// point (when a zoom gesture is active) or the viewport center.
    fn visible_tiles(
        &self,
        viewport: &Viewport,
        pages: &[PageLayout],
        zoom: f64,
        dpr: f64,
        document: &DocumentId,
        focal: Option<Point>,
    ) -> Vec<TileCoordinate>;

    /// Prefetch candidates around the viewport with per-tile priorities.
    fn prefetch_tiles(
        &self,
        viewport: &Viewport,
        pages: &[PageLayout],
        zoom: f64,
        dpr: f64,
        document: &DocumentId,
        focal: Option<Point>,
    ) -> Vec<PrioritizedTile>;
}

/// The quantized cache-lookup scale for a zoom level.
fn lookup_scale(model: &ScaleModel, config: &ScaleConfig, zoom: f64, dpr: f64) -> f64 {
    if config.use_exact_scale {
        model.exact_target(zoom, dpr, Some(config.max_zoom)).scale
    } else {
        model.target_tier(zoom, dpr, Some(config.max_zoom)).tier
    }
}

/// Tiles of one page's grid intersecting `region` (document coordinates).
fn tiles_in_region(
    page: &PageLayout,
    region: &Rect,
    scale: f64,
    tile_size: u32,
    document: &DocumentId,
    out: &mut Vec<TileCoordinate>,
) {
    let clamped = match region.intersection(&page.rect()) {
        Some(rect) if rect.area() > 0.0 => rect,
        _ => return,
    };

    // Tile indices are relative to the page origin.
    let units = tile_size as f64 / scale;
    let rel_x = clamped.x - page.x;
    let rel_y = clamped.y - page.y;

    let max_x = ((page.width * scale / tile_size as f64).ceil() as i64 - 1).max(0);
    let max_y = ((page.height * scale / tile_size as f64).ceil() as i64 - 1).max(0);

    let first_x = (rel_x / units).floor().max(0.0) as i64;
    let first_y = (rel_y / units).floor().max(0.0) as i64;
    let last_x = (((rel_x + clamped.width) / units).ceil() as i64 - 1).min(max_x);
    let last_y = (((rel_y + clamped.height) / units).ceil() as i64 - 1).min(max_y);

    for tile_y in first_y..=last_y {
        for tile_x in first_x..=last_x {
            out.push(TileCoordinate::new(
                document.clone(),
                page.page,
                tile_x as u32,
                tile_y as u32,
                scale,
                tile_size,
            ));
        }
    }
}

/// Center of a tile in document coordinates.
fn tile_center(tile: &TileCoordinate, pages: &[PageLayout]) -> Point {
    let origin = pages
        .iter()
        .find(|p| p.page == tile.page)
        .map(|p| Point::new(p.x, p.y))
        .unwrap_or_default();
    let region = tile.page_region();
    Point::new(
        origin.x + region.x + region.width / 2.0,
        origin.y + region.y + region.height / 2.0,
    )
}

/// Radial focal-point priority in tile units.
fn focal_priority(distance_tiles: f64) -> RenderPriority {
    if distance_tiles <= 1.0 {
        RenderPriority::Critical
    } else if distance_tiles <= 2.0 {
        RenderPriority::High
    } else if distance_tiles <= 4.0 {
        RenderPriority::Medium
    } else {
        RenderPriority::Low
    }
}

/// Priority from a distance in viewport units.
fn distance_priority(distance: f64) -> RenderPriority {
    if distance < 0.5 {
        RenderPriority::Critical
    } else if distance < 1.5 {
        RenderPriority::High
    } else if distance < 2.5 {
        RenderPriority::Medium
    } else {
        RenderPriority::Low
    }
}

fn sorted_visible(
    mut tiles: Vec<TileCoordinate>,
    pages: &[PageLayout],
    anchor: Point,
) -> Vec<TileCoordinate> {
    tiles.sort_by(|a, b| {
        let da = tile_center(a, pages).distance_to(&anchor);
        let db = tile_center(b, pages).distance_to(&anchor);
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    tiles
}

/// Strategy for continuously scrolling documents.
///
/// Prefetch expands the viewport asymmetrically along the scroll direction;
/// the lookahead and the render-quality factor come from the speed zone of
/// the velocity magnitude.
pub struct ScrollStrategy {
    model: ScaleModel,
    config: ScaleConfig,
    speed_zones: SpeedZoneTable,
    max_prefetch_tiles: usize,
}

impl ScrollStrategy {
    pub fn new(
        config: ScaleConfig,
        device: DeviceProfile,
        speed_zones: SpeedZoneTable,
        max_prefetch_tiles: usize,
    ) -> Self {
        Self {
            model: ScaleModel::new(&config.tier_set, device),
            config,
            speed_zones,
            max_prefetch_tiles,
        }
    }

    /// Viewport expanded by `lookahead` viewports along the scroll
    /// direction, with a small symmetric cushion everywhere else.
    fn expanded_rect(viewport: &Viewport, lookahead: f64) -> Rect {
        let rect = viewport.rect();
        let dir = viewport.scroll_direction();

        if dir.magnitude() < f64::EPSILON {
            // Stationary: grow evenly on all sides.
            let dx = viewport.width * lookahead / 2.0;
            let dy = viewport.height * lookahead / 2.0;
            return Rect::new(
                rect.x - dx,
                rect.y - dy,
                rect.width + 2.0 * dx,
                rect.height + 2.0 * dy,
            );
        }

        let cushion_x = viewport.width * 0.25;
        let cushion_y = viewport.height * 0.25;
        let ahead_x = viewport.width * lookahead * dir.x.abs();
        let ahead_y = viewport.height * lookahead * dir.y.abs();

        let mut x = rect.x - cushion_x;
        let mut y = rect.y - cushion_y;
        let mut width = rect.width + 2.0 * cushion_x;
        let mut height = rect.height + 2.0 * cushion_y;

        if dir.x > 0.0 {
            width += ahead_x;
        } else if dir.x < 0.0 {
            x -= ahead_x;
            width += ahead_x;
        }
        if dir.y > 0.0 {
            height += ahead_y;
        } else if dir.y < 0.0 {
            y -= ahead_y;
            height += ahead_y;
        }

        Rect::new(x, y, width, height)
    }

    /// Distance from the viewport center projected onto the scroll
    /// direction, in viewport units; radial when stationary.
    fn scroll_distance(viewport: &Viewport, center: Point) -> f64 {
        let delta = center.subtract(&viewport.center());
        let dir = viewport.scroll_direction();
        let size = (viewport.width * dir.x.abs() + viewport.height * dir.y.abs())
            .max(viewport.height.min(viewport.width));

        if dir.magnitude() < f64::EPSILON {
            delta.magnitude() / viewport.height.max(f64::EPSILON)
        } else {
            delta.dot(&dir).abs() / size.max(f64::EPSILON)
        }
    }
}

impl ViewportStrategy for ScrollStrategy {
    fn visible_tiles(
        &self,
        viewport: &Viewport,
        pages: &[PageLayout],
        zoom: f64,
        dpr: f64,
        document: &DocumentId,
        focal: Option<Point>,
    ) -> Vec<TileCoordinate> {
        let scale = lookup_scale(&self.model, &self.config, zoom, dpr);
        let tile_size = self.model.adaptive_tile_size(zoom, dpr);
        let rect = viewport.rect();

        let mut tiles = Vec::new();
        for page in pages {
            tiles_in_region(page, &rect, scale, tile_size, document, &mut tiles);
        }

        let anchor = focal.unwrap_or_else(|| viewport.center());
        sorted_visible(tiles, pages, anchor)
    }

    fn prefetch_tiles(
        &self,
        viewport: &Viewport,
        pages: &[PageLayout],
        zoom: f64,
        dpr: f64,
        document: &DocumentId,
        focal: Option<Point>,
    ) -> Vec<PrioritizedTile> {
        let scale = lookup_scale(&self.model, &self.config, zoom, dpr);
        let tile_size = self.model.adaptive_tile_size(zoom, dpr);

        let zone = self.speed_zones.classify(viewport.speed());
        let area = Self::expanded_rect(viewport, zone.lookahead);

        let mut raw = Vec::new();
        for page in pages {
            tiles_in_region(page, &area, scale, tile_size, document, &mut raw);
        }

        let mut tiles: Vec<PrioritizedTile> = raw
            .into_iter()
            .map(|tile| {
                let center = tile_center(&tile, pages);
                let (priority, distance) = match focal {
                    Some(focal) => {
                        let units = tile_size as f64 / scale;
                        let distance = center.distance_to(&focal) / units.max(f64::EPSILON);
                        (focal_priority(distance), distance)
                    }
                    None => {
                        let distance = Self::scroll_distance(viewport, center);
                        (distance_priority(distance), distance)
                    }
                };
                PrioritizedTile {
                    tile,
                    priority,
                    distance,
                    quality: zone.quality,
                }
            })
            .collect();

        tiles.sort_by(|a, b| {
            a.priority
                .lane()
                .cmp(&b.priority.lane())
                .then(a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal))
        });
        tiles.truncate(self.max_prefetch_tiles);
        tiles
    }
}

/// Strategy for page-at-a-time viewing.
///
/// Prefetch fills out the current spread first, then reaches into the
/// neighboring pages; scroll velocity only decides how many neighbors.
pub struct PaginatedStrategy {
    model: ScaleModel,
    config: ScaleConfig,
    speed_zones: SpeedZoneTable,
    max_prefetch_tiles: usize,
}

impl PaginatedStrategy {
    pub fn new(
        config: ScaleConfig,
        device: DeviceProfile,
        speed_zones: SpeedZoneTable,
        max_prefetch_tiles: usize,
    ) -> Self {
        Self {
            model: ScaleModel::new(&config.tier_set, device),
            config,
            speed_zones,
            max_prefetch_tiles,
        }
    }

    fn visible_pages(viewport: &Viewport, pages: &[PageLayout]) -> Vec<u32> {
        let rect = viewport.rect();
        pages
            .iter()
            .filter(|p| p.rect().intersects(&rect))
            .map(|p| p.page)
            .collect()
    }
}

impl ViewportStrategy for PaginatedStrategy {
    fn visible_tiles(
        &self,
        viewport: &Viewport,
        pages: &[PageLayout],
        zoom: f64,
        dpr: f64,
        document: &DocumentId,
        focal: Option<Point>,
    ) -> Vec<TileCoordinate> {
        let scale = lookup_scale(&self.model, &self.config, zoom, dpr);
        let tile_size = self.model.adaptive_tile_size(zoom, dpr);
        let rect = viewport.rect();

        let mut tiles = Vec::new();
        for page in pages {
            tiles_in_region(page, &rect, scale, tile_size, document, &mut tiles);
        }

        let anchor = focal.unwrap_or_else(|| viewport.center());
        sorted_visible(tiles, pages, anchor)
    }

    fn prefetch_tiles(
        &self,
        viewport: &Viewport,
        pages: &[PageLayout],
        zoom: f64,
        dpr: f64,
        document: &DocumentId,
        focal: Option<Point>,
    ) -> Vec<PrioritizedTile> {
        let scale = lookup_scale(&self.model, &self.config, zoom, dpr);
        let tile_size = self.model.adaptive_tile_size(zoom, dpr);

        let zone = self.speed_zones.classify(viewport.speed());
        let neighbor_reach = zone.lookahead.round().max(1.0) as u32;

        let visible = Self::visible_pages(viewport, pages);
        let min_page = visible.iter().min().copied().unwrap_or(0);
        let max_page = visible.iter().max().copied().unwrap_or(0);

        let mut tiles = Vec::new();
        for page in pages {
            let in_spread = visible.contains(&page.page);
            let reachable = page.page + neighbor_reach >= min_page
                && page.page <= max_page + neighbor_reach;
            if !in_spread && !reachable {
                continue;
            }

            let mut page_tiles = Vec::new();
            tiles_in_region(page, &page.rect(), scale, tile_size, document, &mut page_tiles);

            for tile in page_tiles {
                let center = tile_center(&tile, pages);
                let (priority, distance) = match focal {
                    Some(focal) if in_spread => {
                        let units = tile_size as f64 / scale;
                        let distance = center.distance_to(&focal) / units.max(f64::EPSILON);
                        (focal_priority(distance), distance)
                    }
                    _ => {
                        let distance = center.distance_to(&viewport.center())
                            / viewport.height.max(f64::EPSILON);
                        let priority = if in_spread {
                            distance_priority(distance)
                        } else {
                            RenderPriority::Low
                        };
                        (priority, distance)
                    }
                };
                tiles.push(PrioritizedTile {
                    tile,
                    priority,
                    distance,
                    quality: if in_spread { 1.0 } else { zone.quality },
                });
            }
        }

        tiles.sort_by(|a, b| {
            a.priority
                .lane()
                .cmp(&b.priority.lane())
                .then(a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal))
        });
        tiles.truncate(self.max_prefetch_tiles);
        tiles
    }
}
