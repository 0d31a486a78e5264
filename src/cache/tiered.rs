//! Three-tier bounded tile cache with best-available fallback lookup
//!
//! L1 (hot) holds tiles rendered for the current viewport, L2 (warm) the
//! general working set, L3 (cold) survivors that are still useful as
//! fallbacks. Each tier has its own byte budget and evicts LRU within the
//! tier only. A render-mode transition purges L1 but preserves L2/L3 so
//! fallbacks are available immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::cache::classification::{JpegSlice, PageClassification};
use crate::core::coords::{scale_key, DocumentId, TileCoordinate, TilePosition};
use crate::prelude::{HashMap, HashSet};

/// Opaque bitmap payload
#[derive(Debug, Clone, PartialEq)]
pub enum TileData {
    Png(Arc<Vec<u8>>),
    Rgba {
        pixels: Arc<Vec<u8>>,
        width: u32,
        height: u32,
    },
}

impl TileData {
    pub fn byte_len(&self) -> usize {
        match self {
            Self::Png(blob) => blob.len(),
            Self::Rgba { pixels, .. } => pixels.len(),
        }
    }
}

/// A cached rasterized tile
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTile {
    pub data: TileData,
    pub width: u32,
    pub height: u32,
    /// Whether the bitmap went through a post-render optimization pass
    pub optimized: bool,
    /// Stretch baked in at render time (reduced-scale strategies)
    pub css_scale_factor: Option<f64>,
    pub target_width: Option<u32>,
    pub target_height: Option<u32>,
}

impl CachedTile {
    pub fn rgba(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: TileData::Rgba {
                pixels: Arc::new(pixels),
                width,
                height,
            },
            width,
            height,
            optimized: false,
            css_scale_factor: None,
            target_width: None,
            target_height: None,
        }
    }

    pub fn png(blob: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data: TileData::Png(Arc::new(blob)),
            width,
            height,
            optimized: false,
            css_scale_factor: None,
            target_width: None,
            target_height: None,
        }
    }

    pub fn with_css_scale_factor(mut self, factor: f64) -> Self {
        self.css_scale_factor = Some(factor);
        self
    }

    pub fn byte_len(&self) -> usize {
        self.data.byte_len()
    }
}

/// Cache tier selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Hot,
    Warm,
    Cold,
}

impl CacheTier {
    fn index(&self) -> usize {
        match self {
            Self::Hot => 0,
            Self::Warm => 1,
            Self::Cold => 2,
        }
    }

    pub fn all() -> [CacheTier; 3] {
        [Self::Hot, Self::Warm, Self::Cold]
    }
}

/// A best-available lookup hit
#[derive(Debug, Clone)]
pub struct FallbackHit {
    pub data: CachedTile,
    pub actual_scale: f64,
    /// Factor that makes the bitmap appear at the requested scale
    pub css_stretch: f64,
    /// Grid coordinates of the tile actually served; grids at different
    /// scales do not share indices, so the compositor needs these to place
    /// the bitmap correctly.
    pub fallback_tile: TileCoordinate,
}

/// Per-tier hit/miss counters
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub hits: [AtomicU64; 3],
    pub misses: AtomicU64,
    pub fallback_hits: AtomicU64,
    pub evictions: AtomicU64,
}

/// Read-only view of the counters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    pub hot_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub fallback_hits: u64,
    pub evictions: u64,
}

struct TierStore {
    entries: LruCache<TileCoordinate, CachedTile>,
    bytes: usize,
    budget: usize,
}

impl TierStore {
    fn new(budget: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
            budget,
        }
    }

    fn insert(&mut self, key: TileCoordinate, value: CachedTile) -> Vec<TileCoordinate> {
        if let Some(old) = self.entries.put(key, value.clone()) {
            self.bytes = self.bytes.saturating_sub(old.byte_len());
        }
        self.bytes += value.byte_len();

        let mut evicted = Vec::new();
        while self.bytes > self.budget {
            match self.entries.pop_lru() {
                Some((key, tile)) => {
                    self.bytes = self.bytes.saturating_sub(tile.byte_len());
                    evicted.push(key);
                }
                None => break,
            }
        }
        evicted
    }

    fn remove(&mut self, key: &TileCoordinate) -> Option<CachedTile> {
        let removed = self.entries.pop(key);
        if let Some(tile) = &removed {
            self.bytes = self.bytes.saturating_sub(tile.byte_len());
        }
        removed
    }

    fn clear(&mut self) -> Vec<TileCoordinate> {
        let keys: Vec<_> = self.entries.iter().map(|(k, _)| k.clone()).collect();
        self.entries.clear();
        self.bytes = 0;
        keys
    }
}

type PageKey = (DocumentId, u32);
/// A tile grid on one page: (quantized scale, tile size)
type GridKey = (u32, u32);

struct CacheInner {
    tiers: [TierStore; 3],
    /// Reference counts of the grids present per page, for fallback search
    grids: HashMap<PageKey, HashMap<GridKey, usize>>,
    classifications: HashMap<PageKey, PageClassification>,
    full_pages: LruCache<(DocumentId, u32, u32), CachedTile>,
    full_page_bytes: usize,
    full_page_budget: usize,
    jpeg_slices: LruCache<PageKey, JpegSlice>,
    jpeg_bytes: usize,
    jpeg_budget: usize,
}

impl CacheInner {
    fn grid_inserted(&mut self, tile: &TileCoordinate) {
        let page = (tile.document.clone(), tile.page);
        let grid = (tile.scale_q, tile.tile_size);
        *self.grids.entry(page).or_default().entry(grid).or_insert(0) += 1;
    }

    fn grid_removed(&mut self, tile: &TileCoordinate) {
        let page = (tile.document.clone(), tile.page);
        if let Some(grids) = self.grids.get_mut(&page) {
            if let Some(count) = grids.get_mut(&(tile.scale_q, tile.tile_size)) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    grids.remove(&(tile.scale_q, tile.tile_size));
                }
            }
            if grids.is_empty() {
                self.grids.remove(&page);
            }
        }
    }
}

/// The 3-tier tile cache
pub struct TieredTileCache {
    inner: Mutex<CacheInner>,
    counters: CacheCounters,
}

impl TieredTileCache {
    pub fn new(device: &crate::device::DeviceProfile) -> Self {
        let (l1, l2, l3) = device.cache_budgets();
        Self::with_budgets(l1, l2, l3)
    }

    pub fn with_budgets(hot: usize, warm: usize, cold: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                tiers: [
                    TierStore::new(hot),
                    TierStore::new(warm),
                    TierStore::new(cold),
                ],
                grids: HashMap::default(),
                classifications: HashMap::default(),
                full_pages: LruCache::unbounded(),
                full_page_bytes: 0,
                full_page_budget: warm / 2,
                jpeg_slices: LruCache::unbounded(),
                jpeg_bytes: 0,
                jpeg_budget: 32 * 1024 * 1024,
            }),
            counters: CacheCounters::default(),
        }
    }

    /// Exact lookup on the full quantized key.
    pub fn get(&self, tile: &TileCoordinate) -> Option<CachedTile> {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        for tier in CacheTier::all() {
            if let Some(found) = inner.tiers[tier.index()].entries.get(tile) {
                let found = found.clone();
                self.counters.hits[tier.index()].fetch_add(1, Ordering::Relaxed);
                return Some(found);
            }
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Whether the exact key is cached, without touching LRU order.
    pub fn contains(&self, tile: &TileCoordinate) -> bool {
        let inner = self.inner.lock().expect("tile cache poisoned");
        inner
            .tiers
            .iter()
            .any(|store| store.entries.contains(tile))
    }

    /// Highest-scale cached tile covering the requested region, together
    /// with the stretch that makes it appear at the requested scale.
    ///
    /// The returned tile's region is always a superset of (or equal to) the
    /// requested tile's region in document coordinates.
    pub fn get_best_available(&self, tile: &TileCoordinate) -> Option<FallbackHit> {
        let requested_region = tile.page_region();
        let requested_scale = tile.scale();

        let mut inner = self.inner.lock().expect("tile cache poisoned");
        let page = (tile.document.clone(), tile.page);

        let mut grids: Vec<GridKey> = inner
            .grids
            .get(&page)
            .map(|grids| grids.keys().copied().collect())
            .unwrap_or_default();
        // Highest scale first; ties prefer the larger tile size.
        grids.sort_by(|a, b| b.cmp(a));

        for (scale_q, tile_size) in grids {
            let scale = scale_q as f64 * crate::core::constants::SCALE_QUANTUM;
            let units = tile_size as f64 / scale;
            let candidate = TileCoordinate {
                document: tile.document.clone(),
                page: tile.page,
                tile_x: (requested_region.x / units).floor().max(0.0) as u32,
                tile_y: (requested_region.y / units).floor().max(0.0) as u32,
                scale_q,
                tile_size,
            };

            // The candidate must cover the whole requested region; a tiny
            // epsilon absorbs float noise at shared grid edges.
            if !candidate
                .page_region()
                .inflate(1e-6)
                .contains_rect(&requested_region)
            {
                continue;
            }

            for tier in CacheTier::all() {
                if let Some(found) = inner.tiers[tier.index()].entries.get(&candidate) {
                    let found = found.clone();
                    self.counters.fallback_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(FallbackHit {
                        data: found,
                        actual_scale: scale,
                        css_stretch: requested_scale / scale,
                        fallback_tile: candidate,
                    });
                }
            }
        }

        None
    }

    /// Highest scale at which this exact grid position is cached, for a
    /// given tile size. Progressive rendering starts from here.
    pub fn best_scale_at(&self, position: &TilePosition, tile_size: u32) -> Option<f64> {
        let inner = self.inner.lock().expect("tile cache poisoned");
        let page = (position.document.clone(), position.page);

        let mut scales: Vec<u32> = inner
            .grids
            .get(&page)
            .map(|grids| {
                grids
                    .keys()
                    .filter(|(_, size)| *size == tile_size)
                    .map(|(scale_q, _)| *scale_q)
                    .collect()
            })
            .unwrap_or_default();
        scales.sort_unstable_by(|a, b| b.cmp(a));

        for scale_q in scales {
            let candidate = TileCoordinate {
                document: position.document.clone(),
                page: position.page,
                tile_x: position.tile_x,
                tile_y: position.tile_y,
                scale_q,
                tile_size,
            };
            if inner
                .tiers
                .iter()
                .any(|store| store.entries.contains(&candidate))
            {
                return Some(scale_q as f64 * crate::core::constants::SCALE_QUANTUM);
            }
        }
        None
    }

    /// Insert a tile into the chosen tier, evicting LRU within that tier
    /// if its byte budget overflows.
    pub fn set(&self, tile: TileCoordinate, data: CachedTile, tier: CacheTier) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");

        // A tile lives in exactly one tier.
        for other in CacheTier::all() {
            if other != tier && inner.tiers[other.index()].remove(&tile).is_some() {
                inner.grid_removed(&tile);
            }
        }

        let already_present = inner.tiers[tier.index()].entries.contains(&tile);
        let evicted = inner.tiers[tier.index()].insert(tile.clone(), data);
        if !already_present {
            inner.grid_inserted(&tile);
        }
        for key in evicted {
            inner.grid_removed(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn remove(&self, tile: &TileCoordinate) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        for tier in CacheTier::all() {
            if inner.tiers[tier.index()].remove(tile).is_some() {
                inner.grid_removed(tile);
            }
        }
    }

    /// Render-mode transition: purge the hot tier, keep warm/cold so
    /// fallbacks can be served immediately.
    pub fn on_mode_transition(&self) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        let purged = inner.tiers[CacheTier::Hot.index()].clear();
        log::debug!("mode transition: purged {} hot tiles", purged.len());
        for key in purged {
            inner.grid_removed(&key);
        }
    }

    /// Drop every entry belonging to a document.
    pub fn purge_document(&self, document: &DocumentId) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        for tier_index in 0..3 {
            let keys: Vec<_> = inner.tiers[tier_index]
                .entries
                .iter()
                .filter(|(k, _)| &k.document == document)
                .map(|(k, _)| k.clone())
                .collect();
            for key in keys {
                inner.tiers[tier_index].remove(&key);
                inner.grid_removed(&key);
            }
        }
        inner.classifications.retain(|(doc, _), _| doc != document);

        let full_keys: Vec<_> = inner
            .full_pages
            .iter()
            .filter(|((doc, _, _), _)| doc == document)
            .map(|(k, _)| k.clone())
            .collect();
        for key in full_keys {
            if let Some(tile) = inner.full_pages.pop(&key) {
                inner.full_page_bytes = inner.full_page_bytes.saturating_sub(tile.byte_len());
            }
        }

        let jpeg_keys: Vec<_> = inner
            .jpeg_slices
            .iter()
            .filter(|((doc, _), _)| doc == document)
            .map(|(k, _)| k.clone())
            .collect();
        for key in jpeg_keys {
            if let Some(slice) = inner.jpeg_slices.pop(&key) {
                inner.jpeg_bytes = inner.jpeg_bytes.saturating_sub(slice.byte_len());
            }
        }
    }

    pub fn page_classification(
        &self,
        document: &DocumentId,
        page: u32,
    ) -> Option<PageClassification> {
        let inner = self.inner.lock().expect("tile cache poisoned");
        inner.classifications.get(&(document.clone(), page)).cloned()
    }

    pub fn set_page_classification(
        &self,
        document: &DocumentId,
        page: u32,
        classification: PageClassification,
    ) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        inner
            .classifications
            .insert((document.clone(), page), classification);
    }

    /// Full-page bitmap lookup for render modes below the tiling threshold.
    pub fn full_page(&self, document: &DocumentId, page: u32, scale: f64) -> Option<CachedTile> {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        inner
            .full_pages
            .get(&(document.clone(), page, scale_key(scale)))
            .cloned()
    }

    pub fn set_full_page(&self, document: &DocumentId, page: u32, scale: f64, data: CachedTile) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        let key = (document.clone(), page, scale_key(scale));
        if let Some(old) = inner.full_pages.put(key, data.clone()) {
            inner.full_page_bytes = inner.full_page_bytes.saturating_sub(old.byte_len());
        }
        inner.full_page_bytes += data.byte_len();
        while inner.full_page_bytes > inner.full_page_budget {
            match inner.full_pages.pop_lru() {
                Some((_, old)) => {
                    inner.full_page_bytes = inner.full_page_bytes.saturating_sub(old.byte_len());
                }
                None => break,
            }
        }
    }

    pub fn jpeg_slice(&self, document: &DocumentId, page: u32) -> Option<JpegSlice> {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        inner.jpeg_slices.get(&(document.clone(), page)).cloned()
    }

    pub fn set_jpeg_slice(&self, document: &DocumentId, page: u32, slice: JpegSlice) {
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        if let Some(old) = inner.jpeg_slices.put((document.clone(), page), slice.clone()) {
            inner.jpeg_bytes = inner.jpeg_bytes.saturating_sub(old.byte_len());
        }
        inner.jpeg_bytes += slice.byte_len();
        while inner.jpeg_bytes > inner.jpeg_budget {
            match inner.jpeg_slices.pop_lru() {
                Some((_, old)) => {
                    inner.jpeg_bytes = inner.jpeg_bytes.saturating_sub(old.byte_len());
                }
                None => break,
            }
        }
    }

    /// Resize the JPEG-slice budget from the detected system memory.
    pub fn set_jpeg_budget(&self, memory_gb: f64) {
        let mb = 1024 * 1024;
        let budget = if memory_gb >= 8.0 {
            64 * mb
        } else if memory_gb >= 4.0 {
            32 * mb
        } else {
            16 * mb
        };
        let mut inner = self.inner.lock().expect("tile cache poisoned");
        inner.jpeg_budget = budget;
        while inner.jpeg_bytes > inner.jpeg_budget {
            match inner.jpeg_slices.pop_lru() {
                Some((_, old)) => {
                    inner.jpeg_bytes = inner.jpeg_bytes.saturating_sub(old.byte_len());
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("tile cache poisoned");
        inner.tiers.iter().map(|t| t.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> usize {
        let inner = self.inner.lock().expect("tile cache poisoned");
        inner.tiers.iter().map(|t| t.bytes).sum()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hot_hits: self.counters.hits[0].load(Ordering::Relaxed),
            warm_hits: self.counters.hits[1].load(Ordering::Relaxed),
            cold_hits: self.counters.hits[2].load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fallback_hits: self.counters.fallback_hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Every document with at least one cached tile.
    pub fn documents(&self) -> HashSet<DocumentId> {
        let inner = self.inner.lock().expect("tile cache poisoned");
        inner.grids.keys().map(|(doc, _)| doc.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::classification::PageContentType;

    fn tile_bytes(n: usize) -> CachedTile {
        CachedTile::rgba(vec![0u8; n], 16, 16)
    }

    fn cache() -> TieredTileCache {
        TieredTileCache::with_budgets(1024, 1024, 1024)
    }

    #[test]
    fn test_exact_get_round_trip() {
        let cache = cache();
        let tile = TileCoordinate::new("doc", 0, 1, 2, 4.0, 256);
        cache.set(tile.clone(), tile_bytes(64), CacheTier::Warm);

        let hit = cache.get(&tile).unwrap();
        assert_eq!(hit.byte_len(), 64);
        assert_eq!(cache.stats().warm_hits, 1);
    }

    #[test]
    fn test_exact_scale_never_cross_matches() {
        let cache = cache();
        let stored = TileCoordinate::new("doc", 0, 0, 0, 8.0, 256);
        cache.set(stored, tile_bytes(64), CacheTier::Warm);

        let requested = TileCoordinate::new("doc", 0, 0, 0, 16.0, 256);
        assert!(cache.get(&requested).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_cross_document_isolation() {
        let cache = cache();
        let a = TileCoordinate::new("doc-a", 0, 0, 0, 4.0, 256);
        cache.set(a, tile_bytes(64), CacheTier::Hot);

        let b = TileCoordinate::new("doc-b", 0, 0, 0, 4.0, 256);
        assert!(cache.get(&b).is_none());
        assert!(cache.get_best_available(&b).is_none());
    }

    #[test]
    fn test_lru_eviction_within_tier() {
        let cache = TieredTileCache::with_budgets(256, 1024, 1024);
        let first = TileCoordinate::new("doc", 0, 0, 0, 4.0, 256);
        let second = TileCoordinate::new("doc", 0, 1, 0, 4.0, 256);
        let third = TileCoordinate::new("doc", 0, 2, 0, 4.0, 256);

        cache.set(first.clone(), tile_bytes(128), CacheTier::Hot);
        cache.set(second.clone(), tile_bytes(128), CacheTier::Hot);
        cache.set(third.clone(), tile_bytes(128), CacheTier::Hot);

        // First tile was least recently used and the budget is 256 bytes.
        assert!(!cache.contains(&first));
        assert!(cache.contains(&second));
        assert!(cache.contains(&third));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_does_not_cross_tiers() {
        let cache = TieredTileCache::with_budgets(128, 1024, 1024);
        let warm = TileCoordinate::new("doc", 0, 5, 5, 4.0, 256);
        cache.set(warm.clone(), tile_bytes(512), CacheTier::Warm);

        // Overflow the hot tier; warm must be untouched.
        for x in 0..4 {
            let tile = TileCoordinate::new("doc", 0, x, 0, 4.0, 256);
            cache.set(tile, tile_bytes(128), CacheTier::Hot);
        }
        assert!(cache.contains(&warm));
    }

    #[test]
    fn test_best_available_prefers_highest_scale() {
        let cache = cache();
        // Same page region covered at scales 2 and 8 (256px tiles).
        cache.set(
            TileCoordinate::new("doc", 0, 0, 0, 2.0, 256),
            tile_bytes(64),
            CacheTier::Cold,
        );
        cache.set(
            TileCoordinate::new("doc", 0, 0, 0, 8.0, 256),
            tile_bytes(64),
            CacheTier::Warm,
        );

        // Request at scale 32 for a region inside the scale-8 tile.
        let requested = TileCoordinate::new("doc", 0, 1, 1, 32.0, 256);
        let hit = cache.get_best_available(&requested).unwrap();
        assert_eq!(hit.actual_scale, 8.0);
        assert_eq!(hit.css_stretch, 4.0);
        assert_eq!(hit.fallback_tile.scale(), 8.0);
        assert_eq!(hit.fallback_tile.tile_x, 0);
    }

    #[test]
    fn test_best_available_covers_requested_region() {
        let cache = cache();
        cache.set(
            TileCoordinate::new("doc", 0, 0, 0, 8.0, 256),
            tile_bytes(64),
            CacheTier::Warm,
        );

        // Region outside the single cached tile: no valid fallback.
        let outside = TileCoordinate::new("doc", 0, 9, 9, 32.0, 256);
        assert!(cache.get_best_available(&outside).is_none());

        // Region inside it: the fallback's region contains the request's.
        let inside = TileCoordinate::new("doc", 0, 2, 3, 32.0, 256);
        let hit = cache.get_best_available(&inside).unwrap();
        assert!(hit
            .fallback_tile
            .page_region()
            .inflate(1e-6)
            .contains_rect(&inside.page_region()));
    }

    #[test]
    fn test_mode_transition_purges_hot_only() {
        let cache = cache();
        let hot = TileCoordinate::new("doc", 0, 0, 0, 4.0, 256);
        let warm = TileCoordinate::new("doc", 0, 1, 0, 4.0, 256);
        cache.set(hot.clone(), tile_bytes(64), CacheTier::Hot);
        cache.set(warm.clone(), tile_bytes(64), CacheTier::Warm);

        cache.on_mode_transition();
        assert!(!cache.contains(&hot));
        assert!(cache.contains(&warm));
    }

    #[test]
    fn test_best_scale_at_position() {
        let cache = cache();
        let position = TilePosition {
            document: "doc".into(),
            page: 0,
            tile_x: 1,
            tile_y: 1,
        };
        assert!(cache.best_scale_at(&position, 256).is_none());

        cache.set(
            TileCoordinate::new("doc", 0, 1, 1, 2.0, 256),
            tile_bytes(64),
            CacheTier::Warm,
        );
        cache.set(
            TileCoordinate::new("doc", 0, 1, 1, 6.0, 256),
            tile_bytes(64),
            CacheTier::Warm,
        );
        assert_eq!(cache.best_scale_at(&position, 256), Some(6.0));
        // A different tile size is a different grid.
        assert!(cache.best_scale_at(&position, 512).is_none());
    }

    #[test]
    fn test_classification_and_full_page_caches() {
        let cache = cache();
        let doc: DocumentId = "doc".into();

        assert!(cache.page_classification(&doc, 3).is_none());
        cache.set_page_classification(
            &doc,
            3,
            PageClassification {
                content_type: PageContentType::ScannedJpeg,
                confidence: 0.9,
                has_transparency: false,
            },
        );
        assert!(cache.page_classification(&doc, 3).unwrap().is_scanned());

        cache.set_full_page(&doc, 3, 1.5, tile_bytes(64));
        assert!(cache.full_page(&doc, 3, 1.5).is_some());
        assert!(cache.full_page(&doc, 3, 2.0).is_none());
    }

    #[test]
    fn test_purge_document() {
        let cache = cache();
        let doc: DocumentId = "doc".into();
        cache.set(
            TileCoordinate::new("doc", 0, 0, 0, 4.0, 256),
            tile_bytes(64),
            CacheTier::Warm,
        );
        cache.set(
            TileCoordinate::new("other", 0, 0, 0, 4.0, 256),
            tile_bytes(64),
            CacheTier::Warm,
        );
        cache.set_full_page(&doc, 0, 1.0, tile_bytes(64));

        cache.purge_document(&doc);
        assert!(cache.full_page(&doc, 0, 1.0).is_none());
        assert!(cache
            .get(&TileCoordinate::new("doc", 0, 0, 0, 4.0, 256))
            .is_none());
        assert!(cache
            .get(&TileCoordinate::new("other", 0, 0, 0, 4.0, 256))
            .is_some());
    }
}
