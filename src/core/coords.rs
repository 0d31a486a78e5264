//! Tile addressing and scale quantization
//!
//! Tiles are addressed by integer grid indices plus the quantized scale and
//! the tile edge length. The grid changes with the zoom band (128/256/512),
//! so tiles at different sizes are distinct cache entries even for the same
//! `(page, x, y)`.

use serde::{Deserialize, Serialize};

use crate::core::constants::SCALE_QUANTUM;
use crate::core::geometry::Rect;

/// Identifies one open document; all renderer state is keyed by it.
pub type DocumentId = String;

/// Round a scale to the cache quantum (0.01). Idempotent.
pub fn quantize_scale(scale: f64) -> f64 {
    (scale / SCALE_QUANTUM).round() * SCALE_QUANTUM
}

/// Quantized scale in centi-units, suitable for hashing.
pub fn scale_key(scale: f64) -> u32 {
    (scale / SCALE_QUANTUM).round().max(0.0) as u32
}

/// Grid position of a tile, independent of scale.
///
/// Used as the key for scale-change supersession: a new request for the same
/// position at a different scale aborts the old one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilePosition {
    pub document: DocumentId,
    pub page: u32,
    pub tile_x: u32,
    pub tile_y: u32,
}

/// Full address of a single rasterized tile.
///
/// The scale is stored pre-quantized so that the request-deduplication key
/// and the cache key can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoordinate {
    pub document: DocumentId,
    pub page: u32,
    pub tile_x: u32,
    pub tile_y: u32,
    /// Quantized scale in centi-units; see [`TileCoordinate::scale`].
    pub scale_q: u32,
    pub tile_size: u32,
}

impl TileCoordinate {
    pub fn new(
        document: impl Into<DocumentId>,
        page: u32,
        tile_x: u32,
        tile_y: u32,
        scale: f64,
        tile_size: u32,
    ) -> Self {
        Self {
            document: document.into(),
            page,
            tile_x,
            tile_y,
            scale_q: scale_key(scale),
            tile_size,
        }
    }

    /// The quantized rendering scale as a float.
    pub fn scale(&self) -> f64 {
        self.scale_q as f64 * SCALE_QUANTUM
    }

    /// Same grid cell at a different scale.
    pub fn at_scale(&self, scale: f64) -> TileCoordinate {
        TileCoordinate {
            scale_q: scale_key(scale),
            ..self.clone()
        }
    }

    pub fn position(&self) -> TilePosition {
        TilePosition {
            document: self.document.clone(),
            page: self.page,
            tile_x: self.tile_x,
            tile_y: self.tile_y,
        }
    }

    /// Region this tile covers on its page, in document coordinates
    /// (page units at scale 1.0) relative to the page origin.
    pub fn page_region(&self) -> Rect {
        let units = self.tile_size as f64 / self.scale();
        Rect::new(
            self.tile_x as f64 * units,
            self.tile_y as f64 * units,
            units,
            units,
        )
    }
}
