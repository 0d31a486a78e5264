//! Shared trait abstractions and collaborator seams
//!
//! The rasterizer and the page analyzer are external collaborators; the
//! renderer drives them through these object-safe traits. Methods return
//! boxed futures so implementations may be synchronous or asynchronous.

use crate::cache::classification::{JpegSlice, PageClassification};
use crate::cache::tiered::CachedTile;
use crate::core::coords::{DocumentId, TileCoordinate};
use crate::prelude::{Future, Pin};

/// Boxed future type used at the collaborator seams
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The injected rasterizer: turns tile coordinates into bitmaps.
///
/// Implementations typically hand the work to a PDF engine worker pool; the
/// coordinator never assumes anything about where the pixels come from.
pub trait TileRasterizer: Send + Sync {
    /// Rasterize one tile at the tile's scale.
    fn render_tile(
        &self,
        tile: TileCoordinate,
        document: DocumentId,
    ) -> BoxFuture<'_, crate::Result<CachedTile>>;

    /// Rasterize a whole page at the given scale.
    fn render_page(
        &self,
        page: u32,
        scale: f64,
        document: DocumentId,
    ) -> BoxFuture<'_, crate::Result<CachedTile>>;
}

/// Optional page-content analyzer backing the render-strategy fast paths.
pub trait PageAnalyzer: Send + Sync {
    fn classify_page(
        &self,
        document: DocumentId,
        page: u32,
    ) -> BoxFuture<'_, crate::Result<PageClassification>>;

    /// Extract the page's embedded JPEG for the scanned-document fast path.
    fn extract_jpeg(
        &self,
        document: DocumentId,
        page: u32,
    ) -> BoxFuture<'_, crate::Result<JpegSlice>>;
}

/// Unified configuration trait for components with swappable options
pub trait Configurable {
    type Config;

    fn config(&self) -> &Self::Config;

    fn set_config(&mut self, config: Self::Config) -> crate::Result<()>;

    fn validate_config(config: &Self::Config) -> crate::Result<()>;
}
