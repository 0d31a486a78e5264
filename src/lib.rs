//! # Vellum
//!
//! A progressive tile-rendering core for paginated document viewers.
//!
//! Vellum decides *what* to render, *at which resolution*, *in what order*,
//! and *whether to deliver or discard* any particular render result while the
//! user scrolls and zooms a document. The actual rasterizer and the
//! compositor are external collaborators injected through trait objects.

pub mod cache;
pub mod core;
pub mod device;
pub mod diagnostics;
pub mod prelude;
pub mod render;
pub mod runtime;
pub mod scale;
pub mod traits;
pub mod viewport;
pub mod zoom;
pub use crate::core::constants;

// Re-export public API
pub use crate::core::{
    config::RendererConfig,
    coords::{DocumentId, TileCoordinate, TilePosition},
    geometry::{PageLayout, Point, Rect},
};

pub use crate::cache::tiered::{CachedTile, TieredTileCache, TileData};

pub use crate::device::{DeviceProfile, DeviceTier};

pub use crate::render::{
    coordinator::RenderCoordinator,
    progressive::ProgressiveRenderer,
    semaphore::PrioritySemaphore,
    types::{RenderError, RenderPriority, RenderRequest, RenderResult},
};

pub use crate::scale::state::ScaleStateManager;

pub use crate::viewport::Viewport;

pub use crate::zoom::{events::ZoomState, orchestrator::ZoomOrchestrator};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum VellumError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid coordinates: {0}")]
    InvalidCoordinates(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = VellumError;
