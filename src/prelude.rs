//! Prelude module for common vellum types and traits
//!
//! Re-exports the most commonly used types, traits, and functions for easy
//! importing with `use vellum::prelude::*;`

// Core types
pub use crate::core::{
    config::{
        CoordinatorConfig, OrchestratorConfig, PrefetchConfig, QualityFalloff, RendererConfig,
        RetryConfig, ScaleConfig, TierSet,
    },
    coords::{quantize_scale, DocumentId, TileCoordinate, TilePosition},
    geometry::{PageLayout, Point, Rect},
};

// Device capabilities
pub use crate::device::{DeviceInfo, DeviceProfile, DeviceTier};

// Scale system
pub use crate::scale::{
    model::{ExactTarget, ScaleModel, TierTarget},
    state::{GesturePhase, RenderMode, ScaleSnapshot, ScaleState, ScaleStateManager},
};

// Zoom gesture handling
pub use crate::zoom::{
    events::{GestureKind, ZoomSnapshot, ZoomState},
    orchestrator::{ZoomOrchestrator, ZoomPhase},
};

// Viewport scheduling
pub use crate::viewport::{
    strategy::{PaginatedStrategy, PrioritizedTile, ScrollStrategy, ViewportStrategy},
    SpeedZone, SpeedZoneTable, Viewport,
};

// Cache
pub use crate::cache::{
    classification::{JpegSlice, PageClassification, PageContentType},
    tiered::{CacheTier, CachedTile, FallbackHit, TieredTileCache, TileData},
};

// Render pipeline
pub use crate::render::{
    coordinator::RenderCoordinator,
    progressive::{ProgressiveRenderer, ProgressiveUpdate},
    semaphore::{Acquisition, PrioritySemaphore},
    types::{AbortHandle, RenderError, RenderPriority, RenderRequest, RenderResult, TileReady},
};

// Collaborator seams
pub use crate::traits::{PageAnalyzer, TileRasterizer};

// Diagnostics
pub use crate::diagnostics::{RenderStats, StatsSnapshot, T2hrTracker};

// Runtime abstraction
pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

// Result and Error types
pub use crate::{Error as VellumError, Result};

// Common standard library re-exports with better performance hashmaps
pub use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    time::{Duration, Instant},
};

// Use FxHashMap and FxHashSet for better performance
pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};
