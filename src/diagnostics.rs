//! Scheduler diagnostics: counters, gauges and latency trackers
//!
//! These observe the coordinator's event flow; nothing in the render path
//! depends on them. Tests use the snapshot to assert scheduler behavior
//! under load.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::cache::tiered::CacheStats;
use crate::core::coords::TilePosition;
use crate::prelude::HashMap;
use crate::render::types::RenderPriority;
use crate::scale::state::GesturePhase;

/// Live counters maintained by the coordinator
#[derive(Debug, Default)]
pub struct RenderStats {
    pub in_flight: AtomicUsize,
    pub completed: AtomicU64,
    pub aborted: AtomicU64,
    pub dropped: AtomicU64,
    pub raster_failures: AtomicU64,
    pub classification_failures: AtomicU64,
    pub jpeg_failures: AtomicU64,
    pub fallbacks_served: AtomicU64,
    pub retries: AtomicU64,
    pub tile_ready_emitted: AtomicU64,
}

impl RenderStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of the whole scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub cache: CacheStats,
    pub in_flight: usize,
    pub waiting_by_priority: [usize; RenderPriority::COUNT],
    pub retry_queue_len: usize,
    pub gesture_phase: GesturePhase,
    pub current_epoch: u64,
    pub max_queue_size: usize,
    pub completed: u64,
    pub aborted: u64,
    pub dropped: u64,
    pub raster_failures: u64,
    pub fallbacks_served: u64,
    pub retries: u64,
    pub tile_ready_emitted: u64,
}

/// Time-to-highest-resolution tracker.
///
/// Measures, per tile position, the latency from the first request to the
/// moment the full-resolution bitmap was delivered.
#[derive(Debug, Default)]
pub struct T2hrTracker {
    pending: Mutex<HashMap<(TilePosition, u32), Instant>>,
    samples: Mutex<Vec<Duration>>,
}

impl T2hrTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tile started progressing toward `target_scale_q`.
    pub fn record_request(&self, position: TilePosition, target_scale_q: u32, now: Instant) {
        let mut pending = self.pending.lock().expect("t2hr poisoned");
        pending.entry((position, target_scale_q)).or_insert(now);
    }

    /// The full-resolution result for a tracked tile was delivered.
    pub fn record_delivery(&self, position: &TilePosition, target_scale_q: u32, now: Instant) {
        let started = {
            let mut pending = self.pending.lock().expect("t2hr poisoned");
            pending.remove(&(position.clone(), target_scale_q))
        };
        if let Some(started) = started {
            let mut samples = self.samples.lock().expect("t2hr poisoned");
            samples.push(now.duration_since(started));
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().expect("t2hr poisoned").len()
    }

    pub fn average(&self) -> Option<Duration> {
        let samples = self.samples.lock().expect("t2hr poisoned");
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    pub fn worst(&self) -> Option<Duration> {
        let samples = self.samples.lock().expect("t2hr poisoned");
        samples.iter().max().copied()
    }

    pub fn outstanding(&self) -> usize {
        self.pending.lock().expect("t2hr poisoned").len()
    }
}

/// Focal-point effectiveness: how often tiles near the focal point were
/// served before everything else.
#[derive(Debug, Default)]
pub struct FocalEffectiveness {
    focal_first: AtomicU64,
    total: AtomicU64,
}

impl FocalEffectiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, was_focal_priority: bool) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if was_focal_priority {
            self.focal_first.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Share of deliveries that went to focal-priority tiles, in [0, 1].
    pub fn ratio(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.focal_first.load(Ordering::Relaxed) as f64 / total as f64
    }
}
