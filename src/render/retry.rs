//! Bounded retry queue for requests shed from the semaphore lanes
//!
//! Entries carry a cooldown, a TTL and an attempt cap; retries are skipped
//! entirely while the semaphore queue is saturated or a gesture is in
//! flight.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::core::config::RetryConfig;
use crate::core::coords::TileCoordinate;
use crate::render::types::RenderPriority;

/// One shed request waiting for another chance
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub tile: TileCoordinate,
    pub priority: RenderPriority,
    pub attempts: u32,
    pub queued_at: Instant,
    pub not_before: Instant,
}

/// Bounded retry queue
#[derive(Debug)]
pub struct RetryQueue {
    entries: VecDeque<RetryEntry>,
    config: RetryConfig,
}

impl RetryQueue {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Queue a shed request for retry. Rejects entries past the attempt cap
    /// and sheds the oldest entry when the queue itself is full.
    pub fn push(&mut self, tile: TileCoordinate, priority: RenderPriority, attempts: u32, now: Instant) {
        if attempts >= self.config.max_attempts {
            log::debug!("retry cap reached for {:?}", tile.position());
            return;
        }
        if self.entries.iter().any(|e| e.tile == tile) {
            return;
        }

        while self.entries.len() >= self.config.max_entries {
            self.entries.pop_front();
        }

        self.entries.push_back(RetryEntry {
            tile,
            priority,
            attempts,
            queued_at: now,
            not_before: now + Duration::from_millis(self.config.cooldown_ms),
        });
    }

    /// Drop entries older than the TTL.
    pub fn purge_expired(&mut self, now: Instant) {
        let ttl = Duration::from_millis(self.config.ttl_ms);
        self.entries
            .retain(|entry| now.duration_since(entry.queued_at) < ttl);
    }

    /// Entries whose cooldown has elapsed, in arrival order. Expired
    /// entries are purged first. When `saturation` is above the configured
    /// threshold nothing is drained at all.
    pub fn drain_ready(&mut self, now: Instant, saturation: f64) -> Vec<RetryEntry> {
        self.purge_expired(now);
        if saturation > self.config.saturation_threshold {
            return Vec::new();
        }

        let mut ready = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            if entry.not_before <= now {
                ready.push(entry);
            } else {
                remaining.push_back(entry);
            }
        }
        self.entries = remaining;
        ready
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
