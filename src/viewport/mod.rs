//! Viewport state and scroll speed classification

pub mod strategy;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{Point, Rect};

/// The visible window over the document, in document coordinates
/// (page units at scale 1.0), plus the current scroll velocity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Scroll velocity in document units per second
    pub velocity: Point,
}

impl Viewport {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            velocity: Point::new(0.0, 0.0),
        }
    }

    pub fn with_velocity(mut self, velocity: Point) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn center(&self) -> Point {
        self.rect().center()
    }

    pub fn speed(&self) -> f64 {
        self.velocity.magnitude()
    }

    /// Unit vector of the scroll direction, or zero when stationary
    pub fn scroll_direction(&self) -> Point {
        self.velocity.normalized()
    }
}

/// Coarse classification of scroll speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeedZone {
    Stationary,
    Slow,
    Medium,
    Fast,
    VeryFast,
}

/// One row of the speed-zone table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedZoneRow {
    pub zone: SpeedZone,
    /// Upper speed bound of this zone in px/s (exclusive); the last row
    /// is open-ended
    pub max_speed: f64,
    /// Prefetch lookahead in viewport heights
    pub lookahead: f64,
    /// Multiplier on the *rendered* scale (never the cache-lookup scale)
    pub quality: f64,
}

/// Speed-zone table controlling prefetch lookahead and render quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedZoneTable {
    pub rows: Vec<SpeedZoneRow>,
}

impl Default for SpeedZoneTable {
    fn default() -> Self {
        Self {
            rows: vec![
                SpeedZoneRow {
                    zone: SpeedZone::Stationary,
                    max_speed: 50.0,
                    lookahead: 1.0,
                    quality: 1.0,
                },
                SpeedZoneRow {
                    zone: SpeedZone::Slow,
                    max_speed: 200.0,
                    lookahead: 2.0,
                    quality: 0.9,
                },
                SpeedZoneRow {
                    zone: SpeedZone::Medium,
                    max_speed: 500.0,
                    lookahead: 3.0,
                    quality: 0.75,
                },
                SpeedZoneRow {
                    zone: SpeedZone::Fast,
                    max_speed: 1_000.0,
                    lookahead: 5.0,
                    quality: 0.5,
                },
                SpeedZoneRow {
                    zone: SpeedZone::VeryFast,
                    max_speed: f64::INFINITY,
                    lookahead: 8.0,
                    quality: 0.35,
                },
            ],
        }
    }
}

impl SpeedZoneTable {
    /// Classify a speed magnitude into its zone row.
    pub fn classify(&self, speed: f64) -> &SpeedZoneRow {
        let speed = if speed.is_finite() { speed.abs() } else { 0.0 };
        self.rows
            .iter()
            .find(|row| speed < row.max_speed)
            .or_else(|| self.rows.last())
            .expect("speed-zone table must not be empty")
    }
}
