//! Gesture-stream input types
//!
//! The host feeds a stream of [`ZoomState`] events; a `gesture_active` flag
//! is all the renderer needs to mark gesture start and end.

use std::time::Instant;

use crate::core::geometry::Point;

/// What kind of input produced a zoom event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Wheel,
    Pinch,
    DoubleTap,
    /// Programmatic zoom (navigation, fit-to-width); carries no focal point
    Programmatic,
}

/// Camera position reported by the host's scene, if it has one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One event of the zoom gesture stream
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomState {
    /// Continuous zoom factor, 1.0 = 100%
    pub zoom: f64,
    /// Gesture pivot in document coordinates, if the gesture has one
    pub focal_point: Option<Point>,
    pub camera: Option<Camera>,
    pub timestamp: Instant,
    pub gesture_active: bool,
    pub kind: GestureKind,
}

impl ZoomState {
    pub fn new(zoom: f64, timestamp: Instant) -> Self {
        Self {
            zoom,
            focal_point: None,
            camera: None,
            timestamp,
            gesture_active: false,
            kind: GestureKind::Programmatic,
        }
    }

    pub fn with_focal_point(mut self, focal: Point) -> Self {
        self.focal_point = Some(focal);
        self
    }

    pub fn active(mut self, kind: GestureKind) -> Self {
        self.gesture_active = true;
        self.kind = kind;
        self
    }
}

/// Camera state frozen at gesture start.
///
/// Viewport math during the gesture references this snapshot so panning and
/// scaling use a stable origin; a resumed gesture keeps the original one.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoomSnapshot {
    pub zoom: f64,
    pub focal_point: Option<Point>,
    pub camera: Option<Camera>,
    pub timestamp: Instant,
}

impl ZoomSnapshot {
    pub fn capture(state: &ZoomState) -> Self {
        Self {
            zoom: state.zoom,
            focal_point: state.focal_point,
            camera: state.camera,
            timestamp: state.timestamp,
        }
    }
}
