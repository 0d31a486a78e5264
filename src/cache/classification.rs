//! Page content classification
//!
//! A classified page gets a render strategy: scanned pages use the direct
//! JPEG slice fast path, vector-heavy pages render at reduced scale with a
//! CSS upscale, everything else renders normally.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Dominant content of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageContentType {
    ScannedJpeg,
    TextHeavy,
    VectorHeavy,
    Mixed,
    Complex,
}

/// Classifier verdict for one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageClassification {
    pub content_type: PageContentType,
    pub confidence: f64,
    pub has_transparency: bool,
}

impl PageClassification {
    /// Whether the direct JPEG extraction fast path applies.
    pub fn is_scanned(&self) -> bool {
        self.content_type == PageContentType::ScannedJpeg && !self.has_transparency
    }

    pub fn is_vector_heavy(&self) -> bool {
        self.content_type == PageContentType::VectorHeavy
    }
}

/// A full-page JPEG extracted for the scanned-document fast path
#[derive(Debug, Clone, PartialEq)]
pub struct JpegSlice {
    pub bytes: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
}

impl JpegSlice {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bytes: Arc::new(bytes),
            width,
            height,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}
