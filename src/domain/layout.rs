//! Named source elements and target slots produced by the parsers.

use serde::{Deserialize, Serialize};

/// A width/height pair in pixels (or layout units for composition slots)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// width / height, or `None` for a degenerate size
    pub fn ratio(&self) -> Option<f64> {
        if self.width > 0.0 && self.height > 0.0 && self.width.is_finite() && self.height.is_finite() {
            Some(self.width / self.height)
        } else {
            None
        }
    }
}

/// A named, geometrically described unit of content from a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceElement {
    /// Element name (layer, frame or artboard name)
    pub name: String,

    /// Display width
    pub width: f64,

    /// Display height
    pub height: f64,

    /// Native pixel width, if the element is raster content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_width: Option<u32>,

    /// Native pixel height, if the element is raster content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_height: Option<u32>,

    /// Referenced asset path (linked image, footage)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
}

impl SourceElement {
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            pixel_width: None,
            pixel_height: None,
            asset: None,
        }
    }

    /// Attach a native pixel resolution
    pub fn with_pixels(mut self, pixel_width: u32, pixel_height: u32) -> Self {
        self.pixel_width = Some(pixel_width);
        self.pixel_height = Some(pixel_height);
        self
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Native resolution, falling back to display size
    pub fn pixel_size(&self) -> Size {
        match (self.pixel_width, self.pixel_height) {
            (Some(w), Some(h)) => Size::new(w as f64, h as f64),
            _ => self.size(),
        }
    }
}

/// A named placeholder in a template expecting one source element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSlot {
    /// Slot (composition / placeholder layer) name
    pub name: String,

    /// Composition width in pixels
    pub width: f64,

    /// Composition height in pixels
    pub height: f64,
}

impl TargetSlot {
    pub fn new(name: impl Into<String>, width: f64, height: f64) -> Self {
        Self {
            name: name.into(),
            width,
            height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
