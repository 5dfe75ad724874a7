//! Placement transforms consumed by the artifact generator.
//!
//! `fit` letterboxes the source inside the slot; `fill` covers the slot and
//! crops the overflow. Both center the scaled source.

use serde::{Deserialize, Serialize};

use crate::domain::Size;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Scale to fit, pad symmetrically
    Fit,
    /// Scale to cover, crop symmetrically
    Fill,
}

/// Uniform scale plus centering offset, in target pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub mode: FitMode,
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub result_width: f64,
    pub result_height: f64,
}

impl Transform {
    /// Letterbox transform; `None` for degenerate sizes
    pub fn fit(source: Size, target: Size) -> Option<Self> {
        Self::compute(FitMode::Fit, source, target)
    }

    /// Crop transform; `None` for degenerate sizes
    pub fn fill(source: Size, target: Size) -> Option<Self> {
        Self::compute(FitMode::Fill, source, target)
    }

    pub fn compute(mode: FitMode, source: Size, target: Size) -> Option<Self> {
        source.ratio()?;
        target.ratio()?;

        let scale_x = target.width / source.width;
        let scale_y = target.height / source.height;
        let scale = match mode {
            FitMode::Fit => scale_x.min(scale_y),
            FitMode::Fill => scale_x.max(scale_y),
        };

        let result_width = source.width * scale;
        let result_height = source.height * scale;

        Some(Self {
            mode,
            scale,
            // positive = padding, negative = overflow
            offset_x: (target.width - result_width) / 2.0,
            offset_y: (target.height - result_height) / 2.0,
            result_width,
            result_height,
        })
    }

    /// Map a source-space point into target space
    pub fn apply_point(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }

    /// Map a target-space point back into source space
    pub fn invert_point(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.offset_x) / self.scale, (y - self.offset_y) / self.scale)
    }

    /// Original source size recovered from the result
    pub fn source_size(&self) -> Size {
        Size::new(self.result_width / self.scale, self.result_height / self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_fit_letterboxes() {
        let t = Transform::fit(Size::new(1080.0, 1920.0), Size::new(1920.0, 1080.0)).unwrap();

        assert!((t.scale - 0.5625).abs() < EPS);
        assert!((t.result_height - 1080.0).abs() < EPS);
        assert!(t.offset_x > 0.0);
        assert!(t.offset_y.abs() < EPS);
    }

    #[test]
    fn test_fill_crops() {
        let t = Transform::fill(Size::new(1080.0, 1920.0), Size::new(1920.0, 1080.0)).unwrap();

        assert!((t.result_width - 1920.0).abs() < EPS);
        assert!(t.offset_y < 0.0);
        assert!(t.offset_x.abs() < EPS);
    }

    #[test]
    fn test_fit_inverse_round_trip() {
        let source = Size::new(1920.0, 1161.0);
        let t = Transform::fit(source, Size::new(1920.0, 1080.0)).unwrap();

        let recovered = t.source_size();
        assert!((recovered.width - source.width).abs() < 1e-6);
        assert!((recovered.height - source.height).abs() < 1e-6);

        let (tx, ty) = t.apply_point(source.width, source.height);
        let (sx, sy) = t.invert_point(tx, ty);
        assert!((sx - source.width).abs() < 1e-6);
        assert!((sy - source.height).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(Transform::fit(Size::new(0.0, 10.0), Size::new(10.0, 10.0)).is_none());
        assert!(Transform::fill(Size::new(10.0, 10.0), Size::new(10.0, -1.0)).is_none());
    }
}
