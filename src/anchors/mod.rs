//! Anchor grids over the feature pyramid.
//!
//! Detector heads emit one regression and one score row per anchor, so
//! anchor order is part of the wire contract: rows run row-major over
//! grid cells, then ratio-major and scale-minor within a cell, and
//! pyramid levels concatenate lowest first.

use itertools::iproduct;
use ndarray::Array2;

use crate::util::{AnchorDetError, AnchorDetResult};

/// Number of feature pyramid levels consumed by the pipeline.
pub const PYRAMID_LEVELS: usize = 5;

/// Lowest pyramid level; levels run 3..=7.
pub const MIN_PYRAMID_LEVEL: u32 = 3;

/// Side length of the square feature grid at `level` for an image of
/// `width` pixels (integer division by `2^level`).
pub fn feature_side(width: usize, level: u32) -> usize {
    width >> level
}

/// Anchor layout configuration shared by all pyramid levels.
///
/// `sizes` and `strides` carry exactly one entry per level (3..=7);
/// `ratios` and `scales` are shared across levels. Validated once at
/// filter construction, read-only afterward.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnchorsConfig {
    /// Base box size per pyramid level.
    pub sizes: Vec<f32>,
    /// Height-over-width aspect ratios laid down in every cell.
    pub ratios: Vec<f32>,
    /// Octave scales applied to each base size.
    pub scales: Vec<f32>,
    /// Grid step in pixels per pyramid level.
    pub strides: Vec<f32>,
}

impl AnchorsConfig {
    /// Rejects per-level lists of the wrong length and empty ratio or
    /// scale lists.
    pub fn validate(&self) -> AnchorDetResult<()> {
        if self.sizes.len() != PYRAMID_LEVELS {
            return Err(AnchorDetError::LevelCountMismatch {
                what: "sizes",
                expected: PYRAMID_LEVELS,
                got: self.sizes.len(),
            });
        }
        if self.strides.len() != PYRAMID_LEVELS {
            return Err(AnchorDetError::LevelCountMismatch {
                what: "strides",
                expected: PYRAMID_LEVELS,
                got: self.strides.len(),
            });
        }
        if self.ratios.is_empty() {
            return Err(AnchorDetError::EmptyConfig {
                what: "aspect ratios",
            });
        }
        if self.scales.is_empty() {
            return Err(AnchorDetError::EmptyConfig { what: "scales" });
        }
        Ok(())
    }

    /// Anchors laid down per grid cell.
    pub fn anchors_per_cell(&self) -> usize {
        self.ratios.len() * self.scales.len()
    }
}

impl Default for AnchorsConfig {
    /// RetinaNet-style layout: sizes doubling from 32, strides `2^level`,
    /// three ratios, three octave scales.
    fn default() -> Self {
        Self {
            sizes: vec![32.0, 64.0, 128.0, 256.0, 512.0],
            ratios: vec![0.5, 1.0, 2.0],
            scales: vec![1.0, 2f32.powf(1.0 / 3.0), 2f32.powf(2.0 / 3.0)],
            strides: vec![8.0, 16.0, 32.0, 64.0, 128.0],
        }
    }
}

/// Dense anchor grid generator for one pyramid level.
#[derive(Clone, Debug)]
pub struct AnchorGenerator {
    size: f32,
    stride: f32,
    ratios: Vec<f32>,
    scales: Vec<f32>,
}

impl AnchorGenerator {
    /// Creates a generator for one level of the pyramid.
    pub fn new(size: f32, ratios: &[f32], scales: &[f32], stride: f32) -> Self {
        Self {
            size,
            stride,
            ratios: ratios.to_vec(),
            scales: scales.to_vec(),
        }
    }

    /// Anchors laid down per grid cell.
    pub fn anchors_per_cell(&self) -> usize {
        self.ratios.len() * self.scales.len()
    }

    /// Box `(width, height)` per cell anchor: ratio-major, scale-minor.
    ///
    /// Each ratio `r` reshapes the `size * scale` square to equal area
    /// with `height = width * r`.
    fn cell_shapes(&self) -> Vec<(f32, f32)> {
        iproduct!(self.ratios.iter(), self.scales.iter())
            .map(|(&ratio, &scale)| {
                let side = self.size * scale;
                let width = (side * side / ratio).sqrt();
                (width, width * ratio)
            })
            .collect()
    }

    /// Generates `(feature_h * feature_w * anchors_per_cell, 4)` corner
    /// boxes `[x1, y1, x2, y2]` in input-image pixels.
    ///
    /// Cell centers sit at `((col + 0.5) * stride, (row + 0.5) * stride)`
    /// and rows run row-major over the grid. The order pairs each anchor
    /// with its regression and score row by position, so it must never
    /// change. A zero-sized grid yields an empty array.
    pub fn generate(&self, feature_h: usize, feature_w: usize) -> Array2<f32> {
        let shapes = self.cell_shapes();
        let mut anchors = Array2::zeros((feature_h * feature_w * shapes.len(), 4));
        let mut row = 0;
        for (gy, gx) in iproduct!(0..feature_h, 0..feature_w) {
            let cy = (gy as f32 + 0.5) * self.stride;
            let cx = (gx as f32 + 0.5) * self.stride;
            for &(w, h) in &shapes {
                anchors[[row, 0]] = cx - 0.5 * w;
                anchors[[row, 1]] = cy - 0.5 * h;
                anchors[[row, 2]] = cx + 0.5 * w;
                anchors[[row, 3]] = cy + 0.5 * h;
                row += 1;
            }
        }
        anchors
    }
}
