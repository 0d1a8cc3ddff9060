//! The detection filter pipeline.
//!
//! [`DetectionFilter`] composes anchor generation over the feature
//! pyramid, batched box decoding, clipping, and per-image suppression
//! into a single call. Stages run in a fixed order; anchors are
//! regenerated per call because the feature grid tracks the input
//! width.

use ndarray::{s, Array2, Array3, ArrayView3, ArrayView4, Axis};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::anchors::{
    feature_side, AnchorGenerator, AnchorsConfig, MIN_PYRAMID_LEVEL, PYRAMID_LEVELS,
};
use crate::boxes::{clip_boxes, regress_boxes};
use crate::suppress::nms::{nms, NmsParams, SuppressionMode};
use crate::suppress::Detection;
use crate::trace::{trace_event, trace_span};
use crate::util::{AnchorDetError, AnchorDetResult};

/// Pipeline configuration beyond the anchor layout.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterConfig {
    /// Minimum class score for a candidate detection.
    pub score_threshold: f32,
    /// IoU strictly above which a lower-ranked box is suppressed.
    pub iou_threshold: f32,
    /// Suppression scope.
    pub mode: SuppressionMode,
    /// Per-image cap on survivors; also the padded output width.
    pub max_detections: usize,
    /// Suppress batch images on the rayon pool. Requires the `rayon`
    /// feature; without it the serial path runs regardless.
    pub parallel: bool,
}

impl FilterConfig {
    /// Default minimum class score.
    pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
    /// Default suppression IoU threshold.
    pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
    /// Default per-image detection cap.
    pub const DEFAULT_MAX_DETECTIONS: usize = 100;
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            score_threshold: Self::DEFAULT_SCORE_THRESHOLD,
            iou_threshold: Self::DEFAULT_IOU_THRESHOLD,
            mode: SuppressionMode::PerClass,
            max_detections: Self::DEFAULT_MAX_DETECTIONS,
            parallel: false,
        }
    }
}

/// Fixed-shape batch output padded to a constant detection count.
///
/// Padding rows carry score [`PaddedDetections::PAD_SCORE`], label
/// [`PaddedDetections::PAD_LABEL`], and a zeroed box.
#[derive(Clone, Debug, PartialEq)]
pub struct PaddedDetections {
    /// `(batch, max_detections, 4)` corner boxes.
    pub boxes: Array3<f32>,
    /// `(batch, max_detections)` scores.
    pub scores: Array2<f32>,
    /// `(batch, max_detections)` class labels.
    pub labels: Array2<i64>,
}

impl PaddedDetections {
    /// Score sentinel marking a padding row.
    pub const PAD_SCORE: f32 = -1.0;
    /// Label sentinel marking a padding row.
    pub const PAD_LABEL: i64 = -1;

    /// Packs per-image detection lists into fixed-shape arrays.
    ///
    /// Lists longer than `max_detections` keep their first entries; the
    /// suppressor already caps and sorts its output, so the pipeline
    /// path never truncates.
    pub fn from_batch(batch: &[Vec<Detection>], max_detections: usize) -> Self {
        let mut boxes = Array3::zeros((batch.len(), max_detections, 4));
        let mut scores = Array2::from_elem((batch.len(), max_detections), Self::PAD_SCORE);
        let mut labels = Array2::from_elem((batch.len(), max_detections), Self::PAD_LABEL);
        for (image, detections) in batch.iter().enumerate() {
            for (slot, detection) in detections.iter().take(max_detections).enumerate() {
                for (axis, &coord) in detection.bbox.iter().enumerate() {
                    boxes[[image, slot, axis]] = coord;
                }
                scores[[image, slot]] = detection.score;
                labels[[image, slot]] = detection.label as i64;
            }
        }
        Self {
            boxes,
            scores,
            labels,
        }
    }
}

/// Turns raw detector outputs into final per-image detections.
///
/// Create once per anchor configuration, then call
/// [`DetectionFilter::filter`] for every forward pass. The five
/// per-level generators are built at construction and never mutated, so
/// a filter is safe to share across threads.
pub struct DetectionFilter {
    config: FilterConfig,
    generators: Vec<AnchorGenerator>,
}

impl DetectionFilter {
    /// Validates `anchors` and builds one generator per pyramid level.
    pub fn new(anchors: &AnchorsConfig) -> AnchorDetResult<Self> {
        anchors.validate()?;
        let generators = anchors
            .sizes
            .iter()
            .zip(&anchors.strides)
            .map(|(&size, &stride)| {
                AnchorGenerator::new(size, &anchors.ratios, &anchors.scales, stride)
            })
            .collect();
        Ok(Self {
            config: FilterConfig::default(),
            generators,
        })
    }

    /// Replaces the pipeline configuration.
    pub fn with_config(mut self, config: FilterConfig) -> Self {
        self.config = config;
        self
    }

    /// Current pipeline configuration.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Concatenated anchors for an image of `width` pixels, level 3
    /// first.
    ///
    /// Each level's square grid side is `width / 2^level`; the image
    /// height never enters the grid size, so non-square inputs still
    /// derive their anchor count from the width alone. A level whose
    /// grid collapses to zero contributes no rows.
    pub fn image_anchors(&self, width: usize) -> Array2<f32> {
        let _span = trace_span!("image_anchors", width = width).entered();

        let sides: Vec<usize> = (0..PYRAMID_LEVELS)
            .map(|idx| feature_side(width, MIN_PYRAMID_LEVEL + idx as u32))
            .collect();
        let total: usize = sides
            .iter()
            .zip(&self.generators)
            .map(|(&side, generator)| side * side * generator.anchors_per_cell())
            .sum();

        let mut anchors = Array2::zeros((total, 4));
        let mut offset = 0;
        for (&side, generator) in sides.iter().zip(&self.generators) {
            let level_anchors = generator.generate(side, side);
            let rows = level_anchors.nrows();
            anchors
                .slice_mut(s![offset..offset + rows, ..])
                .assign(&level_anchors);
            offset += rows;
        }

        trace_event!("anchors_generated", count = total);
        anchors
    }

    /// Runs the full pipeline on one batch.
    ///
    /// `images` is `(batch, height, width, channels)`; only its shape is
    /// read. `regressors` is `(batch, total_anchors, 4)` and
    /// `class_scores` is `(batch, total_anchors, num_classes)`, both
    /// row-aligned with [`DetectionFilter::image_anchors`]. Stages run
    /// in order: generate, concatenate, tile across the batch, regress,
    /// clip, suppress. Returns one list per image, sorted by descending
    /// score; an image with nothing above threshold gets an empty list.
    pub fn filter(
        &self,
        images: ArrayView4<'_, f32>,
        regressors: ArrayView3<'_, f32>,
        class_scores: ArrayView3<'_, f32>,
    ) -> AnchorDetResult<Vec<Vec<Detection>>> {
        let (batch, height, width, _channels) = images.dim();
        let _span =
            trace_span!("filter_detections", batch = batch, height = height, width = width)
                .entered();

        if class_scores.dim().2 == 0 {
            return Err(AnchorDetError::NoClasses);
        }
        if regressors.dim().0 != batch {
            return Err(AnchorDetError::BatchSizeMismatch {
                context: "regressors",
                expected: batch,
                got: regressors.dim().0,
            });
        }
        if class_scores.dim().0 != batch {
            return Err(AnchorDetError::BatchSizeMismatch {
                context: "class scores",
                expected: batch,
                got: class_scores.dim().0,
            });
        }
        if regressors.dim().2 != 4 {
            return Err(AnchorDetError::TrailingDimMismatch {
                context: "regressors",
                expected: 4,
                got: regressors.dim().2,
            });
        }

        let anchors = self.image_anchors(width);
        let num_anchors = anchors.nrows();
        if regressors.dim().1 != num_anchors {
            return Err(AnchorDetError::AnchorCountMismatch {
                context: "regressors",
                expected: num_anchors,
                got: regressors.dim().1,
            });
        }
        if class_scores.dim().1 != num_anchors {
            return Err(AnchorDetError::AnchorCountMismatch {
                context: "class scores",
                expected: num_anchors,
                got: class_scores.dim().1,
            });
        }

        let tiled = anchors.broadcast((batch, num_anchors, 4)).ok_or(
            AnchorDetError::ShapeMismatch {
                context: "anchor tiling",
                left: [1, num_anchors, 4],
                right: [batch, num_anchors, 4],
            },
        )?;
        let decoded = regress_boxes(tiled, regressors)?;
        let clipped = clip_boxes(decoded.view(), (height as f32, width as f32))?;

        let params = NmsParams {
            score_threshold: self.config.score_threshold,
            iou_threshold: self.config.iou_threshold,
            mode: self.config.mode,
            max_detections: self.config.max_detections,
        };
        let per_image = self.suppress_batch(clipped.view(), class_scores, params)?;

        let total: usize = per_image.iter().map(Vec::len).sum();
        trace_event!("filter_complete", images = batch, detections = total);
        Ok(per_image)
    }

    /// Like [`DetectionFilter::filter`], but packs the result into
    /// fixed-shape arrays padded to the configured `max_detections`.
    pub fn filter_padded(
        &self,
        images: ArrayView4<'_, f32>,
        regressors: ArrayView3<'_, f32>,
        class_scores: ArrayView3<'_, f32>,
    ) -> AnchorDetResult<PaddedDetections> {
        let per_image = self.filter(images, regressors, class_scores)?;
        Ok(PaddedDetections::from_batch(
            &per_image,
            self.config.max_detections,
        ))
    }

    fn suppress_batch(
        &self,
        boxes: ArrayView3<'_, f32>,
        class_scores: ArrayView3<'_, f32>,
        params: NmsParams,
    ) -> AnchorDetResult<Vec<Vec<Detection>>> {
        #[cfg(feature = "rayon")]
        {
            if self.config.parallel {
                return suppress_batch_par(boxes, class_scores, params);
            }
        }

        let batch = boxes.dim().0;
        let mut per_image = Vec::with_capacity(batch);
        for image in 0..batch {
            per_image.push(nms(
                boxes.index_axis(Axis(0), image),
                class_scores.index_axis(Axis(0), image),
                params,
            )?);
        }
        Ok(per_image)
    }
}

/// Per-image suppression across the batch on the rayon pool.
#[cfg(feature = "rayon")]
fn suppress_batch_par(
    boxes: ArrayView3<'_, f32>,
    class_scores: ArrayView3<'_, f32>,
    params: NmsParams,
) -> AnchorDetResult<Vec<Vec<Detection>>> {
    (0..boxes.dim().0)
        .into_par_iter()
        .map(|image| {
            nms(
                boxes.index_axis(Axis(0), image),
                class_scores.index_axis(Axis(0), image),
                params,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_stable() {
        let config = FilterConfig::default();
        assert_eq!(config.score_threshold, 0.5);
        assert_eq!(config.iou_threshold, 0.5);
        assert_eq!(config.mode, SuppressionMode::PerClass);
        assert_eq!(config.max_detections, 100);
        assert!(!config.parallel);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_round_trips_through_json() {
        let config = FilterConfig {
            score_threshold: 0.3,
            mode: SuppressionMode::ClassAgnostic,
            ..FilterConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: FilterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
