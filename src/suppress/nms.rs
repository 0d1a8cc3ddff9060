//! Greedy non-maximum suppression over per-anchor class scores.

use ndarray::{ArrayView1, ArrayView2};

use crate::boxes::iou;
use crate::suppress::{sort_detections_desc, Detection};
use crate::util::{AnchorDetError, AnchorDetResult};

/// Suppression scope for overlapping boxes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SuppressionMode {
    /// Only boxes of the same class suppress each other.
    PerClass,
    /// Overlapping boxes compete regardless of class.
    ClassAgnostic,
}

/// Per-image suppression parameters.
///
/// The orchestrator assembles these from its configuration; they can
/// also be passed directly when suppressing a single image.
#[derive(Clone, Copy, Debug)]
pub struct NmsParams {
    /// Candidates scoring below this never enter suppression.
    pub score_threshold: f32,
    /// Overlap strictly above this suppresses the lower-ranked box.
    pub iou_threshold: f32,
    /// Suppression scope.
    pub mode: SuppressionMode,
    /// Hard cap on survivors.
    pub max_detections: usize,
}

impl Default for NmsParams {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            iou_threshold: 0.5,
            mode: SuppressionMode::PerClass,
            max_detections: 100,
        }
    }
}

/// Thresholds, labels, and suppresses one image's decoded boxes.
///
/// Each anchor contributes at most one candidate: its argmax class (ties
/// to the lower class index) with that class's score. Candidates below
/// `score_threshold` are dropped; the rest are ranked by descending
/// score, ties by lower anchor index. A candidate survives if its IoU
/// with every previously kept box stays at or below `iou_threshold`
/// (under [`SuppressionMode::PerClass`] only kept boxes with the same
/// label are compared). At most `max_detections` survivors are
/// returned, best first.
///
/// Nothing above threshold is a valid empty result. An empty class
/// dimension and a box/score row-count mismatch are errors.
pub fn nms(
    boxes: ArrayView2<'_, f32>,
    class_scores: ArrayView2<'_, f32>,
    params: NmsParams,
) -> AnchorDetResult<Vec<Detection>> {
    if class_scores.ncols() == 0 {
        return Err(AnchorDetError::NoClasses);
    }
    if class_scores.nrows() != boxes.nrows() {
        return Err(AnchorDetError::AnchorCountMismatch {
            context: "class scores",
            expected: boxes.nrows(),
            got: class_scores.nrows(),
        });
    }
    if boxes.ncols() != 4 {
        return Err(AnchorDetError::TrailingDimMismatch {
            context: "boxes",
            expected: 4,
            got: boxes.ncols(),
        });
    }

    let mut candidates = Vec::new();
    for (anchor, (box_row, score_row)) in boxes
        .rows()
        .into_iter()
        .zip(class_scores.rows())
        .enumerate()
    {
        let (label, score) = best_class(score_row);
        if score < params.score_threshold {
            continue;
        }
        candidates.push(Detection {
            bbox: [box_row[0], box_row[1], box_row[2], box_row[3]],
            label,
            score,
            anchor,
        });
    }
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    sort_detections_desc(&mut candidates);

    let mut kept: Vec<Detection> = Vec::new();
    'outer: for candidate in candidates {
        if kept.len() == params.max_detections {
            break;
        }
        for survivor in &kept {
            if params.mode == SuppressionMode::PerClass && survivor.label != candidate.label {
                continue;
            }
            if iou(candidate.bbox, survivor.bbox) > params.iou_threshold {
                continue 'outer;
            }
        }
        kept.push(candidate);
    }
    Ok(kept)
}

/// Argmax over one anchor's class scores; ties keep the lower index.
fn best_class(scores: ArrayView1<'_, f32>) -> (usize, f32) {
    let mut label = 0;
    let mut best = scores[0];
    for (idx, &score) in scores.iter().enumerate().skip(1) {
        if score > best {
            label = idx;
            best = score;
        }
    }
    (label, best)
}
