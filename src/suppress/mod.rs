//! Candidate selection and suppression of overlapping detections.

pub mod nms;

use std::cmp::Ordering;

/// One surviving detection.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Detection {
    /// Corner-form box `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f32; 4],
    /// Class index selected by the per-anchor argmax.
    pub label: usize,
    /// Score of the selected class.
    pub score: f32,
    /// Row index of the source anchor.
    pub anchor: usize,
}

fn detection_cmp_desc(a: &Detection, b: &Detection) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.anchor.cmp(&b.anchor))
}

/// Sorts detections by descending score; ties go to the lower anchor
/// index so suppression stays deterministic.
pub(crate) fn sort_detections_desc(detections: &mut [Detection]) {
    detections.sort_by(detection_cmp_desc);
}
