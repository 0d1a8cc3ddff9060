//! Batched box decoding and clipping.
//!
//! Boxes are corner-form `[x1, y1, x2, y2]` in absolute pixels; deltas
//! are `[dx, dy, dw, dh]` aligned positionally with the box layout.

use ndarray::{Array3, ArrayView3, Axis, Zip};

use crate::util::{AnchorDetError, AnchorDetResult};

/// Decodes regression deltas against anchors.
///
/// Both inputs are `(batch, N, 4)`; shapes must match exactly and `N = 0`
/// yields an empty output. Per anchor-delta pair the center moves by
/// `delta * anchor_size` and the size scales by `exp(delta)`, the
/// standard SSD/RetinaNet parametrization. A zero delta decodes an
/// anchor to itself.
pub fn regress_boxes(
    anchors: ArrayView3<'_, f32>,
    deltas: ArrayView3<'_, f32>,
) -> AnchorDetResult<Array3<f32>> {
    let a_dim = anchors.dim();
    let d_dim = deltas.dim();
    if a_dim != d_dim {
        return Err(AnchorDetError::ShapeMismatch {
            context: "anchors vs deltas",
            left: [a_dim.0, a_dim.1, a_dim.2],
            right: [d_dim.0, d_dim.1, d_dim.2],
        });
    }
    if a_dim.2 != 4 {
        return Err(AnchorDetError::TrailingDimMismatch {
            context: "anchors",
            expected: 4,
            got: a_dim.2,
        });
    }

    // exp overflows f32 near 88, so the log-size terms are capped.
    let log_clamp = (1000.0f32 / 16.0).ln();

    let mut out = Array3::zeros(a_dim);
    Zip::from(out.lanes_mut(Axis(2)))
        .and(anchors.lanes(Axis(2)))
        .and(deltas.lanes(Axis(2)))
        .for_each(|mut decoded, anchor, delta| {
            let aw = anchor[2] - anchor[0];
            let ah = anchor[3] - anchor[1];
            let cx = anchor[0] + 0.5 * aw + delta[0] * aw;
            let cy = anchor[1] + 0.5 * ah + delta[1] * ah;
            let w = aw * delta[2].min(log_clamp).exp();
            let h = ah * delta[3].min(log_clamp).exp();
            decoded[0] = cx - 0.5 * w;
            decoded[1] = cy - 0.5 * h;
            decoded[2] = cx + 0.5 * w;
            decoded[3] = cy + 0.5 * h;
        });
    Ok(out)
}

/// Clamps every box into `[0, width] x [0, height]`.
///
/// Shape-preserving and idempotent. Clamping is monotone, so coordinate
/// ordering within a box is preserved.
pub fn clip_boxes(
    boxes: ArrayView3<'_, f32>,
    image_dims: (f32, f32),
) -> AnchorDetResult<Array3<f32>> {
    if boxes.dim().2 != 4 {
        return Err(AnchorDetError::TrailingDimMismatch {
            context: "boxes",
            expected: 4,
            got: boxes.dim().2,
        });
    }
    let (height, width) = image_dims;
    let mut out = boxes.to_owned();
    for mut lane in out.lanes_mut(Axis(2)) {
        lane[0] = lane[0].min(width).max(0.0);
        lane[1] = lane[1].min(height).max(0.0);
        lane[2] = lane[2].min(width).max(0.0);
        lane[3] = lane[3].min(height).max(0.0);
    }
    Ok(out)
}

/// Intersection over union of two corner-form boxes.
///
/// Degenerate input is safe: a zero-area box, or an empty union, gives
/// an IoU of 0 rather than NaN.
pub fn iou(a: [f32; 4], b: [f32; 4]) -> f32 {
    let iw = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let ih = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = iw * ih;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0.0, 0.0, 10.0, 10.0];
        assert_eq!(iou(b, b), 1.0);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou([0.0, 0.0, 1.0, 1.0], [5.0, 5.0, 6.0, 6.0]), 0.0);
    }

    #[test]
    fn iou_with_zero_area_box_is_zero() {
        let point = [5.0, 5.0, 5.0, 5.0];
        let other = [0.0, 0.0, 10.0, 10.0];
        assert_eq!(iou(point, other), 0.0);
        assert_eq!(iou(point, point), 0.0);
    }

    #[test]
    fn iou_half_overlap_matches_hand_computation() {
        // 2x1 boxes overlapping over a 1x1 cell: 1 / (2 + 2 - 1).
        let a = [0.0, 0.0, 2.0, 1.0];
        let b = [1.0, 0.0, 3.0, 1.0];
        assert!((iou(a, b) - 1.0 / 3.0).abs() < 1e-6);
    }
}
