use anchordet::{clip_boxes, iou, regress_boxes, AnchorDetError};
use ndarray::{array, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn zero_delta_decodes_anchor_to_itself() {
    let anchors = array![[[10.0f32, 10.0, 20.0, 20.0]]];
    let deltas = Array3::<f32>::zeros((1, 1, 4));

    let decoded = regress_boxes(anchors.view(), deltas.view()).unwrap();
    assert_eq!(decoded, anchors);
}

#[test]
fn known_delta_moves_center_and_scales_size() {
    let anchors = array![[[0.0f32, 0.0, 10.0, 10.0]]];
    let deltas = array![[[0.1f32, 0.2, 2f32.ln(), 0.0]]];

    let decoded = regress_boxes(anchors.view(), deltas.view()).unwrap();

    // Center moves from (5, 5) to (6, 7); width doubles, height stays.
    let expected = [-4.0f32, 2.0, 16.0, 12.0];
    for (got, want) in decoded.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-4, "expected {want}, got {got}");
    }
}

#[test]
fn clipping_truncates_to_image_bounds() {
    let boxes = array![[[10.0f32, 10.0, 20.0, 20.0]]];
    let clipped = clip_boxes(boxes.view(), (15.0, 15.0)).unwrap();
    assert_eq!(clipped, array![[[10.0f32, 10.0, 15.0, 15.0]]]);

    let negative = array![[[-5.0f32, -3.0, 4.0, 4.0]]];
    let clipped = clip_boxes(negative.view(), (15.0, 15.0)).unwrap();
    assert_eq!(clipped, array![[[0.0f32, 0.0, 4.0, 4.0]]]);
}

#[test]
fn clipping_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(17);
    let boxes = Array3::from_shape_fn((2, 64, 4), |_| rng.random_range(-40.0f32..140.0));

    let once = clip_boxes(boxes.view(), (96.0, 80.0)).unwrap();
    let twice = clip_boxes(once.view(), (96.0, 80.0)).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn decoded_then_clipped_boxes_stay_inside_the_image() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut flat = Vec::with_capacity(2 * 128 * 4);
    for _ in 0..2 * 128 {
        let x1 = rng.random_range(-20.0f32..100.0);
        let y1 = rng.random_range(-20.0f32..100.0);
        let w = rng.random_range(1.0f32..50.0);
        let h = rng.random_range(1.0f32..50.0);
        flat.extend_from_slice(&[x1, y1, x1 + w, y1 + h]);
    }
    let anchors = Array3::from_shape_vec((2, 128, 4), flat).unwrap();
    let deltas = Array3::from_shape_fn((2, 128, 4), |_| rng.random_range(-1.5f32..1.5));

    let decoded = regress_boxes(anchors.view(), deltas.view()).unwrap();
    let clipped = clip_boxes(decoded.view(), (96.0, 80.0)).unwrap();

    for lane in clipped.lanes(Axis(2)) {
        assert!(lane[0] >= 0.0 && lane[2] <= 80.0 && lane[0] <= lane[2]);
        assert!(lane[1] >= 0.0 && lane[3] <= 96.0 && lane[1] <= lane[3]);
    }
}

#[test]
fn oversized_log_deltas_stay_finite() {
    let anchors = array![[[0.0f32, 0.0, 10.0, 10.0]]];
    let deltas = array![[[0.0f32, 0.0, 200.0, 200.0]]];

    let decoded = regress_boxes(anchors.view(), deltas.view()).unwrap();
    assert!(decoded.iter().all(|v| v.is_finite()));

    // The log-size cap corresponds to a 62.5x growth.
    let width = decoded[[0, 0, 2]] - decoded[[0, 0, 0]];
    assert!((width - 625.0).abs() < 0.1, "expected width near 625, got {width}");
}

#[test]
fn empty_anchor_sets_pass_through() {
    let anchors = Array3::<f32>::zeros((2, 0, 4));
    let deltas = Array3::<f32>::zeros((2, 0, 4));

    let decoded = regress_boxes(anchors.view(), deltas.view()).unwrap();
    assert_eq!(decoded.dim(), (2, 0, 4));

    let clipped = clip_boxes(decoded.view(), (10.0, 10.0)).unwrap();
    assert_eq!(clipped.dim(), (2, 0, 4));
}

#[test]
fn mismatched_delta_shape_is_rejected() {
    let anchors = Array3::<f32>::zeros((1, 2, 4));
    let deltas = Array3::<f32>::zeros((1, 3, 4));

    let err = regress_boxes(anchors.view(), deltas.view()).err().unwrap();
    assert_eq!(
        err,
        AnchorDetError::ShapeMismatch {
            context: "anchors vs deltas",
            left: [1, 2, 4],
            right: [1, 3, 4],
        }
    );
}

#[test]
fn wrong_trailing_dimension_is_rejected() {
    let anchors = Array3::<f32>::zeros((1, 2, 5));
    let deltas = Array3::<f32>::zeros((1, 2, 5));

    let err = regress_boxes(anchors.view(), deltas.view()).err().unwrap();
    assert_eq!(
        err,
        AnchorDetError::TrailingDimMismatch {
            context: "anchors",
            expected: 4,
            got: 5,
        }
    );

    let err = clip_boxes(anchors.view(), (4.0, 4.0)).err().unwrap();
    assert_eq!(
        err,
        AnchorDetError::TrailingDimMismatch {
            context: "boxes",
            expected: 4,
            got: 5,
        }
    );
}

#[test]
fn iou_handles_degenerate_boxes() {
    let unit = [0.0f32, 0.0, 10.0, 10.0];
    assert_eq!(iou(unit, unit), 1.0);
    assert_eq!(iou(unit, [20.0, 20.0, 30.0, 30.0]), 0.0);

    // A zero-area box overlaps nothing, even itself.
    let point = [5.0f32, 5.0, 5.0, 5.0];
    assert_eq!(iou(point, point), 0.0);
    assert_eq!(iou(unit, point), 0.0);

    // Half-height overlap of two unit squares: 50 / 150.
    let shifted = [0.0f32, 5.0, 10.0, 15.0];
    assert!((iou(unit, shifted) - 1.0 / 3.0).abs() < 1e-6);
}
