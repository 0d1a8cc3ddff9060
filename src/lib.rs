//! Anchordet turns raw single-shot detector outputs into detections.
//!
//! The crate covers the post-processing half of an EfficientDet-style
//! detector: multi-scale anchor generation, batched box regression
//! decoding, coordinate clipping, and greedy non-maximum suppression,
//! composed by [`DetectionFilter`]. Optional per-image parallelism is
//! available via the `rayon` feature.

pub mod anchors;
pub mod boxes;
pub mod filter;
pub mod suppress;
pub mod util;

mod trace;

pub use anchors::{feature_side, AnchorGenerator, AnchorsConfig};
pub use boxes::{clip_boxes, iou, regress_boxes};
pub use filter::{DetectionFilter, FilterConfig, PaddedDetections};
pub use suppress::nms::{nms, NmsParams, SuppressionMode};
pub use suppress::Detection;
pub use util::{AnchorDetError, AnchorDetResult};
