//! The detector collaborator boundary (SPEC_FULL.md §6): consumes a
//! `waterfall_image()` snapshot and returns annotated boxes. The model itself
//! is explicitly out of scope — this crate only specifies the trait shape that
//! `original_source/Software/algorithms.py` `DroneDetector._detection_loop`
//! produces per iteration (`bbox`, `confidence`, `class_id`, `class_name`).

/// One detected object, in image pixel coordinates of the waterfall image
/// that produced it (same `(rows, cols)` the box's `x1..x2`/`y1..y2` are
/// relative to).
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub confidence: f32,
    pub class_id: i32,
    pub class_name: String,
}

/// A single detection pass result: the boxes found plus the rows/cols of the
/// image they were found against, so a caller can validate coordinates
/// against the current waterfall dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub boxes: Vec<DetectionBox>,
    pub rows: usize,
    pub cols: usize,
}

/// Implemented by the (out-of-scope) detection model collaborator. `detect`
/// receives one RGB `rows x cols x 3` byte buffer, as returned by
/// `State::waterfall_image`, and returns the boxes found against it.
///
/// Per §6/§9, this core neither instantiates nor calls a concrete model —
/// `Pipeline` only needs somewhere to dispatch `waterfall_image()` snapshots
/// if a caller plugs one in; no implementation of this trait ships here.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &[u8], rows: usize, cols: usize) -> DetectionResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullDetector;

    impl Detector for NullDetector {
        fn detect(&self, _image: &[u8], rows: usize, cols: usize) -> DetectionResult {
            DetectionResult {
                boxes: Vec::new(),
                rows,
                cols,
            }
        }
    }

    #[test]
    fn trait_object_is_callable_and_dimension_preserving() {
        let detector: Box<dyn Detector> = Box::new(NullDetector);
        let image = vec![0u8; 4 * 4 * 3];
        let result = detector.detect(&image, 4, 4);
        assert!(result.boxes.is_empty());
        assert_eq!((result.rows, result.cols), (4, 4));
    }
}
