//! Trait for object detection inference backends.

use crate::tracker::{BoundingBox, FrameSize, Rect};

/// Fraction of the shorter frame side added around every detector box.
pub const DETECTION_PAD_FRACTION: f64 = 0.025;

/// One detector proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub class_name: String,
    /// Detector-assigned index, stable only within one detector run
    pub auto_id: u32,
    /// Raw box as returned by the model, before padding and clamping
    pub rect: Rect,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, auto_id: u32, rect: Rect) -> Self {
        Self {
            class_name: class_name.into(),
            auto_id,
            rect,
        }
    }

    /// Pad outwards by [`DETECTION_PAD_FRACTION`] of the shorter frame side,
    /// then clamp into the frame.
    pub fn into_box(self, frame: FrameSize) -> BoundingBox {
        let pad = (f64::from(frame.min_side()) * DETECTION_PAD_FRACTION) as i32;
        BoundingBox::detected(self.rect.padded(pad), frame, self.class_name, self.auto_id)
    }
}

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to a [`crate::Session`].
///
/// # Example
///
/// ```ignore
/// use boxrecon::{Detection, DetectionSource, FrameSize};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl DetectionSource for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, input: &[u8], frame: FrameSize) -> Result<Vec<Detection>, Self::Error> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error;

    /// Run inference on raw image data and return detections.
    ///
    /// # Arguments
    /// * `input` - Raw image bytes (format depends on implementation)
    /// * `frame` - Image size in pixels
    fn detect(&mut self, input: &[u8], frame: FrameSize) -> Result<Vec<Detection>, Self::Error>;

    /// Restart the detector's own id assignment. Auto ids handed out before a
    /// reset must not be trusted afterwards.
    fn reset(&mut self) {}
}
