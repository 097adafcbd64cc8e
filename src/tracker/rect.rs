//! Integer pixel rectangles and the geometry shared by every update source.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Added to the IoU denominator so two degenerate rectangles never divide by zero.
///
/// Stored thresholds were tuned against this exact value; do not change it.
pub const IOU_EPSILON: f64 = 1e-9;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    /// Number of pixel rows (image height)
    pub rows: u32,
    /// Number of pixel columns (image width)
    pub cols: u32,
}

impl FrameSize {
    #[inline]
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Length of the shorter side.
    #[inline]
    pub fn min_side(&self) -> u32 {
        self.rows.min(self.cols)
    }
}

/// Bounding box in XYXY format (left, top, right, bottom), in pixels.
///
/// A `Rect` built with [`Rect::new`] is stored as given; the rest of the crate
/// only keeps rectangles that went through [`Rect::normalize`], so `x0 <= x1`,
/// `y0 <= y1` and every coordinate lies inside the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Rect {
    /// Create a Rect from raw XYXY coordinates, without clamping or reordering.
    #[inline]
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Create a normalized Rect from raw XYXY coordinates.
    #[inline]
    pub fn normalized(x0: i32, y0: i32, x1: i32, y1: i32, frame: FrameSize) -> Self {
        Self::new(x0, y0, x1, y1).normalize(frame)
    }

    /// Create a Rect from XYWH format (left, top, width, height). The far
    /// corner saturates at the `i32` range.
    #[inline]
    pub fn from_wh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            x0: x,
            y0: y,
            x1: x.saturating_add(w),
            y1: y.saturating_add(h),
        }
    }

    /// Clamp to `[0, cols] x [0, rows]`, then order the corners so that
    /// `x0 <= x1` and `y0 <= y1`. Zero-area results are legal.
    pub fn normalize(self, frame: FrameSize) -> Self {
        let cols = i32::try_from(frame.cols).unwrap_or(i32::MAX);
        let rows = i32::try_from(frame.rows).unwrap_or(i32::MAX);

        let x0 = self.x0.clamp(0, cols);
        let x1 = self.x1.clamp(0, cols);
        let y0 = self.y0.clamp(0, rows);
        let y1 = self.y1.clamp(0, rows);

        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    /// Grow the rectangle outwards by `pad` pixels on every side. The result is
    /// not clamped to a frame, only saturated at the `i32` range.
    #[inline]
    pub fn padded(&self, pad: i32) -> Self {
        Self {
            x0: self.x0.saturating_sub(pad),
            y0: self.y0.saturating_sub(pad),
            x1: self.x1.saturating_add(pad),
            y1: self.y1.saturating_add(pad),
        }
    }

    /// Convert to XYXY format: (x0, y0, x1, y1).
    #[inline]
    pub fn to_xyxy(&self) -> [i32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }

    /// Convert to XYWH format: (left, top, width, height). Works on unordered corners too.
    #[inline]
    pub fn to_wh(&self) -> [i32; 4] {
        let left = self.x0.min(self.x1);
        let top = self.y0.min(self.y1);
        [left, top, self.width(), self.height()]
    }

    #[inline]
    pub fn width(&self) -> i32 {
        i32::try_from(self.x1.abs_diff(self.x0)).unwrap_or(i32::MAX)
    }

    #[inline]
    pub fn height(&self) -> i32 {
        i32::try_from(self.y1.abs_diff(self.y0)).unwrap_or(i32::MAX)
    }

    /// `|x1 - x0| * |y1 - y0|`
    #[inline]
    pub fn area(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }

    /// The four corners, ordered (x0,y0), (x0,y1), (x1,y0), (x1,y1).
    #[inline]
    pub fn corners(&self) -> [(i32, i32); 4] {
        [
            (self.x0, self.y0),
            (self.x0, self.y1),
            (self.x1, self.y0),
            (self.x1, self.y1),
        ]
    }

    /// Strict open-interval containment: points on the border are outside.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.x0 < x && x < self.x1 && self.y0 < y && y < self.y1
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    ///
    /// The intersection is zero as soon as one of its sides is `<= 0`, and the
    /// denominator carries [`IOU_EPSILON`].
    pub fn iou(&self, other: &Rect) -> f64 {
        let s0 = self.area() as f64;
        let s1 = other.area() as f64;

        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);

        let w = i64::from(x1) - i64::from(x0);
        let h = i64::from(y1) - i64::from(y0);
        let inter = if w <= 0 || h <= 0 { 0.0 } else { (w * h) as f64 };

        inter / (s0 + s1 - inter + IOU_EPSILON)
    }
}

/// Euclidean distance between a point and a pixel position.
#[inline]
pub fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = f64::from(a.0) - f64::from(b.0);
    let dy = f64::from(a.1) - f64::from(b.1);
    dx.hypot(dy)
}

/// Calculate IoU matrix between two sets of bounding boxes.
///
/// Returns a matrix of shape (M, N) where M is the length of `boxes_a`
/// and N is the length of `boxes_b`.
pub fn iou_batch(boxes_a: &[Rect], boxes_b: &[Rect]) -> Array2<f64> {
    let mut ious = Array2::zeros((boxes_a.len(), boxes_b.len()));
    for (i, a) in boxes_a.iter().enumerate() {
        for (j, b) in boxes_b.iter().enumerate() {
            ious[[i, j]] = a.iou(b);
        }
    }
    ious
}
