//! Immutable per-frame views handed to the renderer.

use crate::tracker::{BoxKey, Color, DisplayMode, Rect, TrackedBoxTable};

/// A box as the renderer should draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotBox {
    pub key: BoxKey,
    pub rect: Rect,
    pub color: Color,
    pub label: String,
    /// Alternative tracker fell back to old coordinates; draw attention to it
    pub tracker_lost: bool,
}

/// Every visible box of one frame, in drawing order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameSnapshot {
    pub frame_index: u64,
    pub boxes: Vec<SnapshotBox>,
}

impl FrameSnapshot {
    /// Copy the visible rows of `table` in render order. Hidden rows are skipped.
    pub fn capture(frame_index: u64, table: &TrackedBoxTable) -> Self {
        let boxes = table
            .render_order()
            .into_iter()
            .filter(|row| row.bbox().display_mode != DisplayMode::Hidden)
            .filter_map(|row| {
                let bbox = row.bbox();
                Some(SnapshotBox {
                    key: row.key(),
                    rect: bbox.rect(),
                    color: bbox.color,
                    label: bbox.display_name()?,
                    tracker_lost: row.is_tracker_lost(),
                })
            })
            .collect();
        Self { frame_index, boxes }
    }
}
