//! Adapters connecting detectors, visual trackers and an operator front-end
//! to the reconciliation table.

mod alternative;
mod detector;
mod editor;
mod labels;
mod pipeline;
mod recovery;
mod snapshot;

pub use alternative::{AlternativeTracker, MIN_TRACKED_AREA, TrackStep, TrackerRegistry};
pub use detector::{DETECTION_PAD_FRACTION, Detection, DetectionSource};
pub use editor::{BoxEditor, EditOutcome, Modifiers, PointerAction, PointerEvent};
pub use labels::{FrameLabels, LabelStore};
pub use pipeline::{Escalation, FrameReport, PipelineError, Session};
pub use recovery::{AcceptAll, DeclineAll, RecoveryPolicy};
pub use snapshot::{FrameSnapshot, SnapshotBox};
