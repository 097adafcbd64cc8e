//! Reconciliation of per-frame bounding boxes coming from a detector, a
//! per-identity visual tracker and a human operator.
//!
//! The [`TrackedBoxTable`] owns every box of the current frame and keeps the
//! registered identities stable while detector ids come and go. The
//! [`integration`] module plugs detectors, trackers and an operator front-end
//! into a per-frame [`Session`].

pub mod config;
pub mod error;
pub mod integration;
pub mod tracker;

pub use config::{SessionConfig, init_logging};
pub use error::{Error, Result};
pub use integration::{
    AlternativeTracker, BoxEditor, DeclineAll, Detection, DetectionSource, Escalation,
    FrameReport, FrameSnapshot, LabelStore, PipelineError, RecoveryPolicy, Session,
};
pub use tracker::{
    Authority, BoundingBox, BoxKey, DisplayMode, FrameSize, IdentityCatalog, IdentityKey, Rect, SearchScope,
    TrackedBoxTable, TrackedRow, ViewMode,
};
