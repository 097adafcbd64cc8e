mod bounding_box;
mod catalog;
mod matching;
mod rect;
mod table;
mod track_state;

pub use bounding_box::{
    AUTO_COLOR, BoundingBox, BoxKey, CORNER_HIT_RADIUS, Color, EditState, IdentityKey, REGISTERED_COLOR,
    UNLABELED_CLASS,
};
pub use catalog::{IdentityCatalog, IdentityRecord};
pub use matching::{AssignmentResult, iou_distance, linear_assignment};
pub use rect::{FrameSize, IOU_EPSILON, Rect, distance, iou_batch};
pub use table::{CoordsUpdate, MIN_REASSOCIATION_IOU, NearestMatch, Reassociation, TrackedBoxTable, TrackedRow};
pub use track_state::{Authority, DisplayMode, SearchScope, ViewMode};
