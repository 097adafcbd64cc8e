use serde::{Deserialize, Serialize};

/// How a box is drawn by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisplayMode {
    /// Drawn as a detector proposal, labelled with its auto id
    #[default]
    Auto,
    /// Drawn as a registered identity, labelled with its registered id
    Registered,
    /// Not drawn
    Hidden,
}

/// Which update source may move a box's coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Authority {
    /// Coordinates follow the detector's proposals
    #[default]
    Detector,
    /// Coordinates follow the per-identity alternative tracker
    AlternativeTracker,
    /// Coordinates are frozen; the row is still kept alive every frame
    Locked,
}

/// Table-wide display projection, see [`crate::TrackedBoxTable::project`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ViewMode {
    /// Registered rows as registered, everything else as auto
    #[default]
    Full,
    /// Only rows carrying an auto id
    AutoOnly,
    /// Only rows bound to a registered identity
    RegisteredOnly,
}

/// Candidate filter for [`crate::TrackedBoxTable::find_nearest_by_iou`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchScope {
    #[default]
    All,
    /// Rows carrying an auto id
    AutoOnly,
    /// Rows carrying an auto id and no registered identity
    UnboundAuto,
    /// Rows bound to a registered identity, whatever source drives them
    AlternativeOnly,
    /// Rows whose authority is locked
    LockedOnly,
}
