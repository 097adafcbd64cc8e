//! Operator decisions taken when a registered identity disappears.

use crate::tracker::TrackedRow;

/// Answers the two recovery offers made for every disappeared registered row.
///
/// Offers are made in order: first reassociation with the IoU-nearest detector
/// row, then, if that is declined or no candidate exists, handing the identity
/// over to the alternative tracker. Declining both leaves the identity gone.
pub trait RecoveryPolicy {
    /// Bind `lost`'s identity to `candidate`?
    fn offer_reassociation(&mut self, lost: &TrackedRow, candidate: &TrackedRow, iou: f64) -> bool;

    /// Keep `lost` alive at its last coordinates under the alternative tracker?
    fn offer_alternative_tracking(&mut self, lost: &TrackedRow) -> bool;
}

/// Declines every offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl RecoveryPolicy for DeclineAll {
    fn offer_reassociation(&mut self, _lost: &TrackedRow, _candidate: &TrackedRow, _iou: f64) -> bool {
        false
    }

    fn offer_alternative_tracking(&mut self, _lost: &TrackedRow) -> bool {
        false
    }
}

/// Accepts every offer; useful for unattended runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl RecoveryPolicy for AcceptAll {
    fn offer_reassociation(&mut self, _lost: &TrackedRow, _candidate: &TrackedRow, _iou: f64) -> bool {
        true
    }

    fn offer_alternative_tracking(&mut self, _lost: &TrackedRow) -> bool {
        true
    }
}
