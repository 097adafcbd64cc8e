//! Per-identity classical trackers that keep registered boxes moving when the
//! detector loses them.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::tracker::{FrameSize, IdentityKey, Rect};

/// Tracked boxes smaller than this, in square pixels, count as a loss.
pub const MIN_TRACKED_AREA: i64 = 16;

/// A single-object visual tracker, e.g. a correlation-filter tracker.
///
/// Coordinates cross this boundary in XYWH (left, top, width, height).
pub trait AlternativeTracker {
    type Error: fmt::Display;

    /// Start tracking the box `xywh` on `input`.
    fn init(&mut self, input: &[u8], frame: FrameSize, xywh: [i32; 4]) -> Result<(), Self::Error>;

    /// Locate the box on the next frame. `None` means the tracker lost it.
    fn update(&mut self, input: &[u8], frame: FrameSize) -> Option<[i32; 4]>;
}

/// Result of one tracker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStep {
    Tracked(Rect),
    /// Tracking failed or degenerated; the tracker was restarted on the
    /// previous coordinates, which should be kept
    Lost { fallback: Rect },
}

/// One tracker per registered identity, created on demand by a factory.
pub struct TrackerRegistry<T> {
    trackers: HashMap<IdentityKey, T>,
    factory: Box<dyn FnMut() -> T>,
}

impl<T: AlternativeTracker> TrackerRegistry<T> {
    pub fn new(factory: impl FnMut() -> T + 'static) -> Self {
        Self {
            trackers: HashMap::new(),
            factory: Box::new(factory),
        }
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn contains(&self, identity: &IdentityKey) -> bool {
        self.trackers.contains_key(identity)
    }

    /// Drop the tracker of `identity`; the next step starts a fresh one.
    pub fn stop(&mut self, identity: &IdentityKey) {
        if self.trackers.remove(identity).is_some() {
            debug!(%identity, "alternative tracker stopped");
        }
    }

    /// Keep only the trackers whose identity satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&IdentityKey) -> bool) {
        self.trackers.retain(|identity, _| keep(identity));
    }

    pub fn clear(&mut self) {
        self.trackers.clear();
    }

    /// Move `identity` from `previous` (its box on `previous_input`) to the
    /// current frame.
    ///
    /// An identity without a tracker gets a new one, initialized on the
    /// previous frame. When the update fails, or the new box is smaller than
    /// [`MIN_TRACKED_AREA`], the tracker is restarted on `previous` and the
    /// step reports a loss.
    pub fn step(
        &mut self,
        identity: &IdentityKey,
        previous_input: &[u8],
        input: &[u8],
        frame: FrameSize,
        previous: Rect,
    ) -> TrackStep {
        if !self.trackers.contains_key(identity) {
            let mut tracker = (self.factory)();
            if let Err(e) = tracker.init(previous_input, frame, previous.to_wh()) {
                warn!(%identity, error = %e, "alternative tracker failed to start");
                return TrackStep::Lost { fallback: previous };
            }
            debug!(%identity, rect = ?previous, "alternative tracker started");
            self.trackers.insert(identity.clone(), tracker);
        }

        let Some(tracker) = self.trackers.get_mut(identity) else {
            return TrackStep::Lost { fallback: previous };
        };

        let tracked = tracker.update(input, frame).map(|[x, y, w, h]| Rect::from_wh(x, y, w, h).normalize(frame));
        match tracked {
            Some(rect) if rect.area() >= MIN_TRACKED_AREA => TrackStep::Tracked(rect),
            tracked => {
                warn!(%identity, ?tracked, "alternative tracker lost its box, keeping previous coordinates");
                if let Err(e) = tracker.init(input, frame, previous.to_wh()) {
                    warn!(%identity, error = %e, "alternative tracker failed to restart");
                    self.trackers.remove(identity);
                }
                TrackStep::Lost { fallback: previous }
            }
        }
    }
}

impl<T> fmt::Debug for TrackerRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerRegistry")
            .field("identities", &self.trackers.keys().collect::<Vec<_>>())
            .finish()
    }
}
