//! A single tracked rectangle and its pointer-driven edit state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tracker::rect::{FrameSize, Rect, distance};
use crate::tracker::track_state::{Authority, DisplayMode};

/// Pixel radius within which a pointer grabs a box corner.
pub const CORNER_HIT_RADIUS: f64 = 6.0;

/// Class name given to a freshly hand-drawn box until the operator labels it.
pub const UNLABELED_CLASS: &str = "?";

pub type Color = [u8; 3];

pub const AUTO_COLOR: Color = [0, 0, 0];
pub const REGISTERED_COLOR: Color = [0, 255, 0];

/// Composite identity of a table row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoxKey {
    pub class_name: String,
    pub auto_id: Option<u32>,
    pub registered_id: Option<u32>,
}

impl BoxKey {
    pub fn new(class_name: impl Into<String>, auto_id: Option<u32>, registered_id: Option<u32>) -> Self {
        Self {
            class_name: class_name.into(),
            auto_id,
            registered_id,
        }
    }

    /// The registered identity carried by this key, if any.
    pub fn identity(&self) -> Option<IdentityKey> {
        self.registered_id
            .map(|registered_id| IdentityKey::new(self.class_name.clone(), registered_id))
    }
}

impl fmt::Display for BoxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |id: Option<u32>| id.map_or_else(|| "none".to_string(), |id| id.to_string());
        write!(
            f,
            "{}[auto={}, reg={}]",
            self.class_name,
            show(self.auto_id),
            show(self.registered_id)
        )
    }
}

/// Stable operator-assigned identity: a class name plus its catalog sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub class_name: String,
    pub registered_id: u32,
}

impl IdentityKey {
    pub fn new(class_name: impl Into<String>, registered_id: u32) -> Self {
        Self {
            class_name: class_name.into(),
            registered_id,
        }
    }
}

/// Formats as `"{class_name},{registered_id}"`, the key used in label files.
impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.class_name, self.registered_id)
    }
}

/// Transient edit state. Exactly one gesture can be active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Idle,
    /// Drawing a new box; `anchor` is the fixed corner
    Creating { anchor: (i32, i32) },
    /// Resizing; `anchor` is the corner opposite to the grabbed one
    DraggingCorner { anchor: (i32, i32) },
    /// Translating; pointer-to-corner offsets `[dx0, dy0, dx1, dy1]`
    DraggingBox { offsets: [i32; 4] },
}

/// A tracked rectangle with identity fields and display/authority flags.
///
/// Identity fields are read-only outside the crate: only the table may rebind
/// a box, which keeps a row's key and its box's key from drifting apart.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    rect: Rect,
    frame: FrameSize,
    class_name: String,
    auto_id: Option<u32>,
    registered_id: Option<u32>,
    description: String,
    /// Outline color used by the renderer
    pub color: Color,
    pub display_mode: DisplayMode,
    pub authority: Authority,
    edit: EditState,
}

impl BoundingBox {
    /// Create an unbound box. The rectangle is normalized against `frame`.
    pub fn new(rect: Rect, frame: FrameSize, class_name: impl Into<String>) -> Self {
        Self {
            rect: rect.normalize(frame),
            frame,
            class_name: class_name.into(),
            auto_id: None,
            registered_id: None,
            description: String::new(),
            color: AUTO_COLOR,
            display_mode: DisplayMode::Auto,
            authority: Authority::Detector,
            edit: EditState::Idle,
        }
    }

    /// A detector proposal carrying the detector's ephemeral index.
    pub fn detected(rect: Rect, frame: FrameSize, class_name: impl Into<String>, auto_id: u32) -> Self {
        Self::new(rect, frame, class_name).with_auto_id(Some(auto_id))
    }

    pub fn with_auto_id(mut self, auto_id: Option<u32>) -> Self {
        self.auto_id = auto_id;
        self
    }

    /// Bind to a registered identity and switch to the registered look.
    pub fn with_identity(mut self, registered_id: u32, description: impl Into<String>) -> Self {
        self.bind(registered_id, description.into());
        self
    }

    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    #[inline]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    #[inline]
    pub fn auto_id(&self) -> Option<u32> {
        self.auto_id
    }

    #[inline]
    pub fn registered_id(&self) -> Option<u32> {
        self.registered_id
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn edit_state(&self) -> EditState {
        self.edit
    }

    pub fn key(&self) -> BoxKey {
        BoxKey::new(self.class_name.clone(), self.auto_id, self.registered_id)
    }

    pub fn identity(&self) -> Option<IdentityKey> {
        self.key().identity()
    }

    /// Label drawn next to the box, e.g. `person(AG),3` or `person(T),0`.
    pub fn display_name(&self) -> Option<String> {
        let show = |id: Option<u32>| id.map_or_else(|| "-".to_string(), |id| id.to_string());
        match self.display_mode {
            DisplayMode::Auto => Some(format!("{}(AG),{}", self.class_name, show(self.auto_id))),
            DisplayMode::Registered => {
                Some(format!("{}(T),{}", self.class_name, show(self.registered_id)))
            }
            DisplayMode::Hidden => None,
        }
    }

    /// Replace the coordinates, normalizing them against the frame.
    pub fn set_rect(&mut self, rect: Rect) {
        self.rect = rect.normalize(self.frame);
    }

    pub(crate) fn bind(&mut self, registered_id: u32, description: String) {
        self.registered_id = Some(registered_id);
        self.description = description;
        self.display_mode = DisplayMode::Registered;
        self.color = REGISTERED_COLOR;
    }

    /// Drop the registered identity and fall back to the detector look.
    pub(crate) fn unbind(&mut self) {
        self.registered_id = None;
        self.description.clear();
        self.display_mode = DisplayMode::Auto;
        self.color = AUTO_COLOR;
    }

    pub(crate) fn set_class_name(&mut self, class_name: String) {
        self.class_name = class_name;
    }

    pub(crate) fn clear_auto_id(&mut self) {
        self.auto_id = None;
    }

    /// Corner within `radius` of the pointer, checked in the order
    /// (x0,y0), (x1,y1), (x0,y1), (x1,y0).
    pub fn hit_corner(&self, x: i32, y: i32, radius: f64) -> Option<(i32, i32)> {
        let Rect { x0, y0, x1, y1 } = self.rect;
        [(x0, y0), (x1, y1), (x0, y1), (x1, y0)]
            .into_iter()
            .find(|&corner| distance(corner, (x, y)) <= radius)
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.rect.contains(x, y)
    }

    /// Creation gesture. The first call anchors the corner nearest to the
    /// pointer; every call moves the opposite corner to the pointer.
    pub fn create_to(&mut self, x: i32, y: i32) {
        let anchor = match self.edit {
            EditState::Creating { anchor } => anchor,
            _ => {
                let anchor = nearest_corner(&self.rect, (x, y));
                self.edit = EditState::Creating { anchor };
                anchor
            }
        };
        self.rect = Rect::new(anchor.0, anchor.1, x, y);
    }

    /// Resize gesture. The first call anchors the corner farthest from the
    /// pointer (the one the operator did not grab); every call moves the
    /// grabbed corner to the pointer.
    pub fn drag_corner_to(&mut self, x: i32, y: i32) {
        let anchor = match self.edit {
            EditState::DraggingCorner { anchor } => anchor,
            _ => {
                let anchor = farthest_corner(&self.rect, (x, y));
                self.edit = EditState::DraggingCorner { anchor };
                anchor
            }
        };
        self.rect = Rect::new(anchor.0, anchor.1, x, y);
    }

    /// Translate gesture. The first call records the pointer-to-corner offsets;
    /// later calls rebuild all corners from them, so width and height are kept.
    pub fn drag_box_to(&mut self, x: i32, y: i32) {
        match self.edit {
            EditState::DraggingBox { offsets: [dx0, dy0, dx1, dy1] } => {
                self.rect = Rect::new(
                    x.saturating_sub(dx0),
                    y.saturating_sub(dy0),
                    x.saturating_add(dx1),
                    y.saturating_add(dy1),
                );
            }
            _ => {
                let Rect { x0, y0, x1, y1 } = self.rect;
                self.edit = EditState::DraggingBox {
                    offsets: [
                        x.saturating_sub(x0),
                        y.saturating_sub(y0),
                        x1.saturating_sub(x),
                        y1.saturating_sub(y),
                    ],
                };
            }
        }
    }

    /// End whatever gesture is active: normalize and return to `Idle`.
    pub fn finish_edit(&mut self) {
        self.rect = self.rect.normalize(self.frame);
        self.edit = EditState::Idle;
    }
}

fn nearest_corner(rect: &Rect, pointer: (i32, i32)) -> (i32, i32) {
    let corners = rect.corners();
    let mut best = corners[0];
    let mut best_dist = distance(best, pointer);
    for corner in &corners[1..] {
        let dist = distance(*corner, pointer);
        if dist < best_dist {
            best = *corner;
            best_dist = dist;
        }
    }
    best
}

fn farthest_corner(rect: &Rect, pointer: (i32, i32)) -> (i32, i32) {
    let corners = rect.corners();
    let mut best = corners[0];
    let mut best_dist = distance(best, pointer);
    for corner in &corners[1..] {
        let dist = distance(*corner, pointer);
        if dist > best_dist {
            best = *corner;
            best_dist = dist;
        }
    }
    best
}
