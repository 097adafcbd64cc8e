//! Routes operator pointer events into box edit gestures and table updates.

use tracing::debug;

use crate::error::Result;
use crate::tracker::{
    Authority, BoundingBox, BoxKey, CORNER_HIT_RADIUS, FrameSize, Rect, TrackedBoxTable, TrackedRow, UNLABELED_CLASS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Move,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub action: PointerAction,
    pub x: i32,
    pub y: i32,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(action: PointerAction, x: i32, y: i32) -> Self {
        Self {
            action,
            x,
            y,
            modifiers: Modifiers::default(),
        }
    }

    pub fn with_ctrl(mut self) -> Self {
        self.modifiers.ctrl = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.modifiers.alt = true;
        self
    }
}

/// What a pointer event did to the table.
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Nothing under the pointer, or no gesture in progress
    Ignored,
    /// A gesture is in progress on this row
    Editing(BoxKey),
    /// The gesture ended; the row holds the normalized rectangle
    Committed(BoxKey),
    Deleted(TrackedRow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    Create,
    Resize,
    Translate,
}

impl Gesture {
    /// Modifier state under which the gesture may continue.
    fn holds(self, modifiers: Modifiers) -> bool {
        match self {
            Gesture::Create => !modifiers.ctrl && !modifiers.alt,
            Gesture::Resize | Gesture::Translate => modifiers.ctrl,
        }
    }
}

/// Pointer-driven box editing.
///
/// * plain press: draw a new unlabeled box;
/// * Ctrl press near a corner: resize that box;
/// * Ctrl press inside a box: move it;
/// * Alt press inside a box: delete it.
///
/// The topmost box under the pointer wins. Releasing the modifier that
/// started a gesture ends it as if the button had been released.
#[derive(Debug, Clone)]
pub struct BoxEditor {
    corner_radius: f64,
    active: Option<(Gesture, BoundingBox)>,
}

impl Default for BoxEditor {
    fn default() -> Self {
        Self::new(CORNER_HIT_RADIUS)
    }
}

impl BoxEditor {
    pub fn new(corner_radius: f64) -> Self {
        Self {
            corner_radius,
            active: None,
        }
    }

    pub fn is_editing(&self) -> bool {
        self.active.is_some()
    }

    pub fn handle(&mut self, table: &mut TrackedBoxTable, frame: FrameSize, event: PointerEvent) -> Result<EditOutcome> {
        let PointerEvent { action, x, y, modifiers } = event;
        match action {
            PointerAction::Down => self.press(table, frame, x, y, modifiers),
            PointerAction::Move => match self.active.as_ref().map(|(gesture, _)| *gesture) {
                Some(gesture) if !gesture.holds(modifiers) => self.finish(table),
                Some(_) => self.drag(table, x, y),
                None => Ok(EditOutcome::Ignored),
            },
            PointerAction::Up => self.finish(table),
        }
    }

    fn press(
        &mut self,
        table: &mut TrackedBoxTable,
        frame: FrameSize,
        x: i32,
        y: i32,
        modifiers: Modifiers,
    ) -> Result<EditOutcome> {
        // a press while a gesture is still open ends it first
        if self.active.is_some() {
            self.finish(table)?;
        }

        if modifiers.alt {
            let Some(key) = topmost(table, |bbox| bbox.contains(x, y)) else {
                return Ok(EditOutcome::Ignored);
            };
            let row = table.remove(&key)?;
            return Ok(EditOutcome::Deleted(row));
        }

        if modifiers.ctrl {
            let radius = self.corner_radius;
            if let Some(key) = topmost(table, |bbox| bbox.hit_corner(x, y, radius).is_some()) {
                return self.begin(table, key, Gesture::Resize, x, y);
            }
            if let Some(key) = topmost(table, |bbox| bbox.contains(x, y)) {
                return self.begin(table, key, Gesture::Translate, x, y);
            }
            return Ok(EditOutcome::Ignored);
        }

        let mut bbox = BoundingBox::new(Rect::new(x, y, x, y), frame, UNLABELED_CLASS).with_authority(Authority::Locked);
        bbox.create_to(x, y);
        let key = table.update(bbox.clone())?;
        self.active = Some((Gesture::Create, bbox));
        debug!(x, y, "drawing new box");
        Ok(EditOutcome::Editing(key))
    }

    fn begin(&mut self, table: &TrackedBoxTable, key: BoxKey, gesture: Gesture, x: i32, y: i32) -> Result<EditOutcome> {
        let Some(row) = table.get(&key)? else {
            return Ok(EditOutcome::Ignored);
        };
        let mut bbox = row.bbox().clone();
        match gesture {
            Gesture::Resize => bbox.drag_corner_to(x, y),
            Gesture::Translate => bbox.drag_box_to(x, y),
            Gesture::Create => bbox.create_to(x, y),
        }
        debug!(%key, ?gesture, "edit started");
        self.active = Some((gesture, bbox));
        Ok(EditOutcome::Editing(key))
    }

    fn drag(&mut self, table: &mut TrackedBoxTable, x: i32, y: i32) -> Result<EditOutcome> {
        let Some((gesture, bbox)) = self.active.as_mut() else {
            return Ok(EditOutcome::Ignored);
        };
        match gesture {
            Gesture::Create => bbox.create_to(x, y),
            Gesture::Resize => bbox.drag_corner_to(x, y),
            Gesture::Translate => bbox.drag_box_to(x, y),
        }
        let key = table.update(bbox.clone())?;
        Ok(EditOutcome::Editing(key))
    }

    fn finish(&mut self, table: &mut TrackedBoxTable) -> Result<EditOutcome> {
        let Some((_, mut bbox)) = self.active.take() else {
            return Ok(EditOutcome::Ignored);
        };
        bbox.finish_edit();
        let key = table.update(bbox)?;
        debug!(%key, "edit committed");
        Ok(EditOutcome::Committed(key))
    }
}

/// Key of the first row, topmost first, whose box satisfies `hit`.
fn topmost(table: &TrackedBoxTable, hit: impl Fn(&BoundingBox) -> bool) -> Option<BoxKey> {
    table
        .render_order()
        .into_iter()
        .rev()
        .find(|row| hit(row.bbox()))
        .map(|row| row.key())
}
