//! The per-frame reconciliation table.
//!
//! Three sources feed the table: the detector (ephemeral auto ids), the
//! alternative tracker (registered identities without an auto id) and the
//! operator (hand-drawn and hand-edited boxes). Every row is identified by
//! `(class_name, auto_id, registered_id)`; a non-empty `(class_name, auto_id)`
//! and a non-empty `(class_name, registered_id)` each belong to at most one row.
//!
//! A row stores its identity only inside its [`BoundingBox`], so the row key and
//! the box key cannot disagree.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::tracker::bounding_box::{BoundingBox, BoxKey, IdentityKey, UNLABELED_CLASS};
use crate::tracker::catalog::IdentityCatalog;
use crate::tracker::matching::{iou_distance, linear_assignment};
use crate::tracker::rect::{Rect, iou_batch};
use crate::tracker::track_state::{Authority, DisplayMode, SearchScope, ViewMode};

/// Candidates overlapping less than this are never offered for reassociation.
pub const MIN_REASSOCIATION_IOU: f64 = 0.1;

/// One table row: a box plus its per-frame liveness marker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedRow {
    bbox: BoundingBox,
    live: bool,
    tracker_lost: bool,
}

impl TrackedRow {
    fn new(mut bbox: BoundingBox) -> Self {
        bbox.finish_edit();
        Self {
            bbox,
            live: true,
            tracker_lost: false,
        }
    }

    #[inline]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn into_box(self) -> BoundingBox {
        self.bbox
    }

    #[inline]
    pub fn class_name(&self) -> &str {
        self.bbox.class_name()
    }

    #[inline]
    pub fn auto_id(&self) -> Option<u32> {
        self.bbox.auto_id()
    }

    #[inline]
    pub fn registered_id(&self) -> Option<u32> {
        self.bbox.registered_id()
    }

    #[inline]
    pub fn description(&self) -> &str {
        self.bbox.description()
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.bbox.rect()
    }

    pub fn key(&self) -> BoxKey {
        self.bbox.key()
    }

    pub fn identity(&self) -> Option<IdentityKey> {
        self.bbox.identity()
    }

    /// Touched since the last sweep.
    #[inline]
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// The alternative tracker fell back to the previous coordinates for this
    /// row and the operator should have a look.
    #[inline]
    pub fn is_tracker_lost(&self) -> bool {
        self.tracker_lost
    }

    fn matches(&self, key: &BoxKey) -> bool {
        self.class_name() == key.class_name
            && self.auto_id() == key.auto_id
            && self.registered_id() == key.registered_id
    }

    fn in_scope(&self, scope: SearchScope) -> bool {
        match scope {
            SearchScope::All => true,
            SearchScope::AutoOnly => self.auto_id().is_some(),
            SearchScope::UnboundAuto => self.auto_id().is_some() && self.registered_id().is_none(),
            SearchScope::AlternativeOnly => self.registered_id().is_some(),
            SearchScope::LockedOnly => self.bbox.authority == Authority::Locked,
        }
    }
}

/// Result of [`TrackedBoxTable::find_nearest_by_iou`].
#[derive(Debug, Clone, PartialEq)]
pub struct NearestMatch {
    /// Best IoU seen, even when it is below the acceptance floor
    pub iou: f64,
    pub candidate: Option<TrackedRow>,
}

/// What [`TrackedBoxTable::update_coords_only`] did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordsUpdate {
    /// Coordinates replaced, row marked live
    Moved,
    /// Row is locked: marked live, coordinates kept
    Held,
    /// Row is driven by the detector; nothing changed
    Rejected,
}

/// A proposed binding of a vanished identity to a detector row.
#[derive(Debug, Clone, PartialEq)]
pub struct Reassociation {
    pub identity: IdentityKey,
    pub description: String,
    pub candidate: BoxKey,
    pub iou: f64,
}

/// The reconciliation engine. Rows are kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct TrackedBoxTable {
    rows: Vec<TrackedRow>,
    catalog: IdentityCatalog,
}

impl TrackedBoxTable {
    pub fn new(catalog: IdentityCatalog) -> Self {
        Self {
            rows: Vec::new(),
            catalog,
        }
    }

    pub fn catalog(&self) -> &IdentityCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut IdentityCatalog {
        &mut self.catalog
    }

    pub fn rows(&self) -> &[TrackedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop every row. The catalog is kept.
    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn get(&self, key: &BoxKey) -> Result<Option<&TrackedRow>> {
        Ok(self.position(key)?.map(|i| &self.rows[i]))
    }

    pub fn row_for_identity(&self, identity: &IdentityKey) -> Result<Option<&TrackedRow>> {
        let index = self.match_unique(
            |r| {
                r.class_name() == identity.class_name
                    && r.registered_id() == Some(identity.registered_id)
            },
            || format!("identity {identity}"),
        )?;
        Ok(index.map(|i| &self.rows[i]))
    }

    pub fn registered_rows(&self) -> impl Iterator<Item = &TrackedRow> {
        self.rows.iter().filter(|r| r.registered_id().is_some())
    }

    /// Registered rows without an auto id: the ones the alternative tracker
    /// drives, including locked ones.
    pub fn alternative_rows(&self) -> impl Iterator<Item = &TrackedRow> {
        self.rows
            .iter()
            .filter(|r| r.auto_id().is_none() && r.registered_id().is_some())
    }

    /// Apply `f` to a copy of the table and keep the result only if `f` succeeds.
    pub fn transact<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mut staged = self.clone();
        let out = f(&mut staged)?;
        *self = staged;
        Ok(out)
    }

    /// Ingest a batch of boxes; either all of them are applied or none.
    pub fn update_all(&mut self, boxes: impl IntoIterator<Item = BoundingBox>) -> Result<Vec<BoxKey>> {
        self.transact(|table| boxes.into_iter().map(|b| table.update(b)).collect())
    }

    /// Ingest one box from any source and mark its row live.
    ///
    /// The branch depends on which identifiers the box carries:
    ///
    /// * neither: a hand-drawn unbound box, matched by class among unbound rows;
    /// * registered id only: an alternatively tracked or locked identity. A
    ///   detector row holding the same identity is demoted first;
    /// * auto id only: a detector proposal. If an earlier association bound that
    ///   auto id, the row keeps its identity;
    /// * both: matched by the full key. If the identity or the auto id sit on
    ///   other rows, the identity is moved onto the detector row.
    ///
    /// Returns the key of the affected row.
    pub fn update(&mut self, incoming: BoundingBox) -> Result<BoxKey> {
        let class_name = incoming.class_name().to_string();
        let class = class_name.as_str();

        let index = match (incoming.auto_id(), incoming.registered_id()) {
            (None, None) => self.match_unique(
                |r| r.class_name() == class && r.auto_id().is_none() && r.registered_id().is_none(),
                || BoxKey::new(class, None, None).to_string(),
            )?,
            (None, Some(registered_id)) => {
                let holder = self.match_unique(
                    |r| {
                        r.class_name() == class
                            && r.auto_id().is_some()
                            && r.registered_id() == Some(registered_id)
                    },
                    || format!("detector row holding {class},{registered_id}"),
                )?;
                let target = self.position(&incoming.key())?;
                if let Some(holder) = holder {
                    let row = &mut self.rows[holder];
                    debug!(key = %row.key(), "identity claimed by another source, demoting detector row");
                    row.bbox.unbind();
                    row.bbox.authority = Authority::Detector;
                }
                target
            }
            (Some(auto_id), None) => {
                let index = self.match_unique(
                    |r| r.class_name() == class && r.auto_id() == Some(auto_id),
                    || format!("{class} auto id {auto_id}"),
                )?;
                if let Some(registered_id) = index.and_then(|i| self.rows[i].registered_id()) {
                    debug!(class_name = class, auto_id, registered_id, "detector proposal inherits binding");
                }
                index
            }
            (Some(auto_id), Some(registered_id)) => {
                let key = incoming.key();
                match self.position(&key)? {
                    Some(index) => Some(index),
                    None => {
                        let by_auto = self.match_unique(
                            |r| r.class_name() == class && r.auto_id() == Some(auto_id),
                            || format!("{class} auto id {auto_id}"),
                        )?;
                        let holder = self.match_unique(
                            |r| r.class_name() == class && r.registered_id() == Some(registered_id),
                            || format!("identity {class},{registered_id}"),
                        )?;
                        debug!(%key, "rebinding identity during ingestion");
                        let mut by_auto = by_auto;
                        if let Some(holder) = holder {
                            if self.release(holder).is_some() {
                                by_auto = by_auto.map(|i| if holder < i { i - 1 } else { i });
                            }
                        }
                        if let Some(index) = by_auto {
                            let bbox = &mut self.rows[index].bbox;
                            bbox.bind(registered_id, incoming.description().to_string());
                        }
                        by_auto
                    }
                }
            }
        };

        match index {
            Some(index) => {
                let row = &mut self.rows[index];
                row.bbox.set_rect(incoming.rect());
                row.live = true;
                row.tracker_lost = false;
                Ok(row.key())
            }
            None => {
                let row = TrackedRow::new(incoming);
                let key = row.key();
                debug!(%key, rect = ?row.rect(), "new row");
                self.rows.push(row);
                Ok(key)
            }
        }
    }

    /// Alternative-tracker refresh: touches geometry and liveness only.
    ///
    /// Rows under [`Authority::AlternativeTracker`] are moved, locked rows are
    /// kept alive in place and detector rows are left alone.
    pub fn update_coords_only(&mut self, key: &BoxKey, rect: Rect) -> Result<CoordsUpdate> {
        let index = self
            .position(key)?
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let row = &mut self.rows[index];
        let outcome = match row.bbox.authority {
            Authority::AlternativeTracker => {
                row.bbox.set_rect(rect);
                row.live = true;
                row.tracker_lost = false;
                CoordsUpdate::Moved
            }
            Authority::Locked => {
                row.live = true;
                CoordsUpdate::Held
            }
            Authority::Detector => CoordsUpdate::Rejected,
        };
        Ok(outcome)
    }

    /// Mark a row whose alternative tracker had to fall back to old coordinates.
    pub fn flag_tracker_loss(&mut self, key: &BoxKey) -> Result<()> {
        let index = self
            .position(key)?
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        self.rows[index].tracker_lost = true;
        Ok(())
    }

    /// Remove every row nobody touched since the previous sweep and return them.
    /// Survivors start the next frame as not live.
    pub fn sweep(&mut self) -> Vec<TrackedRow> {
        let (mut kept, gone): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.rows).into_iter().partition(|r| r.live);
        for row in &mut kept {
            row.live = false;
        }
        self.rows = kept;

        for row in &gone {
            match row.identity() {
                Some(identity) => {
                    info!(%identity, description = row.description(), "registered identity disappeared")
                }
                None => debug!(key = %row.key(), "row disappeared"),
            }
        }
        gone
    }

    /// Row of the same class with the highest IoU against `query`, skipping the
    /// row that has `query`'s own key. Below [`MIN_REASSOCIATION_IOU`] no
    /// candidate is returned.
    pub fn find_nearest_by_iou(&self, query: &BoundingBox, scope: SearchScope) -> NearestMatch {
        let own_key = query.key();
        let candidates: Vec<&TrackedRow> = self
            .rows
            .iter()
            .filter(|r| r.class_name() == query.class_name() && r.in_scope(scope) && !r.matches(&own_key))
            .collect();

        if candidates.is_empty() {
            return NearestMatch {
                iou: 0.0,
                candidate: None,
            };
        }

        let rects: Vec<Rect> = candidates.iter().map(|r| r.rect()).collect();
        let ious = iou_batch(&[query.rect()], &rects);

        let mut best = 0;
        let mut best_iou = ious[[0, 0]];
        for (j, &iou) in ious.row(0).iter().enumerate().skip(1) {
            if iou > best_iou {
                best = j;
                best_iou = iou;
            }
        }

        let candidate = (best_iou >= MIN_REASSOCIATION_IOU).then(|| candidates[best].clone());
        NearestMatch {
            iou: best_iou,
            candidate,
        }
    }

    /// One-to-one proposals binding vanished identities to unbound detector
    /// rows of the same class, solved as a linear assignment on IoU.
    pub fn propose_reassociations(&self, lost: &[TrackedRow]) -> Vec<Reassociation> {
        let mut classes: Vec<&str> = lost
            .iter()
            .filter(|r| r.registered_id().is_some())
            .map(|r| r.class_name())
            .collect();
        classes.sort_unstable();
        classes.dedup();

        let mut proposals = Vec::new();
        for class in classes {
            let lost_rows: Vec<&TrackedRow> = lost
                .iter()
                .filter(|r| r.class_name() == class && r.registered_id().is_some())
                .collect();
            let candidates: Vec<&TrackedRow> = self
                .rows
                .iter()
                .filter(|r| r.class_name() == class && r.auto_id().is_some() && r.registered_id().is_none())
                .collect();

            let lost_rects: Vec<Rect> = lost_rows.iter().map(|r| r.rect()).collect();
            let candidate_rects: Vec<Rect> = candidates.iter().map(|r| r.rect()).collect();
            let cost = iou_distance(&lost_rects, &candidate_rects);
            let assignment = linear_assignment(&cost, 1.0 - MIN_REASSOCIATION_IOU);

            for (i, j) in assignment.matches {
                let iou = lost_rects[i].iou(&candidate_rects[j]);
                if iou < MIN_REASSOCIATION_IOU {
                    continue;
                }
                if let Some(identity) = lost_rows[i].identity() {
                    proposals.push(Reassociation {
                        identity,
                        description: lost_rows[i].description().to_string(),
                        candidate: candidates[j].key(),
                        iou,
                    });
                }
            }
        }
        proposals
    }

    /// Bind the detector row `(class_name, auto_id)` to a registered identity.
    ///
    /// Whichever row held the identity before gives it up: a detector row is
    /// demoted to an unbound detector row, an alternatively tracked row is removed.
    /// A target already bound to a different identity is refused with
    /// [`Error::AlreadyBound`], so no identity is dropped silently.
    pub fn associate(
        &mut self,
        class_name: &str,
        auto_id: u32,
        description: &str,
        registered_id: u32,
    ) -> Result<BoxKey> {
        let mut target = self
            .match_unique(
                |r| r.class_name() == class_name && r.auto_id() == Some(auto_id),
                || format!("{class_name} auto id {auto_id}"),
            )?
            .ok_or_else(|| Error::NotFound(format!("{class_name} auto id {auto_id}")))?;
        if let Some(bound) = self.rows[target].registered_id().filter(|&r| r != registered_id) {
            return Err(Error::AlreadyBound {
                key: self.rows[target].key().to_string(),
                registered_id: bound,
            });
        }
        let holder = self.match_unique(
            |r| r.class_name() == class_name && r.registered_id() == Some(registered_id),
            || format!("identity {class_name},{registered_id}"),
        )?;

        if let Some(holder) = holder.filter(|&h| h != target) {
            debug!(key = %self.rows[holder].key(), "releasing identity from previous holder");
            if self.release(holder).is_some() && holder < target {
                target -= 1;
            }
        }

        let bbox = &mut self.rows[target].bbox;
        bbox.bind(registered_id, description.to_string());
        bbox.authority = Authority::Detector;
        info!(class_name, auto_id, registered_id, description, "identity associated");
        Ok(bbox.key())
    }

    /// Undo an association. A row with an auto id goes back to being an unbound
    /// detector row; a row without one is removed and returned.
    pub fn unregister_row(&mut self, key: &BoxKey) -> Result<Option<TrackedRow>> {
        let index = self
            .position(key)?
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(self.release(index))
    }

    /// Cancel every association. Returns the rows that had to be removed.
    pub fn unregister_all(&mut self) -> Vec<TrackedRow> {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.rows)
            .into_iter()
            .partition(|r| r.auto_id().is_some() || r.registered_id().is_none());
        self.rows = kept;
        for row in &mut self.rows {
            if row.registered_id().is_some() {
                row.bbox.unbind();
                row.bbox.authority = Authority::Detector;
            }
        }
        info!(removed = removed.len(), "all associations cancelled");
        removed
    }

    /// Operator delete.
    pub fn remove(&mut self, key: &BoxKey) -> Result<TrackedRow> {
        let index = self
            .position(key)?
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let row = self.rows.remove(index);
        debug!(%key, "row removed");
        Ok(row)
    }

    /// Forget every detector-driven row. Auto ids do not survive a detector
    /// reset, so bound detector rows go too; alternatively tracked rows stay.
    pub fn forget_detector_rows(&mut self) -> Vec<TrackedRow> {
        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.rows)
            .into_iter()
            .partition(|r| r.auto_id().is_none());
        self.rows = kept;
        removed
    }

    /// Freeze (`locked = true`) or release every alternatively tracked row.
    /// Returns the number of rows switched.
    pub fn set_alternative_authority(&mut self, locked: bool) -> usize {
        let authority = if locked {
            Authority::Locked
        } else {
            Authority::AlternativeTracker
        };
        let mut switched = 0;
        for row in &mut self.rows {
            if row.auto_id().is_none() && row.registered_id().is_some() && row.bbox.authority != authority {
                row.bbox.authority = authority;
                switched += 1;
            }
        }
        switched
    }

    /// Turn the unlabeled hand-drawn box into the registered identity
    /// `(class_name, description)`, tracked by the alternative tracker from now on.
    pub fn label_manual_box(&mut self, class_name: &str, description: &str) -> Result<BoxKey> {
        let registered_id = self
            .catalog
            .find(class_name, description)
            .ok_or_else(|| Error::NotFound(format!("identity {class_name} `{description}`")))?;
        let unlabeled = BoxKey::new(UNLABELED_CLASS, None, None);

        self.transact(|table| {
            let mut bbox = table.remove(&unlabeled)?.into_box();
            bbox.set_class_name(class_name.to_string());
            bbox.bind(registered_id, description.to_string());
            bbox.authority = Authority::AlternativeTracker;
            table.update(bbox)
        })
    }

    /// Set every row's display mode from a table-wide view. Identity and
    /// geometry are not touched.
    pub fn project(&mut self, view: ViewMode) {
        for row in &mut self.rows {
            let bbox = &mut row.bbox;
            let registered = bbox.registered_id().is_some();
            bbox.display_mode = match view {
                ViewMode::Full if registered => DisplayMode::Registered,
                ViewMode::Full => DisplayMode::Auto,
                ViewMode::AutoOnly if bbox.auto_id().is_some() => DisplayMode::Auto,
                ViewMode::AutoOnly => DisplayMode::Hidden,
                ViewMode::RegisteredOnly if registered => DisplayMode::Registered,
                ViewMode::RegisteredOnly => DisplayMode::Hidden,
            };
        }
    }

    /// Rows in drawing order: unregistered rows first, then registered rows,
    /// each group newest first.
    pub fn render_order(&self) -> Vec<&TrackedRow> {
        let unregistered = self.rows.iter().rev().filter(|r| r.registered_id().is_none());
        let registered = self.rows.iter().rev().filter(|r| r.registered_id().is_some());
        unregistered.chain(registered).collect()
    }

    /// Verify the uniqueness invariants.
    pub fn check_invariants(&self) -> Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            for other in &self.rows[i + 1..] {
                if row.class_name() != other.class_name() {
                    continue;
                }
                let same_auto = row.auto_id().is_some() && row.auto_id() == other.auto_id();
                let same_reg = row.registered_id().is_some() && row.registered_id() == other.registered_id();
                let same_unbound = row.auto_id().is_none()
                    && row.registered_id().is_none()
                    && other.auto_id().is_none()
                    && other.registered_id().is_none();
                if same_auto || same_reg || same_unbound {
                    return Err(Error::AmbiguousMatch {
                        key: row.key().to_string(),
                        count: 2,
                    });
                }
            }
        }
        Ok(())
    }

    fn position(&self, key: &BoxKey) -> Result<Option<usize>> {
        self.match_unique(|r| r.matches(key), || key.to_string())
    }

    /// Index of the single row satisfying `pred`. More than one match means the
    /// invariants were broken upstream and is reported, never resolved.
    fn match_unique(
        &self,
        pred: impl Fn(&TrackedRow) -> bool,
        describe: impl FnOnce() -> String,
    ) -> Result<Option<usize>> {
        let mut found = None;
        let mut count = 0;
        for (i, row) in self.rows.iter().enumerate() {
            if pred(row) {
                count += 1;
                found.get_or_insert(i);
            }
        }
        if count > 1 {
            let key = describe();
            warn!(%key, count, "ambiguous row match");
            return Err(Error::AmbiguousMatch { key, count });
        }
        Ok(found)
    }

    /// Append a row without any uniqueness check.
    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, bbox: BoundingBox) {
        self.rows.push(TrackedRow::new(bbox));
    }

    /// Free the identity held by row `index`. Returns the row if it had to be removed.
    fn release(&mut self, index: usize) -> Option<TrackedRow> {
        if self.rows[index].auto_id().is_some() {
            let bbox = &mut self.rows[index].bbox;
            bbox.unbind();
            bbox.authority = Authority::Detector;
            None
        } else {
            Some(self.rows.remove(index))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::rect::FrameSize;

    const FRAME: FrameSize = FrameSize {
        rows: 480,
        cols: 640,
    };

    fn detected(class: &str, auto_id: u32, rect: Rect) -> BoundingBox {
        BoundingBox::detected(rect, FRAME, class, auto_id)
    }

    fn alternative(class: &str, registered_id: u32, rect: Rect) -> BoundingBox {
        BoundingBox::new(rect, FRAME, class)
            .with_identity(registered_id, "")
            .with_authority(Authority::AlternativeTracker)
    }

    #[test]
    fn test_unbound_manual_box_is_updated_in_place() {
        let mut table = TrackedBoxTable::default();
        let manual = BoundingBox::new(Rect::new(10, 10, 20, 20), FRAME, UNLABELED_CLASS);
        table.update(manual.clone()).unwrap();

        let mut moved = manual;
        moved.set_rect(Rect::new(10, 10, 40, 50));
        table.update(moved).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].rect(), Rect::new(10, 10, 40, 50));
    }

    #[test]
    fn test_alternative_update_demotes_detector_holder() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 4, Rect::new(0, 0, 10, 10))).unwrap();
        table.associate("person", 4, "alice", 0).unwrap();

        table.update(alternative("person", 0, Rect::new(50, 50, 80, 90))).unwrap();

        let detector_row = table.get(&BoxKey::new("person", Some(4), None)).unwrap().unwrap();
        assert_eq!(detector_row.description(), "");
        assert_eq!(detector_row.bbox().display_mode, DisplayMode::Auto);

        let identity = IdentityKey::new("person", 0);
        let holder = table.row_for_identity(&identity).unwrap().unwrap();
        assert_eq!(holder.auto_id(), None);
        assert_eq!(holder.rect(), Rect::new(50, 50, 80, 90));
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_detector_redetection_keeps_binding() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.associate("person", 1, "alice", 0).unwrap();

        let key = table.update(detected("person", 1, Rect::new(2, 2, 12, 12))).unwrap();
        assert_eq!(key, BoxKey::new("person", Some(1), Some(0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].description(), "alice");
        assert_eq!(table.rows()[0].rect(), Rect::new(2, 2, 12, 12));
    }

    #[test]
    fn test_fully_bound_box_moves_identity() {
        let mut table = TrackedBoxTable::default();
        table.update(alternative("person", 0, Rect::new(0, 0, 10, 10))).unwrap();
        table.update(detected("person", 7, Rect::new(1, 1, 11, 11))).unwrap();

        let bound = detected("person", 7, Rect::new(1, 1, 12, 12)).with_identity(0, "alice");
        table.update(bound).unwrap();

        assert_eq!(table.len(), 1);
        let row = &table.rows()[0];
        assert_eq!(row.key(), BoxKey::new("person", Some(7), Some(0)));
        assert_eq!(row.description(), "alice");
        table.check_invariants().unwrap();
    }

    #[test]
    fn test_duplicate_rows_are_reported() {
        let mut table = TrackedBoxTable::default();
        let row = TrackedRow::new(detected("person", 1, Rect::new(0, 0, 10, 10)));
        table.rows.push(row.clone());
        table.rows.push(row);

        let before = table.rows.clone();
        let err = table.update(detected("person", 1, Rect::new(5, 5, 9, 9))).unwrap_err();
        assert!(matches!(err, Error::AmbiguousMatch { count: 2, .. }));
        assert_eq!(table.rows, before);
    }

    #[test]
    fn test_update_all_is_atomic() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.rows.push(TrackedRow::new(detected("car", 2, Rect::new(0, 0, 5, 5))));
        table.rows.push(TrackedRow::new(detected("car", 2, Rect::new(0, 0, 5, 5))));
        let before = table.rows.clone();

        let batch = vec![
            detected("person", 1, Rect::new(100, 100, 200, 200)),
            detected("car", 2, Rect::new(1, 1, 6, 6)),
        ];
        assert!(table.update_all(batch).is_err());
        assert_eq!(table.rows, before);
    }

    #[test]
    fn test_coords_only_respects_authority() {
        let mut table = TrackedBoxTable::default();
        let alt = table.update(alternative("person", 0, Rect::new(0, 0, 10, 10))).unwrap();
        let det = table.update(detected("person", 3, Rect::new(20, 20, 30, 30))).unwrap();
        table.sweep();

        let moved = table.update_coords_only(&alt, Rect::new(5, 5, 15, 15)).unwrap();
        assert_eq!(moved, CoordsUpdate::Moved);
        let rejected = table.update_coords_only(&det, Rect::new(0, 0, 1, 1)).unwrap();
        assert_eq!(rejected, CoordsUpdate::Rejected);

        table.set_alternative_authority(true);
        let held = table.update_coords_only(&alt, Rect::new(90, 90, 99, 99)).unwrap();
        assert_eq!(held, CoordsUpdate::Held);

        let row = table.get(&alt).unwrap().unwrap();
        assert_eq!(row.rect(), Rect::new(5, 5, 15, 15));
        assert!(row.is_live());
        assert!(!table.get(&det).unwrap().unwrap().is_live());

        let missing = BoxKey::new("person", None, Some(9));
        assert!(matches!(
            table.update_coords_only(&missing, Rect::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_associate_missing_row_does_not_mutate() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.associate("person", 1, "alice", 0).unwrap();

        let err = table.associate("person", 2, "alice", 0).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(table.rows()[0].registered_id(), Some(0));
    }

    #[test]
    fn test_associate_refuses_row_bound_to_other_identity() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.associate("person", 1, "alice", 0).unwrap();
        let before = table.rows.clone();

        let err = table.associate("person", 1, "bob", 1).unwrap_err();
        assert!(matches!(err, Error::AlreadyBound { registered_id: 0, .. }));
        assert_eq!(table.rows, before);

        // rebinding the same identity is not a conflict
        let key = table.associate("person", 1, "alice", 0).unwrap();
        assert_eq!(key, BoxKey::new("person", Some(1), Some(0)));
    }

    #[test]
    fn test_unbound_auto_scope() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.update(detected("person", 2, Rect::new(1, 1, 11, 11))).unwrap();
        table.associate("person", 1, "alice", 0).unwrap();

        let query = BoundingBox::new(Rect::new(0, 0, 10, 10), FRAME, "person");
        let any = table.find_nearest_by_iou(&query, SearchScope::AutoOnly);
        assert_eq!(any.candidate.unwrap().auto_id(), Some(1));
        let free = table.find_nearest_by_iou(&query, SearchScope::UnboundAuto);
        assert_eq!(free.candidate.unwrap().auto_id(), Some(2));

        // a detector row bound to an identity counts as registered
        let bound = table.find_nearest_by_iou(&query, SearchScope::AlternativeOnly);
        assert_eq!(bound.candidate.unwrap().registered_id(), Some(0));
        let free_query = BoundingBox::new(Rect::new(1, 1, 11, 11), FRAME, "person");
        let bound = table.find_nearest_by_iou(&free_query, SearchScope::AlternativeOnly);
        assert_eq!(bound.candidate.unwrap().auto_id(), Some(1));
    }

    #[test]
    fn test_associate_removes_alternative_holder() {
        let mut table = TrackedBoxTable::default();
        table.update(alternative("person", 0, Rect::new(0, 0, 10, 10))).unwrap();
        table.update(detected("person", 5, Rect::new(1, 1, 10, 10))).unwrap();

        table.associate("person", 5, "alice", 0).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].key(), BoxKey::new("person", Some(5), Some(0)));
    }

    #[test]
    fn test_unregister_row() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        let bound = table.associate("person", 1, "alice", 0).unwrap();
        let alt = table.update(alternative("person", 1, Rect::new(50, 50, 60, 60))).unwrap();

        assert!(table.unregister_row(&bound).unwrap().is_none());
        assert_eq!(table.rows()[0].key(), BoxKey::new("person", Some(1), None));

        let removed = table.unregister_row(&alt).unwrap().unwrap();
        assert_eq!(removed.key(), alt);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_project() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.update(detected("person", 2, Rect::new(20, 20, 30, 30))).unwrap();
        table.associate("person", 2, "bob", 0).unwrap();
        table.update(alternative("person", 1, Rect::new(50, 50, 60, 60))).unwrap();

        let modes = |t: &TrackedBoxTable| t.rows().iter().map(|r| r.bbox().display_mode).collect::<Vec<_>>();

        table.project(ViewMode::AutoOnly);
        assert_eq!(modes(&table), vec![DisplayMode::Auto, DisplayMode::Auto, DisplayMode::Hidden]);

        table.project(ViewMode::RegisteredOnly);
        assert_eq!(
            modes(&table),
            vec![DisplayMode::Hidden, DisplayMode::Registered, DisplayMode::Registered]
        );

        table.project(ViewMode::Full);
        assert_eq!(
            modes(&table),
            vec![DisplayMode::Auto, DisplayMode::Registered, DisplayMode::Registered]
        );
    }

    #[test]
    fn test_render_order() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.update(detected("person", 2, Rect::new(0, 0, 10, 10))).unwrap();
        table.update(detected("person", 3, Rect::new(0, 0, 10, 10))).unwrap();
        table.associate("person", 1, "alice", 0).unwrap();

        let order: Vec<Option<u32>> = table.render_order().iter().map(|r| r.auto_id()).collect();
        assert_eq!(order, vec![Some(3), Some(2), Some(1)]);
    }

    #[test]
    fn test_label_manual_box() {
        let mut catalog = IdentityCatalog::new();
        catalog.register("person", "alice").unwrap();
        let mut table = TrackedBoxTable::new(catalog);
        table
            .update(BoundingBox::new(Rect::new(10, 10, 40, 40), FRAME, UNLABELED_CLASS))
            .unwrap();

        let key = table.label_manual_box("person", "alice").unwrap();
        assert_eq!(key, BoxKey::new("person", None, Some(0)));
        let row = table.get(&key).unwrap().unwrap();
        assert_eq!(row.bbox().authority, Authority::AlternativeTracker);
        assert_eq!(row.bbox().display_mode, DisplayMode::Registered);

        // unknown identity leaves the table untouched
        table
            .update(BoundingBox::new(Rect::new(1, 1, 4, 4), FRAME, UNLABELED_CLASS))
            .unwrap();
        assert!(table.label_manual_box("person", "nobody").is_err());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_unregister_all_and_forget_detector_rows() {
        let mut table = TrackedBoxTable::default();
        table.update(detected("person", 1, Rect::new(0, 0, 10, 10))).unwrap();
        table.associate("person", 1, "alice", 0).unwrap();
        table.update(alternative("person", 1, Rect::new(50, 50, 60, 60))).unwrap();

        let mut other = table.clone();

        let removed = table.unregister_all();
        assert_eq!(removed.len(), 1);
        assert_eq!(table.registered_rows().count(), 0);

        let forgotten = other.forget_detector_rows();
        assert_eq!(forgotten.len(), 1);
        assert_eq!(other.alternative_rows().count(), 1);
    }
}
