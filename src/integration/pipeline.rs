//! Session: one detector, one tracker registry and one table, driven frame by frame.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::alternative::{AlternativeTracker, TrackStep, TrackerRegistry};
use super::editor::{BoxEditor, EditOutcome, PointerEvent};
use super::labels::LabelStore;
use super::recovery::RecoveryPolicy;
use super::snapshot::FrameSnapshot;
use super::{Detection, DetectionSource};
use crate::config::SessionConfig;
use crate::error::Error;
use crate::tracker::{
    Authority, BoxKey, FrameSize, IdentityCatalog, IdentityKey, Rect, SearchScope, TrackedBoxTable, TrackedRow,
};

#[derive(Debug, Error)]
pub enum PipelineError<E> {
    /// The detector failed; the table is unchanged.
    #[error("detector failed: {0}")]
    Detector(E),

    #[error(transparent)]
    Engine(#[from] Error),
}

/// Something the operator should look at.
#[derive(Debug, Clone, PartialEq)]
pub enum Escalation {
    /// The alternative tracker lost the box and it stays at `fallback`.
    TrackerLoss { key: BoxKey, fallback: Rect },
}

/// What happened during one [`Session::process_frame`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Detector boxes ingested (after class filtering)
    pub ingested: usize,
    /// Rows dropped by the liveness sweep
    pub disappeared: Vec<TrackedRow>,
    /// Rows that took over a disappeared identity
    pub reassociated: Vec<BoxKey>,
    /// Disappeared identities handed to the alternative tracker
    pub alternative: Vec<BoxKey>,
    /// Disappeared identities the operator let go
    pub lost: Vec<IdentityKey>,
    pub escalations: Vec<Escalation>,
}

/// Drives a [`TrackedBoxTable`] frame by frame.
///
/// Each frame runs, in order: detector ingestion (all or nothing), the
/// liveness sweep, recovery offers for every disappeared registered row, and
/// the alternative tracker step. A [`FrameSnapshot`] is published at the end
/// of every frame and after every operator edit.
pub struct Session<D: DetectionSource, T: AlternativeTracker> {
    detector: D,
    trackers: TrackerRegistry<T>,
    table: TrackedBoxTable,
    editor: BoxEditor,
    labels: LabelStore,
    config: SessionConfig,
    frame: FrameSize,
    next_frame: u64,
    previous_input: Option<Vec<u8>>,
    snapshots: Option<Sender<FrameSnapshot>>,
}

impl<D: DetectionSource, T: AlternativeTracker> Session<D, T> {
    pub fn new(detector: D, trackers: TrackerRegistry<T>, mut table: TrackedBoxTable, config: SessionConfig) -> Self {
        if !config.alternative_tracking {
            table.set_alternative_authority(true);
        }
        Self {
            detector,
            trackers,
            table,
            editor: BoxEditor::new(config.corner_radius),
            labels: LabelStore::new(config.labels_dir.clone()),
            config,
            frame: FrameSize::default(),
            next_frame: 0,
            previous_input: None,
            snapshots: None,
        }
    }

    /// Build a session whose catalog is read from `config.catalog_path`.
    pub fn from_config(detector: D, trackers: TrackerRegistry<T>, config: SessionConfig) -> Result<Self, Error> {
        let catalog = IdentityCatalog::load(&config.catalog_path)?;
        info!(
            identities = catalog.len(),
            labels_dir = %config.labels_dir.display(),
            "session configured"
        );
        Ok(Self::new(detector, trackers, TrackedBoxTable::new(catalog), config))
    }

    pub fn table(&self) -> &TrackedBoxTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut TrackedBoxTable {
        &mut self.table
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    pub fn trackers(&self) -> &TrackerRegistry<T> {
        &self.trackers
    }

    pub fn label_store(&self) -> &LabelStore {
        &self.labels
    }

    /// Index the next processed frame will get.
    pub fn next_frame(&self) -> u64 {
        self.next_frame
    }

    /// Index of the most recently processed frame.
    pub fn current_frame(&self) -> Option<u64> {
        self.next_frame.checked_sub(1)
    }

    /// Jump to another position in the video. Alternative trackers are
    /// restarted since the previous frame is no longer adjacent.
    pub fn seek(&mut self, frame_index: u64) {
        self.next_frame = frame_index;
        self.previous_input = None;
        self.trackers.clear();
        debug!(frame_index, "seek");
    }

    /// Receive a [`FrameSnapshot`] after every frame and every edit. A new
    /// subscription replaces the previous one.
    pub fn subscribe(&mut self) -> Receiver<FrameSnapshot> {
        let (tx, rx) = mpsc::channel();
        self.snapshots = Some(tx);
        rx
    }

    /// Allow or forbid the alternative tracker to move registered boxes.
    pub fn set_alternative_tracking(&mut self, enabled: bool) {
        self.config.alternative_tracking = enabled;
        let switched = self.table.set_alternative_authority(!enabled);
        info!(enabled, switched, "alternative tracking switched");
    }

    /// Restart the detector. Its auto ids are meaningless afterwards, so every
    /// detector row is forgotten; alternatively tracked rows stay.
    pub fn reset_detector(&mut self) -> Vec<TrackedRow> {
        self.detector.reset();
        let forgotten = self.table.forget_detector_rows();
        info!(forgotten = forgotten.len(), "detector reset");
        self.publish();
        forgotten
    }

    /// Process one frame. On error the table is left as it was after the
    /// previous frame and the alternative trackers restart from it.
    pub fn process_frame(
        &mut self,
        input: &[u8],
        frame: FrameSize,
        policy: &mut impl RecoveryPolicy,
    ) -> Result<FrameReport, PipelineError<D::Error>> {
        let checkpoint = self.table.clone();
        let report = self.advance(input, frame, policy);
        if report.is_err() {
            warn!(frame_index = self.next_frame, "frame failed, table rolled back");
            self.table = checkpoint;
            self.trackers.clear();
        }
        report
    }

    fn advance(
        &mut self,
        input: &[u8],
        frame: FrameSize,
        policy: &mut impl RecoveryPolicy,
    ) -> Result<FrameReport, PipelineError<D::Error>> {
        let frame_index = self.next_frame;
        let detections = self
            .detector
            .detect(input, frame)
            .map_err(PipelineError::Detector)?;

        let boxes: Vec<_> = detections
            .into_iter()
            .filter(|d| self.config.accepts_class(&d.class_name))
            .map(|d: Detection| d.into_box(frame))
            .collect();
        let ingested = boxes.len();
        self.table.update_all(boxes)?;

        let disappeared = self.table.sweep();
        let mut report = FrameReport {
            frame_index,
            ingested,
            ..FrameReport::default()
        };
        self.recover(&disappeared, frame, policy, &mut report)?;
        report.disappeared = disappeared;

        let previous_input = self.previous_input.clone().unwrap_or_else(|| input.to_vec());
        self.step_alternative(&previous_input, input, frame, &mut report)?;

        self.previous_input = Some(input.to_vec());
        self.frame = frame;
        self.next_frame = frame_index + 1;
        self.publish();

        debug!(
            frame_index,
            ingested,
            rows = self.table.len(),
            disappeared = report.disappeared.len(),
            "frame processed"
        );
        Ok(report)
    }

    /// Route an operator pointer event into the table. There is nothing to
    /// edit before the first frame.
    pub fn pointer(&mut self, event: PointerEvent) -> Result<EditOutcome, Error> {
        if self.current_frame().is_none() {
            return Err(Error::NotFound("no frame processed yet".to_string()));
        }
        let outcome = self.editor.handle(&mut self.table, self.frame, event)?;
        if outcome != EditOutcome::Ignored {
            self.publish();
        }
        Ok(outcome)
    }

    /// Turn the hand-drawn box into the registered identity
    /// `(class_name, description)`.
    pub fn label_manual_box(&mut self, class_name: &str, description: &str) -> Result<BoxKey, Error> {
        let key = self.table.label_manual_box(class_name, description)?;
        if !self.config.alternative_tracking {
            self.table.set_alternative_authority(true);
        }
        self.publish();
        Ok(key)
    }

    /// Export the registered rows of the most recent frame into `labels_dir`.
    pub fn save_labels(&self) -> Result<usize, Error> {
        let frame_index = self
            .current_frame()
            .ok_or_else(|| Error::NotFound("no frame processed yet".to_string()))?;
        self.labels.write_frame(frame_index, self.table.registered_rows())
    }

    /// Write the identity catalog back to `catalog_path`.
    pub fn save_catalog(&self) -> Result<(), Error> {
        self.table.catalog().save(&self.config.catalog_path)
    }

    fn recover(
        &mut self,
        disappeared: &[TrackedRow],
        frame: FrameSize,
        policy: &mut impl RecoveryPolicy,
        report: &mut FrameReport,
    ) -> Result<(), Error> {
        let proposals: HashMap<IdentityKey, BoxKey> = self
            .table
            .propose_reassociations(disappeared)
            .into_iter()
            .map(|p| (p.identity, p.candidate))
            .collect();

        for lost in disappeared {
            let Some(identity) = lost.identity() else {
                continue;
            };

            let candidate = match proposals.get(&identity) {
                Some(key) => self
                    .table
                    .get(key)?
                    .filter(|row| row.registered_id().is_none())
                    .map(|row| (row.clone(), row.rect().iou(&lost.rect()))),
                None => None,
            }
            .or_else(|| {
                // a bound row would lose its identity to this one
                let nearest = self.table.find_nearest_by_iou(lost.bbox(), SearchScope::UnboundAuto);
                nearest
                    .candidate
                    .filter(|row| row.registered_id().is_none())
                    .map(|row| (row, nearest.iou))
            });

            if let Some((candidate, iou)) = candidate {
                if let Some(auto_id) = candidate.auto_id() {
                    if policy.offer_reassociation(lost, &candidate, iou) {
                        let key = self.table.associate(
                            &identity.class_name,
                            auto_id,
                            lost.description(),
                            identity.registered_id,
                        )?;
                        info!(%identity, %key, iou, "identity reassociated");
                        report.reassociated.push(key);
                        continue;
                    }
                }
            }

            if policy.offer_alternative_tracking(lost) {
                let authority = if self.config.alternative_tracking {
                    Authority::AlternativeTracker
                } else {
                    Authority::Locked
                };
                let mut bbox = lost.bbox().clone().with_authority(authority);
                bbox.clear_auto_id();
                let key = self.table.update(bbox)?;
                self.trackers.stop(&identity);
                info!(%identity, %key, "identity handed to the alternative tracker");
                report.alternative.push(key);
                continue;
            }

            warn!(%identity, description = lost.description(), frame = ?frame, "identity lost");
            report.lost.push(identity);
        }
        Ok(())
    }

    fn step_alternative(
        &mut self,
        previous_input: &[u8],
        input: &[u8],
        frame: FrameSize,
        report: &mut FrameReport,
    ) -> Result<(), Error> {
        let rows: Vec<(BoxKey, IdentityKey, Rect, Authority)> = self
            .table
            .alternative_rows()
            .filter_map(|row| Some((row.key(), row.identity()?, row.rect(), row.bbox().authority)))
            .collect();

        for (key, identity, rect, authority) in &rows {
            match authority {
                Authority::Locked => {
                    self.table.update_coords_only(key, *rect)?;
                }
                Authority::AlternativeTracker => {
                    match self.trackers.step(identity, previous_input, input, frame, *rect) {
                        TrackStep::Tracked(tracked) => {
                            self.table.update_coords_only(key, tracked)?;
                        }
                        TrackStep::Lost { fallback } => {
                            self.table.update_coords_only(key, fallback)?;
                            self.table.flag_tracker_loss(key)?;
                            report.escalations.push(Escalation::TrackerLoss {
                                key: key.clone(),
                                fallback,
                            });
                        }
                    }
                }
                Authority::Detector => {}
            }
        }

        self.trackers.retain(|identity| {
            rows.iter()
                .any(|(_, id, _, authority)| id == identity && *authority == Authority::AlternativeTracker)
        });
        Ok(())
    }

    fn publish(&mut self) {
        let Some(tx) = self.snapshots.as_ref() else {
            return;
        };
        let snapshot = FrameSnapshot::capture(self.current_frame().unwrap_or_default(), &self.table);
        if tx.send(snapshot).is_err() {
            debug!("snapshot receiver dropped");
            self.snapshots = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::DeclineAll;
    use crate::tracker::BoundingBox;

    struct MockDetector {
        detections: Vec<Detection>,
    }

    impl DetectionSource for MockDetector {
        type Error = std::convert::Infallible;

        fn detect(&mut self, _input: &[u8], _frame: FrameSize) -> Result<Vec<Detection>, Self::Error> {
            Ok(self.detections.clone())
        }
    }

    struct StillTracker;

    impl AlternativeTracker for StillTracker {
        type Error = String;

        fn init(&mut self, _input: &[u8], _frame: FrameSize, _xywh: [i32; 4]) -> Result<(), String> {
            Ok(())
        }

        fn update(&mut self, _input: &[u8], _frame: FrameSize) -> Option<[i32; 4]> {
            None
        }
    }

    fn person(registered_id: u32, rect: Rect) -> BoundingBox {
        BoundingBox::new(rect, FrameSize::new(480, 640), "person")
            .with_identity(registered_id, "")
            .with_authority(Authority::AlternativeTracker)
    }

    #[test]
    fn test_failed_frame_restores_table_and_input() {
        let detector = MockDetector { detections: vec![] };
        let mut session = Session::new(
            detector,
            TrackerRegistry::new(|| StillTracker),
            TrackedBoxTable::default(),
            SessionConfig::default(),
        );
        let frame = FrameSize::new(480, 640);
        session.process_frame(&[1, 2, 3], frame, &mut DeclineAll).unwrap();

        session.table_mut().update(person(0, Rect::new(0, 0, 40, 40))).unwrap();
        session.process_frame(&[1, 2, 3], frame, &mut DeclineAll).unwrap();
        assert!(!session.trackers().is_empty());

        // a duplicated identity makes the alternative step fail halfway
        session.table_mut().push_unchecked(person(1, Rect::new(100, 100, 140, 140)));
        session.table_mut().push_unchecked(person(1, Rect::new(200, 200, 240, 240)));
        let before = session.table().rows().to_vec();

        let err = session.process_frame(&[4, 5, 6], frame, &mut DeclineAll).unwrap_err();
        assert!(matches!(err, PipelineError::Engine(Error::AmbiguousMatch { .. })));
        assert_eq!(session.table().rows(), before.as_slice());
        assert!(session.trackers().is_empty());
        assert_eq!(session.previous_input.as_deref(), Some(&[1u8, 2, 3][..]));
        assert_eq!(session.next_frame(), 2);
    }

    #[test]
    fn test_session_pipeline() {
        let detector = MockDetector {
            detections: vec![
                Detection::new("person", 0, Rect::new(100, 100, 200, 200)),
                Detection::new("dog", 1, Rect::new(10, 10, 50, 50)),
            ],
        };
        let config = SessionConfig {
            classes: vec!["person".to_string()],
            ..SessionConfig::default()
        };
        let mut session = Session::new(
            detector,
            TrackerRegistry::new(|| StillTracker),
            TrackedBoxTable::default(),
            config,
        );
        let rx = session.subscribe();

        let report = session
            .process_frame(&[], FrameSize::new(480, 640), &mut DeclineAll)
            .unwrap();
        assert_eq!(report.frame_index, 0);
        assert_eq!(report.ingested, 1);
        assert_eq!(session.table().len(), 1);
        assert_eq!(session.current_frame(), Some(0));

        let snapshot = rx.try_recv().unwrap();
        assert_eq!(snapshot.boxes.len(), 1);
        // padded by 2.5% of 480
        assert_eq!(snapshot.boxes[0].rect, Rect::new(88, 88, 212, 212));
    }
}
