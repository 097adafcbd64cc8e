//! Per-frame label files.
//!
//! Each frame gets `{frame_index:06}.json`, a JSON object mapping
//! `"{class_name},{registered_id}"` to `[x0, y0, x1, y1]`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;
use crate::tracker::TrackedRow;

pub type FrameLabels = BTreeMap<String, [i32; 4]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelStore {
    dir: PathBuf,
}

impl LabelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frame_path(&self, frame_index: u64) -> PathBuf {
        self.dir.join(format!("{frame_index:06}.json"))
    }

    /// Labels stored for a frame; empty when the frame has no file yet.
    pub fn read_frame(&self, frame_index: u64) -> Result<FrameLabels> {
        let path = self.frame_path(frame_index);
        if !path.is_file() {
            return Ok(FrameLabels::new());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Write the registered rows among `rows` into the frame's file. Keys
    /// already in the file and absent from `rows` are kept.
    ///
    /// Returns the number of labels written this time.
    pub fn write_frame<'a>(&self, frame_index: u64, rows: impl IntoIterator<Item = &'a TrackedRow>) -> Result<usize> {
        let mut labels = self.read_frame(frame_index)?;
        let mut written = 0;
        for row in rows {
            if let Some(identity) = row.identity() {
                labels.insert(identity.to_string(), row.rect().to_xyxy());
                written += 1;
            }
        }

        fs::create_dir_all(&self.dir)?;
        fs::write(self.frame_path(frame_index), serde_json::to_string(&labels)?)?;
        debug!(frame_index, written, total = labels.len(), "labels written");
        Ok(written)
    }

    /// Index of the first labelled frame containing `class_name`.
    pub fn first_appearance(&self, class_name: &str) -> Result<Option<u64>> {
        if !self.dir.is_dir() {
            return Ok(None);
        }

        let mut frames: Vec<u64> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_suffix(".json")?.parse().ok()
            })
            .collect();
        frames.sort_unstable();

        for frame_index in frames {
            let labels = self.read_frame(frame_index)?;
            let found = labels
                .keys()
                .filter_map(|key| key.rsplit_once(','))
                .any(|(class, _)| class == class_name);
            if found {
                return Ok(Some(frame_index));
            }
        }
        Ok(None)
    }
}
