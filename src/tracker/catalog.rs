//! Durable list of operator-registered identities.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// One registered identity, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub sequence_no: u32,
    pub class_name: String,
    #[serde(default)]
    pub description: String,
}

/// Registered identities, kept sorted by `(class_name, sequence_no)`.
///
/// Sequence numbers are dense per class while nothing is deleted. After a
/// deletion a number is not handed out again until [`IdentityCatalog::renumber`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityCatalog {
    records: Vec<IdentityRecord>,
    next_sequence: HashMap<String, u32>,
}

impl IdentityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<IdentityRecord>) -> Self {
        let mut catalog = Self {
            records,
            next_sequence: HashMap::new(),
        };
        catalog.sort();
        for record in &catalog.records {
            let next = catalog
                .next_sequence
                .entry(record.class_name.clone())
                .or_insert(0);
            *next = (*next).max(record.sequence_no + 1);
        }
        catalog
    }

    /// Read a catalog from a JSON file. A missing file yields an empty
    /// catalog, which is written out immediately.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            info!(path = %path.display(), "identity catalog not found, creating an empty one");
            let catalog = Self::new();
            catalog.save(path)?;
            return Ok(catalog);
        }
        let text = fs::read_to_string(path)?;
        let records: Vec<IdentityRecord> = serde_json::from_str(&text)?;
        debug!(path = %path.display(), count = records.len(), "identity catalog loaded");
        Ok(Self::from_records(records))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.records)?)?;
        Ok(())
    }

    /// Register a new identity and return its sequence number.
    ///
    /// A non-empty description must be unique across all classes.
    pub fn register(&mut self, class_name: &str, description: &str) -> Result<u32> {
        if !description.is_empty() && self.records.iter().any(|r| r.description == description) {
            return Err(Error::IdentityCollision {
                class_name: class_name.to_string(),
                description: description.to_string(),
            });
        }

        let count = self
            .records
            .iter()
            .filter(|r| r.class_name == class_name)
            .count() as u32;
        let next = self.next_sequence.entry(class_name.to_string()).or_insert(0);
        let sequence_no = count.max(*next);
        *next = sequence_no + 1;

        self.records.push(IdentityRecord {
            sequence_no,
            class_name: class_name.to_string(),
            description: description.to_string(),
        });
        self.sort();

        info!(class_name, description, sequence_no, "identity registered");
        Ok(sequence_no)
    }

    pub fn unregister(&mut self, class_name: &str, sequence_no: u32, description: &str) -> Result<IdentityRecord> {
        let position = self
            .records
            .iter()
            .position(|r| {
                r.class_name == class_name
                    && r.sequence_no == sequence_no
                    && r.description == description
            })
            .ok_or_else(|| {
                Error::NotFound(format!("identity {class_name},{sequence_no} `{description}`"))
            })?;
        let record = self.records.remove(position);
        info!(class_name, sequence_no, "identity unregistered");
        Ok(record)
    }

    pub fn find(&self, class_name: &str, description: &str) -> Option<u32> {
        self.records
            .iter()
            .find(|r| r.class_name == class_name && r.description == description)
            .map(|r| r.sequence_no)
    }

    /// Reassign dense sequence numbers per class, keeping the current order.
    /// Returns `(class_name, old, new)` for every record whose number changed.
    pub fn renumber(&mut self) -> Vec<(String, u32, u32)> {
        let mut changed = Vec::new();
        let mut counters: HashMap<String, u32> = HashMap::new();
        for record in &mut self.records {
            let counter = counters.entry(record.class_name.clone()).or_insert(0);
            if record.sequence_no != *counter {
                changed.push((record.class_name.clone(), record.sequence_no, *counter));
                record.sequence_no = *counter;
            }
            *counter += 1;
        }
        self.next_sequence = counters;
        changed
    }

    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn sort(&mut self) {
        self.records.sort_by(|a, b| {
            a.class_name
                .cmp(&b.class_name)
                .then(a.sequence_no.cmp(&b.sequence_no))
        });
    }
}
