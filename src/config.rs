//! Session configuration and logging setup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::tracker::CORNER_HIT_RADIUS;

/// Per-session settings, read from a TOML file.
///
/// ```toml
/// classes = ["person", "car"]
/// labels_dir = "labels"
/// catalog_path = "identities.json"
/// alternative_tracking = true
/// log_filter = "boxrecon=debug"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Detector classes kept by the session; empty keeps every class
    pub classes: Vec<String>,
    /// Directory holding the per-frame label files
    pub labels_dir: PathBuf,
    /// JSON file holding the identity catalog
    pub catalog_path: PathBuf,
    /// Pointer distance, in pixels, within which a corner is grabbed
    pub corner_radius: f64,
    /// Whether the alternative tracker may move registered boxes. When false,
    /// alternatively tracked rows are locked in place.
    pub alternative_tracking: bool,
    /// Fallback `tracing` filter when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            classes: Vec::new(),
            labels_dir: PathBuf::from("labels"),
            catalog_path: PathBuf::from("identities.json"),
            corner_radius: CORNER_HIT_RADIUS,
            alternative_tracking: true,
            log_filter: "info".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Install the fmt subscriber with `log_filter` as the fallback filter.
    pub fn init_logging(&self) -> Result<()> {
        init_logging(&self.log_filter)
    }

    /// True when detections of `class_name` should be ingested.
    pub fn accepts_class(&self, class_name: &str) -> bool {
        self.classes.is_empty() || self.classes.iter().any(|c| c == class_name)
    }
}

/// Install a `tracing` fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| Error::Logging(e.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}
