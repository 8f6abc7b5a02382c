//! Configuration loading for the label-generator service
//!
//! Resolution follows the priority order:
//! 1. Command-line argument (highest priority)
//! 2. `CMOLABEL_CONFIG` environment variable
//! 3. Compiled defaults (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Logical topic names the service consumes and produces
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TopicConfig {
    /// Inbound new-request topic
    pub new_request_in: String,
    /// Inbound promoted-request topic
    pub promoted_request_in: String,
    /// Inbound single-sample label-update topic
    pub sample_update_in: String,
    /// Outbound new-request topic (labels filled in)
    pub new_request_out: String,
    /// Outbound promoted-request topic (labels filled in)
    pub promoted_request_out: String,
    /// Outbound single-sample topic (resolved label)
    pub sample_update_out: String,
    /// Request-reply subject for single-sample label previews
    pub label_request: String,
    /// Request-reply subject for patient sample lookups
    pub patient_samples_request: String,
    /// Request-reply subject for alt-id sample lookups
    pub alt_id_samples_request: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            new_request_in: "lims.request.new".to_string(),
            promoted_request_in: "lims.request.promoted".to_string(),
            sample_update_in: "lims.sample.update".to_string(),
            new_request_out: "cmolabel.request.new".to_string(),
            promoted_request_out: "cmolabel.request.promoted".to_string(),
            sample_update_out: "cmolabel.sample.update".to_string(),
            label_request: "cmolabel.label.request".to_string(),
            patient_samples_request: "samplestore.patient_samples".to_string(),
            alt_id_samples_request: "samplestore.alt_id_samples".to_string(),
        }
    }
}

/// Worker pool sizing per processing stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Workers for the new-request stage
    pub new_request: usize,
    /// Workers for the promoted-request stage
    pub promoted_request: usize,
    /// Workers for the sample-label-update stage
    pub sample_update: usize,
    /// Workers for the outbound publication stage
    pub publisher: usize,
    /// Workers for the request-reply responder
    pub responder: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            new_request: 3,
            promoted_request: 3,
            sample_update: 2,
            publisher: 2,
            responder: 2,
        }
    }
}

/// Service configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Topic names
    pub topics: TopicConfig,
    /// Worker counts per stage
    pub workers: WorkerConfig,
    /// Bounded queue capacity per stage
    pub queue_capacity: usize,
    /// Worker queue poll timeout in milliseconds
    pub poll_interval_ms: u64,
    /// Request-reply timeout in milliseconds (sample store and previews)
    pub request_timeout_ms: u64,
    /// Audit log file path
    pub audit_log_path: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            topics: TopicConfig::default(),
            workers: WorkerConfig::default(),
            queue_capacity: 64,
            poll_interval_ms: 100,
            request_timeout_ms: 5000,
            audit_log_path: PathBuf::from("cmolabel-audit.log"),
        }
    }
}

impl ServiceConfig {
    /// Load configuration following the resolution priority order
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            info!("Loading configuration from {}", path.display());
            return Self::from_file(path);
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var("CMOLABEL_CONFIG") {
            info!("Loading configuration from CMOLABEL_CONFIG={}", path);
            return Self::from_file(Path::new(&path));
        }

        // Priority 3: Compiled defaults
        info!("No configuration file specified, using defaults");
        Ok(Self::default())
    }

    /// Parse configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Write configuration to a TOML file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configured values
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be non-zero".to_string()));
        }
        let pools = [
            ("new_request", self.workers.new_request),
            ("promoted_request", self.workers.promoted_request),
            ("sample_update", self.workers.sample_update),
            ("publisher", self.workers.publisher),
            ("responder", self.workers.responder),
        ];
        for (name, count) in pools {
            if count == 0 {
                return Err(Error::Config(format!("workers.{} must be non-zero", name)));
            }
        }
        Ok(())
    }
}
