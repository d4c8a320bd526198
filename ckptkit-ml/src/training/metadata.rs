//! Lightweight records kept next to the checkpoint files.
//!
//! Two files live in the checkpoint directory:
//! - a JSON-lines metadata log, one [`MetadataRecord`] appended per save and
//!   never rewritten, so tooling can walk the training history without
//!   loading any weights;
//! - a JSON index of the checkpoints still on disk, in save order.

use chrono::{DateTime, Utc};
use ckptkit_core::persistence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CheckpointError, CheckpointResult};
use crate::training::checkpoint::Metrics;

/// Summary of one saved checkpoint.
///
/// `epoch`, `metrics` and `path` are the stable fields external readers rely on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub epoch: u64,
    pub metrics: Metrics,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub model_name: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size_bytes: u64,
}

/// One retained checkpoint in the on-disk index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub model_name: String,
    pub epoch: u64,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn append_record(log_path: &Path, record: &MetadataRecord) -> CheckpointResult<()> {
    persistence::append_json_line(log_path, record).map_err(CheckpointError::from_io_data)
}

pub(crate) fn read_records(log_path: &Path) -> CheckpointResult<Vec<MetadataRecord>> {
    persistence::read_json_lines(log_path).map_err(CheckpointError::from_io_data)
}

pub(crate) fn load_index(index_path: &Path) -> CheckpointResult<Vec<IndexEntry>> {
    let entries = persistence::load_json(index_path).map_err(CheckpointError::from_io_data)?;
    Ok(entries.unwrap_or_default())
}

pub(crate) fn store_index(index_path: &Path, entries: &[IndexEntry]) -> CheckpointResult<()> {
    persistence::atomic_write_json(index_path, entries)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(epoch: u64) -> MetadataRecord {
        MetadataRecord {
            epoch,
            metrics: Metrics::from([("loss".to_string(), 1.0 / (epoch as f64 + 1.0))]),
            path: PathBuf::from(format!("model_epoch{epoch:06}.ckpt")),
            timestamp: Utc::now(),
            id: format!("id-{epoch}"),
            model_name: "model".to_string(),
            sha256: String::new(),
            size_bytes: 0,
        }
    }

    #[test]
    fn test_records_append_in_order() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("checkpoint_metadata.jsonl");

        append_record(&log, &record(1)).unwrap();
        append_record(&log, &record(2)).unwrap();

        let records = read_records(&log).unwrap();
        let epochs: Vec<_> = records.iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![1, 2]);
        assert_eq!(records[1].id, "id-2");
    }

    #[test]
    fn test_record_uses_stable_field_names() {
        let value = serde_json::to_value(record(4)).unwrap();
        assert_eq!(value["epoch"], 4);
        assert_eq!(value["metrics"]["loss"], 0.2);
        assert_eq!(value["path"], "model_epoch000004.ckpt");
    }

    #[test]
    fn test_malformed_log_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("checkpoint_metadata.jsonl");
        std::fs::write(&log, "{\"epoch\": 1}\n").unwrap();

        assert!(matches!(
            read_records(&log),
            Err(CheckpointError::Serialization(_))
        ));
    }

    #[test]
    fn test_index_roundtrip_and_missing() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("checkpoints.json");
        assert!(load_index(&index).unwrap().is_empty());

        let entries = vec![IndexEntry {
            id: "a".to_string(),
            model_name: "model".to_string(),
            epoch: 1,
            path: dir.path().join("model_epoch000001.ckpt"),
            created_at: Utc::now(),
        }];
        store_index(&index, &entries).unwrap();
        assert_eq!(load_index(&index).unwrap(), entries);
    }

    #[test]
    fn test_malformed_index_is_serialization_error() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("checkpoints.json");
        std::fs::write(&index, "[{]").unwrap();

        assert!(matches!(
            load_index(&index),
            Err(CheckpointError::Serialization(_))
        ));
    }
}
