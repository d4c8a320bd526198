//! Checkpoint management for training runs.
//!
//! A [`CheckpointManager`] writes one self-contained file per checkpoint,
//! remembers the files it wrote in save order, and deletes the oldest once
//! more than `max_to_keep` are tracked. Eviction follows save order, not
//! epoch order: saving epochs out of sequence still evicts the earliest save.
//!
//! History is per instance. A fresh manager pointed at an existing directory
//! does not adopt (or evict) earlier files, but [`CheckpointManager::load`]
//! can still find them through the index or a directory scan.
//!
//! Two managers writing the same directory are not coordinated; their
//! in-memory histories drift from what is actually on disk.

use chrono::{DateTime, Utc};
use ckptkit_core::config::{CheckpointSettings, CkptConfig};
use ckptkit_core::logging::Logger;
use ckptkit_core::persistence;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CheckpointError, CheckpointResult};
use crate::training::metadata::{self, IndexEntry, MetadataRecord};
use crate::training::naming;
use crate::training::state::Stateful;

/// Metric name to value, captured at save time.
pub type Metrics = BTreeMap<String, f64>;

/// Version written into every checkpoint file.
pub const FORMAT_VERSION: u32 = 1;

/// A training checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub format_version: u32,
    pub model_name: String,
    pub epoch: u64,
    #[serde(with = "base64_blob")]
    pub model_state: Vec<u8>,
    #[serde(with = "base64_blob")]
    pub optimizer_state: Vec<u8>,
    pub metrics: Metrics,
    pub created_at: DateTime<Utc>,
    /// Where the checkpoint was written to or read from.
    #[serde(skip)]
    pub path: PathBuf,
}

impl Checkpoint {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

mod base64_blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Outcome of [`CheckpointManager::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The file matches the digest recorded when it was saved.
    Verified,
    /// The file changed after it was saved.
    Mismatch { expected: String, actual: String },
    /// The metadata log has no digest for this file.
    Unrecorded,
}

/// Checkpoint manager.
#[derive(Debug)]
pub struct CheckpointManager {
    settings: CheckpointSettings,
    checkpoint_files: Vec<PathBuf>,
    logger: Option<Arc<Logger>>,
}

impl CheckpointManager {
    /// Create a manager, creating `settings.checkpoint_dir` if needed.
    pub fn new(settings: CheckpointSettings) -> CheckpointResult<Self> {
        if settings.max_to_keep == 0 {
            return Err(CheckpointError::config("max_to_keep must be >= 1"));
        }
        naming::validate_model_name(&settings.model_name).map_err(CheckpointError::Config)?;
        if settings.metadata_file == settings.index_file {
            return Err(CheckpointError::config(
                "metadata_file and index_file must differ",
            ));
        }

        std::fs::create_dir_all(&settings.checkpoint_dir).map_err(|e| {
            CheckpointError::config(format!(
                "cannot create checkpoint directory {}: {e}",
                settings.checkpoint_dir.display()
            ))
        })?;

        Ok(Self {
            settings,
            checkpoint_files: Vec::new(),
            logger: None,
        })
    }

    /// Manager for `checkpoint_dir` with default settings
    /// (`model_name = "model"`, `max_to_keep = 3`).
    pub fn open(checkpoint_dir: impl Into<PathBuf>) -> CheckpointResult<Self> {
        Self::new(CheckpointSettings::new(checkpoint_dir))
    }

    /// Manager and logger built from a loaded configuration.
    pub fn from_config(config: &CkptConfig) -> CheckpointResult<Self> {
        let logger = Logger::new(&config.log)?;
        Ok(Self::new(config.checkpoint.clone())?.with_logger(Arc::new(logger)))
    }

    /// Route this manager's events through `logger` instead of the global
    /// subscriber.
    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.settings.checkpoint_dir
    }

    pub fn model_name(&self) -> &str {
        &self.settings.model_name
    }

    pub fn max_to_keep(&self) -> usize {
        self.settings.max_to_keep
    }

    pub fn settings(&self) -> &CheckpointSettings {
        &self.settings
    }

    /// Checkpoints saved by this manager and still retained, oldest first.
    pub fn checkpoint_files(&self) -> &[PathBuf] {
        &self.checkpoint_files
    }

    /// Most recently saved checkpoint of this manager.
    pub fn latest(&self) -> Option<&Path> {
        self.checkpoint_files.last().map(PathBuf::as_path)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.settings.checkpoint_dir.join(&self.settings.metadata_file)
    }

    pub fn index_path(&self) -> PathBuf {
        self.settings.checkpoint_dir.join(&self.settings.index_file)
    }

    /// Default file name for `epoch`.
    pub fn file_name_for(&self, epoch: u64) -> String {
        naming::checkpoint_file_name(
            &self.settings.model_name,
            epoch,
            self.settings.epoch_width,
            &self.settings.extension,
        )
    }

    /// Save a checkpoint of `state` and `optimizer` at `epoch`.
    ///
    /// Writes `checkpoint_dir/filename` (default `{model_name}_epoch{N}.{ext}`),
    /// evicts the oldest tracked checkpoints beyond `max_to_keep`, and appends
    /// a metadata record. An existing file with the same name is replaced.
    pub fn save<S, O>(
        &mut self,
        state: &S,
        optimizer: &O,
        epoch: u64,
        metrics: &Metrics,
        filename: Option<&str>,
    ) -> CheckpointResult<PathBuf>
    where
        S: Stateful + ?Sized,
        O: Stateful + ?Sized,
    {
        let model_state = state.export_state().map_err(CheckpointError::State)?;
        let optimizer_state = optimizer.export_state().map_err(CheckpointError::State)?;
        self.save_blobs(model_state, optimizer_state, epoch, metrics, filename)
    }

    /// Same as [`save`](Self::save) for already exported state.
    pub fn save_blobs(
        &mut self,
        model_state: Vec<u8>,
        optimizer_state: Vec<u8>,
        epoch: u64,
        metrics: &Metrics,
        filename: Option<&str>,
    ) -> CheckpointResult<PathBuf> {
        let logger = self.logger.clone();
        in_logger_scope(logger.as_deref(), || {
            self.write_checkpoint(model_state, optimizer_state, epoch, metrics, filename)
        })
    }

    fn write_checkpoint(
        &mut self,
        model_state: Vec<u8>,
        optimizer_state: Vec<u8>,
        epoch: u64,
        metrics: &Metrics,
        filename: Option<&str>,
    ) -> CheckpointResult<PathBuf> {
        if let Some((name, value)) = metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CheckpointError::serialization(format!(
                "metric '{name}' has non-finite value {value}"
            )));
        }

        let file_name = match filename {
            Some(name) => {
                naming::validate_file_name(name).map_err(CheckpointError::Config)?;
                if name == self.settings.metadata_file || name == self.settings.index_file {
                    return Err(CheckpointError::config(format!(
                        "checkpoint file name '{name}' is reserved"
                    )));
                }
                name.to_string()
            }
            None => self.file_name_for(epoch),
        };
        let path = self.settings.checkpoint_dir.join(&file_name);

        let checkpoint = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            format_version: FORMAT_VERSION,
            model_name: self.settings.model_name.clone(),
            epoch,
            model_state,
            optimizer_state,
            metrics: metrics.clone(),
            created_at: Utc::now(),
            path: path.clone(),
        };

        let bytes = serde_json::to_vec_pretty(&checkpoint)?;
        persistence::atomic_write(&path, &bytes)?;
        info!(
            path = %path.display(),
            epoch,
            bytes = bytes.len(),
            "Saved checkpoint"
        );

        // A rewritten path moves to the newest position rather than appearing twice.
        self.checkpoint_files.retain(|p| p != &path);
        self.checkpoint_files.push(path.clone());
        self.cleanup_old_checkpoints()?;
        self.update_index(|entries| {
            entries.retain(|e| e.path != path);
            entries.push(IndexEntry {
                id: checkpoint.id.clone(),
                model_name: checkpoint.model_name.clone(),
                epoch,
                path: path.clone(),
                created_at: checkpoint.created_at,
            });
        });
        self.save_metadata(&checkpoint, &bytes)?;

        Ok(path)
    }

    /// Load a checkpoint and restore the given targets from it.
    ///
    /// With `checkpoint_path = None` the newest checkpoint is resolved from,
    /// in order: this manager's history, the on-disk index, a scan of the
    /// directory for `{model_name}_epoch*` files (highest epoch wins). If
    /// nothing is found, returns `Ok(None)` and leaves the targets untouched.
    ///
    /// An explicit relative path that does not exist as given is looked up
    /// inside the checkpoint directory. An explicit path that cannot be found
    /// is an error, and so is a file that cannot be parsed.
    pub fn load(
        &self,
        checkpoint_path: Option<&Path>,
        state_target: Option<&mut dyn Stateful>,
        optimizer_target: Option<&mut dyn Stateful>,
    ) -> CheckpointResult<Option<Checkpoint>> {
        in_logger_scope(self.logger.as_deref(), || {
            self.read_and_restore(checkpoint_path, state_target, optimizer_target)
        })
    }

    fn read_and_restore(
        &self,
        checkpoint_path: Option<&Path>,
        state_target: Option<&mut dyn Stateful>,
        optimizer_target: Option<&mut dyn Stateful>,
    ) -> CheckpointResult<Option<Checkpoint>> {
        let path = match checkpoint_path {
            Some(p) => self.resolve_path(p),
            None => match self.find_latest()? {
                Some(p) => p,
                None => {
                    warn!(
                        dir = %self.settings.checkpoint_dir.display(),
                        model = %self.settings.model_name,
                        "No checkpoints found to load"
                    );
                    return Ok(None);
                }
            },
        };

        info!(path = %path.display(), "Loading checkpoint");
        let checkpoint = read_checkpoint(&path)?;

        if let Some(target) = state_target {
            target
                .import_state(&checkpoint.model_state)
                .map_err(CheckpointError::State)?;
        }
        if let Some(target) = optimizer_target {
            target
                .import_state(&checkpoint.optimizer_state)
                .map_err(CheckpointError::State)?;
        }

        debug!(epoch = checkpoint.epoch, id = %checkpoint.id, "Restored checkpoint");
        Ok(Some(checkpoint))
    }

    /// Metadata records of every save into this directory, in append order.
    pub fn read_metadata(&self) -> CheckpointResult<Vec<MetadataRecord>> {
        metadata::read_records(&self.metadata_path())
    }

    /// Checkpoint files following the naming convention for this model,
    /// sorted by epoch (then file name).
    pub fn list_on_disk(&self) -> CheckpointResult<Vec<PathBuf>> {
        let mut found: Vec<(u64, String)> = Vec::new();
        for entry in std::fs::read_dir(&self.settings.checkpoint_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(epoch) = naming::parse_epoch(&self.settings.model_name, &name) {
                found.push((epoch, name));
            }
        }
        found.sort();
        Ok(found
            .into_iter()
            .map(|(_, name)| self.settings.checkpoint_dir.join(name))
            .collect())
    }

    /// Compare a checkpoint file against the digest recorded when it was saved.
    pub fn verify(&self, checkpoint_path: &Path) -> CheckpointResult<Verification> {
        let path = self.resolve_path(checkpoint_path);
        let actual = match persistence::sha256_file(&path) {
            Ok(digest) => digest,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(path));
            }
            Err(e) => return Err(e.into()),
        };

        let records = self.read_metadata()?;
        let recorded = records
            .iter()
            .rev()
            .find(|r| r.path.file_name() == path.file_name() && !r.sha256.is_empty());

        Ok(match recorded {
            None => Verification::Unrecorded,
            Some(r) if r.sha256 == actual => Verification::Verified,
            Some(r) => Verification::Mismatch {
                expected: r.sha256.clone(),
                actual,
            },
        })
    }

    /// Delete the oldest tracked checkpoints until at most `max_to_keep` remain.
    ///
    /// Files that are already gone count as evicted. Returns how many entries
    /// were dropped from the history.
    pub(crate) fn cleanup_old_checkpoints(&mut self) -> CheckpointResult<usize> {
        let mut evicted = Vec::new();
        while self.checkpoint_files.len() > self.settings.max_to_keep {
            let oldest = self.checkpoint_files.remove(0);
            match std::fs::remove_file(&oldest) {
                Ok(()) => debug!(path = %oldest.display(), "Evicted checkpoint"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %oldest.display(), "Evicted checkpoint was already removed");
                }
                Err(e) => return Err(e.into()),
            }
            evicted.push(oldest);
        }

        if !evicted.is_empty() {
            self.update_index(|entries| entries.retain(|e| !evicted.contains(&e.path)));
        }
        Ok(evicted.len())
    }

    fn save_metadata(&self, checkpoint: &Checkpoint, bytes: &[u8]) -> CheckpointResult<()> {
        let record = MetadataRecord {
            epoch: checkpoint.epoch,
            metrics: checkpoint.metrics.clone(),
            path: checkpoint.path.clone(),
            timestamp: Utc::now(),
            id: checkpoint.id.clone(),
            model_name: checkpoint.model_name.clone(),
            sha256: persistence::sha256_hex(bytes),
            size_bytes: bytes.len() as u64,
        };
        metadata::append_record(&self.metadata_path(), &record)
    }

    /// Rewrite the index, dropping entries whose file is gone.
    ///
    /// Failures are logged and never fail the save that triggered them. An
    /// unreadable index is replaced.
    fn update_index(&self, edit: impl FnOnce(&mut Vec<IndexEntry>)) {
        let index_path = self.index_path();
        let mut entries = match metadata::load_index(&index_path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %index_path.display(), error = %e, "Replacing unreadable checkpoint index");
                Vec::new()
            }
        };
        edit(&mut entries);
        entries.retain(|e| self.indexed_path(e).is_some_and(|p| p.is_file()));

        if let Err(e) = metadata::store_index(&index_path, &entries) {
            warn!(path = %index_path.display(), error = %e, "Failed to write checkpoint index");
        }
    }

    /// Location of an index entry inside this manager's directory.
    fn indexed_path(&self, entry: &IndexEntry) -> Option<PathBuf> {
        entry
            .path
            .file_name()
            .map(|name| self.settings.checkpoint_dir.join(name))
    }

    fn find_latest(&self) -> CheckpointResult<Option<PathBuf>> {
        if let Some(last) = self.checkpoint_files.last() {
            return Ok(Some(last.clone()));
        }

        let index_path = self.index_path();
        let indexed = metadata::load_index(&index_path).unwrap_or_else(|e| {
            warn!(path = %index_path.display(), error = %e, "Ignoring unreadable checkpoint index");
            Vec::new()
        });
        let from_index = indexed
            .iter()
            .rev()
            .filter(|e| e.model_name == self.settings.model_name)
            .filter_map(|e| self.indexed_path(e))
            .find(|p| p.is_file());
        if let Some(path) = from_index {
            debug!(path = %path.display(), "Resolved latest checkpoint from index");
            return Ok(Some(path));
        }

        let latest = self.list_on_disk()?.pop();
        if let Some(path) = &latest {
            debug!(path = %path.display(), "Resolved latest checkpoint from directory scan");
        }
        Ok(latest)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() || path.exists() {
            path.to_path_buf()
        } else {
            self.settings.checkpoint_dir.join(path)
        }
    }
}

fn in_logger_scope<R>(logger: Option<&Logger>, f: impl FnOnce() -> R) -> R {
    match logger {
        Some(logger) => logger.in_scope(f),
        None => f(),
    }
}

fn read_checkpoint(path: &Path) -> CheckpointResult<Checkpoint> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut checkpoint: Checkpoint = serde_json::from_slice(&bytes).map_err(|e| {
        CheckpointError::serialization(format!("{}: {e}", path.display()))
    })?;
    if checkpoint.format_version > FORMAT_VERSION {
        return Err(CheckpointError::serialization(format!(
            "{}: unsupported format version {} (newest known is {FORMAT_VERSION})",
            path.display(),
            checkpoint.format_version
        )));
    }
    checkpoint.path = path.to_path_buf();
    Ok(checkpoint)
}
