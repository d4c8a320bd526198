//! # ckptkit-ml — checkpoint lifecycle for training runs
//!
//! A [`CheckpointManager`] persists snapshots of trainable state (model
//! parameters, optimizer state, epoch, metrics) to a directory, keeps at most
//! `max_to_keep` of them, and hands back the most recent one so a training
//! loop can resume.
//!
//! ```no_run
//! use ckptkit_ml::{CheckpointManager, ParameterSet};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> Result<(), ckptkit_ml::CheckpointError> {
//! let mut manager = CheckpointManager::open("checkpoints")?;
//! let mut model = ParameterSet::new();
//! model.insert("dense.weight", vec![0.1, 0.2]);
//! let optimizer = ParameterSet::new();
//!
//! let metrics = BTreeMap::from([("loss".to_string(), 0.42)]);
//! manager.save(&model, &optimizer, 1, &metrics, None)?;
//!
//! let mut restored = ParameterSet::new();
//! let checkpoint = manager.load(None, Some(&mut restored), None)?;
//! assert_eq!(checkpoint.map(|c| c.epoch), Some(1));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod training;

pub use error::{CheckpointError, CheckpointResult};
pub use training::{
    Checkpoint, CheckpointManager, IndexEntry, MetadataRecord, Metrics, ParameterSet, Stateful,
    Verification,
};
