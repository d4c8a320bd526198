//! Training infrastructure — checkpoints, their metadata, and state capture.

pub mod checkpoint;
pub mod metadata;
pub mod naming;
pub mod state;

pub use checkpoint::{Checkpoint, CheckpointManager, Metrics, Verification};
pub use metadata::{IndexEntry, MetadataRecord};
pub use state::{ParameterSet, Stateful};
