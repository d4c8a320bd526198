//! # ckptkit-core — shared plumbing for checkpoint management
//!
//! Provides the pieces every ckptkit crate leans on:
//! - [`persistence`]: atomic writes, JSON documents and JSON-lines logs
//! - [`config`]: layered configuration via `figment`
//! - [`logging`]: an owned `tracing` logger handle

pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;

pub use config::{CheckpointSettings, CkptConfig, load_config};
pub use error::{CoreError, CoreResult};
pub use logging::{LogConfig, LogDestination, LogFormat, Logger};
