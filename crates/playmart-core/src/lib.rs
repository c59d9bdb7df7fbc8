//! playmart-core library.
//!
//! Loads raw song-play logs and a song catalog into staging tables, then
//! reshapes them into a star schema: four dimensions rebuilt in full on every
//! run and a `songplays` fact table merged on its natural key so reruns never
//! duplicate plays.
//!
//! # Conventions
//!
//! - **Errors**: stage failures are [`error::PipelineError`]; config and glue
//!   code use `anyhow::Result`.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`) with
//!   structured fields.

pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod staging;
pub mod transform;

pub use config::PipelineConfig;
pub use error::{ErrorCode, PipelineError, Stage};
pub use pipeline::Pipeline;
