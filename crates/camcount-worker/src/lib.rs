//! Orchestration for camcount.
//!
//! Fans clip fetches out per camera group, then fans detection and
//! transcoding out per clip, and persists the request manifest.

pub mod config;
pub mod download;
pub mod error;
pub mod fan_out;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod processing;

#[cfg(test)]
mod test_support;

pub use config::WorkerConfig;
pub use download::DownloadOrchestrator;
pub use error::{WorkerError, WorkerResult};
pub use fan_out::{join_ordered, TaskFailure};
pub use logging::RequestLogger;
pub use pipeline::Pipeline;
pub use processing::{write_manifest, ProcessingOrchestrator, ProcessingReport};
