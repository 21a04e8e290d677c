//! The sequential minting pipeline.
//!
//! [`OutputProcessor`] runs one output through compose, prove, sign and
//! broadcast; [`PipelineController`] walks the run in index order, skipping
//! completed work and leaving unaffordable outputs alone.

mod controller;
mod errors;
mod processor;

pub use controller::{PipelineController, RunSummary};
pub use errors::ProcessError;
pub use processor::OutputProcessor;
