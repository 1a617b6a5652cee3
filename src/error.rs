//! Errors that abort an engine run.

use std::io;
use thiserror::Error;

use crate::probe::ChannelError;

/// A fatal mid-run failure
///
/// Per-probe timeouts never surface here; they are recorded as losses.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}
