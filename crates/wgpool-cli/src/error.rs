//! CLI error types.

use thiserror::Error;
use wgpool_provision::ProvisionError;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provisioning failed.
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
