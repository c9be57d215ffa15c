//! Pool command implementation.

use std::io::Write;

use wgpool_network::PoolStore;
use wgpool_provision::{ArtifactStore, HostOps, Provisioner};

use crate::cli::PoolCommands;
use crate::error::CliError;
use crate::output::{OutputFormat, PoolReport};

/// Pool command executor.
pub struct PoolCommand<'a, P, A, H> {
    provisioner: &'a Provisioner<P, A, H>,
}

impl<'a, P: PoolStore, A: ArtifactStore, H: HostOps> PoolCommand<'a, P, A, H> {
    /// Create a new pool command.
    #[must_use]
    pub fn new(provisioner: &'a Provisioner<P, A, H>) -> Self {
        Self { provisioner }
    }

    /// Execute a pool subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if a pool cannot be read or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &PoolCommands,
    ) -> Result<(), CliError> {
        match command {
            PoolCommands::Status => {
                let report = PoolReport {
                    pools: self.provisioner.pool_status()?,
                };
                format.write(writer, &report)?;
            }
        }
        Ok(())
    }
}
