//! Client command implementation.

use std::io::Write;

use wgpool_network::PoolStore;
use wgpool_provision::{ArtifactStore, ClientRequest, HostOps, Provisioner};

use crate::cli::ClientCommands;
use crate::error::CliError;
use crate::output::OutputFormat;

/// Client command executor.
pub struct ClientCommand<'a, P, A, H> {
    provisioner: &'a Provisioner<P, A, H>,
}

impl<'a, P: PoolStore, A: ArtifactStore, H: HostOps> ClientCommand<'a, P, A, H> {
    /// Create a new client command.
    #[must_use]
    pub fn new(provisioner: &'a Provisioner<P, A, H>) -> Self {
        Self { provisioner }
    }

    /// Execute a client subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &ClientCommands,
    ) -> Result<(), CliError> {
        match command {
            ClientCommands::Add(args) => {
                let request = ClientRequest {
                    interface: args.interface.clone(),
                    name: args.name.clone(),
                };
                let client = self.provisioner.clients().provision(&request)?;
                format.write(writer, &client)?;
            }
        }
        Ok(())
    }
}
