//! Interface command implementation.
//!
//! Provides subcommands for:
//! - Provisioning an interface
//! - Listing interfaces
//! - Showing one interface

use std::io::Write;

use wgpool_network::PoolStore;
use wgpool_provision::{ArtifactStore, HostOps, InterfaceRequest, Provisioner};

use crate::cli::{InterfaceAddArgs, InterfaceCommands};
use crate::error::CliError;
use crate::output::{InterfaceList, OutputFormat};

/// Interface command executor.
pub struct InterfaceCommand<'a, P, A, H> {
    provisioner: &'a Provisioner<P, A, H>,
}

impl<'a, P: PoolStore, A: ArtifactStore, H: HostOps> InterfaceCommand<'a, P, A, H> {
    /// Create a new interface command.
    #[must_use]
    pub fn new(provisioner: &'a Provisioner<P, A, H>) -> Self {
        Self { provisioner }
    }

    /// Execute an interface subcommand.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning or output fails.
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        command: &InterfaceCommands,
    ) -> Result<(), CliError> {
        match command {
            InterfaceCommands::Add(args) => {
                let provisioned = self
                    .provisioner
                    .interfaces()
                    .provision(&Self::request(args))?;
                format.write(writer, &provisioned)?;
            }
            InterfaceCommands::List => {
                let list = InterfaceList {
                    interfaces: self.provisioner.list_interfaces()?,
                };
                format.write(writer, &list)?;
            }
            InterfaceCommands::Show { name } => {
                let summary = self.provisioner.show_interface(name)?;
                format.write(writer, &summary)?;
            }
        }
        Ok(())
    }

    fn request(args: &InterfaceAddArgs) -> InterfaceRequest {
        InterfaceRequest {
            name: args.name.clone(),
            subnet_v4: args.subnet_v4.clone(),
            subnet_v6: args.subnet_v6.clone(),
        }
    }
}
