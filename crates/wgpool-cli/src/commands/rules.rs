//! Firewall rule persistence command.

use std::io::Write;

use wgpool_network::PoolStore;
use wgpool_provision::{ArtifactStore, HostOps, Provisioner};

use crate::error::CliError;
use crate::output::{Message, OutputFormat};

/// Saves the live NAT rules so they survive a reboot.
pub struct SaveRulesCommand<'a, P, A, H> {
    provisioner: &'a Provisioner<P, A, H>,
}

impl<'a, P: PoolStore, A: ArtifactStore, H: HostOps> SaveRulesCommand<'a, P, A, H> {
    /// Create a new save-rules command.
    #[must_use]
    pub fn new(provisioner: &'a Provisioner<P, A, H>) -> Self {
        Self { provisioner }
    }

    /// Execute the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot save the rules.
    pub fn execute<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        self.provisioner.save_firewall_rules()?;
        let firewall = &self.provisioner.config().firewall;
        let message = Message::success(format!(
            "Firewall rules saved to {} and {}",
            firewall.ipv4_rules.display(),
            firewall.ipv6_rules.display()
        ));
        format.write(writer, &message)
    }
}
