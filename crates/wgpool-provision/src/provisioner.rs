//! The provisioning context shared by interface and client operations, plus
//! read-only inventory queries.

use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;
use serde::Serialize;
use tracing::{info, warn};
use wgpool_network::{Family, FilePoolStore, NetworkError, PoolStatus, PoolStore};

use crate::client::{ClientProvisioner, RecoveredInterface};
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, Result};
use crate::host::{HostOps, SystemHost};
use crate::interface::InterfaceProvisioner;
use crate::naming::validate_interface_name;
use crate::store::{ArtifactStore, FileArtifactStore};

/// What the inventory knows about one interface.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceSummary {
    /// Interface name.
    pub name: String,
    /// Listen port.
    pub listen_port: u16,
    /// Public addresses used for SNAT.
    pub public_addresses: Vec<IpAddr>,
    /// Interface subnets.
    pub subnets: Vec<IpNet>,
    /// Named peers, in artifact order.
    pub peers: Vec<String>,
    /// Number of peers, named or not.
    pub peer_count: usize,
    /// Artifact location.
    pub artifact: PathBuf,
}

impl InterfaceSummary {
    fn from_recovered(recovered: &RecoveredInterface) -> Self {
        Self {
            name: recovered.name.clone(),
            listen_port: recovered.listen_port,
            public_addresses: recovered.public_addresses(),
            subnets: recovered.subnets(),
            peers: recovered
                .record
                .peer_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            peer_count: recovered.record.peers.len(),
            artifact: recovered.artifact.clone(),
        }
    }
}

/// Configuration, stores and host, wired together.
#[derive(Debug)]
pub struct Provisioner<P = FilePoolStore, A = FileArtifactStore, H = SystemHost> {
    config: ProvisionConfig,
    pools: P,
    artifacts: A,
    host: H,
}

impl Provisioner {
    /// Builds a provisioner over the configured directories and the real host.
    #[must_use]
    pub fn system(config: ProvisionConfig) -> Self {
        let pools = FilePoolStore::new(config.pool_paths());
        let artifacts = FileArtifactStore::new(&config.wireguard_dir);
        Self::new(config, pools, artifacts, SystemHost)
    }
}

impl<P: PoolStore, A: ArtifactStore, H: HostOps> Provisioner<P, A, H> {
    /// Wires explicit collaborators together.
    #[must_use]
    pub fn new(config: ProvisionConfig, pools: P, artifacts: A, host: H) -> Self {
        Self {
            config,
            pools,
            artifacts,
            host,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Public address pools.
    #[must_use]
    pub fn pools(&self) -> &P {
        &self.pools
    }

    /// Artifact store.
    #[must_use]
    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    /// Host collaborators.
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Interface provisioning operations.
    #[must_use]
    pub fn interfaces(&self) -> InterfaceProvisioner<'_, P, A, H> {
        InterfaceProvisioner::new(self)
    }

    /// Client provisioning operations.
    #[must_use]
    pub fn clients(&self) -> ClientProvisioner<'_, P, A, H> {
        ClientProvisioner::new(self)
    }

    /// Summaries of every interface artifact. Artifacts that cannot be
    /// recovered are logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails if the artifact store cannot be listed.
    pub fn list_interfaces(&self) -> Result<Vec<InterfaceSummary>> {
        let mut summaries = Vec::new();
        for name in self.artifacts.interface_names()? {
            match RecoveredInterface::recover(&self.artifacts, &name) {
                Ok(recovered) => summaries.push(InterfaceSummary::from_recovered(&recovered)),
                Err(e) => warn!(interface = %name, error = %e, "skipping unreadable interface"),
            }
        }
        Ok(summaries)
    }

    /// Summary of one interface.
    ///
    /// # Errors
    ///
    /// `IllegalName` for anything but a plain interface name,
    /// `InterfaceNotFound`, or any recovery error.
    pub fn show_interface(&self, name: &str) -> Result<InterfaceSummary> {
        let recovered = RecoveredInterface::recover(&self.artifacts, name)?;
        Ok(InterfaceSummary::from_recovered(&recovered))
    }

    /// Counts for each configured pool. A missing IPv6 pool file is omitted.
    ///
    /// # Errors
    ///
    /// Fails if the IPv4 pool is missing or either pool is malformed.
    pub fn pool_status(&self) -> Result<Vec<PoolStatus>> {
        let mut statuses = vec![self.pools.load(Family::V4)?.status()];
        match self.pools.load(Family::V6) {
            Ok(pool) => statuses.push(pool.status()),
            Err(NetworkError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(statuses)
    }

    /// Persists the live firewall rule sets.
    ///
    /// # Errors
    ///
    /// Whatever the host reports.
    pub fn save_firewall_rules(&self) -> Result<()> {
        self.host.save_firewall_rules(&self.config.firewall)?;
        info!("firewall rules saved");
        Ok(())
    }

    /// Resolves the interface an operation targets.
    pub(crate) fn require_interface(&self, name: &str) -> Result<()> {
        validate_interface_name(name)?;
        if self.artifacts.interface_exists(name) {
            Ok(())
        } else {
            Err(ProvisionError::InterfaceNotFound(name.to_string()))
        }
    }
}
