//! Client provisioning.
//!
//! State is recovered from the interface artifact on every call, so the
//! artifact stays the single source of truth for which addresses are taken.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::Serialize;
use tracing::{info, warn};
use wgpool_network::{next_client_address, PoolStore};
use wgpool_wireguard::{
    render_client, render_peer_block, ClientProfile, Endpoint, InterfaceRecord, KeyPair,
    PeerRecord, PresharedKey, PublicKey,
};

use crate::error::{ProvisionError, Result};
use crate::host::HostOps;
use crate::naming::{default_client_name, validate_client_name, validate_interface_name};
use crate::provisioner::Provisioner;
use crate::saga::Saga;
use crate::store::ArtifactStore;

/// Interface state recovered from its artifact.
#[derive(Debug, Clone)]
pub struct RecoveredInterface {
    /// Interface name.
    pub name: String,
    /// Artifact location.
    pub artifact: PathBuf,
    /// The parsed artifact.
    pub record: InterfaceRecord,
    /// Listen port.
    pub listen_port: u16,
    /// Public IPv4 address from the IPv4 SNAT rule.
    pub public_v4: Option<IpAddr>,
    /// IPv4 subnet from the IPv4 SNAT rule.
    pub subnet_v4: Option<IpNet>,
    /// Public IPv6 address; present iff IPv6 is enabled.
    pub public_v6: Option<IpAddr>,
    /// IPv6 subnet; present iff IPv6 is enabled.
    pub subnet_v6: Option<IpNet>,
}

impl RecoveredInterface {
    /// Loads and recovers an interface from the store.
    ///
    /// # Errors
    ///
    /// `IllegalName`, `InterfaceNotFound`, `InvalidPublicAddress`, or any
    /// error from [`RecoveredInterface::from_record`].
    pub fn recover<A: ArtifactStore>(artifacts: &A, name: &str) -> Result<Self> {
        validate_interface_name(name)?;
        let record = artifacts.load_interface(name)?;
        Self::from_record(name, artifacts.interface_path(name), record)
    }

    /// Extracts the provisioning state from a parsed artifact.
    ///
    /// # Errors
    ///
    /// `MissingPublicAddress` if no SNAT rule is present, `MissingPort` if
    /// the listen port is absent or unreadable, and `MissingSubnet` if a
    /// rule's subnet has no gateway among the interface addresses.
    pub fn from_record(name: &str, artifact: PathBuf, record: InterfaceRecord) -> Result<Self> {
        let v4 = record.nat_rule(false).map(|r| (r.public_address, r.subnet));
        let v6 = record.nat_rule(true).map(|r| (r.public_address, r.subnet));
        if v4.is_none() && v6.is_none() {
            return Err(ProvisionError::MissingPublicAddress(artifact));
        }
        let Some(listen_port) = record.listen_port else {
            return Err(ProvisionError::MissingPort(artifact));
        };

        for (_, subnet) in v4.iter().chain(v6.iter()) {
            let has_gateway = record
                .addresses
                .iter()
                .any(|address| subnet.contains(&address.addr()));
            if !has_gateway {
                return Err(ProvisionError::MissingSubnet(artifact));
            }
        }

        Ok(Self {
            name: name.to_string(),
            artifact,
            listen_port,
            public_v4: v4.map(|(ip, _)| ip),
            subnet_v4: v4.map(|(_, net)| net),
            public_v6: v6.map(|(ip, _)| ip),
            subnet_v6: v6.map(|(_, net)| net),
            record,
        })
    }

    /// Whether the interface carries IPv6.
    #[must_use]
    pub fn ipv6_enabled(&self) -> bool {
        self.public_v6.is_some()
    }

    /// Public addresses, IPv4 first.
    #[must_use]
    pub fn public_addresses(&self) -> Vec<IpAddr> {
        self.public_v4.into_iter().chain(self.public_v6).collect()
    }

    /// Interface subnets, IPv4 first.
    #[must_use]
    pub fn subnets(&self) -> Vec<IpNet> {
        self.subnet_v4.into_iter().chain(self.subnet_v6).collect()
    }

    /// Endpoint handed to clients, IPv4 preferred.
    #[must_use]
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.public_v4
            .or(self.public_v6)
            .map(|ip| Endpoint::from_ip_port(ip, self.listen_port))
    }

    /// Every address already taken inside the interface subnets: peer
    /// addresses plus the interface's own gateways.
    #[must_use]
    pub fn assigned_addresses(&self) -> HashSet<IpAddr> {
        let mut taken = self.record.peer_addresses();
        taken.extend(self.record.addresses.iter().map(IpNet::addr));
        taken
    }
}

/// Operator input for a new client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientRequest {
    /// Interface to attach to.
    pub interface: String,
    /// Client name; derived when absent.
    pub name: Option<String>,
}

impl ClientRequest {
    /// A request for a client with a derived name.
    #[must_use]
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            name: None,
        }
    }

    /// Sets an explicit name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A provisioned client.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedClient {
    /// Interface the client is attached to.
    pub interface: String,
    /// Client name.
    pub name: String,
    /// Addresses assigned to the client.
    pub addresses: Vec<IpNet>,
    /// Client public key.
    pub public_key: PublicKey,
    /// Endpoint written into the client profile.
    pub endpoint: Endpoint,
    /// Client artifact location.
    pub artifact: PathBuf,
}

/// Adds clients to existing interfaces.
#[derive(Debug)]
pub struct ClientProvisioner<'p, P, A, H> {
    ctx: &'p Provisioner<P, A, H>,
}

impl<'p, P: PoolStore, A: ArtifactStore, H: HostOps> ClientProvisioner<'p, P, A, H> {
    pub(crate) fn new(ctx: &'p Provisioner<P, A, H>) -> Self {
        Self { ctx }
    }

    /// Runs the whole client sequence.
    ///
    /// # Errors
    ///
    /// `IllegalName` for an interface name that is not a plain interface
    /// name. Recovery errors, `ClientAddressExhausted`, `IllegalName` and
    /// `ClientExists` are raised before anything is written.
    /// `ServiceActivationFailed` is raised after removing the peer block and
    /// the client artifact.
    pub fn provision(&self, request: &ClientRequest) -> Result<ProvisionedClient> {
        let interface = request.interface.as_str();
        self.ctx.require_interface(interface)?;
        let artifacts = self.ctx.artifacts();
        let recovered = RecoveredInterface::recover(artifacts, interface)?;
        let Some(endpoint) = recovered.endpoint() else {
            return Err(ProvisionError::MissingPublicAddress(recovered.artifact));
        };

        let addresses = Self::allocate_addresses(&recovered)?;
        let name = self.resolve_name(&recovered, request.name.as_deref())?;
        let name = name.as_str();

        info!(interface, client = name, addresses = ?addresses, "provisioning client");

        let keys = KeyPair::generate();
        let preshared_key = PresharedKey::generate();
        let peer = PeerRecord {
            name: Some(name.to_string()),
            public_key: *keys.public_key(),
            preshared_key: Some(preshared_key.clone()),
            allowed_ips: addresses.clone(),
        };
        let mut allowed_ips = vec![IpNet::V4(Ipv4Net::default())];
        if recovered.ipv6_enabled() {
            allowed_ips.push(IpNet::V6(Ipv6Net::default()));
        }
        let profile = ClientProfile {
            private_key: keys.private_key().clone(),
            addresses: addresses.clone(),
            dns: self.ctx.config().client_dns.clone(),
            server_public_key: recovered.record.private_key.public_key(),
            preshared_key,
            endpoint: endpoint.clone(),
            allowed_ips,
            persistent_keepalive: self.ctx.config().keepalive(),
        };

        let artifact = Saga::execute("client", |saga| {
            saga.step(
                "append peer block",
                || {
                    let previous = artifacts.read_interface(interface)?;
                    artifacts.append_interface(interface, &render_peer_block(&peer))?;
                    Ok(previous)
                },
                move |previous: String| artifacts.replace_interface(interface, &previous),
            )?;
            let artifact = saga.step(
                "write client artifact",
                || artifacts.create_client(interface, name, &render_client(&profile)),
                move |_| artifacts.remove_client(interface, name),
            )?;
            self.apply_live(interface)?;
            Ok(artifact)
        })?;

        info!(interface, client = name, artifact = %artifact.display(), "client provisioned");
        Ok(ProvisionedClient {
            interface: interface.to_string(),
            name: name.to_string(),
            addresses,
            public_key: *keys.public_key(),
            endpoint,
            artifact,
        })
    }

    fn allocate_addresses(recovered: &RecoveredInterface) -> Result<Vec<IpNet>> {
        let taken = recovered.assigned_addresses();
        let mut rng = rand::thread_rng();
        recovered
            .subnets()
            .iter()
            .map(|subnet| -> Result<IpNet> {
                let address = next_client_address(subnet, &taken, &mut rng)?;
                Ok(IpNet::from(address))
            })
            .collect()
    }

    fn resolve_name(&self, recovered: &RecoveredInterface, requested: Option<&str>) -> Result<String> {
        let existing = self.ctx.artifacts().client_names(&recovered.name)?;
        let name = match requested {
            Some(name) => name.to_string(),
            None => default_client_name(&existing),
        };
        validate_client_name(&name)?;

        let in_artifact = recovered.record.peer_names().contains(&name.as_str());
        if in_artifact || existing.contains(&name) {
            return Err(ProvisionError::ClientExists {
                interface: recovered.name.clone(),
                client: name,
            });
        }
        Ok(name)
    }

    /// Restarts the service, falling back to an in-place sync.
    fn apply_live(&self, interface: &str) -> Result<()> {
        let host = self.ctx.host();
        let Err(restart) = host.restart_service(interface) else {
            return Ok(());
        };
        warn!(interface, error = %restart, "restart failed, syncing in place");
        host.sync_service(interface)
            .map_err(|sync| ProvisionError::ServiceActivationFailed {
                interface: interface.to_string(),
                detail: format!("restart: {restart}; sync: {sync}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpool_wireguard::{NatRule, PrivateKey};

    fn record(port: Option<u16>, dual: bool) -> InterfaceRecord {
        let mut record = InterfaceRecord::new(PrivateKey::generate())
            .with_address("10.8.0.1/24".parse().expect("cidr"))
            .with_nat_rule(NatRule::new(
                "iptables",
                "10.8.0.0/24".parse().expect("cidr"),
                "eth0",
                "198.51.100.4".parse().expect("ip"),
            ));
        if dual {
            record = record
                .with_address("fd00:8::1/64".parse().expect("cidr"))
                .with_nat_rule(NatRule::new(
                    "ip6tables",
                    "fd00:8::/64".parse().expect("cidr"),
                    "eth0",
                    "2001:db8::4".parse().expect("ip"),
                ));
        }
        if let Some(port) = port {
            record = record.with_listen_port(port);
        }
        record
    }

    #[test]
    fn recovers_dual_stack_state() {
        let recovered =
            RecoveredInterface::from_record("wg0", PathBuf::from("wg0.conf"), record(Some(51820), true))
                .expect("recover");
        assert!(recovered.ipv6_enabled());
        assert_eq!(recovered.listen_port, 51820);
        assert_eq!(recovered.public_v4, Some("198.51.100.4".parse().expect("ip")));
        assert_eq!(recovered.subnet_v6, Some("fd00:8::/64".parse().expect("cidr")));
        assert_eq!(
            recovered.endpoint().expect("endpoint").to_string(),
            "198.51.100.4:51820"
        );
    }

    #[test]
    fn missing_port_is_reported() {
        let result = RecoveredInterface::from_record("wg0", PathBuf::from("wg0.conf"), record(None, false));
        assert!(matches!(result, Err(ProvisionError::MissingPort(_))));
    }

    #[test]
    fn missing_rules_are_reported() {
        let bare = InterfaceRecord::new(PrivateKey::generate()).with_listen_port(51820);
        let result = RecoveredInterface::from_record("wg0", PathBuf::from("wg0.conf"), bare);
        assert!(matches!(result, Err(ProvisionError::MissingPublicAddress(_))));
    }

    #[test]
    fn rule_without_gateway_is_missing_subnet() {
        let mut partial = record(Some(51820), false);
        partial.addresses.clear();
        let result = RecoveredInterface::from_record("wg0", PathBuf::from("wg0.conf"), partial);
        assert!(matches!(result, Err(ProvisionError::MissingSubnet(_))));
    }

    #[test]
    fn gateways_count_as_assigned() {
        let recovered =
            RecoveredInterface::from_record("wg0", PathBuf::from("wg0.conf"), record(Some(51820), true))
                .expect("recover");
        let taken = recovered.assigned_addresses();
        assert!(taken.contains(&"10.8.0.1".parse::<IpAddr>().expect("ip")));
        assert!(taken.contains(&"fd00:8::1".parse::<IpAddr>().expect("ip")));
    }

    #[test]
    fn ipv6_only_endpoint_is_bracketed() {
        let mut v6_only = record(Some(51820), true);
        v6_only.nat_rules.retain(NatRule::is_ipv6);
        v6_only.addresses.retain(|a| matches!(a, IpNet::V6(_)));
        let recovered = RecoveredInterface::from_record("wg0", PathBuf::from("wg0.conf"), v6_only)
            .expect("recover");
        assert_eq!(
            recovered.endpoint().expect("endpoint").to_string(),
            "[2001:db8::4]:51820"
        );
    }
}
