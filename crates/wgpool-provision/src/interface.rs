//! Interface provisioning.
//!
//! Creating an interface commits public addresses, writes the interface
//! artifact with SNAT rules for each family and starts the tunnel service.
//! Every durable step is compensated if a later one fails, so a failed run
//! leaves neither ledger entries nor an artifact behind.

use std::net::IpAddr;
use std::path::PathBuf;

use ipnet::IpNet;
use serde::Serialize;
use tracing::{info, warn};
use wgpool_network::{gateway, next_free_port, parse_subnet, Family, NetworkError, PoolStore};
use wgpool_wireguard::{render_interface, InterfaceRecord, KeyPair, NatRule, PublicKey};

use crate::error::{ProvisionError, Result};
use crate::host::HostOps;
use crate::naming::{default_interface_name, validate_interface_name};
use crate::provisioner::Provisioner;
use crate::saga::Saga;
use crate::store::ArtifactStore;

/// Operator input for a new interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceRequest {
    /// Interface name; derived from the configured prefix when absent.
    pub name: Option<String>,
    /// IPv4 subnet in CIDR notation.
    pub subnet_v4: String,
    /// Optional IPv6 subnet in CIDR notation.
    pub subnet_v6: Option<String>,
}

impl InterfaceRequest {
    /// A request for an IPv4-only interface with a derived name.
    #[must_use]
    pub fn new(subnet_v4: impl Into<String>) -> Self {
        Self {
            name: None,
            subnet_v4: subnet_v4.into(),
            subnet_v6: None,
        }
    }

    /// Sets an explicit name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Enables IPv6 with the given subnet.
    #[must_use]
    pub fn with_subnet_v6(mut self, subnet: impl Into<String>) -> Self {
        self.subnet_v6 = Some(subnet.into());
        self
    }
}

/// A provisioned and running interface.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedInterface {
    /// Interface name.
    pub name: String,
    /// UDP listen port.
    pub listen_port: u16,
    /// Interface public key, handed to clients.
    pub public_key: PublicKey,
    /// Host interface carrying the default route.
    pub egress: String,
    /// Committed public IPv4 address.
    pub public_v4: IpAddr,
    /// Committed public IPv6 address.
    pub public_v6: Option<IpAddr>,
    /// IPv4 subnet.
    pub subnet_v4: IpNet,
    /// IPv6 subnet.
    pub subnet_v6: Option<IpNet>,
    /// IPv4 gateway with prefix.
    pub gateway_v4: IpNet,
    /// IPv6 gateway with prefix.
    pub gateway_v6: Option<IpNet>,
    /// Artifact location.
    pub artifact: PathBuf,
}

fn parse_family(text: &str, family: Family) -> Result<IpNet> {
    let subnet = parse_subnet(text)?;
    if Family::of(&subnet.addr()) != family {
        return Err(NetworkError::InvalidFormat {
            input: text.to_string(),
            expected: match family {
                Family::V4 => "an IPv4 subnet",
                Family::V6 => "an IPv6 subnet",
            },
        }
        .into());
    }
    Ok(subnet)
}

/// Creates interfaces.
#[derive(Debug)]
pub struct InterfaceProvisioner<'p, P, A, H> {
    ctx: &'p Provisioner<P, A, H>,
}

impl<'p, P: PoolStore, A: ArtifactStore, H: HostOps> InterfaceProvisioner<'p, P, A, H> {
    pub(crate) fn new(ctx: &'p Provisioner<P, A, H>) -> Self {
        Self { ctx }
    }

    /// Runs the whole interface sequence.
    ///
    /// # Errors
    ///
    /// `InvalidSubnet`/`InvalidFormat` and `IllegalName`/`InterfaceExists` are
    /// raised before anything is written. `PoolExhausted`, `PortsExhausted`,
    /// `NoDefaultRoute` and `ServiceActivationFailed` are raised after
    /// compensating every completed step.
    pub fn provision(&self, request: &InterfaceRequest) -> Result<ProvisionedInterface> {
        let subnet_v4 = parse_family(&request.subnet_v4, Family::V4)?;
        let subnet_v6 = request
            .subnet_v6
            .as_deref()
            .map(|s| parse_family(s, Family::V6))
            .transpose()?;
        let gateway_v4 = gateway(&subnet_v4)?;
        let gateway_v6 = subnet_v6.as_ref().map(gateway).transpose()?;
        let name = self.resolve_name(request.name.as_deref())?;

        info!(interface = %name, %subnet_v4, subnet_v6 = ?subnet_v6, "provisioning interface");

        let pools = self.ctx.pools();
        let artifacts = self.ctx.artifacts();
        let config = self.ctx.config();
        let name = name.as_str();

        let provisioned = Saga::execute("interface", |saga| {
            let public_v4 = saga.step(
                "commit public IPv4",
                || Ok(pools.claim(Family::V4)?),
                move |ip| pools.rollback(ip).map(drop).map_err(Into::into),
            )?;
            let public_v6 = match subnet_v6 {
                Some(_) => Some(saga.step(
                    "commit public IPv6",
                    || Ok(pools.claim(Family::V6)?),
                    move |ip| pools.rollback(ip).map(drop).map_err(Into::into),
                )?),
                None => None,
            };

            let listen_port = self.select_port()?;
            let egress = self
                .ctx
                .host()
                .default_route_interface()?
                .ok_or(ProvisionError::NoDefaultRoute)?;
            let keys = KeyPair::generate();

            let mut record = InterfaceRecord::new(keys.private_key().clone())
                .with_listen_port(listen_port)
                .with_address(gateway_v4)
                .with_nat_rule(NatRule::new(
                    &config.firewall.ipv4_tool,
                    subnet_v4,
                    &egress,
                    public_v4,
                ));
            if let (Some(subnet), Some(gw), Some(public)) = (subnet_v6, gateway_v6, public_v6) {
                record = record.with_address(gw).with_nat_rule(NatRule::new(
                    &config.firewall.ipv6_tool,
                    subnet,
                    &egress,
                    public,
                ));
            }

            let artifact = saga.step(
                "write artifact",
                || artifacts.create_interface(name, &render_interface(&record)),
                move |_| artifacts.remove_interface(name),
            )?;

            self.ctx.host().enable_service(name).map_err(|e| {
                ProvisionError::ServiceActivationFailed {
                    interface: name.to_string(),
                    detail: e.to_string(),
                }
            })?;

            Ok(ProvisionedInterface {
                name: name.to_string(),
                listen_port,
                public_key: *keys.public_key(),
                egress,
                public_v4,
                public_v6,
                subnet_v4,
                subnet_v6,
                gateway_v4,
                gateway_v6,
                artifact,
            })
        })?;

        info!(
            interface = %provisioned.name,
            port = provisioned.listen_port,
            public_v4 = %provisioned.public_v4,
            public_v6 = ?provisioned.public_v6,
            "interface provisioned"
        );
        Ok(provisioned)
    }

    fn resolve_name(&self, requested: Option<&str>) -> Result<String> {
        let artifacts = self.ctx.artifacts();
        let name = match requested {
            Some(name) => name.to_string(),
            None => default_interface_name(
                &self.ctx.config().interface_prefix,
                &artifacts.interface_names()?,
            ),
        };
        validate_interface_name(&name)?;
        if artifacts.interface_exists(&name) {
            return Err(ProvisionError::InterfaceExists(name));
        }
        Ok(name)
    }

    /// First free port, skipping live UDP listeners and every port already
    /// recorded by an interface artifact.
    fn select_port(&self) -> Result<u16> {
        let artifacts = self.ctx.artifacts();
        let mut in_use = self.ctx.host().listening_udp_ports()?;
        for name in artifacts.interface_names()? {
            match artifacts.load_interface(&name) {
                Ok(record) => in_use.extend(record.listen_port),
                Err(e) => warn!(interface = %name, error = %e, "ignoring unreadable artifact"),
            }
        }
        Ok(next_free_port(self.ctx.config().base_port, &in_use)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("10.0.0.0/24", Family::V4, true; "v4 as v4")]
    #[test_case("fd00::/64", Family::V6, true; "v6 as v6")]
    #[test_case("fd00::/64", Family::V4, false; "v6 as v4")]
    #[test_case("10.0.0.0/24", Family::V6, false; "v4 as v6")]
    fn subnet_family_is_enforced(text: &str, family: Family, ok: bool) {
        assert_eq!(parse_family(text, family).is_ok(), ok);
    }

    #[test]
    fn request_builder() {
        let request = InterfaceRequest::new("10.0.0.0/24")
            .with_name("wg5")
            .with_subnet_v6("fd00::/64");
        assert_eq!(request.name.as_deref(), Some("wg5"));
        assert_eq!(request.subnet_v6.as_deref(), Some("fd00::/64"));
    }
}
