//! Interface and client configuration artifacts.
//!
//! The interface artifact is the only record of an interface and its peers,
//! so the renderer and the parser here must agree on every field. Parsing
//! produces an [`InterfaceRecord`]; callers work on the record instead of
//! grepping the text again.
//!
//! ```text
//! [Interface]
//! Address = 10.0.0.1/24, fd00::1/64
//! PrivateKey = <base64>
//! ListenPort = 51820
//! PostUp = iptables -t nat -A POSTROUTING -s 10.0.0.0/24 -o eth0 -j SNAT --to-source 1.1.1.1
//! PostDown = iptables -t nat -D POSTROUTING -s 10.0.0.0/24 -o eth0 -j SNAT --to-source 1.1.1.1
//!
//! ### client1
//! [Peer]
//! PublicKey = <base64>
//! PresharedKey = <base64>
//! AllowedIPs = 10.0.0.2/32
//! ```

use std::collections::HashSet;
use std::fmt::Write as FmtWrite;
use std::net::IpAddr;

use ipnet::IpNet;
use tracing::warn;

use crate::error::{Result, WireGuardError};
use crate::keys::{PrivateKey, PublicKey};
use crate::types::{Endpoint, NatAction, NatRule, PresharedKey};

/// Prefix of the comment line that names the following peer.
const PEER_NAME_MARKER: &str = "###";

/// Parsed form of an interface artifact.
#[derive(Clone, Debug)]
pub struct InterfaceRecord {
    /// The interface's private key.
    pub private_key: PrivateKey,
    /// UDP listen port, if the artifact declares a readable one.
    pub listen_port: Option<u16>,
    /// Gateway addresses with their subnet prefix length.
    pub addresses: Vec<IpNet>,
    /// SNAT rules, one per enabled family.
    pub nat_rules: Vec<NatRule>,
    /// Peers appended after the interface block.
    pub peers: Vec<PeerRecord>,
}

impl InterfaceRecord {
    /// Creates a record with no port, addresses, rules or peers.
    #[must_use]
    pub fn new(private_key: PrivateKey) -> Self {
        Self {
            private_key,
            listen_port: None,
            addresses: Vec::new(),
            nat_rules: Vec::new(),
            peers: Vec::new(),
        }
    }

    /// Sets the listen port.
    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Adds a gateway address.
    #[must_use]
    pub fn with_address(mut self, address: IpNet) -> Self {
        self.addresses.push(address);
        self
    }

    /// Adds a NAT rule.
    #[must_use]
    pub fn with_nat_rule(mut self, rule: NatRule) -> Self {
        self.nat_rules.push(rule);
        self
    }

    /// Returns the SNAT rule for one family.
    #[must_use]
    pub fn nat_rule(&self, ipv6: bool) -> Option<&NatRule> {
        self.nat_rules.iter().find(|r| r.is_ipv6() == ipv6)
    }

    /// Returns the gateway address (with prefix) for one family.
    #[must_use]
    pub fn gateway(&self, ipv6: bool) -> Option<IpNet> {
        self.addresses
            .iter()
            .copied()
            .find(|a| matches!(a, IpNet::V6(_)) == ipv6)
    }

    /// Every host address already handed to a peer.
    #[must_use]
    pub fn peer_addresses(&self) -> HashSet<IpAddr> {
        self.peers
            .iter()
            .flat_map(|p| p.allowed_ips.iter().map(IpNet::addr))
            .collect()
    }

    /// Names of all named peers, in artifact order.
    #[must_use]
    pub fn peer_names(&self) -> Vec<&str> {
        self.peers.iter().filter_map(|p| p.name.as_deref()).collect()
    }
}

/// One `[Peer]` block of an interface artifact.
#[derive(Clone, Debug)]
pub struct PeerRecord {
    /// Client name from the marker comment, if present.
    pub name: Option<String>,
    /// The client's public key.
    pub public_key: PublicKey,
    /// Optional preshared key.
    pub preshared_key: Option<PresharedKey>,
    /// Host routes assigned to the client.
    pub allowed_ips: Vec<IpNet>,
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a full interface artifact.
#[must_use]
pub fn render_interface(record: &InterfaceRecord) -> String {
    let mut output = String::new();

    output.push_str("[Interface]\n");
    if !record.addresses.is_empty() {
        let _ = writeln!(output, "Address = {}", join(&record.addresses));
    }
    let _ = writeln!(output, "PrivateKey = {}", record.private_key.to_base64());
    if let Some(port) = record.listen_port {
        let _ = writeln!(output, "ListenPort = {port}");
    }
    for rule in &record.nat_rules {
        let _ = writeln!(output, "PostUp = {}", rule.line(NatAction::Apply));
        let _ = writeln!(output, "PostDown = {}", rule.line(NatAction::Revert));
    }

    for peer in &record.peers {
        output.push_str(&render_peer_block(peer));
    }

    output
}

/// Renders one peer block, ready to append to an interface artifact.
#[must_use]
pub fn render_peer_block(peer: &PeerRecord) -> String {
    let mut output = String::from("\n");
    if let Some(ref name) = peer.name {
        let _ = writeln!(output, "{PEER_NAME_MARKER} {name}");
    }
    output.push_str("[Peer]\n");
    let _ = writeln!(output, "PublicKey = {}", peer.public_key.to_base64());
    if let Some(ref psk) = peer.preshared_key {
        let _ = writeln!(output, "PresharedKey = {}", psk.to_base64());
    }
    if !peer.allowed_ips.is_empty() {
        let _ = writeln!(output, "AllowedIPs = {}", join(&peer.allowed_ips));
    }
    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Interface,
    Peer,
}

fn parse_error(line: usize, message: impl Into<String>) -> WireGuardError {
    WireGuardError::ParseError {
        line,
        message: message.into(),
    }
}

fn parse_cidr_list(value: &str, field: &str, line: usize) -> Result<Vec<IpNet>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<IpNet>()
                .map_err(|_| parse_error(line, format!("invalid {field}: {s}")))
        })
        .collect()
}

/// Parses an interface artifact.
///
/// # Errors
///
/// Returns `ParseError` for malformed lines, keys or CIDRs, and
/// `InvalidPublicAddress` for an SNAT rule whose public address is malformed.
pub fn parse_interface(text: &str) -> Result<InterfaceRecord> {
    let mut section = Section::None;
    let mut private_key: Option<PrivateKey> = None;
    let mut listen_port: Option<u16> = None;
    let mut addresses = Vec::new();
    let mut nat_rules = Vec::new();
    let mut peers = Vec::new();
    let mut current_peer: Option<ParsedPeer> = None;
    let mut pending_name: Option<String> = None;

    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        let line_number = index + 1;

        if let Some(name) = line.strip_prefix(PEER_NAME_MARKER) {
            pending_name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            if let Some(peer) = current_peer.take() {
                peers.push(peer.build(line_number)?);
            }
            section = match &line[1..line.len() - 1] {
                "Interface" => Section::Interface,
                "Peer" => {
                    current_peer = Some(ParsedPeer {
                        name: pending_name.take(),
                        ..ParsedPeer::default()
                    });
                    Section::Peer
                }
                other => return Err(parse_error(line_number, format!("unknown section: {other}"))),
            };
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(parse_error(line_number, format!("invalid line format: {line}")));
        };
        let key = key.trim();
        let value = value.trim();

        match section {
            Section::None => {
                return Err(parse_error(line_number, "key-value pair outside of section"));
            }
            Section::Interface => match key {
                "PrivateKey" => {
                    private_key = Some(
                        PrivateKey::from_base64(value)
                            .map_err(|_| parse_error(line_number, "invalid PrivateKey"))?,
                    );
                }
                "ListenPort" => {
                    listen_port = value.parse().ok();
                    if listen_port.is_none() {
                        warn!(line = line_number, value, "unreadable ListenPort");
                    }
                }
                "Address" => addresses.extend(parse_cidr_list(value, "Address", line_number)?),
                "PostUp" => {
                    if let Some((NatAction::Apply, rule)) = NatRule::parse(value)? {
                        nat_rules.push(rule);
                    }
                }
                _ => {}
            },
            Section::Peer => {
                if let Some(ref mut peer) = current_peer {
                    peer.parse_key(key, value, line_number)?;
                }
            }
        }
    }

    if let Some(peer) = current_peer {
        peers.push(peer.build(text.lines().count())?);
    }

    let private_key =
        private_key.ok_or_else(|| parse_error(0, "missing PrivateKey in [Interface] section"))?;

    Ok(InterfaceRecord {
        private_key,
        listen_port,
        addresses,
        nat_rules,
        peers,
    })
}

#[derive(Default)]
struct ParsedPeer {
    name: Option<String>,
    public_key: Option<PublicKey>,
    preshared_key: Option<PresharedKey>,
    allowed_ips: Vec<IpNet>,
}

impl ParsedPeer {
    fn parse_key(&mut self, key: &str, value: &str, line_number: usize) -> Result<()> {
        match key {
            "PublicKey" => {
                self.public_key = Some(
                    PublicKey::from_base64(value)
                        .map_err(|_| parse_error(line_number, "invalid PublicKey"))?,
                );
            }
            "PresharedKey" => {
                self.preshared_key = Some(
                    PresharedKey::from_base64(value)
                        .map_err(|_| parse_error(line_number, "invalid PresharedKey"))?,
                );
            }
            "AllowedIPs" => self
                .allowed_ips
                .extend(parse_cidr_list(value, "AllowedIPs", line_number)?),
            _ => {}
        }
        Ok(())
    }

    fn build(self, line_number: usize) -> Result<PeerRecord> {
        let public_key = self
            .public_key
            .ok_or_else(|| parse_error(line_number, "missing PublicKey in [Peer] section"))?;
        Ok(PeerRecord {
            name: self.name,
            public_key,
            preshared_key: self.preshared_key,
            allowed_ips: self.allowed_ips,
        })
    }
}

/// A self-contained client profile.
#[derive(Clone, Debug)]
pub struct ClientProfile {
    /// The client's private key.
    pub private_key: PrivateKey,
    /// Addresses assigned to the client.
    pub addresses: Vec<IpNet>,
    /// DNS servers pushed to the client.
    pub dns: Vec<IpAddr>,
    /// The interface's public key.
    pub server_public_key: PublicKey,
    /// Preshared key shared with the interface's peer block.
    pub preshared_key: PresharedKey,
    /// Public address and port of the interface.
    pub endpoint: Endpoint,
    /// Routes sent through the tunnel.
    pub allowed_ips: Vec<IpNet>,
    /// Keep-alive interval in seconds.
    pub persistent_keepalive: Option<u16>,
}

/// Renders a client profile.
#[must_use]
pub fn render_client(profile: &ClientProfile) -> String {
    let mut output = String::from("[Interface]\n");
    let _ = writeln!(output, "PrivateKey = {}", profile.private_key.to_base64());
    let _ = writeln!(output, "Address = {}", join(&profile.addresses));
    if !profile.dns.is_empty() {
        let _ = writeln!(output, "DNS = {}", join(&profile.dns));
    }

    output.push_str("\n[Peer]\n");
    let _ = writeln!(output, "PublicKey = {}", profile.server_public_key.to_base64());
    let _ = writeln!(output, "PresharedKey = {}", profile.preshared_key.to_base64());
    let _ = writeln!(output, "Endpoint = {}", profile.endpoint);
    let _ = writeln!(output, "AllowedIPs = {}", join(&profile.allowed_ips));
    if let Some(keepalive) = profile.persistent_keepalive {
        let _ = writeln!(output, "PersistentKeepalive = {keepalive}");
    }
    output
}
