//! Value types shared by the interface and client artifacts.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use ipnet::IpNet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireGuardError};
use crate::keys::KEY_SIZE;

/// Token shape of an SNAT rule: tool, action, subnet, egress, public address.
static NAT_RULE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+) -t nat -([AD]) POSTROUTING -s (\S+) -o (\S+) -j SNAT --to-source (\S+)$")
        .unwrap_or_else(|_| unreachable!())
});

/// Strict dotted quad: four decimal octets, no leading zeros, nothing else.
static DOTTED_QUAD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)(\.(25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)){3}$")
        .unwrap_or_else(|_| unreachable!())
});

/// Returns true if `s` is a dotted-quad IPv4 literal.
#[must_use]
pub fn is_dotted_quad(s: &str) -> bool {
    DOTTED_QUAD_REGEX.is_match(s)
}

/// A preshared key mixed into the handshake of one peer.
#[derive(Clone)]
pub struct PresharedKey([u8; KEY_SIZE]);

impl PresharedKey {
    /// Generates a new random preshared key from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        use rand::rngs::OsRng;
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Encodes the key as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Decodes a preshared key from base64.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or has the wrong length.
    pub fn from_base64(s: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD.decode(s.trim())?;
        <[u8; KEY_SIZE]>::try_from(bytes.as_slice())
            .map(Self)
            .map_err(|_| WireGuardError::InvalidKeyLength(bytes.len()))
    }
}

impl fmt::Debug for PresharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedKey").field("key", &"[REDACTED]").finish()
    }
}

impl PartialEq for PresharedKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PresharedKey {}

/// The address a client dials to reach its interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint {
    address: SocketAddr,
}

impl Endpoint {
    /// Creates an endpoint from an IP address and port.
    #[must_use]
    pub fn from_ip_port(ip: IpAddr, port: u16) -> Self {
        Self {
            address: SocketAddr::new(ip, port),
        }
    }

    /// Returns the IP address.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }

    /// Returns the port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.address.port()
    }
}

impl FromStr for Endpoint {
    type Err = WireGuardError;

    fn from_str(s: &str) -> Result<Self> {
        let address = s
            .parse::<SocketAddr>()
            .map_err(|e| WireGuardError::InvalidEndpoint(format!("{s}: {e}")))?;
        Ok(Self { address })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// One SNAT rule translating an internal subnet to a public address on egress.
///
/// Rendered as an apply (`-A`) line and a mirrored revert (`-D`) line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatRule {
    /// Firewall tool, e.g. `iptables` or `ip6tables`.
    pub tool: String,
    /// Internal subnet in network form.
    pub subnet: IpNet,
    /// Egress interface.
    pub egress: String,
    /// Public source address.
    pub public_address: IpAddr,
}

/// Whether a rule line adds or deletes the rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatAction {
    /// `-A`
    Apply,
    /// `-D`
    Revert,
}

impl NatRule {
    /// Creates a rule; the subnet is truncated to its network address.
    #[must_use]
    pub fn new(tool: &str, subnet: IpNet, egress: &str, public_address: IpAddr) -> Self {
        Self {
            tool: tool.to_string(),
            subnet: subnet.trunc(),
            egress: egress.to_string(),
            public_address,
        }
    }

    /// Returns true if this rule translates IPv6 traffic.
    #[must_use]
    pub fn is_ipv6(&self) -> bool {
        matches!(self.subnet, IpNet::V6(_))
    }

    /// Renders the rule line for the given action.
    #[must_use]
    pub fn line(&self, action: NatAction) -> String {
        let flag = match action {
            NatAction::Apply => 'A',
            NatAction::Revert => 'D',
        };
        format!(
            "{} -t nat -{flag} POSTROUTING -s {} -o {} -j SNAT --to-source {}",
            self.tool, self.subnet, self.egress, self.public_address
        )
    }

    /// Parses a rule line.
    ///
    /// Returns `Ok(None)` if the line does not have the SNAT rule shape at all.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPublicAddress` if the shape matches but the public
    /// address is malformed (an IPv4 rule requires a strict dotted quad), and
    /// `InvalidCidr` if the subnet does not parse.
    pub fn parse(line: &str) -> Result<Option<(NatAction, Self)>> {
        let Some(caps) = NAT_RULE_REGEX.captures(line.trim()) else {
            return Ok(None);
        };
        let action = if &caps[2] == "A" {
            NatAction::Apply
        } else {
            NatAction::Revert
        };
        let subnet = caps[3]
            .parse::<IpNet>()
            .map_err(|e| WireGuardError::InvalidCidr(format!("{}: {e}", &caps[3])))?;
        let raw_public = &caps[5];
        let public_address = match subnet {
            IpNet::V4(_) if is_dotted_quad(raw_public) => raw_public
                .parse::<IpAddr>()
                .map_err(|_| WireGuardError::InvalidPublicAddress(raw_public.to_string()))?,
            IpNet::V6(_) => match raw_public.parse::<IpAddr>() {
                Ok(ip @ IpAddr::V6(_)) => ip,
                _ => return Err(WireGuardError::InvalidPublicAddress(raw_public.to_string())),
            },
            IpNet::V4(_) => {
                return Err(WireGuardError::InvalidPublicAddress(raw_public.to_string()));
            }
        };
        Ok(Some((
            action,
            Self::new(&caps[1], subnet, &caps[4], public_address),
        )))
    }
}
