//! Client address generation inside an interface subnet.
//!
//! The caller passes the addresses already assigned on the interface,
//! recovered fresh from its artifact on every call. IPv4 is an ascending scan
//! from one above the gateway. IPv6 blocks are too large to scan, so a
//! bounded number of random host suffixes is tried first; after that a
//! bounded ascending scan from one above the gateway runs before giving up.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use rand::Rng;
use tracing::{debug, warn};

use crate::error::{NetworkError, Result};
use crate::subnet::{ipv6_gateway, usable_range};

/// Random suffixes tried for an IPv6 client before the ascending scan.
pub const IPV6_RANDOM_ATTEMPTS: usize = 10;

/// Hosts above the gateway examined by the IPv6 ascending scan.
pub const IPV6_SCAN_LIMIT: u128 = 65_536;

/// Smallest host in `(gateway, last usable]` not in `existing`.
///
/// # Errors
///
/// `ClientAddressExhausted` when every such host is taken; `InvalidSubnet`
/// if the subnet has no usable hosts.
pub fn next_client_v4(subnet: &Ipv4Net, existing: &HashSet<IpAddr>) -> Result<Ipv4Addr> {
    let (gateway, last) = usable_range(subnet)?;
    let address = (u32::from(gateway) + 1..=u32::from(last))
        .map(Ipv4Addr::from)
        .find(|ip| !existing.contains(&IpAddr::V4(*ip)))
        .ok_or_else(|| NetworkError::ClientAddressExhausted {
            subnet: subnet.to_string(),
        })?;
    debug!(%subnet, %address, "generated IPv4 client address");
    Ok(address)
}

/// Picks an unused IPv6 host in `subnet`, never the network or gateway address.
///
/// # Errors
///
/// `ClientAddressExhausted` if neither the random attempts nor the bounded
/// scan find a free host. Capacity may remain in very large blocks, so
/// callers should let the operator retry.
pub fn next_client_v6<R: Rng>(
    subnet: &Ipv6Net,
    existing: &HashSet<IpAddr>,
    rng: &mut R,
) -> Result<Ipv6Addr> {
    let gateway = u128::from(ipv6_gateway(subnet)?);
    let network = u128::from(subnet.network());
    let host_bits = 128 - u32::from(subnet.prefix_len());
    let host_mask = if host_bits == 128 {
        u128::MAX
    } else {
        (1u128 << host_bits) - 1
    };
    let is_free = |candidate: u128| !existing.contains(&IpAddr::V6(Ipv6Addr::from(candidate)));

    for attempt in 1..=IPV6_RANDOM_ATTEMPTS {
        let suffix = rng.gen_range(0..=host_mask);
        let candidate = network | suffix;
        if candidate > gateway && is_free(candidate) {
            let address = Ipv6Addr::from(candidate);
            debug!(%subnet, %address, attempt, "generated IPv6 client address");
            return Ok(address);
        }
    }

    let last = network | host_mask;
    let scan_end = gateway.saturating_add(IPV6_SCAN_LIMIT).min(last);
    warn!(
        %subnet,
        attempts = IPV6_RANDOM_ATTEMPTS,
        "random IPv6 suffixes collided, scanning sequentially"
    );
    (gateway + 1..=scan_end)
        .find(|candidate| is_free(*candidate))
        .map(Ipv6Addr::from)
        .ok_or_else(|| NetworkError::ClientAddressExhausted {
            subnet: subnet.to_string(),
        })
}

/// Family-dispatching wrapper over [`next_client_v4`] and [`next_client_v6`].
///
/// # Errors
///
/// Same as the family-specific functions.
pub fn next_client_address<R: Rng>(
    subnet: &IpNet,
    existing: &HashSet<IpAddr>,
    rng: &mut R,
) -> Result<IpAddr> {
    match subnet {
        IpNet::V4(net) => next_client_v4(net, existing).map(IpAddr::V4),
        IpNet::V6(net) => next_client_v6(net, existing, rng).map(IpAddr::V6),
    }
}
