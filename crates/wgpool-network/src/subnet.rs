//! Subnet arithmetic over CIDR text.
//!
//! The lowest usable host of every interface subnet is the interface's own
//! gateway address. Client allocation starts one above it, so the gateway is
//! never handed out.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Family, NetworkError, Result};

/// Literal IPv4 CIDR shape `d.d.d.d/n`.
static IPV4_CIDR_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}/\d{1,2}$").unwrap_or_else(|_| unreachable!())
});

/// Validates subnet text and reports its family.
///
/// # Errors
///
/// `InvalidFormat` for empty input, input starting with `-`, or IPv4 text
/// not shaped like `d.d.d.d/n`; `InvalidSubnet` if the CIDR does not parse.
pub fn validate_subnet(subnet: &str) -> Result<Family> {
    parse_subnet(subnet).map(|net| match net {
        IpNet::V4(_) => Family::V4,
        IpNet::V6(_) => Family::V6,
    })
}

/// Validates subnet text and returns it in network form.
///
/// Host bits are dropped: `10.0.0.5/24` becomes `10.0.0.0/24`.
///
/// # Errors
///
/// Same as [`validate_subnet`].
pub fn parse_subnet(subnet: &str) -> Result<IpNet> {
    if subnet.is_empty() {
        return Err(NetworkError::InvalidFormat {
            input: String::new(),
            expected: "a subnet in CIDR notation",
        });
    }
    if subnet.starts_with('-') {
        return Err(NetworkError::InvalidFormat {
            input: subnet.to_string(),
            expected: "a subnet, not a flag",
        });
    }

    if subnet.contains(':') {
        return subnet
            .parse::<Ipv6Net>()
            .map(|net| IpNet::V6(net.trunc()))
            .map_err(|e| NetworkError::invalid_subnet(subnet, e.to_string()));
    }

    if !IPV4_CIDR_SHAPE.is_match(subnet) {
        return Err(NetworkError::InvalidFormat {
            input: subnet.to_string(),
            expected: "d.d.d.d/n",
        });
    }
    subnet
        .parse::<Ipv4Net>()
        .map(|net| IpNet::V4(net.trunc()))
        .map_err(|e| NetworkError::invalid_subnet(subnet, e.to_string()))
}

/// First and last host of an IPv4 subnet, excluding network and broadcast.
///
/// # Errors
///
/// `InvalidSubnet` for `/31` and `/32`, which leave no room for a gateway
/// plus clients.
pub fn usable_range(subnet: &Ipv4Net) -> Result<(Ipv4Addr, Ipv4Addr)> {
    if subnet.prefix_len() > 30 {
        return Err(NetworkError::invalid_subnet(
            &subnet.to_string(),
            "no usable host range",
        ));
    }
    let first = u32::from(subnet.network()) + 1;
    let last = u32::from(subnet.broadcast()) - 1;
    Ok((Ipv4Addr::from(first), Ipv4Addr::from(last)))
}

/// Canonical compressed network address of an IPv6 block (`fd00:1234::`).
#[must_use]
pub fn compressed_address(subnet: &Ipv6Net) -> Ipv6Addr {
    subnet.network()
}

/// Gateway of an IPv6 block: the first address above [`compressed_address`].
///
/// # Errors
///
/// `InvalidSubnet` for `/127` and `/128`.
pub fn ipv6_gateway(subnet: &Ipv6Net) -> Result<Ipv6Addr> {
    if subnet.prefix_len() > 126 {
        return Err(NetworkError::invalid_subnet(
            &subnet.to_string(),
            "no usable host range",
        ));
    }
    Ok(Ipv6Addr::from(u128::from(compressed_address(subnet)) + 1))
}

/// Gateway of either family, carrying the subnet's prefix length.
///
/// # Errors
///
/// `InvalidSubnet` if the subnet has no usable hosts.
pub fn gateway(subnet: &IpNet) -> Result<IpNet> {
    let gateway = match subnet {
        IpNet::V4(net) => {
            let (first, _) = usable_range(net)?;
            IpNet::V4(Ipv4Net::new(first, net.prefix_len()).map_err(|e| {
                NetworkError::invalid_subnet(&net.to_string(), e.to_string())
            })?)
        }
        IpNet::V6(net) => IpNet::V6(Ipv6Net::new(ipv6_gateway(net)?, net.prefix_len()).map_err(
            |e| NetworkError::invalid_subnet(&net.to_string(), e.to_string()),
        )?),
    };
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("10.10.0.0/24", Family::V4 ; "ipv4")]
    #[test_case("fd00:1234::/64", Family::V6 ; "ipv6")]
    #[test_case("192.168.7.0/30", Family::V4 ; "small ipv4")]
    fn validate_accepts(input: &str, family: Family) {
        assert_eq!(validate_subnet(input).expect("valid"), family);
    }

    #[test_case("-10.10.0.0/24" ; "flag like")]
    #[test_case("10.10.0/24" ; "three octets")]
    #[test_case("10.10.0.0" ; "no prefix")]
    #[test_case("10.10.0.0/24 " ; "trailing space")]
    fn validate_rejects_format(input: &str) {
        assert!(matches!(
            validate_subnet(input),
            Err(NetworkError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(matches!(
            validate_subnet(""),
            Err(NetworkError::InvalidFormat { .. })
        ));
    }

    #[test_case("300.10.0.0/24" ; "octet out of range")]
    #[test_case("10.10.0.0/33" ; "prefix out of range")]
    #[test_case("fd00:zz::/64" ; "bad ipv6")]
    #[test_case("fd00::/129" ; "ipv6 prefix out of range")]
    fn validate_rejects_unparsable(input: &str) {
        assert!(matches!(
            validate_subnet(input),
            Err(NetworkError::InvalidSubnet { .. })
        ));
    }

    #[test]
    fn parse_truncates_host_bits() {
        let net = parse_subnet("10.0.0.5/24").expect("valid");
        assert_eq!(net.to_string(), "10.0.0.0/24");
    }

    #[test]
    fn usable_range_slash_29() {
        let net: Ipv4Net = "10.0.0.0/29".parse().expect("cidr");
        let (first, last) = usable_range(&net).expect("range");
        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(last, Ipv4Addr::new(10, 0, 0, 6));
    }

    #[test]
    fn usable_range_slash_30_has_two_hosts() {
        let net: Ipv4Net = "10.0.0.0/30".parse().expect("cidr");
        assert_eq!(
            usable_range(&net).expect("range"),
            (Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
        );
    }

    #[test_case("10.0.0.0/31")]
    #[test_case("10.0.0.1/32")]
    fn usable_range_rejects_tiny(input: &str) {
        let net: Ipv4Net = input.parse().expect("cidr");
        assert!(usable_range(&net).is_err());
    }

    #[test]
    fn compressed_address_is_network() {
        let net: Ipv6Net = "fd00:1234:0000:0000::/64".parse().expect("cidr");
        assert_eq!(compressed_address(&net).to_string(), "fd00:1234::");
    }

    #[test]
    fn gateway_is_first_host_with_prefix() {
        let v4 = parse_subnet("10.10.0.0/24").expect("valid");
        let v6 = parse_subnet("fd00:1234::/64").expect("valid");
        assert_eq!(gateway(&v4).expect("gateway").to_string(), "10.10.0.1/24");
        assert_eq!(gateway(&v6).expect("gateway").to_string(), "fd00:1234::1/64");
    }

    #[test]
    fn ipv6_gateway_rejects_tiny() {
        let net: Ipv6Net = "fd00::/127".parse().expect("cidr");
        assert!(ipv6_gateway(&net).is_err());
    }
}
