//! Error types for subnet, pool and port operations.

use std::net::IpAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Address family of a pool or subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Family {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

impl Family {
    /// Returns the family of an address.
    #[must_use]
    pub const fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::V4 => write!(f, "IPv4"),
            Self::V6 => write!(f, "IPv6"),
        }
    }
}

/// Errors raised by the allocation primitives.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The subnet did not parse, or has no usable hosts.
    #[error("invalid subnet {subnet:?}: {reason}")]
    InvalidSubnet {
        /// Input as given.
        subnet: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The input does not have the expected textual shape.
    #[error("invalid format {input:?}: expected {expected}")]
    InvalidFormat {
        /// Input as given.
        input: String,
        /// Description of the expected shape.
        expected: &'static str,
    },

    /// Every address in a public pool is in the used ledger.
    #[error("{family} public address pool exhausted ({pool})")]
    PoolExhausted {
        /// Family of the pool.
        family: Family,
        /// Pool file.
        pool: PathBuf,
    },

    /// No free client address remains in an interface subnet.
    #[error("no client address available in {subnet}")]
    ClientAddressExhausted {
        /// The subnet that ran out.
        subnet: String,
    },

    /// Every port from the base up to 65535 is taken.
    #[error("no free UDP port at or above {base}")]
    PortsExhausted {
        /// The base port the scan started from.
        base: u16,
    },

    /// A pool or ledger line is not an address of the expected family.
    #[error("{path}:{line}: not a valid {family} address: {value:?}")]
    InvalidPoolEntry {
        /// File containing the entry.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Expected family.
        family: Family,
        /// Offending text.
        value: String,
    },

    /// An address was handed to a pool of the other family.
    #[error("{ip} does not belong to the {family} pool")]
    FamilyMismatch {
        /// The address.
        ip: IpAddr,
        /// The pool's family.
        family: Family,
    },

    /// Committing an address that is not a pool candidate.
    #[error("{ip} is not a candidate in {pool}")]
    NotInPool {
        /// The address.
        ip: IpAddr,
        /// Pool file.
        pool: PathBuf,
    },

    /// Committing an address that the ledger already holds.
    #[error("{ip} is already recorded in {ledger}")]
    AlreadyCommitted {
        /// The address.
        ip: IpAddr,
        /// Used ledger file.
        ledger: PathBuf,
    },

    /// Reading or writing a pool file failed.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl NetworkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_subnet(subnet: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSubnet {
            subnet: subnet.to_string(),
            reason: reason.into(),
        }
    }
}
