//! Error types for provisioning.

use std::path::PathBuf;

use thiserror::Error;
use wgpool_network::NetworkError;
use wgpool_wireguard::WireGuardError;

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors raised while provisioning interfaces and clients.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// An interface artifact with this name already exists.
    #[error("interface {0} already exists")]
    InterfaceExists(String),

    /// No interface artifact with this name exists.
    #[error("interface {0} not found")]
    InterfaceNotFound(String),

    /// A client with this name already exists on the interface.
    #[error("client {client} already exists on interface {interface}")]
    ClientExists {
        /// Interface name.
        interface: String,
        /// Client name.
        client: String,
    },

    /// The host has no default route, so no egress interface for SNAT.
    #[error("no default route found; cannot determine egress interface")]
    NoDefaultRoute,

    /// Bringing the tunnel service up or applying new peers failed.
    #[error("failed to activate interface {interface}: {detail}")]
    ServiceActivationFailed {
        /// Interface name.
        interface: String,
        /// What the service manager reported.
        detail: String,
    },

    /// The IPv4 SNAT address in an artifact is not a dotted quad.
    #[error("{artifact}: invalid public address {value:?}")]
    InvalidPublicAddress {
        /// Interface artifact.
        artifact: PathBuf,
        /// Offending text.
        value: String,
    },

    /// The artifact carries no SNAT rule to recover a public address from.
    #[error("{0}: no public address found")]
    MissingPublicAddress(PathBuf),

    /// The artifact carries no readable listen port.
    #[error("{0}: no listen port found")]
    MissingPort(PathBuf),

    /// The artifact carries no SNAT subnet.
    #[error("{0}: no interface subnet found")]
    MissingSubnet(PathBuf),

    /// An interface or client name is not acceptable.
    #[error("illegal name {name:?}: {reason}")]
    IllegalName {
        /// Name as given.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A host command failed to run or exited unsuccessfully.
    #[error("command `{command}` failed: {detail}")]
    Command {
        /// Command line.
        command: String,
        /// Exit status or stderr.
        detail: String,
    },

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// An artifact could not be parsed.
    #[error("{path}: {source}")]
    Artifact {
        /// Artifact file.
        path: PathBuf,
        /// Parse error.
        #[source]
        source: WireGuardError,
    },

    /// Allocation error.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Key or artifact model error.
    #[error(transparent)]
    WireGuard(#[from] WireGuardError),

    /// Filesystem error.
    #[error("{path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn illegal_name(name: &str, reason: &'static str) -> Self {
        Self::IllegalName {
            name: name.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_failure_names_interface() {
        let err = ProvisionError::ServiceActivationFailed {
            interface: "wg0".to_string(),
            detail: "exit status: 1".to_string(),
        };
        assert_eq!(err.to_string(), "failed to activate interface wg0: exit status: 1");
    }

    #[test]
    fn network_errors_pass_through() {
        let err: ProvisionError = NetworkError::PortsExhausted { base: 51820 }.into();
        assert_eq!(err.to_string(), "no free UDP port at or above 51820");
    }
}
