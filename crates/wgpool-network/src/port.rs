//! UDP listen port selection.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{NetworkError, Result};

/// Conventional WireGuard port; the scan starts here unless configured.
pub const DEFAULT_BASE_PORT: u16 = 51820;

/// Returns the first port at or above `base` that is not in `in_use`.
///
/// # Errors
///
/// `PortsExhausted` if every port from `base` through 65535 is taken.
pub fn next_free_port(base: u16, in_use: &HashSet<u16>) -> Result<u16> {
    let port = (base..=u16::MAX)
        .find(|port| !in_use.contains(port))
        .ok_or(NetworkError::PortsExhausted { base })?;
    debug!(base, port, "selected listen port");
    Ok(port)
}
