//! Subnet arithmetic, public address pools and port selection for wgpool.
//!
//! Everything here is a pure function or a small flat-file store; the
//! provisioning crate composes these into interface and client sagas.

#![forbid(unsafe_code)]

pub mod client_addr;
pub mod error;
pub mod pool;
pub mod port;
pub mod subnet;

pub use client_addr::{next_client_address, next_client_v4, next_client_v6};
pub use error::{Family, NetworkError, Result};
pub use pool::{AddressPool, FilePoolStore, PoolPaths, PoolStatus, PoolStore};
pub use port::{next_free_port, DEFAULT_BASE_PORT};
pub use subnet::{compressed_address, gateway, parse_subnet, usable_range, validate_subnet};
