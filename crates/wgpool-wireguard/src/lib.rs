//! WireGuard key material and configuration artifacts for wgpool.
//!
//! Provides Curve25519 key types, the SNAT rule line grammar, and the
//! renderer/parser pair for interface and client artifacts.

pub mod config;
pub mod error;
mod keys;
pub mod types;

pub use config::{
    parse_interface, render_client, render_interface, render_peer_block, ClientProfile,
    InterfaceRecord, PeerRecord,
};
pub use error::{Result, WireGuardError};
pub use keys::{KeyPair, PrivateKey, PublicKey, KEY_SIZE};
pub use types::{is_dotted_quad, Endpoint, NatAction, NatRule, PresharedKey};
