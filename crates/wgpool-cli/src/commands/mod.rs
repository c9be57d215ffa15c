//! CLI command implementations.
//!
//! Each submodule implements a specific CLI command:
//! - [`interface`] - Interface provisioning and inventory
//! - [`client`] - Client provisioning
//! - [`pool`] - Public address pool status
//! - [`rules`] - Firewall rule persistence

pub mod client;
pub mod interface;
pub mod pool;
pub mod rules;

pub use client::ClientCommand;
pub use interface::InterfaceCommand;
pub use pool::PoolCommand;
pub use rules::SaveRulesCommand;
