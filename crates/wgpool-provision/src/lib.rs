//! Interface and client provisioning for wgpool.
//!
//! This crate ties the allocation primitives of `wgpool-network` and the
//! artifact model of `wgpool-wireguard` to the host:
//!
//! - **Interfaces**: commit public addresses, choose a port, write the
//!   interface artifact with SNAT rules and start the tunnel service
//! - **Clients**: recover interface state from its artifact, pick client
//!   addresses, append a peer block, write a client profile and apply it
//! - **Rollback**: both sequences run as sagas whose durable steps are
//!   compensated in reverse when a later step fails
//!
//! # Example
//!
//! ```rust,no_run
//! use wgpool_provision::{ClientRequest, InterfaceRequest, ProvisionConfig, Provisioner};
//!
//! let provisioner = Provisioner::system(ProvisionConfig::default());
//! let interface = provisioner
//!     .interfaces()
//!     .provision(&InterfaceRequest::new("10.8.0.0/24").with_subnet_v6("fd00:8::/64"))?;
//! let client = provisioner
//!     .clients()
//!     .provision(&ClientRequest::new(&interface.name).with_name("laptop"))?;
//! println!("{}", client.artifact.display());
//! # Ok::<(), wgpool_provision::ProvisionError>(())
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod interface;
pub mod naming;
pub mod provisioner;
pub mod saga;
pub mod store;

pub use client::{ClientProvisioner, ClientRequest, ProvisionedClient, RecoveredInterface};
pub use config::{FirewallConfig, ProvisionConfig};
pub use error::{ProvisionError, Result};
pub use host::{FakeHost, HostCall, HostOps, SystemHost};
pub use interface::{InterfaceProvisioner, InterfaceRequest, ProvisionedInterface};
pub use provisioner::{InterfaceSummary, Provisioner};
pub use saga::{CompensationFailure, Saga};
pub use store::{ArtifactStore, FileArtifactStore};
