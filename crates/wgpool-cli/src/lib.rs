//! # wgpool-cli
//!
//! Command-line front end for WireGuard interface and client provisioning.
//!
//! Provides commands for:
//! - Provisioning interfaces from the public address pools
//! - Adding clients to existing interfaces
//! - Inspecting interfaces and pool usage
//! - Persisting firewall rules
//!
//! Every command runs against a [`wgpool_provision::Provisioner`], so the
//! same code drives the real host and the in-memory fakes used in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, ClientCommands, Commands, Format, InterfaceCommands, PoolCommands};
pub use error::CliError;
pub use output::OutputFormat;
