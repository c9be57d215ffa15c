//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wgpool/config.toml";

/// wgpool - WireGuard interfaces and clients from a public address pool.
#[derive(Parser, Debug, Clone)]
#[command(name = "wgpool")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(short, long, env = "WGPOOL_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Tunnel interface management.
    Interface {
        /// Interface subcommand to execute.
        #[command(subcommand)]
        command: InterfaceCommands,
    },

    /// Client management.
    Client {
        /// Client subcommand to execute.
        #[command(subcommand)]
        command: ClientCommands,
    },

    /// Public address pools.
    Pool {
        /// Pool subcommand to execute.
        #[command(subcommand)]
        command: PoolCommands,
    },

    /// Save the live firewall rules so SNAT survives a reboot.
    SaveRules,
}

/// Interface subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum InterfaceCommands {
    /// Create an interface, commit public addresses and start its service.
    Add(InterfaceAddArgs),

    /// List provisioned interfaces.
    List,

    /// Show one interface.
    Show {
        /// Interface name.
        name: String,
    },
}

/// Arguments for `interface add`.
#[derive(Args, Debug, Clone)]
pub struct InterfaceAddArgs {
    /// IPv4 subnet for the interface, e.g. 10.8.0.0/24.
    #[arg(long = "subnet4")]
    pub subnet_v4: String,

    /// IPv6 subnet; enables IPv6 when given.
    #[arg(long = "subnet6")]
    pub subnet_v6: Option<String>,

    /// Interface name; derived from the configured prefix when omitted.
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Client subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum ClientCommands {
    /// Add a client to an interface and write its profile.
    Add(ClientAddArgs),
}

/// Arguments for `client add`.
#[derive(Args, Debug, Clone)]
pub struct ClientAddArgs {
    /// Interface to attach the client to.
    pub interface: String,

    /// Client name; `client<N>` when omitted.
    #[arg(short, long)]
    pub name: Option<String>,
}

/// Pool subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum PoolCommands {
    /// Show candidate, used and available counts per family.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_interface_add() {
        let cli = Cli::parse_from([
            "wgpool", "interface", "add",
            "--subnet4", "10.8.0.0/24",
            "--subnet6", "fd00:8::/64",
            "--name", "office",
        ]);
        match cli.command {
            Commands::Interface { command: InterfaceCommands::Add(args) } => {
                assert_eq!(args.subnet_v4, "10.8.0.0/24");
                assert_eq!(args.subnet_v6.as_deref(), Some("fd00:8::/64"));
                assert_eq!(args.name.as_deref(), Some("office"));
            }
            _ => panic!("expected interface add command"),
        }
    }

    #[test]
    fn parse_interface_add_requires_subnet4() {
        assert!(Cli::try_parse_from(["wgpool", "interface", "add"]).is_err());
    }

    #[test]
    fn parse_interface_show() {
        let cli = Cli::parse_from(["wgpool", "interface", "show", "wg0"]);
        match cli.command {
            Commands::Interface { command: InterfaceCommands::Show { name } } => {
                assert_eq!(name, "wg0");
            }
            _ => panic!("expected interface show command"),
        }
    }

    #[test]
    fn parse_client_add_with_default_name() {
        let cli = Cli::parse_from(["wgpool", "client", "add", "wg0"]);
        match cli.command {
            Commands::Client { command: ClientCommands::Add(args) } => {
                assert_eq!(args.interface, "wg0");
                assert!(args.name.is_none());
            }
            _ => panic!("expected client add command"),
        }
    }

    #[test]
    fn parse_pool_status_and_save_rules() {
        let cli = Cli::parse_from(["wgpool", "pool", "status"]);
        assert!(matches!(cli.command, Commands::Pool { command: PoolCommands::Status }));

        let cli = Cli::parse_from(["wgpool", "save-rules"]);
        assert!(matches!(cli.command, Commands::SaveRules));
    }

    #[test]
    fn global_flags() {
        let cli = Cli::parse_from([
            "wgpool", "--format", "json", "--config", "/tmp/wgpool.toml", "pool", "status",
        ]);
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.config, PathBuf::from("/tmp/wgpool.toml"));
    }
}
