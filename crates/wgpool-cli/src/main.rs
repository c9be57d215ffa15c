//! wgpool CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use wgpool_cli::cli::{Cli, Commands};
use wgpool_cli::commands::{ClientCommand, InterfaceCommand, PoolCommand, SaveRulesCommand};
use wgpool_cli::output::OutputFormat;
use wgpool_provision::{ProvisionConfig, Provisioner};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wgpool=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), wgpool_cli::CliError> {
    debug!(config = %cli.config.display(), "loading configuration");
    let config = ProvisionConfig::load(Some(&cli.config))?;
    let provisioner = Provisioner::system(config);
    let format = OutputFormat::new(cli.format);
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Interface { command } => {
            let cmd = InterfaceCommand::new(&provisioner);
            cmd.execute(&mut stdout, &format, &command)?;
        }
        Commands::Client { command } => {
            let cmd = ClientCommand::new(&provisioner);
            cmd.execute(&mut stdout, &format, &command)?;
        }
        Commands::Pool { command } => {
            let cmd = PoolCommand::new(&provisioner);
            cmd.execute(&mut stdout, &format, &command)?;
        }
        Commands::SaveRules => {
            let cmd = SaveRulesCommand::new(&provisioner);
            cmd.execute(&mut stdout, &format)?;
        }
    }

    Ok(())
}
