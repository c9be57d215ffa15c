//! Output formatting for CLI commands.
//!
//! Supports table (human-readable) and JSON output formats.

use std::io::Write;

use serde::Serialize;
use wgpool_network::PoolStatus;
use wgpool_provision::{InterfaceSummary, ProvisionedClient, ProvisionedInterface};

use crate::cli::Format;
use crate::error::CliError;

/// Output formatter that handles both table and JSON output.
#[derive(Debug, Clone)]
pub struct OutputFormat {
    format: Format,
}

impl OutputFormat {
    /// Create a new output formatter.
    #[must_use]
    pub const fn new(format: Format) -> Self {
        Self { format }
    }

    /// Write a serializable value to the output.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write<W, T>(&self, writer: &mut W, value: &T) -> Result<(), CliError>
    where
        W: Write,
        T: Serialize + TableDisplay,
    {
        match self.format {
            Format::Json => {
                serde_json::to_writer_pretty(&mut *writer, value)
                    .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
                writeln!(writer)?;
            }
            Format::Table => {
                value.write_table(writer)?;
            }
        }
        Ok(())
    }

    /// Write a serializable value to a string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_string<T>(&self, value: &T) -> Result<String, CliError>
    where
        T: Serialize + TableDisplay,
    {
        let mut buf = Vec::new();
        self.write(&mut buf, value)?;
        String::from_utf8(buf).map_err(|e| CliError::Format(format!("UTF-8 error: {e}")))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::new(Format::Table)
    }
}

/// Trait for types that can be displayed as a table.
pub trait TableDisplay {
    /// Write the value as a human-readable table.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError>;
}

fn join<T: ToString>(items: &[T]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl TableDisplay for ProvisionedInterface {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Interface {}", self.name)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Listen Port:      {}", self.listen_port)?;
        writeln!(writer, "Public Key:       {}", self.public_key)?;
        writeln!(writer, "Egress:           {}", self.egress)?;
        writeln!(writer)?;
        writeln!(writer, "IPv4")?;
        writeln!(writer, "  Public:         {}", self.public_v4)?;
        writeln!(writer, "  Subnet:         {}", self.subnet_v4)?;
        writeln!(writer, "  Gateway:        {}", self.gateway_v4)?;
        if let (Some(public), Some(subnet), Some(gateway)) =
            (self.public_v6, self.subnet_v6, self.gateway_v6)
        {
            writeln!(writer)?;
            writeln!(writer, "IPv6")?;
            writeln!(writer, "  Public:         {public}")?;
            writeln!(writer, "  Subnet:         {subnet}")?;
            writeln!(writer, "  Gateway:        {gateway}")?;
        }
        writeln!(writer)?;
        writeln!(writer, "Artifact:         {}", self.artifact.display())?;
        Ok(())
    }
}

impl TableDisplay for ProvisionedClient {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "✓ Client {} added to {}", self.name, self.interface)?;
        writeln!(writer, "  Addresses:      {}", join(&self.addresses))?;
        writeln!(writer, "  Endpoint:       {}", self.endpoint)?;
        writeln!(writer, "  Public Key:     {}", self.public_key)?;
        writeln!(writer, "  Profile:        {}", self.artifact.display())?;
        Ok(())
    }
}

impl TableDisplay for InterfaceSummary {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(writer, "Interface {}", self.name)?;
        writeln!(writer, "══════════════════════════════════")?;
        writeln!(writer, "Listen Port:      {}", self.listen_port)?;
        writeln!(writer, "Public:           {}", join(&self.public_addresses))?;
        writeln!(writer, "Subnets:          {}", join(&self.subnets))?;
        writeln!(writer, "Artifact:         {}", self.artifact.display())?;
        writeln!(writer)?;
        writeln!(writer, "Peers ({})", self.peer_count)?;
        for peer in &self.peers {
            writeln!(writer, "  {peer}")?;
        }
        Ok(())
    }
}

/// All provisioned interfaces.
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceList {
    /// One summary per interface artifact.
    pub interfaces: Vec<InterfaceSummary>,
}

impl TableDisplay for InterfaceList {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.interfaces.is_empty() {
            writeln!(writer, "No interfaces provisioned.")?;
            return Ok(());
        }

        writeln!(
            writer,
            "{:<16} {:>6} {:<32} {:<24} {:>5}",
            "NAME", "PORT", "PUBLIC", "SUBNETS", "PEERS"
        )?;
        for summary in &self.interfaces {
            writeln!(
                writer,
                "{:<16} {:>6} {:<32} {:<24} {:>5}",
                summary.name,
                summary.listen_port,
                join(&summary.public_addresses),
                join(&summary.subnets),
                summary.peer_count
            )?;
        }
        Ok(())
    }
}

/// Pool counts per family.
#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    /// One entry per configured pool.
    pub pools: Vec<PoolStatus>,
}

impl TableDisplay for PoolReport {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        writeln!(
            writer,
            "{:<8} {:>8} {:>8} {:>10}",
            "FAMILY", "TOTAL", "USED", "AVAILABLE"
        )?;
        for pool in &self.pools {
            writeln!(
                writer,
                "{:<8} {:>8} {:>8} {:>10}",
                pool.family.to_string(),
                pool.total,
                pool.used,
                pool.available
            )?;
        }
        Ok(())
    }
}

/// Simple success or informational message.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    /// Message text.
    pub message: String,
    /// Whether this is a success message.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub success: bool,
}

impl Message {
    /// Create a success message.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }
}

impl TableDisplay for Message {
    fn write_table<W: Write>(&self, writer: &mut W) -> Result<(), CliError> {
        if self.success {
            writeln!(writer, "✓ {}", self.message)?;
        } else {
            writeln!(writer, "{}", self.message)?;
        }
        Ok(())
    }
}
