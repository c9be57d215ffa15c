//! Host collaborators: routing table, listening sockets, the tunnel service
//! and the firewall rule sets.
//!
//! [`SystemHost`] shells out to the usual Linux tools. [`FakeHost`] keeps
//! everything in memory and records what was asked of it, for tests.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::FirewallConfig;
use crate::error::{ProvisionError, Result};

const CMD_IP: &str = "ip";
const CMD_SS: &str = "ss";
const CMD_SYSTEMCTL: &str = "systemctl";
const CMD_WG: &str = "wg";
const CMD_WG_QUICK: &str = "wg-quick";

/// Operations provisioning needs from the host.
pub trait HostOps {
    /// Name of the network interface carrying the default IPv4 route.
    ///
    /// # Errors
    ///
    /// Fails if the routing table cannot be queried.
    fn default_route_interface(&self) -> Result<Option<String>>;

    /// UDP ports currently held by listening sockets.
    ///
    /// # Errors
    ///
    /// Fails if the socket table cannot be queried.
    fn listening_udp_ports(&self) -> Result<HashSet<u16>>;

    /// Enables the tunnel service for `interface` at boot and starts it now.
    ///
    /// # Errors
    ///
    /// Fails if the service manager reports an error.
    fn enable_service(&self, interface: &str) -> Result<()>;

    /// Restarts the running tunnel service for `interface`.
    ///
    /// # Errors
    ///
    /// Fails if the service manager reports an error.
    fn restart_service(&self, interface: &str) -> Result<()>;

    /// Applies the artifact to the live tunnel without a restart:
    /// `wg-quick strip` output is fed to `wg syncconf`.
    ///
    /// # Errors
    ///
    /// Fails if the sync command fails.
    fn sync_service(&self, interface: &str) -> Result<()>;

    /// Saves the live IPv4 and IPv6 rule sets to the configured files.
    ///
    /// # Errors
    ///
    /// Fails if a save tool fails or a rules file cannot be written.
    fn save_firewall_rules(&self, firewall: &FirewallConfig) -> Result<()>;
}

fn service_unit(interface: &str) -> String {
    format!("wg-quick@{interface}")
}

/// Extracts the device from `ip route show default` output.
#[must_use]
pub fn parse_default_route(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|line| line.trim_start().starts_with("default"))
        .find_map(|line| {
            let mut fields = line.split_whitespace();
            fields.find(|field| *field == "dev")?;
            fields.next().map(str::to_string)
        })
}

/// Extracts local ports from `ss -Hlun` output.
#[must_use]
pub fn parse_udp_listeners(output: &str) -> HashSet<u16> {
    output
        .lines()
        .filter_map(|line| {
            let local = line.split_whitespace().nth(3)?;
            let (_, port) = local.rsplit_once(':')?;
            port.parse().ok()
        })
        .collect()
}

/// Runs host commands through `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl SystemHost {
    fn run(program: &str, args: &[&str]) -> Result<String> {
        Self::run_with_input(program, args, None)
    }

    /// Runs `program` with `args` as argv, never through a shell. `input`,
    /// when given, is written to the child's stdin.
    fn run_with_input(program: &str, args: &[&str], input: Option<&[u8]>) -> Result<String> {
        let command = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(%command, "running host command");

        let failed = |detail: String| ProvisionError::Command {
            command: command.clone(),
            detail,
        };

        let output = match input {
            None => Command::new(program).args(args).output(),
            Some(input) => Self::spawn_with_stdin(program, args, input),
        }
        .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(failed(if detail.is_empty() {
                output.status.to_string()
            } else {
                detail.to_string()
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn_with_stdin(program: &str, args: &[&str], input: &[u8]) -> std::io::Result<Output> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input)?;
        }
        child.wait_with_output()
    }

    fn save_rules(tool: &str, destination: &Path) -> Result<()> {
        let rules = Self::run(&format!("{tool}-save"), &[])?;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| ProvisionError::io(parent, e))?;
        }
        fs::write(destination, rules).map_err(|e| ProvisionError::io(destination, e))?;
        info!(tool, rules = %destination.display(), "saved firewall rules");
        Ok(())
    }
}

impl HostOps for SystemHost {
    fn default_route_interface(&self) -> Result<Option<String>> {
        let output = Self::run(CMD_IP, &["-4", "route", "show", "default"])?;
        Ok(parse_default_route(&output))
    }

    fn listening_udp_ports(&self) -> Result<HashSet<u16>> {
        let output = Self::run(CMD_SS, &["-H", "-l", "-u", "-n"])?;
        Ok(parse_udp_listeners(&output))
    }

    fn enable_service(&self, interface: &str) -> Result<()> {
        Self::run(CMD_SYSTEMCTL, &["enable", "--now", &service_unit(interface)]).map(drop)
    }

    fn restart_service(&self, interface: &str) -> Result<()> {
        Self::run(CMD_SYSTEMCTL, &["restart", &service_unit(interface)]).map(drop)
    }

    fn sync_service(&self, interface: &str) -> Result<()> {
        let stripped = Self::run(CMD_WG_QUICK, &["strip", interface])?;
        Self::run_with_input(
            CMD_WG,
            &["syncconf", interface, "/dev/stdin"],
            Some(stripped.as_bytes()),
        )
        .map(drop)
    }

    fn save_firewall_rules(&self, firewall: &FirewallConfig) -> Result<()> {
        Self::save_rules(&firewall.ipv4_tool, &firewall.ipv4_rules)?;
        Self::save_rules(&firewall.ipv6_tool, &firewall.ipv6_rules)
    }
}

/// A call made against a [`FakeHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    /// `enable_service`.
    Enable(String),
    /// `restart_service`.
    Restart(String),
    /// `sync_service`.
    Sync(String),
    /// `save_firewall_rules`.
    SaveRules,
}

#[derive(Debug, Default)]
struct FakeState {
    default_route: Option<String>,
    listening: HashSet<u16>,
    fail_enable: bool,
    fail_restart: bool,
    fail_sync: bool,
    calls: Vec<HostCall>,
}

/// In-memory host for tests.
#[derive(Debug)]
pub struct FakeHost {
    state: Mutex<FakeState>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeHost {
    /// A host routing through `eth0` with no UDP listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                default_route: Some("eth0".to_string()),
                ..FakeState::default()
            }),
        }
    }

    /// Replaces the default route device.
    #[must_use]
    pub fn with_default_route(self, device: Option<&str>) -> Self {
        self.state.lock().default_route = device.map(str::to_string);
        self
    }

    /// Marks ports as held by other listeners.
    #[must_use]
    pub fn with_listening(self, ports: impl IntoIterator<Item = u16>) -> Self {
        self.state.lock().listening.extend(ports);
        self
    }

    /// Makes `enable_service` fail or succeed.
    pub fn set_fail_enable(&self, fail: bool) {
        self.state.lock().fail_enable = fail;
    }

    /// Makes `restart_service` fail or succeed.
    pub fn set_fail_restart(&self, fail: bool) {
        self.state.lock().fail_restart = fail;
    }

    /// Makes `sync_service` fail or succeed.
    pub fn set_fail_sync(&self, fail: bool) {
        self.state.lock().fail_sync = fail;
    }

    /// Calls made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: HostCall, fail: impl Fn(&FakeState) -> bool) -> Result<()> {
        let mut state = self.state.lock();
        let failed = fail(&state);
        let command = format!("{call:?}");
        state.calls.push(call);
        if failed {
            return Err(ProvisionError::Command {
                command,
                detail: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

impl HostOps for FakeHost {
    fn default_route_interface(&self) -> Result<Option<String>> {
        Ok(self.state.lock().default_route.clone())
    }

    fn listening_udp_ports(&self) -> Result<HashSet<u16>> {
        Ok(self.state.lock().listening.clone())
    }

    fn enable_service(&self, interface: &str) -> Result<()> {
        self.record(HostCall::Enable(interface.to_string()), |s| s.fail_enable)
    }

    fn restart_service(&self, interface: &str) -> Result<()> {
        self.record(HostCall::Restart(interface.to_string()), |s| s.fail_restart)
    }

    fn sync_service(&self, interface: &str) -> Result<()> {
        self.record(HostCall::Sync(interface.to_string()), |s| s.fail_sync)
    }

    fn save_firewall_rules(&self, _firewall: &FirewallConfig) -> Result<()> {
        self.record(HostCall::SaveRules, |_| false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("default via 203.0.113.1 dev eth0 proto static\n", Some("eth0"); "static")]
    #[test_case("default via 10.0.0.1 dev ens3 proto dhcp src 10.0.0.5 metric 100\n", Some("ens3"); "dhcp")]
    #[test_case("", None; "no route")]
    #[test_case("default via 10.0.0.1\n", None; "no device")]
    fn default_route_device(output: &str, expected: Option<&str>) {
        assert_eq!(parse_default_route(output).as_deref(), expected);
    }

    #[test]
    fn udp_listener_ports() {
        let output = "\
UNCONN 0      0            0.0.0.0:51820      0.0.0.0:*
UNCONN 0      0      127.0.0.53%lo:53         0.0.0.0:*
UNCONN 0      0               [::]:51821         [::]:*
UNCONN 0      0                  *:5353             *:*
";
        let ports = parse_udp_listeners(output);
        assert_eq!(ports, [51820, 53, 51821, 5353].into_iter().collect());
    }

    #[test]
    fn udp_listeners_ignore_garbage() {
        assert!(parse_udp_listeners("not ss output\n\n").is_empty());
    }

    #[test]
    fn service_unit_name() {
        assert_eq!(service_unit("wg0"), "wg-quick@wg0");
    }

    #[test]
    fn fake_host_records_and_fails_on_demand() {
        let host = FakeHost::new();
        host.enable_service("wg0").expect("enable");
        host.set_fail_restart(true);
        assert!(host.restart_service("wg0").is_err());
        assert!(host.sync_service("wg0").is_ok());
        assert_eq!(
            host.calls(),
            vec![
                HostCall::Enable("wg0".to_string()),
                HostCall::Restart("wg0".to_string()),
                HostCall::Sync("wg0".to_string()),
            ]
        );
    }

    #[test]
    fn fake_host_route_can_be_removed() {
        let host = FakeHost::new().with_default_route(None);
        assert_eq!(host.default_route_interface().expect("query"), None);
    }
}
