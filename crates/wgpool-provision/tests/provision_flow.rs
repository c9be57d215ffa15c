//! End-to-end provisioning against on-disk pools and artifacts with a fake host.

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use wgpool_network::{Family, FilePoolStore, NetworkError};
use wgpool_provision::{
    ArtifactStore, ClientRequest, FakeHost, FileArtifactStore, HostCall, InterfaceRequest,
    ProvisionConfig, ProvisionError, Provisioner, RecoveredInterface,
};

type TestProvisioner = Provisioner<FilePoolStore, FileArtifactStore, FakeHost>;

struct Fixture {
    dir: TempDir,
    provisioner: TestProvisioner,
}

impl Fixture {
    fn new(v4_pool: &[&str], v6_pool: Option<&[&str]>) -> Self {
        Self::with_host(v4_pool, v6_pool, FakeHost::new())
    }

    fn with_host(v4_pool: &[&str], v6_pool: Option<&[&str]>, host: FakeHost) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ProvisionConfig {
            state_dir: dir.path().join("state"),
            wireguard_dir: dir.path().join("wireguard"),
            ..ProvisionConfig::default()
        };
        let paths = config.pool_paths();
        fs::create_dir_all(&config.state_dir).expect("state dir");
        write_lines(&paths.ipv4_pool, v4_pool);
        if let Some(v6_pool) = v6_pool {
            write_lines(&paths.ipv6_pool, v6_pool);
        }

        let pools = FilePoolStore::new(paths);
        let artifacts = FileArtifactStore::new(&config.wireguard_dir);
        Self {
            dir,
            provisioner: Provisioner::new(config, pools, artifacts, host),
        }
    }

    fn used(&self, file: &str) -> String {
        fs::read_to_string(self.dir.path().join("state").join(file)).unwrap_or_default()
    }

    fn artifact(&self, name: &str) -> String {
        self.provisioner
            .artifacts()
            .read_interface(name)
            .expect("artifact")
    }

    fn host(&self) -> &FakeHost {
        self.provisioner.host()
    }
}

fn write_lines(path: &Path, lines: &[&str]) {
    let mut content = lines.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content).expect("write pool");
}

#[test]
fn interfaces_take_pool_addresses_in_order() {
    let fx = Fixture::new(&["1.1.1.1", "1.1.1.2"], None);
    let interfaces = fx.provisioner.interfaces();

    let first = interfaces
        .provision(&InterfaceRequest::new("10.10.0.0/24"))
        .expect("first interface");
    assert_eq!(first.name, "wg0");
    assert_eq!(first.public_v4.to_string(), "1.1.1.1");
    assert_eq!(first.listen_port, 51820);
    assert_eq!(fx.used("used_ips.txt"), "1.1.1.1\n");

    let artifact = fx.artifact("wg0");
    assert!(artifact.contains("Address = 10.10.0.1/24\n"));
    assert!(artifact.contains("ListenPort = 51820\n"));
    assert!(artifact.contains(
        "PostUp = iptables -t nat -A POSTROUTING -s 10.10.0.0/24 -o eth0 -j SNAT --to-source 1.1.1.1\n"
    ));
    assert!(artifact.contains(
        "PostDown = iptables -t nat -D POSTROUTING -s 10.10.0.0/24 -o eth0 -j SNAT --to-source 1.1.1.1\n"
    ));

    let second = interfaces
        .provision(&InterfaceRequest::new("10.11.0.0/24"))
        .expect("second interface");
    assert_eq!(second.name, "wg1");
    assert_eq!(second.public_v4.to_string(), "1.1.1.2");
    assert_eq!(second.listen_port, 51821, "port of wg0's artifact is skipped");
    assert_eq!(fx.used("used_ips.txt"), "1.1.1.1\n1.1.1.2\n");

    let third = interfaces.provision(&InterfaceRequest::new("10.12.0.0/24"));
    assert!(matches!(
        third,
        Err(ProvisionError::Network(NetworkError::PoolExhausted { family: Family::V4, .. }))
    ));
    assert!(!fx.provisioner.artifacts().interface_exists("wg2"));
    assert_eq!(fx.used("used_ips.txt"), "1.1.1.1\n1.1.1.2\n");

    assert_eq!(
        fx.host().calls(),
        vec![HostCall::Enable("wg0".to_string()), HostCall::Enable("wg1".to_string())]
    );
}

#[test]
fn activation_failure_leaves_nothing_behind() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    fx.host().set_fail_enable(true);

    let request = InterfaceRequest::new("10.10.0.0/24").with_name("office");
    let result = fx.provisioner.interfaces().provision(&request);
    assert!(matches!(
        result,
        Err(ProvisionError::ServiceActivationFailed { ref interface, .. }) if interface == "office"
    ));
    assert!(!fx.dir.path().join("state").join("used_ips.txt").exists());
    assert!(!fx.provisioner.artifacts().interface_exists("office"));

    fx.host().set_fail_enable(false);
    let retried = fx
        .provisioner
        .interfaces()
        .provision(&request)
        .expect("retry succeeds");
    assert_eq!(retried.public_v4.to_string(), "1.1.1.1");
    assert_eq!(fx.used("used_ips.txt"), "1.1.1.1\n");
}

#[test]
fn ipv6_exhaustion_rolls_back_ipv4() {
    let fx = Fixture::new(&["1.1.1.1"], Some(&[]));
    let result = fx
        .provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24").with_subnet_v6("fd00:10::/64"));

    assert!(matches!(
        result,
        Err(ProvisionError::Network(NetworkError::PoolExhausted { family: Family::V6, .. }))
    ));
    assert_eq!(fx.used("used_ips.txt"), "");
    assert!(fx.provisioner.artifacts().interface_names().expect("names").is_empty());
}

#[test]
fn missing_default_route_rolls_back() {
    let fx = Fixture::with_host(&["1.1.1.1"], None, FakeHost::new().with_default_route(None));
    let result = fx
        .provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24"));

    assert!(matches!(result, Err(ProvisionError::NoDefaultRoute)));
    assert_eq!(fx.used("used_ips.txt"), "");
    assert!(fx.host().calls().is_empty());
}

#[test]
fn invalid_input_is_rejected_before_allocation() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    let interfaces = fx.provisioner.interfaces();

    assert!(matches!(
        interfaces.provision(&InterfaceRequest::new("10.0.0.0/31")),
        Err(ProvisionError::Network(NetworkError::InvalidSubnet { .. }))
    ));
    assert!(matches!(
        interfaces.provision(&InterfaceRequest::new("not-a-subnet")),
        Err(ProvisionError::Network(NetworkError::InvalidFormat { .. }))
    ));
    assert!(matches!(
        interfaces.provision(&InterfaceRequest::new("10.0.0.0/24").with_name("wg-bad")),
        Err(ProvisionError::IllegalName { .. })
    ));
    assert_eq!(fx.used("used_ips.txt"), "");
}

#[test]
fn existing_name_is_refused() {
    let fx = Fixture::new(&["1.1.1.1", "1.1.1.2"], None);
    let request = InterfaceRequest::new("10.10.0.0/24").with_name("wg0");
    fx.provisioner.interfaces().provision(&request).expect("first");

    assert!(matches!(
        fx.provisioner.interfaces().provision(&request),
        Err(ProvisionError::InterfaceExists(ref name)) if name == "wg0"
    ));
    assert_eq!(fx.used("used_ips.txt"), "1.1.1.1\n");
}

#[test]
fn live_listeners_are_skipped() {
    let fx = Fixture::with_host(
        &["1.1.1.1"],
        None,
        FakeHost::new().with_listening([51820, 51821]),
    );
    let provisioned = fx
        .provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24"))
        .expect("interface");
    assert_eq!(provisioned.listen_port, 51822);
}

#[test]
fn dual_stack_interface_and_client() {
    let fx = Fixture::new(&["203.0.113.5"], Some(&["2001:db8::10"]));
    let interface = fx
        .provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.30.0.0/24").with_subnet_v6("fd00:30::/64"))
        .expect("interface");
    assert_eq!(fx.used("used_ip6s.txt"), "2001:db8::10\n");

    let artifact = fx.artifact(&interface.name);
    assert!(artifact.contains("Address = 10.30.0.1/24, fd00:30::1/64\n"));
    assert!(artifact.contains(
        "PostUp = ip6tables -t nat -A POSTROUTING -s fd00:30::/64 -o eth0 -j SNAT --to-source 2001:db8::10\n"
    ));

    let client = fx
        .provisioner
        .clients()
        .provision(&ClientRequest::new(&interface.name).with_name("laptop"))
        .expect("client");
    assert_eq!(client.addresses.len(), 2);
    assert_eq!(client.addresses[0].to_string(), "10.30.0.2/32");
    assert!(client.addresses[1].prefix_len() == 128);

    let profile = fs::read_to_string(&client.artifact).expect("client artifact");
    assert!(profile.contains("Endpoint = 203.0.113.5:51820\n"));
    assert!(profile.contains("AllowedIPs = 0.0.0.0/0, ::/0\n"));
    assert!(profile.contains("DNS = 1.1.1.1, 2606:4700:4700::1111\n"));
    assert!(profile.contains("PersistentKeepalive = 25\n"));
    assert!(profile.contains(&format!("PublicKey = {}\n", interface.public_key.to_base64())));

    let artifact = fx.artifact(&interface.name);
    assert!(artifact.contains("\n### laptop\n[Peer]\n"));
    assert!(artifact.contains(&format!("AllowedIPs = {}, {}\n", client.addresses[0], client.addresses[1])));
}

#[test]
fn recovery_round_trips_rendered_state() {
    let fx = Fixture::new(&["198.51.100.7"], Some(&["2001:db8::7"]));
    let interface = fx
        .provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.40.0.0/22").with_subnet_v6("fd00:40::/48"))
        .expect("interface");

    let recovered =
        RecoveredInterface::recover(fx.provisioner.artifacts(), &interface.name).expect("recover");
    assert_eq!(recovered.public_v4, Some(interface.public_v4));
    assert_eq!(recovered.subnet_v4, Some(interface.subnet_v4));
    assert_eq!(recovered.public_v6, interface.public_v6);
    assert_eq!(recovered.subnet_v6, interface.subnet_v6);
    assert_eq!(recovered.listen_port, interface.listen_port);
    assert_eq!(recovered.record.private_key.public_key(), interface.public_key);
}

#[test]
fn slash_29_takes_five_clients() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    fx.provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.20.0.0/29"))
        .expect("interface");

    let clients = fx.provisioner.clients();
    for host in 2..=6 {
        let client = clients.provision(&ClientRequest::new("wg0")).expect("client");
        assert_eq!(client.addresses[0].to_string(), format!("10.20.0.{host}/32"));
        assert_eq!(client.name, format!("client{}", host - 1));
    }

    let before = fx.artifact("wg0");
    assert!(matches!(
        clients.provision(&ClientRequest::new("wg0")),
        Err(ProvisionError::Network(NetworkError::ClientAddressExhausted { .. }))
    ));
    assert_eq!(fx.artifact("wg0"), before);
    assert_eq!(
        fx.provisioner.artifacts().client_names("wg0").expect("names").len(),
        5
    );
    assert_eq!(
        fx.provisioner.show_interface("wg0").expect("show").peer_count,
        5
    );
}

#[test]
fn restart_failure_falls_back_to_sync() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    fx.provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24"))
        .expect("interface");
    fx.host().set_fail_restart(true);

    fx.provisioner
        .clients()
        .provision(&ClientRequest::new("wg0"))
        .expect("client");
    assert_eq!(
        fx.host().calls()[1..].to_vec(),
        vec![HostCall::Restart("wg0".to_string()), HostCall::Sync("wg0".to_string())]
    );
}

#[test]
fn client_activation_failure_restores_artifacts() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    fx.provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24"))
        .expect("interface");
    let before = fx.artifact("wg0");
    fx.host().set_fail_restart(true);
    fx.host().set_fail_sync(true);

    let result = fx
        .provisioner
        .clients()
        .provision(&ClientRequest::new("wg0").with_name("phone"));
    assert!(matches!(result, Err(ProvisionError::ServiceActivationFailed { .. })));
    assert_eq!(fx.artifact("wg0"), before);
    assert!(fx.provisioner.artifacts().client_names("wg0").expect("names").is_empty());

    fx.host().set_fail_restart(false);
    let client = fx
        .provisioner
        .clients()
        .provision(&ClientRequest::new("wg0").with_name("phone"))
        .expect("retry");
    assert_eq!(client.addresses[0].to_string(), "10.10.0.2/32");
}

#[test]
fn client_names_are_checked() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    fx.provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24"))
        .expect("interface");
    let clients = fx.provisioner.clients();

    clients
        .provision(&ClientRequest::new("wg0").with_name("laptop"))
        .expect("first");
    assert!(matches!(
        clients.provision(&ClientRequest::new("wg0").with_name("laptop")),
        Err(ProvisionError::ClientExists { .. })
    ));
    assert!(matches!(
        clients.provision(&ClientRequest::new("wg0").with_name("../laptop")),
        Err(ProvisionError::IllegalName { .. })
    ));
    assert!(matches!(
        clients.provision(&ClientRequest::new("wg9")),
        Err(ProvisionError::InterfaceNotFound(_))
    ));
}

#[test]
fn interface_names_outside_the_artifact_dir_are_refused() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    fx.provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24"))
        .expect("interface");

    // A readable artifact one level above the artifact directory.
    let outside = fx.dir.path().join("x$(id).conf");
    fs::write(&outside, fx.artifact("wg0")).expect("copy artifact");
    let calls_before = fx.host().calls();

    for name in ["../wg0", "../x$(id)", "wg0/..", ""] {
        assert!(
            matches!(
                fx.provisioner.clients().provision(&ClientRequest::new(name)),
                Err(ProvisionError::IllegalName { .. })
            ),
            "client on {name:?}"
        );
        assert!(
            matches!(
                fx.provisioner.show_interface(name),
                Err(ProvisionError::IllegalName { .. })
            ),
            "show {name:?}"
        );
    }

    assert_eq!(fx.host().calls(), calls_before);
    assert!(!fx.dir.path().join("x$(id)").exists());
    assert_eq!(fs::read_to_string(&outside).expect("read"), fx.artifact("wg0"));
}

#[test]
fn malformed_public_address_is_reported() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    let artifact = "[Interface]\n\
        Address = 10.10.0.1/24\n\
        PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n\
        ListenPort = 51820\n\
        PostUp = iptables -t nat -A POSTROUTING -s 10.10.0.0/24 -o eth0 -j SNAT --to-source 1.1.1\n";
    fx.provisioner
        .artifacts()
        .create_interface("wg0", artifact)
        .expect("write");

    assert!(matches!(
        fx.provisioner.clients().provision(&ClientRequest::new("wg0")),
        Err(ProvisionError::InvalidPublicAddress { ref value, .. }) if value == "1.1.1"
    ));
}

#[test]
fn missing_port_is_reported() {
    let fx = Fixture::new(&["1.1.1.1"], None);
    let artifact = "[Interface]\n\
        Address = 10.10.0.1/24\n\
        PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n\
        ListenPort = fifty\n\
        PostUp = iptables -t nat -A POSTROUTING -s 10.10.0.0/24 -o eth0 -j SNAT --to-source 1.1.1.1\n";
    fx.provisioner
        .artifacts()
        .create_interface("wg0", artifact)
        .expect("write");

    assert!(matches!(
        fx.provisioner.clients().provision(&ClientRequest::new("wg0")),
        Err(ProvisionError::MissingPort(_))
    ));
}

#[test]
fn inventory_and_pool_status() {
    let fx = Fixture::new(&["1.1.1.1", "1.1.1.2", "1.1.1.3"], None);
    fx.provisioner
        .interfaces()
        .provision(&InterfaceRequest::new("10.10.0.0/24"))
        .expect("interface");
    fx.provisioner
        .clients()
        .provision(&ClientRequest::new("wg0").with_name("laptop"))
        .expect("client");

    let summaries = fx.provisioner.list_interfaces().expect("list");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "wg0");
    assert_eq!(summaries[0].peers, vec!["laptop".to_string()]);
    assert_eq!(summaries[0].subnets[0].to_string(), "10.10.0.0/24");

    let status = fx.provisioner.pool_status().expect("status");
    assert_eq!(status.len(), 1, "missing IPv6 pool is omitted");
    assert_eq!(status[0].total, 3);
    assert_eq!(status[0].used, 1);
    assert_eq!(status[0].available, 2);

    fx.provisioner.save_firewall_rules().expect("save");
    assert_eq!(fx.host().calls().last(), Some(&HostCall::SaveRules));
}
