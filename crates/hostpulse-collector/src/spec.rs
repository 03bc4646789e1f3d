use anyhow::{Context, Result};
use hostpulse_common::types::{HostSpec, NetInterface};
use serde_json::json;
use std::net::IpAddr;
use sysinfo::{Networks, System};

/// Produces the descriptive host metadata sent on registration and on every
/// spec refresh.
pub trait HostSpecSource: Send + Sync {
    fn collect(&self) -> Result<HostSpec>;
}

/// Reads host metadata from the running system.
///
/// Role names, display name and configured check names come from the agent
/// configuration and are copied into every collected spec.
#[derive(Debug, Clone, Default)]
pub struct SystemHostSpec {
    pub role_fullnames: Vec<String>,
    pub display_name: Option<String>,
    pub checks: Vec<String>,
}

impl SystemHostSpec {
    pub fn new(
        role_fullnames: Vec<String>,
        display_name: Option<String>,
        checks: Vec<String>,
    ) -> Self {
        Self {
            role_fullnames,
            display_name,
            checks,
        }
    }
}

fn collect_meta() -> serde_json::Value {
    let mut system = System::new();
    system.refresh_cpu_all();
    system.refresh_memory();

    let cpus: Vec<serde_json::Value> = system
        .cpus()
        .iter()
        .map(|cpu| {
            json!({
                "model_name": cpu.brand(),
                "vendor_id": cpu.vendor_id(),
                "mhz": cpu.frequency(),
            })
        })
        .collect();

    json!({
        "agent-name": concat!("hostpulse-agent/", env!("CARGO_PKG_VERSION")),
        "agent-version": env!("CARGO_PKG_VERSION"),
        "kernel": {
            "name": System::name(),
            "release": System::kernel_version(),
            "os": System::long_os_version(),
            "version": System::os_version(),
            "machine": std::env::consts::ARCH,
        },
        "cpu": cpus,
        "memory": { "total": system.total_memory() },
    })
}

fn collect_interfaces() -> Vec<NetInterface> {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<NetInterface> = networks
        .iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .map(|(name, data)| {
            let mut iface = NetInterface {
                name: name.clone(),
                mac_address: Some(data.mac_address().to_string()),
                ..Default::default()
            };
            for network in data.ip_networks() {
                match network.addr {
                    IpAddr::V4(addr) => iface.ipv4_addresses.push(addr.to_string()),
                    IpAddr::V6(addr) => iface.ipv6_addresses.push(addr.to_string()),
                }
            }
            iface
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

impl HostSpecSource for SystemHostSpec {
    fn collect(&self) -> Result<HostSpec> {
        let name = System::host_name().context("failed to obtain hostname")?;
        tracing::debug!(hostname = %name, "Collecting host spec");

        Ok(HostSpec {
            name,
            meta: collect_meta(),
            interfaces: collect_interfaces(),
            role_fullnames: self.role_fullnames.clone(),
            checks: self.checks.clone(),
            display_name: self.display_name.clone(),
            custom_identifier: None,
        })
    }
}
