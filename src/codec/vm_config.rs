//! Map-based decoding of a live guest configuration.
//!
//! `GET /nodes/{node}/qemu/{vmid}/config` returns a flat JSON object whose
//! positional keys (`scsi0`, `net3`, `ipconfig1`, ...) carry encoded
//! strings. The object is first lowered into a canonical `field → string`
//! map and the typed view is built from that map alone; no typed wire
//! struct is ever introspected.

use crate::codec::{agent::decode_agent, disk::decode_disk, ipconfig::decode_ipconfig, nic::decode_nic};
use crate::core::domain::{
    error::PveResult,
    model::{
        cloudinit::CloudInitIp,
        disk::{Disk, DiskInterface},
        nic::Nic,
        vm::{AgentConfig, Bios, CpuConfig, MemoryConfig, OsType},
    },
};
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;

/// Lowers the JSON configuration object into the canonical field map.
///
/// Scalars are stringified the way PVE prints them; nested values (which
/// the config endpoint does not produce) are skipped with a warning.
pub fn config_map_from_json(value: &Value) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let Some(object) = value.as_object() else {
        warn!("guest config payload is not an object; treating as empty");
        return map;
    };
    for (key, value) in object {
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Null => continue,
            other => {
                warn!("skipping non-scalar config field '{}': {}", key, other);
                continue;
            }
        };
        map.insert(key.clone(), rendered);
    }
    map
}

/// Splits a positional key into its family prefix and slot index
/// (`"scsi10"` → `("scsi", 10)`). Returns `None` for non-positional keys.
pub fn split_slot_key(key: &str) -> Option<(&str, u8)> {
    let digit_start = key.find(|c: char| c.is_ascii_digit())?;
    let (prefix, suffix) = key.split_at(digit_start);
    if prefix.is_empty() || !suffix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().map(|index| (prefix, index))
}

/// The decoded live view of one guest configuration.
///
/// This is the `live` input to the planner and the payload of a
/// reconciler read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmConfigView {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub bios: Option<Bios>,
    pub os_type: Option<OsType>,
    pub machine: Option<String>,
    pub keyboard: Option<String>,
    pub kvm_args: Option<String>,
    pub on_boot: Option<bool>,
    pub agent: Option<AgentConfig>,
    pub cpu: CpuConfig,
    pub memory: MemoryConfig,
    pub disks: Vec<Disk>,
    /// Volumes PVE parked under `unused{N}` after detachment.
    pub unused_disks: Vec<(u8, String)>,
    pub nics: Vec<Nic>,
    pub ip_configs: Vec<CloudInitIp>,
    pub cloud_init_user: Option<String>,
    pub dns_domain: Option<String>,
    pub dns_servers: Vec<String>,
}

impl VmConfigView {
    pub fn disk_at(&self, interface: DiskInterface, position: u8) -> Option<&Disk> {
        self.disks
            .iter()
            .find(|d| d.interface == interface && d.position == position)
    }

    /// True when any cloud-init related field is present.
    pub fn has_cloud_init(&self) -> bool {
        !self.ip_configs.is_empty() || self.cloud_init_user.is_some()
    }
}

/// Decodes the canonical field map into the typed live view.
///
/// Unknown non-positional fields are ignored; positional fields with an
/// unknown family are logged and skipped so a newer cluster cannot break
/// the read path.
pub fn decode_vm_config(map: &BTreeMap<String, String>) -> PveResult<VmConfigView> {
    let mut view = VmConfigView::default();

    for (key, value) in map {
        if let Some((family, position)) = split_slot_key(key) {
            match family {
                "scsi" | "sata" | "ide" | "virtio" => {
                    let interface =
                        DiskInterface::parse(family).expect("matched known interface");
                    if let Some(disk) = decode_disk(interface, position, value)? {
                        view.disks.push(disk);
                    }
                }
                "unused" => {
                    view.unused_disks.push((position, value.clone()));
                }
                "net" => {
                    view.nics.push(decode_nic(position, value)?);
                }
                "ipconfig" => {
                    view.ip_configs.push(decode_ipconfig(position, value)?);
                }
                "hostpci" | "usb" | "serial" | "parallel" => {
                    // passthrough families the live view does not diff
                }
                other => {
                    warn!("skipping unknown positional config family '{}{}'", other, position);
                }
            }
            continue;
        }

        match key.as_str() {
            "name" => view.name = Some(value.clone()),
            "description" => view.description = Some(value.clone()),
            "tags" => {
                view.tags = value
                    .split([',', ';'])
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "bios" => view.bios = Some(Bios::parse(value)?),
            "ostype" => view.os_type = Some(OsType::parse(value)?),
            "machine" => view.machine = Some(value.clone()),
            "keyboard" => view.keyboard = Some(value.clone()),
            "args" => view.kvm_args = Some(value.clone()),
            "onboot" => view.on_boot = Some(value == "1"),
            "agent" => view.agent = Some(decode_agent(value)?),
            "cores" => view.cpu.cores = value.parse().ok(),
            "sockets" => view.cpu.sockets = value.parse().ok(),
            "cpu" => view.cpu.cpu_type = Some(value.clone()),
            "arch" => view.cpu.architecture = Some(value.clone()),
            "cpuunits" => view.cpu.units = value.parse().ok(),
            "cpulimit" => view.cpu.limit = value.parse().ok(),
            "memory" => view.memory.dedicated = value.parse().ok(),
            "balloon" => view.memory.floating = value.parse().ok(),
            "ciuser" => view.cloud_init_user = Some(value.clone()),
            "searchdomain" => view.dns_domain = Some(value.clone()),
            "nameserver" => {
                view.dns_servers = value.split_whitespace().map(str::to_string).collect();
            }
            _ => {}
        }
    }

    view.disks.sort_by_key(Disk::slot);
    view.nics.sort_by_key(|n| n.position);
    view.ip_configs.sort_by_key(|c| c.position);
    view.unused_disks.sort_by_key(|(position, _)| *position);
    Ok(view)
}
