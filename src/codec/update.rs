//! The mutable update record sent to `PUT /nodes/{node}/qemu/{vmid}/config`.
//!
//! Positional fields are populated through typed setters so the planner
//! never assembles stringly-typed field names itself; the record serializes
//! to the flat key-value form the endpoint expects.

use crate::codec::{
    agent::encode_agent,
    disk::{disk_field_name, encode_disk},
    ipconfig::{encode_ipconfig, ipconfig_field_name},
    nic::{encode_nic, nic_field_name},
};
use crate::core::domain::{
    error::PveResult,
    model::{
        cloudinit::CloudInitIp,
        disk::{Disk, DiskInterface},
        nic::Nic,
        vm::{AgentConfig, Bios, CpuConfig, MemoryConfig, OsType, PciDevice},
    },
};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;

/// A pending configuration update for one guest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateRecord {
    fields: BTreeMap<String, String>,
    delete: Vec<String>,
}

impl UpdateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.delete.is_empty()
    }

    pub fn has_updates(&self) -> bool {
        !self.fields.is_empty()
    }

    /// Fields scheduled for reset, in insertion order.
    pub fn deletions(&self) -> &[String] {
        &self.delete
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    /// Schedules a field reset. Duplicates are collapsed.
    pub fn push_delete(&mut self, field: impl Into<String>) {
        let field = field.into();
        if !self.delete.contains(&field) {
            self.delete.push(field);
        }
    }

    /// Splits the record into its delete-only and update-only halves, in
    /// the order they must be applied (deletes first, so positions are free
    /// for reassignment).
    pub fn split(self) -> (Option<UpdateRecord>, Option<UpdateRecord>) {
        let deletes = (!self.delete.is_empty()).then(|| UpdateRecord {
            fields: BTreeMap::new(),
            delete: self.delete.clone(),
        });
        let updates = (!self.fields.is_empty()).then(|| UpdateRecord {
            fields: self.fields,
            delete: Vec::new(),
        });
        (deletes, updates)
    }

    fn set(&mut self, field: &str, value: impl ToString) {
        self.fields.insert(field.to_string(), value.to_string());
    }

    pub fn set_name(&mut self, name: &str) {
        self.set("name", name);
    }

    pub fn set_description(&mut self, description: &str) {
        self.set("description", description);
    }

    /// The entire tag set, comma-joined.
    pub fn set_tags(&mut self, tags: &[String]) {
        self.set("tags", tags.join(","));
    }

    pub fn set_agent(&mut self, agent: &AgentConfig) {
        self.set("agent", encode_agent(agent));
    }

    pub fn set_bios(&mut self, bios: Bios) {
        self.set("bios", bios.as_str());
    }

    pub fn set_os_type(&mut self, os_type: OsType) {
        self.set("ostype", os_type.as_str());
    }

    pub fn set_machine(&mut self, machine: &str) {
        self.set("machine", machine);
    }

    pub fn set_keyboard(&mut self, keyboard: &str) {
        self.set("keyboard", keyboard);
    }

    pub fn set_kvm_args(&mut self, args: &str) {
        self.set("args", args);
    }

    pub fn set_on_boot(&mut self, on_boot: bool) {
        self.set("onboot", if on_boot { "1" } else { "0" });
    }

    pub fn set_cpu(&mut self, cpu: &CpuConfig) {
        if let Some(cores) = cpu.cores {
            self.set("cores", cores);
        }
        if let Some(sockets) = cpu.sockets {
            self.set("sockets", sockets);
        }
        if let Some(cpu_type) = &cpu.cpu_type {
            self.set("cpu", cpu_type);
        }
        if let Some(architecture) = &cpu.architecture {
            self.set("arch", architecture);
        }
        if let Some(units) = cpu.units {
            self.set("cpuunits", units);
        }
        if let Some(limit) = cpu.limit {
            self.set("cpulimit", limit);
        }
    }

    pub fn set_memory(&mut self, memory: &MemoryConfig) {
        if let Some(dedicated) = memory.dedicated {
            self.set("memory", dedicated);
        }
        if let Some(floating) = memory.floating {
            self.set("balloon", floating);
        }
    }

    pub fn set_cloud_init_user(&mut self, user: &str) {
        self.set("ciuser", user);
    }

    pub fn set_cloud_init_password(&mut self, password: &str) {
        self.set("cipassword", password);
    }

    pub fn set_ssh_keys(&mut self, keys: &[String]) {
        self.set("sshkeys", keys.join("\n"));
    }

    pub fn set_dns_domain(&mut self, domain: &str) {
        self.set("searchdomain", domain);
    }

    pub fn set_dns_servers(&mut self, servers: &[String]) {
        self.set("nameserver", servers.join(" "));
    }

    /// Populates the disk slot for `(interface, position)`.
    ///
    /// # Errors
    ///
    /// Fails when the position is out of range for the interface family.
    pub fn set_disk(
        &mut self,
        interface: DiskInterface,
        position: u8,
        disk: &Disk,
    ) -> PveResult<()> {
        let field = disk_field_name(interface, position)?;
        self.fields.insert(field, encode_disk(disk));
        Ok(())
    }

    /// Populates the `netN` slot.
    pub fn set_nic(&mut self, position: u8, nic: &Nic) -> PveResult<()> {
        let field = nic_field_name(position)?;
        self.fields.insert(field, encode_nic(nic)?);
        Ok(())
    }

    /// Populates the `ipconfigN` slot.
    pub fn set_ipconfig(&mut self, position: u8, config: &CloudInitIp) -> PveResult<()> {
        let field = ipconfig_field_name(position)?;
        self.fields.insert(field, encode_ipconfig(config)?);
        Ok(())
    }

    /// Populates the `hostpciN` slot.
    pub fn set_pci_device(&mut self, device: &PciDevice) {
        let mut value = device.device.clone();
        if device.pcie {
            value.push_str(",pcie=1");
        }
        if !device.rombar {
            value.push_str(",rombar=0");
        }
        if let Some(mdev) = &device.mdev {
            value.push_str(&format!(",mdev={}", mdev));
        }
        self.set(&format!("hostpci{}", device.position), value);
    }
}

impl Serialize for UpdateRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(!self.delete.is_empty());
        let mut map = serializer.serialize_map(Some(self.fields.len() + extra))?;
        for (key, value) in &self.fields {
            map.serialize_entry(key, value)?;
        }
        if !self.delete.is_empty() {
            map.serialize_entry("delete", &self.delete.join(","))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::model::disk::DiskSpeedLimits;
    use crate::core::domain::value_object::{BridgeName, DiskSize, MacAddress};

    #[test]
    fn setters_address_concrete_fields() {
        let mut record = UpdateRecord::new();
        record.set_name("web-1");
        record
            .set_disk(
                DiskInterface::Scsi,
                3,
                &Disk {
                    interface: DiskInterface::Scsi,
                    position: 3,
                    storage: "local-lvm".to_string(),
                    volume: Some("vm-100-disk-0".to_string()),
                    format: None,
                    size: DiskSize::from_gib(10),
                    discard: false,
                    ssd: false,
                    iothread: false,
                    speed: DiskSpeedLimits::default(),
                },
            )
            .unwrap();
        record
            .set_nic(
                2,
                &crate::core::domain::model::nic::Nic {
                    position: 2,
                    model: crate::core::domain::model::nic::NicModel::Virtio,
                    bridge: BridgeName::new_unchecked("vmbr0"),
                    mac: Some(MacAddress::new_unchecked("BC:24:11:AA:BB:CC")),
                    enabled: true,
                    firewall: false,
                    vlan: None,
                    rate_limit: None,
                    mtu: None,
                },
            )
            .unwrap();

        assert!(record.fields().contains_key("scsi3"));
        assert!(record.fields().contains_key("net2"));
        assert_eq!(record.fields()["name"], "web-1");
    }

    #[test]
    fn out_of_range_position_fails() {
        let mut record = UpdateRecord::new();
        let disk = Disk {
            interface: DiskInterface::Sata,
            position: 9,
            storage: "local".to_string(),
            volume: None,
            format: None,
            size: DiskSize::from_gib(1),
            discard: false,
            ssd: false,
            iothread: false,
            speed: DiskSpeedLimits::default(),
        };
        assert!(record.set_disk(DiskInterface::Sata, 9, &disk).is_err());
    }

    #[test]
    fn serializes_delete_comma_joined() {
        let mut record = UpdateRecord::new();
        record.set_name("web-1");
        record.push_delete("scsi2");
        record.push_delete("net1");
        record.push_delete("scsi2"); // collapsed

        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(encoded["name"], "web-1");
        assert_eq!(encoded["delete"], "scsi2,net1");
    }

    #[test]
    fn split_orders_deletes_before_updates() {
        let mut record = UpdateRecord::new();
        record.set_name("web-1");
        record.push_delete("scsi2");

        let (deletes, updates) = record.split();
        let deletes = deletes.unwrap();
        let updates = updates.unwrap();
        assert_eq!(deletes.deletions(), ["scsi2".to_string()]);
        assert!(deletes.fields().is_empty());
        assert!(updates.deletions().is_empty());
        assert_eq!(updates.fields()["name"], "web-1");
    }
}
