//! Desired-state model for QEMU guests.
//!
//! A [`VmSpec`] is the plan/state value the reconciler diffs and applies.
//! Optional fields carry present/absent semantics: an absent field is left
//! alone on create and scheduled for deletion on update when it was
//! previously set.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::{cloudinit::CloudInitConfig, disk::Disk, nic::Nic},
    value_object::VmId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Guest firmware flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bios {
    Seabios,
    Ovmf,
}

impl Bios {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bios::Seabios => "seabios",
            Bios::Ovmf => "ovmf",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "seabios" => Ok(Bios::Seabios),
            "ovmf" => Ok(Bios::Ovmf),
            other => Err(ValidationError::Format(format!("unknown BIOS '{}'", other))),
        }
    }
}

/// PVE `ostype` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    L24,
    L26,
    Other,
    Solaris,
    Wxp,
    W2k,
    W2k3,
    W2k8,
    Wvista,
    Win7,
    Win8,
    Win10,
    Win11,
}

impl OsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsType::L24 => "l24",
            OsType::L26 => "l26",
            OsType::Other => "other",
            OsType::Solaris => "solaris",
            OsType::Wxp => "wxp",
            OsType::W2k => "w2k",
            OsType::W2k3 => "w2k3",
            OsType::W2k8 => "w2k8",
            OsType::Wvista => "wvista",
            OsType::Win7 => "win7",
            OsType::Win8 => "win8",
            OsType::Win10 => "win10",
            OsType::Win11 => "win11",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "l24" => Ok(OsType::L24),
            "l26" => Ok(OsType::L26),
            "other" => Ok(OsType::Other),
            "solaris" => Ok(OsType::Solaris),
            "wxp" => Ok(OsType::Wxp),
            "w2k" => Ok(OsType::W2k),
            "w2k3" => Ok(OsType::W2k3),
            "w2k8" => Ok(OsType::W2k8),
            "wvista" => Ok(OsType::Wvista),
            "win7" => Ok(OsType::Win7),
            "win8" => Ok(OsType::Win8),
            "win10" => Ok(OsType::Win10),
            "win11" => Ok(OsType::Win11),
            other => Err(ValidationError::Format(format!(
                "unknown OS type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for OsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// QEMU guest agent configuration. `None` at the VmSpec level means the
/// field is unset on the cluster, which PVE treats differently from an
/// explicit `enabled: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub enabled: bool,
    #[serde(default)]
    pub fstrim_cloned_disks: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
}

/// CPU topology and type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sockets: Option<u32>,
    /// CPU model, e.g. `kvm64` or `host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_type: Option<String>,
    /// Emulated architecture. Setting it requires the root account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl CpuConfig {
    pub fn is_empty(&self) -> bool {
        self.cores.is_none()
            && self.sockets.is_none()
            && self.cpu_type.is_none()
            && self.architecture.is_none()
            && self.units.is_none()
            && self.limit.is_none()
    }
}

/// Memory sizing in MiB. `floating` enables ballooning below `dedicated`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedicated: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating: Option<u64>,
}

impl MemoryConfig {
    pub fn is_empty(&self) -> bool {
        self.dedicated.is_none() && self.floating.is_none()
    }
}

/// A PCI passthrough device on a `hostpciN` slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PciDevice {
    pub position: u8,
    /// Host device address or mapping name.
    pub device: String,
    #[serde(default)]
    pub pcie: bool,
    #[serde(default = "default_true")]
    pub rombar: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mdev: Option<String>,
}

fn default_true() -> bool {
    true
}

/// How a guest comes into existence. Exactly one variant must be chosen;
/// the reconciler rejects a plan carrying both or neither on create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreateSource {
    Clone {
        source: VmId,
        full: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        storage: Option<String>,
    },
    Iso {
        storage: String,
        image: String,
    },
}

/// Per-operation wall-clock budgets, overridable per guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTimeouts {
    pub create: Duration,
    pub delete: Duration,
    pub stop: Duration,
    pub start: Duration,
    pub reboot: Duration,
    pub shutdown: Duration,
    pub clone: Duration,
    pub configure: Duration,
    pub resize_disk: Duration,
}

impl Default for OperationTimeouts {
    fn default() -> Self {
        let default = Duration::from_secs(600);
        Self {
            create: default,
            delete: default,
            stop: default,
            start: default,
            reboot: default,
            shutdown: default,
            clone: default,
            configure: default,
            resize_disk: default,
        }
    }
}

/// Desired state of one QEMU guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSpec {
    pub node: String,
    pub vm_id: VmId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios: Option<Bios>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<OsType>,
    /// Machine type, e.g. `q35`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<String>,
    /// Raw arguments appended to the KVM command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kvm_args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_boot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,
    #[serde(default, skip_serializing_if = "CpuConfig::is_empty")]
    pub cpu: CpuConfig,
    #[serde(default, skip_serializing_if = "MemoryConfig::is_empty")]
    pub memory: MemoryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_init: Option<CloudInitConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disks: Vec<Disk>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nics: Vec<Nic>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pci_devices: Vec<PciDevice>,
    /// Resource pool membership; a guest belongs to at most one pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_source: Option<CreateSource>,
    #[serde(default)]
    pub start_on_create: bool,
    #[serde(default)]
    pub timeouts: OperationTimeouts,
}

impl VmSpec {
    pub fn new(node: impl Into<String>, vm_id: VmId) -> Self {
        Self {
            node: node.into(),
            vm_id,
            name: None,
            description: None,
            tags: Vec::new(),
            bios: None,
            os_type: None,
            machine: None,
            keyboard: None,
            kvm_args: None,
            on_boot: None,
            agent: None,
            cpu: CpuConfig::default(),
            memory: MemoryConfig::default(),
            cloud_init: None,
            disks: Vec::new(),
            nics: Vec::new(),
            pci_devices: Vec::new(),
            pool: None,
            create_source: None,
            start_on_create: false,
            timeouts: OperationTimeouts::default(),
        }
    }

    /// Enforces the structural invariants a plan must satisfy before any
    /// API call is issued: unique disk slots, unique NIC and ipconfig
    /// positions, per-entry field validity.
    pub fn validate(&self) -> PveResult<()> {
        let mut disk_slots = BTreeSet::new();
        for disk in &self.disks {
            disk.validate()?;
            if !disk_slots.insert(disk.slot()) {
                return Err(ValidationError::ConstraintViolation(format!(
                    "duplicate disk slot {}{}",
                    disk.interface, disk.position
                ))
                .into());
            }
        }
        let mut nic_positions = BTreeSet::new();
        for nic in &self.nics {
            nic.validate()?;
            if !nic_positions.insert(nic.position) {
                return Err(ValidationError::ConstraintViolation(format!(
                    "duplicate NIC position net{}",
                    nic.position
                ))
                .into());
            }
        }
        let mut pci_positions = BTreeSet::new();
        for pci in &self.pci_devices {
            if !pci_positions.insert(pci.position) {
                return Err(ValidationError::ConstraintViolation(format!(
                    "duplicate PCI position hostpci{}",
                    pci.position
                ))
                .into());
            }
        }
        if let Some(cloud_init) = &self.cloud_init {
            cloud_init.validate()?;
        }
        Ok(())
    }

    /// Tag set encoded the way the API expects it.
    pub fn tags_joined(&self) -> String {
        self.tags.join(",")
    }
}
