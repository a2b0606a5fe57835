//! Domain model for guest disks.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    value_object::DiskSize,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The bus a disk attaches to. `Unused` is the family PVE parks detached
/// volumes under until they are explicitly removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskInterface {
    Scsi,
    Sata,
    Ide,
    Virtio,
    Unused,
}

impl DiskInterface {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskInterface::Scsi => "scsi",
            DiskInterface::Sata => "sata",
            DiskInterface::Ide => "ide",
            DiskInterface::Virtio => "virtio",
            DiskInterface::Unused => "unused",
        }
    }

    /// Highest slot index PVE accepts for the family.
    pub fn max_position(&self) -> u8 {
        match self {
            DiskInterface::Scsi => 30,
            DiskInterface::Sata => 5,
            DiskInterface::Ide => 3,
            DiskInterface::Virtio => 15,
            DiskInterface::Unused => 255,
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "scsi" => Ok(DiskInterface::Scsi),
            "sata" => Ok(DiskInterface::Sata),
            "ide" => Ok(DiskInterface::Ide),
            "virtio" => Ok(DiskInterface::Virtio),
            "unused" => Ok(DiskInterface::Unused),
            other => Err(ValidationError::Format(format!(
                "unknown disk interface '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DiskInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk file format of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Raw,
    Qcow2,
    Vmdk,
}

impl DiskFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Vmdk => "vmdk",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "raw" => Ok(DiskFormat::Raw),
            "qcow2" => Ok(DiskFormat::Qcow2),
            "vmdk" => Ok(DiskFormat::Vmdk),
            other => Err(ValidationError::Format(format!(
                "unknown disk format '{}'",
                other
            ))),
        }
    }
}

/// Bandwidth caps for a disk, in whole MB/s. Absent means uncapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiskSpeedLimits {
    pub read: Option<u64>,
    pub write: Option<u64>,
    pub read_max: Option<u64>,
    pub write_max: Option<u64>,
}

impl DiskSpeedLimits {
    pub fn is_empty(&self) -> bool {
        self.read.is_none()
            && self.write.is_none()
            && self.read_max.is_none()
            && self.write_max.is_none()
    }
}

/// A guest disk. The addressable identity is `(interface, position)`; the
/// matching identity across desired and live state additionally includes the
/// storage backend, because moving a disk is always delete-plus-add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    pub interface: DiskInterface,
    pub position: u8,
    /// Storage backend id (e.g. `local-lvm`).
    pub storage: String,
    /// Volume name on the backend. Present only for disks that already
    /// exist on the cluster; absent for disks still to be allocated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<DiskFormat>,
    pub size: DiskSize,
    #[serde(default)]
    pub discard: bool,
    #[serde(default)]
    pub ssd: bool,
    #[serde(default)]
    pub iothread: bool,
    #[serde(default, skip_serializing_if = "DiskSpeedLimits::is_empty")]
    pub speed: DiskSpeedLimits,
}

impl Disk {
    /// The slot identity used for field addressing and diffing.
    pub fn slot(&self) -> (DiskInterface, u8) {
        (self.interface, self.position)
    }

    /// The matching identity across state, plan and live views.
    pub fn identity(&self) -> (DiskInterface, u8, &str) {
        (self.interface, self.position, self.storage.as_str())
    }

    /// Checks the slot is addressable and the storage id non-empty.
    pub fn validate(&self) -> PveResult<()> {
        if self.position > self.interface.max_position() {
            return Err(ValidationError::ConstraintViolation(format!(
                "disk position {}{} out of range (max {})",
                self.interface,
                self.position,
                self.interface.max_position()
            ))
            .into());
        }
        if self.storage.is_empty() {
            return Err(ValidationError::Field {
                field: "storage".to_string(),
                message: "disk storage id cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// True when the two disks differ in anything other than size. Size has
    /// its own change channel (the resize call) and is deliberately left out.
    pub fn options_differ(&self, other: &Disk) -> bool {
        self.format != other.format
            || self.discard != other.discard
            || self.ssd != other.ssd
            || self.iothread != other.iothread
            || self.speed != other.speed
    }
}
