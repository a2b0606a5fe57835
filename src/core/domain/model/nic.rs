//! Domain model for guest network interfaces.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    value_object::{BridgeName, MacAddress},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest NIC slot index PVE accepts (`net0..net7`).
pub const NIC_POSITION_MAX: u8 = 7;

/// Emulated NIC hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NicModel {
    Virtio,
    E1000,
    Rtl8139,
    Vmxnet3,
}

impl NicModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NicModel::Virtio => "virtio",
            NicModel::E1000 => "e1000",
            NicModel::Rtl8139 => "rtl8139",
            NicModel::Vmxnet3 => "vmxnet3",
        }
    }

    /// An unrecognised model is an error, never a warning: silently
    /// accepting one would round-trip a NIC the cluster cannot create.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "virtio" => Ok(NicModel::Virtio),
            "e1000" => Ok(NicModel::E1000),
            "rtl8139" => Ok(NicModel::Rtl8139),
            "vmxnet3" => Ok(NicModel::Vmxnet3),
            other => Err(ValidationError::Format(format!(
                "unknown NIC model '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for NicModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A guest NIC, addressed by its `netN` position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    pub position: u8,
    pub model: NicModel,
    pub bridge: BridgeName,
    /// Absent means the planner generates one and reports it back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddress>,
    /// Logical negation of the wire-level `link_down` flag.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub firewall: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    /// Rate limit in MB/s.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u64>,
    /// MTU override; only the virtio model supports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
}

fn default_true() -> bool {
    true
}

impl Nic {
    pub fn validate(&self) -> PveResult<()> {
        if self.position > NIC_POSITION_MAX {
            return Err(ValidationError::ConstraintViolation(format!(
                "NIC position net{} out of range (max net{})",
                self.position, NIC_POSITION_MAX
            ))
            .into());
        }
        if self.mtu.is_some() && self.model != NicModel::Virtio {
            return Err(ValidationError::ConstraintViolation(format!(
                "MTU can only be set on virtio NICs, net{} is {}",
                self.position, self.model
            ))
            .into());
        }
        Ok(())
    }
}
