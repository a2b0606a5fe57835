//! Domain model for node-level network interfaces (bridges and bonds).

use crate::core::domain::{
    error::{PveResult, ValidationError},
    value_object::{BondName, BridgeName},
};
use serde::{Deserialize, Serialize};

/// Bonding policy, matching the kernel's `bond_mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BondMode {
    BalanceRr,
    ActiveBackup,
    BalanceXor,
    Broadcast,
    #[serde(rename = "802.3ad")]
    Lacp,
    BalanceTlb,
    BalanceAlb,
}

impl BondMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondMode::BalanceRr => "balance-rr",
            BondMode::ActiveBackup => "active-backup",
            BondMode::BalanceXor => "balance-xor",
            BondMode::Broadcast => "broadcast",
            BondMode::Lacp => "802.3ad",
            BondMode::BalanceTlb => "balance-tlb",
            BondMode::BalanceAlb => "balance-alb",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "balance-rr" => Ok(BondMode::BalanceRr),
            "active-backup" => Ok(BondMode::ActiveBackup),
            "balance-xor" => Ok(BondMode::BalanceXor),
            "broadcast" => Ok(BondMode::Broadcast),
            "802.3ad" => Ok(BondMode::Lacp),
            "balance-tlb" => Ok(BondMode::BalanceTlb),
            "balance-alb" => Ok(BondMode::BalanceAlb),
            other => Err(ValidationError::Format(format!(
                "unknown bond mode '{}'",
                other
            ))),
        }
    }
}

/// Transmit hash policy for xor/LACP bonds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BondHashPolicy {
    #[serde(rename = "layer2")]
    Layer2,
    #[serde(rename = "layer2+3")]
    Layer2Plus3,
    #[serde(rename = "layer3+4")]
    Layer3Plus4,
}

impl BondHashPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BondHashPolicy::Layer2 => "layer2",
            BondHashPolicy::Layer2Plus3 => "layer2+3",
            BondHashPolicy::Layer3Plus4 => "layer3+4",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "layer2" => Ok(BondHashPolicy::Layer2),
            "layer2+3" => Ok(BondHashPolicy::Layer2Plus3),
            "layer3+4" => Ok(BondHashPolicy::Layer3Plus4),
            other => Err(ValidationError::Format(format!(
                "unknown bond hash policy '{}'",
                other
            ))),
        }
    }
}

/// Desired state of a Linux bridge on a node. `name: None` asks the
/// reconciler to auto-allocate the first free `vmbr<n>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkBridge {
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<BridgeName>,
    /// Member ports, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// IPv4 address in CIDR notation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway6: Option<String>,
    #[serde(default)]
    pub vlan_aware: bool,
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

/// Desired state of a bond on a node. `name: None` auto-allocates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkBond {
    pub node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<BondName>,
    pub slaves: Vec<String>,
    pub mode: BondMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_policy: Option<BondHashPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub miimon: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default = "default_true")]
    pub autostart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

fn default_true() -> bool {
    true
}

impl NetworkBond {
    pub fn validate(&self) -> PveResult<()> {
        if self.slaves.is_empty() {
            return Err(ValidationError::Field {
                field: "slaves".to_string(),
                message: "a bond needs at least one member interface".to_string(),
            }
            .into());
        }
        if let Some(primary) = &self.primary {
            if !self.slaves.contains(primary) {
                return Err(ValidationError::ConstraintViolation(format!(
                    "bond primary '{}' is not one of its members",
                    primary
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// A node network interface as returned by `GET /nodes/{node}/network`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkIfaceInfo {
    pub iface: String,
    #[serde(rename = "type")]
    pub iface_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autostart: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_ports: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_vlan_aware: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slaves: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bond_xmit_hash_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "bond-primary")]
    pub bond_primary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway6: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}
