//! Domain model for resource pools.

use crate::core::domain::error::{PveResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What kind of object a pool member is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolMemberKind {
    Qemu,
    Storage,
}

impl PoolMemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolMemberKind::Qemu => "qemu",
            PoolMemberKind::Storage => "storage",
        }
    }
}

/// One member of a resource pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolMember {
    pub kind: PoolMemberKind,
    pub id: String,
}

/// A named resource pool grouping guests and storage for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub members: BTreeSet<PoolMember>,
}

impl ResourcePool {
    pub fn validate(&self) -> PveResult<()> {
        if self.id.is_empty() {
            return Err(ValidationError::Field {
                field: "poolid".to_string(),
                message: "pool id cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn vm_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.kind == PoolMemberKind::Qemu)
            .map(|m| m.id.as_str())
            .collect()
    }

    pub fn storage_members(&self) -> Vec<&str> {
        self.members
            .iter()
            .filter(|m| m.kind == PoolMemberKind::Storage)
            .map(|m| m.id.as_str())
            .collect()
    }
}

/// Pool detail as returned by `GET /pools/{poolid}`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PoolInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poolid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<PoolMemberInfo>,
}

/// One member entry in a pool detail response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PoolMemberInfo {
    #[serde(rename = "type")]
    pub member_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vmid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}
