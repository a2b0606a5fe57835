//! Domain model for storage classes and node-level storage pools.

use crate::core::domain::error::{PveResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Content a storage backend may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Images,
    #[serde(rename = "rootdir")]
    RootDir,
    Vztmpl,
    Backup,
    Iso,
    Snippets,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Images => "images",
            ContentType::RootDir => "rootdir",
            ContentType::Vztmpl => "vztmpl",
            ContentType::Backup => "backup",
            ContentType::Iso => "iso",
            ContentType::Snippets => "snippets",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "images" => Ok(ContentType::Images),
            "rootdir" => Ok(ContentType::RootDir),
            "vztmpl" => Ok(ContentType::Vztmpl),
            "backup" => Ok(ContentType::Backup),
            "iso" => Ok(ContentType::Iso),
            "snippets" => Ok(ContentType::Snippets),
            other => Err(ValidationError::Format(format!(
                "unknown storage content type '{}'",
                other
            ))),
        }
    }

    /// Parses PVE's comma-joined content list, ignoring entries this model
    /// does not track (e.g. `import`).
    pub fn parse_list(value: &str) -> BTreeSet<ContentType> {
        value
            .split(',')
            .filter_map(|part| Self::parse(part.trim()).ok())
            .collect()
    }

    pub fn join(set: &BTreeSet<ContentType>) -> String {
        set.iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific attributes of a storage class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StorageKind {
    Lvm {
        vg_name: String,
    },
    LvmThin {
        vg_name: String,
        thinpool: String,
    },
    Nfs {
        server: String,
        export: String,
    },
    Zfs {
        pool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mount_point: Option<String>,
    },
}

impl StorageKind {
    /// The `type` parameter PVE expects on `POST /storage`.
    pub fn api_type(&self) -> &'static str {
        match self {
            StorageKind::Lvm { .. } => "lvm",
            StorageKind::LvmThin { .. } => "lvmthin",
            StorageKind::Nfs { .. } => "nfs",
            StorageKind::Zfs { .. } => "zfspool",
        }
    }
}

/// A cluster-wide storage class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageClass {
    pub id: String,
    pub kind: StorageKind,
    /// Nodes the class is restricted to. Empty means every node; reads
    /// materialise the actual node list in that case.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub nodes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub content: BTreeSet<ContentType>,
}

impl StorageClass {
    pub fn validate(&self) -> PveResult<()> {
        if self.id.is_empty() {
            return Err(ValidationError::Field {
                field: "id".to_string(),
                message: "storage id cannot be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Per-node observed binding of a storage class, from
/// `GET /nodes/{node}/storage`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeStorage {
    pub storage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub storage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avail: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<u8>,
}

impl NodeStorage {
    pub fn content_types(&self) -> BTreeSet<ContentType> {
        self.content
            .as_deref()
            .map(ContentType::parse_list)
            .unwrap_or_default()
    }
}

/// A physical disk on a node, from `GET /nodes/{node}/disks/list`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NodeDisk {
    pub devpath: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wearout: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "type")]
    pub disk_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

/// A ZFS pool on a node, from `GET /nodes/{node}/disks/zfs`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ZfsPoolInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alloc: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
}

/// An LVM volume group on a node, from `GET /nodes/{node}/disks/lvm`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LvmGroupInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<u64>,
}

/// An LVM thinpool on a node, from `GET /nodes/{node}/disks/lvmthin`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LvmThinPoolInfo {
    pub lv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lv_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,
}
