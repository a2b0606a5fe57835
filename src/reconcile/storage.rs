//! Reconciler for cluster storage classes and node-level disk pools.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::{
        status::NodeListItem,
        storage::{
            ContentType, LvmGroupInfo, LvmThinPoolInfo, NodeDisk, NodeStorage, StorageClass,
            StorageKind, ZfsPoolInfo,
        },
    },
};
use crate::core::infrastructure::api_client::ApiClient;
use crate::lifecycle::{retry_read, LVM_THIN_READ_ATTEMPTS, ZFS_READ_ATTEMPTS};
use log::info;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Wire shape of `GET /storage/{id}`.
#[derive(Debug, Clone, Deserialize)]
struct StorageInfo {
    storage: String,
    #[serde(rename = "type")]
    storage_type: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    nodes: Option<String>,
    #[serde(default)]
    vgname: Option<String>,
    #[serde(default)]
    thinpool: Option<String>,
    #[serde(default)]
    server: Option<String>,
    #[serde(default)]
    export: Option<String>,
    #[serde(default)]
    pool: Option<String>,
    #[serde(default)]
    mountpoint: Option<String>,
}

/// Create-then-read retry budgets, tunable per deployment. The LVM-thin
/// default is high because thin metadata initialisation on slow disks can
/// take minutes.
#[derive(Debug, Clone, Copy)]
pub struct StorageRetrySettings {
    pub lvm_thin_attempts: u32,
    pub zfs_attempts: u32,
}

impl Default for StorageRetrySettings {
    fn default() -> Self {
        Self {
            lvm_thin_attempts: LVM_THIN_READ_ATTEMPTS,
            zfs_attempts: ZFS_READ_ATTEMPTS,
        }
    }
}

/// Reconciler for storage classes and the ZFS/LVM pools backing them.
pub struct StorageReconciler {
    client: Arc<ApiClient>,
    retries: StorageRetrySettings,
}

impl StorageReconciler {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            retries: StorageRetrySettings::default(),
        }
    }

    pub fn with_retry_settings(mut self, retries: StorageRetrySettings) -> Self {
        self.retries = retries;
        self
    }

    /// Registers a storage class cluster-wide.
    pub async fn create(&self, class: &StorageClass) -> PveResult<()> {
        class.validate()?;
        let mut form: Vec<(&str, String)> = vec![
            ("storage", class.id.clone()),
            ("type", class.kind.api_type().to_string()),
        ];
        if !class.content.is_empty() {
            form.push(("content", ContentType::join(&class.content)));
        }
        if !class.nodes.is_empty() {
            form.push((
                "nodes",
                class.nodes.iter().cloned().collect::<Vec<_>>().join(","),
            ));
        }
        match &class.kind {
            StorageKind::Lvm { vg_name } => {
                form.push(("vgname", vg_name.clone()));
            }
            StorageKind::LvmThin { vg_name, thinpool } => {
                form.push(("vgname", vg_name.clone()));
                form.push(("thinpool", thinpool.clone()));
            }
            StorageKind::Nfs { server, export } => {
                form.push(("server", server.clone()));
                form.push(("export", export.clone()));
            }
            StorageKind::Zfs { pool, mount_point } => {
                form.push(("pool", pool.clone()));
                if let Some(mount_point) = mount_point {
                    form.push(("mountpoint", mount_point.clone()));
                }
            }
        }
        info!("creating storage class '{}'", class.id);
        let _: Option<serde_json::Value> = self.client.post("storage", Some(&form)).await?;
        Ok(())
    }

    /// Reads a storage class. An empty node restriction is materialised
    /// into the cluster's current node list.
    pub async fn read(&self, id: &str) -> PveResult<StorageClass> {
        let info: StorageInfo = self.client.get(&format!("storage/{}", id)).await?;
        let kind = match info.storage_type.as_str() {
            "lvm" => StorageKind::Lvm {
                vg_name: info.vgname.clone().unwrap_or_default(),
            },
            "lvmthin" => StorageKind::LvmThin {
                vg_name: info.vgname.clone().unwrap_or_default(),
                thinpool: info.thinpool.clone().unwrap_or_default(),
            },
            "nfs" => StorageKind::Nfs {
                server: info.server.clone().unwrap_or_default(),
                export: info.export.clone().unwrap_or_default(),
            },
            "zfspool" => StorageKind::Zfs {
                pool: info.pool.clone().unwrap_or_default(),
                mount_point: info.mountpoint.clone(),
            },
            other => {
                return Err(ValidationError::Format(format!(
                    "unsupported storage type '{}' on storage '{}'",
                    other, info.storage
                ))
                .into());
            }
        };

        let nodes: BTreeSet<String> = match info.nodes.as_deref() {
            Some(nodes) if !nodes.is_empty() => {
                nodes.split(',').map(str::to_string).collect()
            }
            _ => self.cluster_nodes().await?,
        };

        Ok(StorageClass {
            id: info.storage,
            kind,
            nodes,
            content: info
                .content
                .as_deref()
                .map(ContentType::parse_list)
                .unwrap_or_default(),
        })
    }

    /// Updates the mutable parts of a class (content types and node
    /// restriction); the kind-specific backing is immutable on PVE.
    pub async fn update(&self, class: &StorageClass) -> PveResult<()> {
        class.validate()?;
        let mut form: Vec<(&str, String)> = Vec::new();
        if !class.content.is_empty() {
            form.push(("content", ContentType::join(&class.content)));
        }
        if !class.nodes.is_empty() {
            form.push((
                "nodes",
                class.nodes.iter().cloned().collect::<Vec<_>>().join(","),
            ));
        }
        let _: Option<serde_json::Value> = self
            .client
            .put(&format!("storage/{}", class.id), Some(&form))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> PveResult<()> {
        info!("deleting storage class '{}'", id);
        let _: Option<serde_json::Value> =
            self.client.delete(&format!("storage/{}", id)).await?;
        Ok(())
    }

    pub async fn import(&self, id: &str) -> PveResult<StorageClass> {
        self.read(id).await
    }

    /// Per-node view of a storage class with observed capacity.
    pub async fn node_storage(&self, node: &str) -> PveResult<Vec<NodeStorage>> {
        self.client.get(&format!("nodes/{}/storage", node)).await
    }

    /// Physical disk inventory of a node.
    pub async fn node_disks(&self, node: &str) -> PveResult<Vec<NodeDisk>> {
        self.client.get(&format!("nodes/{}/disks/list", node)).await
    }

    /// Creates a ZFS pool on a node and waits until it is readable.
    pub async fn create_zfs_pool(
        &self,
        node: &str,
        name: &str,
        devices: &[String],
        raid_level: &str,
    ) -> PveResult<ZfsPoolInfo> {
        let form = [
            ("name", name.to_string()),
            ("devices", devices.join(",")),
            ("raidlevel", raid_level.to_string()),
        ];
        info!("creating ZFS pool '{}' on {}", name, node);
        let _: Option<String> = self
            .client
            .post(&format!("nodes/{}/disks/zfs", node), Some(&form))
            .await?;

        let client = Arc::clone(&self.client);
        let list_path = format!("nodes/{}/disks/zfs", node);
        retry_read(
            &format!("ZFS pool '{}' on {}", name, node),
            self.retries.zfs_attempts,
            || {
                let client = Arc::clone(&client);
                let list_path = list_path.clone();
                let name = name.to_string();
                async move {
                    let pools: Vec<ZfsPoolInfo> = client.get(&list_path).await?;
                    Ok(pools.into_iter().find(|p| p.name == name))
                }
            },
        )
        .await
    }

    /// Creates an LVM thinpool on a node and waits until it is readable.
    pub async fn create_lvm_thinpool(
        &self,
        node: &str,
        name: &str,
        device: &str,
    ) -> PveResult<LvmThinPoolInfo> {
        let form = [("name", name.to_string()), ("device", device.to_string())];
        info!("creating LVM thinpool '{}' on {}", name, node);
        let _: Option<String> = self
            .client
            .post(&format!("nodes/{}/disks/lvmthin", node), Some(&form))
            .await?;

        let client = Arc::clone(&self.client);
        let list_path = format!("nodes/{}/disks/lvmthin", node);
        retry_read(
            &format!("LVM thinpool '{}' on {}", name, node),
            self.retries.lvm_thin_attempts,
            || {
                let client = Arc::clone(&client);
                let list_path = list_path.clone();
                let name = name.to_string();
                async move {
                    let pools: Vec<LvmThinPoolInfo> = client.get(&list_path).await?;
                    Ok(pools.into_iter().find(|p| p.lv == name))
                }
            },
        )
        .await
    }

    /// Creates an LVM volume group on a node and waits until it is
    /// readable.
    pub async fn create_lvm_volume_group(
        &self,
        node: &str,
        name: &str,
        device: &str,
    ) -> PveResult<LvmGroupInfo> {
        let form = [("name", name.to_string()), ("device", device.to_string())];
        info!("creating LVM volume group '{}' on {}", name, node);
        let _: Option<String> = self
            .client
            .post(&format!("nodes/{}/disks/lvm", node), Some(&form))
            .await?;

        let client = Arc::clone(&self.client);
        let list_path = format!("nodes/{}/disks/lvm", node);
        retry_read(
            &format!("LVM volume group '{}' on {}", name, node),
            self.retries.zfs_attempts,
            || {
                let client = Arc::clone(&client);
                let list_path = list_path.clone();
                let name = name.to_string();
                async move {
                    let groups: Vec<LvmGroupInfo> = client.get(&list_path).await?;
                    Ok(groups.into_iter().find(|g| g.name == name))
                }
            },
        )
        .await
    }

    /// Destroys a node disk pool, cleaning up the backing disks.
    pub async fn delete_disk_pool(&self, node: &str, kind: &str, name: &str) -> PveResult<()> {
        info!("deleting {} pool '{}' on {}", kind, name, node);
        let _: Option<String> = self
            .client
            .delete(&format!(
                "nodes/{}/disks/{}/{}?cleanup-disks=1",
                node, kind, name
            ))
            .await?;
        Ok(())
    }

    async fn cluster_nodes(&self) -> PveResult<BTreeSet<String>> {
        let nodes: Vec<NodeListItem> = self.client.get("nodes").await?;
        Ok(nodes.into_iter().map(|n| n.node).collect())
    }
}
