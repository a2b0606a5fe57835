//! Reconciler for resource pools.

use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::pool::{PoolInfo, PoolMember, PoolMemberKind, ResourcePool},
};
use crate::core::infrastructure::api_client::ApiClient;
use log::info;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One entry of `GET /pools`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolListItem {
    pub poolid: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Reconciler for resource pools and their membership.
pub struct PoolReconciler {
    client: Arc<ApiClient>,
}

impl PoolReconciler {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> PveResult<Vec<PoolListItem>> {
        self.client.get("pools").await
    }

    /// Creates the pool and assigns its initial members.
    pub async fn create(&self, pool: &ResourcePool) -> PveResult<()> {
        pool.validate()?;
        let mut form: Vec<(&str, String)> = vec![("poolid", pool.id.clone())];
        if let Some(comment) = &pool.comment {
            form.push(("comment", comment.clone()));
        }
        info!("creating pool '{}'", pool.id);
        let _: Option<serde_json::Value> = self.client.post("pools", Some(&form)).await?;

        if !pool.members.is_empty() {
            self.set_members(&pool.id, &pool.members, false).await?;
        }
        Ok(())
    }

    pub async fn read(&self, id: &str) -> PveResult<ResourcePool> {
        let info: PoolInfo = self.client.get(&format!("pools/{}", id)).await?;
        let mut members = BTreeSet::new();
        for member in &info.members {
            match member.member_type.as_str() {
                "qemu" => {
                    if let Some(vmid) = member.vmid {
                        members.insert(PoolMember {
                            kind: PoolMemberKind::Qemu,
                            id: vmid.to_string(),
                        });
                    }
                }
                "storage" => {
                    if let Some(storage) = &member.storage {
                        members.insert(PoolMember {
                            kind: PoolMemberKind::Storage,
                            id: storage.clone(),
                        });
                    }
                }
                other => {
                    log::warn!("ignoring pool member of unknown kind '{}'", other);
                }
            }
        }
        Ok(ResourcePool {
            id: id.to_string(),
            comment: info.comment,
            members,
        })
    }

    /// Converges comment and membership onto the desired pool definition.
    pub async fn update(&self, pool: &ResourcePool) -> PveResult<()> {
        pool.validate()?;
        let current = self.read(&pool.id).await?;

        if pool.comment != current.comment {
            let comment = pool.comment.clone().unwrap_or_default();
            let form = [("comment", comment)];
            let _: Option<serde_json::Value> = self
                .client
                .put(&format!("pools/{}", pool.id), Some(&form))
                .await?;
        }

        let added: BTreeSet<PoolMember> =
            pool.members.difference(&current.members).cloned().collect();
        let removed: BTreeSet<PoolMember> =
            current.members.difference(&pool.members).cloned().collect();
        if !removed.is_empty() {
            self.set_members(&pool.id, &removed, true).await?;
        }
        if !added.is_empty() {
            self.set_members(&pool.id, &added, false).await?;
        }
        Ok(())
    }

    /// A pool must be empty before deletion; members are detached first.
    pub async fn delete(&self, id: &str) -> PveResult<()> {
        let current = self.read(id).await?;
        if !current.members.is_empty() {
            self.set_members(id, &current.members, true).await?;
        }
        info!("deleting pool '{}'", id);
        let _: Option<serde_json::Value> = self.client.delete(&format!("pools/{}", id)).await?;
        Ok(())
    }

    pub async fn import(&self, id: &str) -> PveResult<ResourcePool> {
        if id.is_empty() {
            return Err(ValidationError::Field {
                field: "poolid".to_string(),
                message: "pool id cannot be empty".to_string(),
            }
            .into());
        }
        self.read(id).await
    }

    /// Membership additions pass `delete=0`, removals `delete=1`.
    async fn set_members(
        &self,
        pool: &str,
        members: &BTreeSet<PoolMember>,
        remove: bool,
    ) -> PveResult<()> {
        let vms: Vec<&str> = members
            .iter()
            .filter(|m| m.kind == PoolMemberKind::Qemu)
            .map(|m| m.id.as_str())
            .collect();
        let storage: Vec<&str> = members
            .iter()
            .filter(|m| m.kind == PoolMemberKind::Storage)
            .map(|m| m.id.as_str())
            .collect();

        let mut form: Vec<(&str, String)> = vec![(
            "delete",
            if remove { "1" } else { "0" }.to_string(),
        )];
        if !vms.is_empty() {
            form.push(("vms", vms.join(",")));
        }
        if !storage.is_empty() {
            form.push(("storage", storage.join(",")));
        }
        let _: Option<serde_json::Value> = self
            .client
            .put(&format!("pools/{}", pool), Some(&form))
            .await?;
        Ok(())
    }
}
