//! The guest reconciler: binds the planner and the lifecycle coordinator
//! to the transport for create, read, update, delete and import.
//!
//! Apply ordering within one reconcile is fixed and observable: field
//! deletions, field updates, one dedicated call per resize, cloud-init
//! regeneration, pool membership, unused-disk cleanup. The coordinator
//! waits for the guest lock between every mutating call.

use crate::codec::{config_map_from_json, decode_vm_config, UpdateRecord, VmConfigView};
use crate::core::domain::{
    error::{PveError, PveResult, ValidationError},
    model::{
        status::{PowerState, VmListItem, VmStatusCurrent},
        vm::{CreateSource, OperationTimeouts, VmSpec},
    },
    value_object::{ObjectId, VmId},
};
use crate::core::infrastructure::api_client::ApiClient;
use crate::lifecycle::{deadline_after, wait_for_lock, wait_for_state};
use crate::planner::{plan_vm_changes, unused_disk_cleanup, PoolChange, VmChangePlan};
use log::info;
use rand::rngs::OsRng;
use std::sync::Arc;

/// The live view a read produces: decoded configuration plus runtime
/// status.
#[derive(Debug, Clone, PartialEq)]
pub struct VmReadOutput {
    pub node: String,
    pub vm_id: VmId,
    pub config: VmConfigView,
    pub status: VmStatusCurrent,
}

/// Reconciler for QEMU guests.
pub struct VmReconciler {
    client: Arc<ApiClient>,
    /// Reject plans that set root-only fields under non-root credentials.
    /// The upstream API silently misbehaves otherwise; kept as a toggle.
    enforce_root_only: bool,
}

impl VmReconciler {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self {
            client,
            enforce_root_only: true,
        }
    }

    pub fn with_root_only_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_root_only = enforce;
        self
    }

    /// Creates the guest from its clone or iso source, converges the rest
    /// of the plan, and optionally starts it. Returns the reconciled
    /// state, with generated MACs filled in.
    pub async fn create(&self, plan: &VmSpec) -> PveResult<VmSpec> {
        self.authorize(plan)?;
        plan.validate()?;

        let source = plan.create_source.as_ref().ok_or_else(|| {
            PveError::from(ValidationError::Field {
                field: "create_source".to_string(),
                message: "creating a guest requires exactly one of clone or iso".to_string(),
            })
        })?;

        match source {
            CreateSource::Clone {
                source,
                full,
                storage,
            } => {
                let mut form: Vec<(&str, String)> = vec![
                    ("newid", plan.vm_id.to_string()),
                    ("full", if *full { "1" } else { "0" }.to_string()),
                ];
                if let Some(storage) = storage {
                    form.push(("storage", storage.clone()));
                }
                if let Some(pool) = &plan.pool {
                    form.push(("pool", pool.clone()));
                }
                if let Some(name) = &plan.name {
                    form.push(("name", name.clone()));
                }
                if let Some(description) = &plan.description {
                    form.push(("description", description.clone()));
                }
                info!(
                    "cloning {}/{} into {}/{}",
                    plan.node, source, plan.node, plan.vm_id
                );
                let _: Option<String> = self
                    .client
                    .post(
                        &format!("nodes/{}/qemu/{}/clone", plan.node, source),
                        Some(&form),
                    )
                    .await?;
                wait_for_lock(
                    &self.client,
                    &plan.node,
                    plan.vm_id,
                    deadline_after(plan.timeouts.clone),
                )
                .await?;
            }
            CreateSource::Iso { storage, image } => {
                let mut form: Vec<(&str, String)> = vec![
                    ("vmid", plan.vm_id.to_string()),
                    (
                        "ide2",
                        format!("{}:iso/{},media=cdrom", storage, image),
                    ),
                ];
                if let Some(name) = &plan.name {
                    form.push(("name", name.clone()));
                }
                if let Some(pool) = &plan.pool {
                    form.push(("pool", pool.clone()));
                }
                info!("creating {}/{} from iso {}", plan.node, plan.vm_id, image);
                let _: Option<String> = self
                    .client
                    .post(&format!("nodes/{}/qemu", plan.node), Some(&form))
                    .await?;
                wait_for_lock(
                    &self.client,
                    &plan.node,
                    plan.vm_id,
                    deadline_after(plan.timeouts.create),
                )
                .await?;
            }
        }

        // The freshly created guest is the live baseline; converge the
        // rest of the plan against a null state.
        let live = self.read_config(&plan.node, plan.vm_id).await?;
        let mut changes = plan_vm_changes(None, plan, Some(&live), &mut OsRng)?;
        // Creation already decided membership via the `pool` parameter.
        changes.pool = PoolChange::Nop;
        let final_live = self.apply(plan, &changes).await?;

        if plan.start_on_create {
            self.start(&plan.node, plan.vm_id, &plan.timeouts).await?;
        }

        Ok(Self::reconciled_state(plan, &final_live))
    }

    /// Reads the guest's configuration and runtime status.
    pub async fn read(&self, node: &str, vm_id: VmId) -> PveResult<VmReadOutput> {
        let config = self.read_config(node, vm_id).await?;
        let status = self.read_status(node, vm_id).await?;
        Ok(VmReadOutput {
            node: node.to_string(),
            vm_id,
            config,
            status,
        })
    }

    /// Converges the guest from `state` to `plan` and returns the new
    /// reconciled state.
    pub async fn update(&self, state: &VmSpec, plan: &VmSpec) -> PveResult<VmSpec> {
        self.authorize(plan)?;
        let live = self.read_config(&plan.node, plan.vm_id).await?;
        let changes = plan_vm_changes(Some(state), plan, Some(&live), &mut OsRng)?;
        if changes.is_noop() {
            return Ok(Self::reconciled_state(plan, &live));
        }
        let final_live = self.apply(plan, &changes).await?;
        Ok(Self::reconciled_state(plan, &final_live))
    }

    /// Stops the guest if needed, then deletes it.
    pub async fn delete(
        &self,
        node: &str,
        vm_id: VmId,
        timeouts: &OperationTimeouts,
    ) -> PveResult<()> {
        let status = self.read_status(node, vm_id).await?;
        if !status.matches(PowerState::Stopped) {
            self.stop(node, vm_id, timeouts).await?;
        }
        wait_for_lock(&self.client, node, vm_id, deadline_after(timeouts.delete)).await?;
        info!("deleting {}/{}", node, vm_id);
        let _: Option<String> = self
            .client
            .delete(&format!("nodes/{}/qemu/{}", node, vm_id))
            .await?;
        Ok(())
    }

    /// Imports an existing guest by its `{node}/{vmid}` identifier.
    pub async fn import(&self, id: &str) -> PveResult<VmReadOutput> {
        let id = ObjectId::parse(id)?;
        let vm_id: u32 = id.name().parse().map_err(|_| {
            PveError::from(ValidationError::Format(format!(
                "invalid guest id '{}': the name part must be a vmid",
                id
            )))
        })?;
        self.read(id.node(), VmId::new(vm_id)?).await
    }

    /// Starts the guest and waits for it to report running.
    pub async fn start(
        &self,
        node: &str,
        vm_id: VmId,
        timeouts: &OperationTimeouts,
    ) -> PveResult<()> {
        info!("starting {}/{}", node, vm_id);
        let _: Option<String> = self
            .client
            .post(
                &format!("nodes/{}/qemu/{}/status/start", node, vm_id),
                None::<&()>,
            )
            .await?;
        wait_for_state(
            &self.client,
            node,
            vm_id,
            PowerState::Running,
            deadline_after(timeouts.start),
        )
        .await
    }

    /// All guests on a node.
    pub async fn list(&self, node: &str) -> PveResult<Vec<VmListItem>> {
        self.client.get(&format!("nodes/{}/qemu", node)).await
    }

    /// Reboots the guest and waits for it to report running again.
    pub async fn reboot(
        &self,
        node: &str,
        vm_id: VmId,
        timeouts: &OperationTimeouts,
    ) -> PveResult<()> {
        info!("rebooting {}/{}", node, vm_id);
        let _: Option<String> = self
            .client
            .post(
                &format!("nodes/{}/qemu/{}/status/reboot", node, vm_id),
                None::<&()>,
            )
            .await?;
        wait_for_state(
            &self.client,
            node,
            vm_id,
            PowerState::Running,
            deadline_after(timeouts.reboot),
        )
        .await
    }

    /// Asks the guest to shut down cleanly and waits for it to stop.
    pub async fn shutdown(
        &self,
        node: &str,
        vm_id: VmId,
        timeouts: &OperationTimeouts,
    ) -> PveResult<()> {
        info!("shutting down {}/{}", node, vm_id);
        let _: Option<String> = self
            .client
            .post(
                &format!("nodes/{}/qemu/{}/status/shutdown", node, vm_id),
                None::<&()>,
            )
            .await?;
        wait_for_state(
            &self.client,
            node,
            vm_id,
            PowerState::Stopped,
            deadline_after(timeouts.shutdown),
        )
        .await
    }

    /// Stops the guest and waits for it to report stopped.
    pub async fn stop(
        &self,
        node: &str,
        vm_id: VmId,
        timeouts: &OperationTimeouts,
    ) -> PveResult<()> {
        info!("stopping {}/{}", node, vm_id);
        let _: Option<String> = self
            .client
            .post(
                &format!("nodes/{}/qemu/{}/status/stop", node, vm_id),
                None::<&()>,
            )
            .await?;
        wait_for_state(
            &self.client,
            node,
            vm_id,
            PowerState::Stopped,
            deadline_after(timeouts.stop),
        )
        .await
    }

    /// Applies a computed change plan in the mandatory order and returns
    /// the final live view (read for the unused-disk cleanup).
    async fn apply(&self, plan: &VmSpec, changes: &VmChangePlan) -> PveResult<VmConfigView> {
        let node = &plan.node;
        let vm_id = plan.vm_id;
        let config_path = format!("nodes/{}/qemu/{}/config", node, vm_id);

        let (deletes, updates) = changes.record.clone().split();
        if let Some(deletes) = deletes {
            let _: Option<String> = self.client.put(&config_path, Some(&deletes)).await?;
            wait_for_lock(
                &self.client,
                node,
                vm_id,
                deadline_after(plan.timeouts.configure),
            )
            .await?;
        }
        if let Some(updates) = updates {
            let _: Option<String> = self.client.put(&config_path, Some(&updates)).await?;
            wait_for_lock(
                &self.client,
                node,
                vm_id,
                deadline_after(plan.timeouts.configure),
            )
            .await?;
        }

        for resize in &changes.resizes {
            let form = [
                ("disk", resize.disk.clone()),
                ("size", resize.size.to_string()),
            ];
            info!("resizing {}/{} {} to {}", node, vm_id, resize.disk, resize.size);
            let _: Option<String> = self
                .client
                .put(
                    &format!("nodes/{}/qemu/{}/resize", node, vm_id),
                    Some(&form),
                )
                .await?;
            wait_for_lock(
                &self.client,
                node,
                vm_id,
                deadline_after(plan.timeouts.resize_disk),
            )
            .await?;
        }

        if changes.regenerate_cloud_init {
            let _: Option<String> = self
                .client
                .put(
                    &format!("nodes/{}/qemu/{}/cloudinit", node, vm_id),
                    None::<&()>,
                )
                .await?;
            wait_for_lock(
                &self.client,
                node,
                vm_id,
                deadline_after(plan.timeouts.configure),
            )
            .await?;
        }

        self.apply_pool_change(vm_id, &changes.pool).await?;

        // Re-read: the update and delete passes may have parked volumes
        // under unused{N}; those are garbage to collect now.
        let live = self.read_config(node, vm_id).await?;
        let cleanup = unused_disk_cleanup(&live);
        if !cleanup.is_empty() {
            let mut record = UpdateRecord::new();
            for field in cleanup {
                record.push_delete(field);
            }
            let _: Option<String> = self.client.put(&config_path, Some(&record)).await?;
            wait_for_lock(
                &self.client,
                node,
                vm_id,
                deadline_after(plan.timeouts.configure),
            )
            .await?;
            return self.read_config(node, vm_id).await;
        }
        Ok(live)
    }

    async fn apply_pool_change(&self, vm_id: VmId, change: &PoolChange) -> PveResult<()> {
        match change {
            PoolChange::Nop => Ok(()),
            PoolChange::Add(pool) => self.pool_membership(pool, vm_id, false).await,
            PoolChange::Remove(pool) => self.pool_membership(pool, vm_id, true).await,
            PoolChange::Move { from, to } => {
                self.pool_membership(from, vm_id, true).await?;
                self.pool_membership(to, vm_id, false).await
            }
        }
    }

    /// Membership additions pass `delete=0`, removals `delete=1`.
    async fn pool_membership(&self, pool: &str, vm_id: VmId, remove: bool) -> PveResult<()> {
        let form = [
            ("vms", vm_id.to_string()),
            ("delete", if remove { "1" } else { "0" }.to_string()),
        ];
        let _: Option<String> = self
            .client
            .put(&format!("pools/{}", pool), Some(&form))
            .await?;
        Ok(())
    }

    async fn read_config(&self, node: &str, vm_id: VmId) -> PveResult<VmConfigView> {
        let raw: serde_json::Value = self
            .client
            .get(&format!("nodes/{}/qemu/{}/config", node, vm_id))
            .await?;
        decode_vm_config(&config_map_from_json(&raw))
    }

    async fn read_status(&self, node: &str, vm_id: VmId) -> PveResult<VmStatusCurrent> {
        self.client
            .get(&format!("nodes/{}/qemu/{}/status/current", node, vm_id))
            .await
    }

    /// The state written back after a successful reconcile: the plan, with
    /// MACs the cluster settled on so later diffs see them as stable.
    fn reconciled_state(plan: &VmSpec, live: &VmConfigView) -> VmSpec {
        let mut state = plan.clone();
        for nic in &mut state.nics {
            if nic.mac.is_none() {
                nic.mac = live
                    .nics
                    .iter()
                    .find(|l| l.position == nic.position)
                    .and_then(|l| l.mac);
            }
        }
        state
    }

    fn authorize(&self, plan: &VmSpec) -> PveResult<()> {
        if !self.enforce_root_only || self.client.credentials().is_root() {
            return Ok(());
        }
        if plan.cloud_init.is_some() {
            return Err(ValidationError::ConstraintViolation(
                "cloud-init configuration is root only".to_string(),
            )
            .into());
        }
        if plan.cpu.architecture.is_some() {
            return Err(ValidationError::ConstraintViolation(
                "cpu.architecture is root only".to_string(),
            )
            .into());
        }
        Ok(())
    }
}
