//! The configuration-change planner.
//!
//! Given the last reconciled state, the requested plan and a fresh live
//! read, [`plan_vm_changes`] computes the minimal set of API operations
//! that converge the guest. All validation happens here; once a plan is
//! returned, applying it issues no further domain checks.

use crate::codec::{disk_field_name, ipconfig_field_name, nic_field_name, UpdateRecord, VmConfigView};
use crate::core::domain::{
    error::{PveResult, ValidationError},
    model::{
        disk::{Disk, DiskInterface},
        vm::VmSpec,
    },
    value_object::{DiskSize, MacAddress},
};
use crate::planner::pool::PoolChange;
use rand::{CryptoRng, RngCore};
use std::collections::BTreeSet;

/// One dedicated resize call. Resizes are never batched into the
/// configuration update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskResize {
    /// PVE disk field name (`scsi0`).
    pub disk: String,
    /// Target size; PVE grows the volume to this value.
    pub size: DiskSize,
}

/// The full change set for one guest reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct VmChangePlan {
    /// Field updates and deletions, applied deletions-first.
    pub record: UpdateRecord,
    pub resizes: Vec<DiskResize>,
    pub pool: PoolChange,
    /// Whether the cloud-init drive must be regenerated after the update.
    pub regenerate_cloud_init: bool,
    /// MACs generated during planning, keyed by NIC position. Callers
    /// write these back into their state so later diffs see them as stable.
    pub generated_macs: Vec<(u8, MacAddress)>,
}

impl VmChangePlan {
    pub fn is_noop(&self) -> bool {
        self.record.is_empty() && self.resizes.is_empty() && self.pool.is_nop()
    }
}

/// Computes the change plan for one guest.
///
/// `state` is the last-observed reconciled view (absent on create), `plan`
/// the requested desired state, `live` a fresh read from the cluster
/// (absent when the guest does not exist yet).
///
/// # Errors
///
/// Any structural violation in `plan` — duplicate slots, out-of-range
/// positions, a disk shrink against `live` — fails the whole plan before
/// a single API call is issued.
pub fn plan_vm_changes<R: RngCore + CryptoRng>(
    state: Option<&VmSpec>,
    plan: &VmSpec,
    live: Option<&VmConfigView>,
    rng: &mut R,
) -> PveResult<VmChangePlan> {
    plan.validate()?;

    let mut record = UpdateRecord::new();
    let mut generated_macs = Vec::new();

    plan_scalars(state, plan, &mut record);
    plan_disks(state, plan, live, &mut record)?;
    let resizes = plan_resizes(plan, live)?;
    plan_nics(state, plan, &mut record, rng, &mut generated_macs)?;
    plan_cloud_init(state, plan, &mut record)?;

    let pool = PoolChange::plan(
        state.and_then(|s| s.pool.as_deref()),
        plan.pool.as_deref(),
    );

    Ok(VmChangePlan {
        record,
        resizes,
        pool,
        regenerate_cloud_init: plan.cloud_init.is_some(),
        generated_macs,
    })
}

/// Field names for the follow-up cleanup of volumes PVE parked under
/// `unused{N}` after the update and delete passes.
pub fn unused_disk_cleanup(live: &VmConfigView) -> Vec<String> {
    live.unused_disks
        .iter()
        .map(|(position, _)| format!("unused{}", position))
        .collect()
}

fn plan_scalars(state: Option<&VmSpec>, plan: &VmSpec, record: &mut UpdateRecord) {
    match (&plan.name, state.and_then(|s| s.name.as_ref())) {
        (Some(name), old) if old != Some(name) => record.set_name(name),
        (None, Some(_)) => record.push_delete("name"),
        _ => {}
    }
    match (&plan.description, state.and_then(|s| s.description.as_ref())) {
        (Some(description), old) if old != Some(description) => {
            record.set_description(description)
        }
        (None, Some(_)) => record.push_delete("description"),
        _ => {}
    }
    let old_tags = state.map(|s| s.tags.as_slice()).unwrap_or_default();
    if !plan.tags.is_empty() {
        if plan.tags != old_tags {
            record.set_tags(&plan.tags);
        }
    } else if !old_tags.is_empty() {
        record.push_delete("tags");
    }
    match (&plan.agent, state.and_then(|s| s.agent.as_ref())) {
        (Some(agent), old) if old != Some(agent) => record.set_agent(agent),
        (None, Some(_)) => record.push_delete("agent"),
        _ => {}
    }
    if let Some(bios) = plan.bios {
        if state.and_then(|s| s.bios) != Some(bios) {
            record.set_bios(bios);
        }
    }
    if let Some(os_type) = plan.os_type {
        if state.and_then(|s| s.os_type) != Some(os_type) {
            record.set_os_type(os_type);
        }
    }
    if let Some(machine) = &plan.machine {
        if state.and_then(|s| s.machine.as_ref()) != Some(machine) {
            record.set_machine(machine);
        }
    }
    if let Some(keyboard) = &plan.keyboard {
        if state.and_then(|s| s.keyboard.as_ref()) != Some(keyboard) {
            record.set_keyboard(keyboard);
        }
    }
    if let Some(args) = &plan.kvm_args {
        if state.and_then(|s| s.kvm_args.as_ref()) != Some(args) {
            record.set_kvm_args(args);
        }
    }
    if let Some(on_boot) = plan.on_boot {
        if state.and_then(|s| s.on_boot) != Some(on_boot) {
            record.set_on_boot(on_boot);
        }
    }
    if !plan.cpu.is_empty() && state.map(|s| &s.cpu) != Some(&plan.cpu) {
        record.set_cpu(&plan.cpu);
    }
    if !plan.memory.is_empty() && state.map(|s| &s.memory) != Some(&plan.memory) {
        record.set_memory(&plan.memory);
    }
    for pci in &plan.pci_devices {
        let old = state.and_then(|s| {
            s.pci_devices
                .iter()
                .find(|candidate| candidate.position == pci.position)
        });
        if old != Some(pci) {
            record.set_pci_device(pci);
        }
    }
    if let Some(state) = state {
        for pci in &state.pci_devices {
            if !plan.pci_devices.iter().any(|p| p.position == pci.position) {
                record.push_delete(format!("hostpci{}", pci.position));
            }
        }
    }
}

fn plan_disks(
    state: Option<&VmSpec>,
    plan: &VmSpec,
    live: Option<&VmConfigView>,
    record: &mut UpdateRecord,
) -> PveResult<()> {
    for disk in &plan.disks {
        if disk.interface == DiskInterface::Unused {
            return Err(ValidationError::ConstraintViolation(format!(
                "a plan cannot place a disk on the unused family (unused{})",
                disk.position
            ))
            .into());
        }
        let previous = state.and_then(|s| {
            s.disks
                .iter()
                .find(|candidate| candidate.identity() == disk.identity())
        });
        let needs_update = match previous {
            None => true,
            Some(previous) => previous.options_differ(disk),
        };
        if needs_update {
            // Keep the volume the cluster already allocated for this slot;
            // re-encoding an allocation request would create a second one.
            let mut encoded = disk.clone();
            if encoded.volume.is_none() {
                if let Some(live_disk) =
                    live.and_then(|l| l.disk_at(disk.interface, disk.position))
                {
                    if live_disk.storage == disk.storage {
                        encoded.volume = live_disk.volume.clone();
                    }
                }
            }
            record.set_disk(disk.interface, disk.position, &encoded)?;
        }
    }

    if let Some(state) = state {
        let planned_slots: BTreeSet<(DiskInterface, u8)> =
            plan.disks.iter().map(Disk::slot).collect();
        for disk in &state.disks {
            if !planned_slots.contains(&disk.slot()) {
                record.push_delete(disk_field_name(disk.interface, disk.position)?);
            }
        }
    }
    Ok(())
}

fn plan_resizes(plan: &VmSpec, live: Option<&VmConfigView>) -> PveResult<Vec<DiskResize>> {
    let Some(live) = live else {
        return Ok(Vec::new());
    };
    let mut resizes = Vec::new();
    for disk in &plan.disks {
        let Some(live_disk) = live.disk_at(disk.interface, disk.position) else {
            continue;
        };
        if live_disk.storage != disk.storage {
            continue;
        }
        if disk.size < live_disk.size {
            return Err(ValidationError::ConstraintViolation(format!(
                "disk {}{} cannot shrink from {} to {}",
                disk.interface, disk.position, live_disk.size, disk.size
            ))
            .into());
        }
        if disk.size > live_disk.size {
            resizes.push(DiskResize {
                disk: disk_field_name(disk.interface, disk.position)?,
                size: disk.size,
            });
        }
    }
    Ok(resizes)
}

fn plan_nics<R: RngCore + CryptoRng>(
    state: Option<&VmSpec>,
    plan: &VmSpec,
    record: &mut UpdateRecord,
    rng: &mut R,
    generated_macs: &mut Vec<(u8, MacAddress)>,
) -> PveResult<()> {
    for nic in &plan.nics {
        let previous = state.and_then(|s| {
            s.nics
                .iter()
                .find(|candidate| candidate.position == nic.position)
        });

        let mut resolved = nic.clone();
        if resolved.mac.is_none() {
            // Inherit the address the last reconcile settled on; generate
            // only for genuinely new interfaces.
            resolved.mac = previous.and_then(|p| p.mac);
            if resolved.mac.is_none() {
                let mac = MacAddress::generate(rng);
                generated_macs.push((nic.position, mac));
                resolved.mac = Some(mac);
            }
        }

        if previous != Some(&resolved) {
            record.set_nic(resolved.position, &resolved)?;
        }
    }

    if let Some(state) = state {
        let planned: BTreeSet<u8> = plan.nics.iter().map(|n| n.position).collect();
        for nic in &state.nics {
            if !planned.contains(&nic.position) {
                record.push_delete(nic_field_name(nic.position)?);
            }
        }
    }
    Ok(())
}

fn plan_cloud_init(
    state: Option<&VmSpec>,
    plan: &VmSpec,
    record: &mut UpdateRecord,
) -> PveResult<()> {
    let old = state.and_then(|s| s.cloud_init.as_ref());
    if let Some(cloud_init) = &plan.cloud_init {
        for ip in &cloud_init.ip_configs {
            let previous = old.and_then(|c| {
                c.ip_configs
                    .iter()
                    .find(|candidate| candidate.position == ip.position)
            });
            if previous != Some(ip) {
                record.set_ipconfig(ip.position, ip)?;
            }
        }
        if let Some(user) = &cloud_init.user {
            if old.and_then(|c| c.user.as_ref()) != Some(user) {
                record.set_cloud_init_user(user);
            }
        }
        if let Some(password) = &cloud_init.password {
            if old.and_then(|c| c.password.as_ref()) != Some(password) {
                record.set_cloud_init_password(password);
            }
        }
        if !cloud_init.ssh_keys.is_empty()
            && old.map(|c| c.ssh_keys.as_slice()) != Some(cloud_init.ssh_keys.as_slice())
        {
            record.set_ssh_keys(&cloud_init.ssh_keys);
        }
        if let Some(domain) = &cloud_init.dns_domain {
            if old.and_then(|c| c.dns_domain.as_ref()) != Some(domain) {
                record.set_dns_domain(domain);
            }
        }
        if !cloud_init.dns_servers.is_empty()
            && old.map(|c| c.dns_servers.as_slice()) != Some(cloud_init.dns_servers.as_slice())
        {
            record.set_dns_servers(&cloud_init.dns_servers);
        }
    }

    let planned_positions: BTreeSet<u8> = plan
        .cloud_init
        .as_ref()
        .map(|c| c.ip_configs.iter().map(|ip| ip.position).collect())
        .unwrap_or_default();
    if let Some(old) = old {
        for ip in &old.ip_configs {
            if !planned_positions.contains(&ip.position) {
                record.push_delete(ipconfig_field_name(ip.position)?);
            }
        }
    }
    Ok(())
}
