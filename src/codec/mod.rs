//! Bidirectional mapping between the typed domain model and PVE's
//! positional configuration strings.

pub mod agent;
pub mod disk;
pub mod ipconfig;
pub mod nic;
pub mod update;
pub mod vm_config;

pub use agent::{decode_agent, encode_agent};
pub use disk::{decode_disk, disk_field_name, encode_disk};
pub use ipconfig::{decode_ipconfig, encode_ipconfig, ipconfig_field_name};
pub use nic::{decode_nic, encode_nic, nic_field_name};
pub use update::UpdateRecord;
pub use vm_config::{config_map_from_json, decode_vm_config, split_slot_key, VmConfigView};
