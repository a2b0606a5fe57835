pub mod base_value_object;
pub mod disk_size;
pub mod iface_name;
pub mod mac_address;
pub mod object_id;
pub mod vm_id;

pub use base_value_object::ValueObject;
pub use disk_size::DiskSize;
pub use iface_name::{allocate_iface_name, BondName, BridgeName, IfaceKind};
pub use mac_address::MacAddress;
pub use object_id::ObjectId;
pub use vm_id::VmId;
