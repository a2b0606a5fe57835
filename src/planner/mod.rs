//! The diff planner: computes the update, delete, resize and pool change
//! sets that converge a guest onto its desired state.

pub mod diff;
pub mod pool;

pub use diff::{plan_vm_changes, unused_disk_cleanup, DiskResize, VmChangePlan};
pub use pool::PoolChange;
