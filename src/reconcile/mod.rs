//! Per-entity reconcilers binding the planner and lifecycle coordinator
//! to the transport. All operations are single-shot and idempotent
//! relative to the live cluster view.

pub mod network;
pub mod pool;
pub mod storage;
pub mod vm;

pub use network::NetworkReconciler;
pub use pool::PoolReconciler;
pub use storage::{StorageReconciler, StorageRetrySettings};
pub use vm::{VmReadOutput, VmReconciler};
