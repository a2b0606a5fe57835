#![feature(error_generic_member_access)] // Required for backtrace capture in thiserror (unstable) https://github.com/rust-lang/rust/issues/99301

mod auth;
mod codec;
mod config;
mod core;
mod lifecycle;
mod planner;
mod reconcile;

#[cfg(test)]
mod tests;

pub use crate::codec::{UpdateRecord, VmConfigView};
pub use crate::config::{ConnectionOptions, Credentials, RateLimitConfig};
pub use crate::core::domain::error::{PveError, PveResult, ValidationError};
pub use crate::core::domain::model::{
    cloudinit::{CloudInitConfig, CloudInitIp, IpSpec},
    disk::{Disk, DiskFormat, DiskInterface, DiskSpeedLimits},
    network::{BondHashPolicy, BondMode, NetworkBond, NetworkBridge, NetworkIfaceInfo},
    nic::{Nic, NicModel},
    pool::{PoolMember, PoolMemberKind, ResourcePool},
    status::{NodeListItem, PowerState, VmListItem, VmStatusCurrent},
    storage::{
        ContentType, LvmGroupInfo, LvmThinPoolInfo, NodeDisk, NodeStorage, StorageClass,
        StorageKind, ZfsPoolInfo,
    },
    vm::{
        AgentConfig, Bios, CpuConfig, CreateSource, MemoryConfig, OperationTimeouts, OsType,
        PciDevice, VmSpec,
    },
};
pub use crate::core::domain::value_object::{
    allocate_iface_name, BondName, BridgeName, DiskSize, IfaceKind, MacAddress, ObjectId, VmId,
};
pub use crate::core::infrastructure::api_client::ApiClient;
pub use crate::planner::{
    plan_vm_changes, unused_disk_cleanup, DiskResize, PoolChange, VmChangePlan,
};
pub use crate::reconcile::{
    NetworkReconciler, PoolReconciler, StorageReconciler, StorageRetrySettings, VmReadOutput,
    VmReconciler,
};

use std::sync::Arc;
use std::time::Duration;

/// A client for declaratively reconciling a Proxmox VE cluster.
///
/// One shared transport backs every reconciler for the lifetime of the
/// process; each accessor hands out a reconciler borrowing it.
///
/// # Examples
///
/// ```no_run
/// use pvesync::{PveClient, PveResult, VmId};
///
/// #[tokio::main]
/// async fn main() -> PveResult<()> {
///     let client = PveClient::builder()
///         .endpoint("https://10.0.0.2:8006")
///         .api_token("automation@pve!tf=uuid")
///         .insecure_tls(true)
///         .build()?;
///
///     let vm = client.vms().read("pve1", VmId::new(100)?).await?;
///     println!("{:?}", vm.status.status);
///     Ok(())
/// }
/// ```
pub struct PveClient {
    api: Arc<ApiClient>,
}

/// Builder for PveClient configuration
#[derive(Debug, Default)]
pub struct PveClientBuilder {
    endpoint: Option<String>,
    api_token: Option<String>,
    username: Option<String>,
    password: Option<String>,
    insecure_tls: bool,
    request_timeout: Option<Duration>,
    rate_limit: Option<RateLimitConfig>,
}

impl PveClientBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Token authentication: `user@realm!tokenid=uuid`. Exclusive with
    /// [`credentials`](Self::credentials).
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Ticket authentication with `user@realm` and password. Exclusive
    /// with [`api_token`](Self::api_token).
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Skip TLS certificate verification. Off by default.
    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    /// Per-request deadline for a single HTTP call (default 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Optional client-side request throttle.
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    pub fn build(self) -> PveResult<PveClient> {
        let endpoint = self.endpoint.ok_or_else(|| {
            PveError::from(ValidationError::Field {
                field: "endpoint".to_string(),
                message: "endpoint is required".to_string(),
            })
        })?;
        let credentials = Credentials::resolve(self.api_token, self.username, self.password)?;
        let mut options = ConnectionOptions::new(&endpoint, credentials)?;
        options.insecure_tls = self.insecure_tls;
        if let Some(timeout) = self.request_timeout {
            options.request_timeout = timeout;
        }
        options.rate_limit = self.rate_limit;
        PveClient::with_options(options)
    }
}

impl PveClient {
    /// Creates a new builder for PveClient configuration
    pub fn builder() -> PveClientBuilder {
        PveClientBuilder::default()
    }

    /// Builds a client from the `PROXMOX_*` environment variables.
    pub fn from_env() -> PveResult<Self> {
        Self::with_options(ConnectionOptions::from_env()?)
    }

    pub fn with_options(options: ConnectionOptions) -> PveResult<Self> {
        Ok(Self {
            api: Arc::new(ApiClient::new(options)?),
        })
    }

    /// The shared transport, for callers composing their own flows.
    pub fn api(&self) -> Arc<ApiClient> {
        Arc::clone(&self.api)
    }

    pub fn vms(&self) -> VmReconciler {
        VmReconciler::new(Arc::clone(&self.api))
    }

    pub fn storage(&self) -> StorageReconciler {
        StorageReconciler::new(Arc::clone(&self.api))
    }

    pub fn network(&self) -> NetworkReconciler {
        NetworkReconciler::new(Arc::clone(&self.api))
    }

    pub fn pools(&self) -> PoolReconciler {
        PoolReconciler::new(Arc::clone(&self.api))
    }

    /// The cluster's node inventory.
    pub async fn nodes(&self) -> PveResult<Vec<NodeListItem>> {
        self.api.get("nodes").await
    }
}
