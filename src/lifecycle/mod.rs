//! The asynchronous lifecycle coordinator.
//!
//! PVE acknowledges most mutating calls immediately and keeps the guest in
//! a "locked" state while the hypervisor works. The coordinator observes
//! that lock, waits for power-state transitions, and retries
//! create-then-read flows where a just-made object may be briefly absent.
//! It retries only polls, never mutating calls.

use crate::core::domain::{
    error::{PveError, PveResult},
    model::status::{PowerState, VmStatusCurrent},
    value_object::VmId,
};
use crate::core::infrastructure::api_client::ApiClient;
use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// How often the lock and state loops poll `/status/current`.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Create-then-read retry budget for LVM thinpools. Deliberately high:
/// thin metadata initialisation on spinning storage can take minutes.
pub const LVM_THIN_READ_ATTEMPTS: u32 = 50;
/// Create-then-read retry budget for ZFS pools.
pub const ZFS_READ_ATTEMPTS: u32 = 10;
/// Create-then-read retry budget for network interfaces.
pub const NETWORK_READ_ATTEMPTS: u32 = 3;

/// Computes the wall-clock deadline for an operation starting now.
pub fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout
}

/// Waits until the guest's lock is released.
///
/// Polls every [`POLL_INTERVAL`]. Transient transport and API errors are
/// logged and polling continues; the deadline is never reset by them.
///
/// # Errors
///
/// * `PveError::Timeout` when the deadline elapses
/// * any non-transient error from the status read
pub async fn wait_for_lock(
    client: &ApiClient,
    node: &str,
    vm_id: VmId,
    deadline: Instant,
) -> PveResult<()> {
    let started = Instant::now();
    let operation = format!("lock release on {}/{}", node, vm_id);
    loop {
        match read_status(client, node, vm_id).await {
            Ok(status) => {
                if !status.is_locked() {
                    return Ok(());
                }
                debug!(
                    "{}/{} still locked ({})",
                    node,
                    vm_id,
                    status.lock.as_deref().unwrap_or_default()
                );
            }
            Err(e) if e.is_transient() => {
                warn!("transient error while polling {}: {}", operation, e);
            }
            Err(e) => return Err(e),
        }
        sleep_until_or_timeout(&operation, started, deadline).await?;
    }
}

/// Waits until the guest reports the target power state.
pub async fn wait_for_state(
    client: &ApiClient,
    node: &str,
    vm_id: VmId,
    target: PowerState,
    deadline: Instant,
) -> PveResult<()> {
    let started = Instant::now();
    let operation = format!("state '{}' on {}/{}", target, node, vm_id);
    loop {
        match read_status(client, node, vm_id).await {
            Ok(status) => {
                if status.matches(target) {
                    return Ok(());
                }
                debug!("{}/{} is '{}', waiting for '{}'", node, vm_id, status.status, target);
            }
            Err(e) if e.is_transient() => {
                warn!("transient error while polling {}: {}", operation, e);
            }
            Err(e) => return Err(e),
        }
        sleep_until_or_timeout(&operation, started, deadline).await?;
    }
}

/// Retries a read until it yields a value, with linear backoff: attempt
/// `i` sleeps `i` seconds before the next try.
///
/// `read` returns `Ok(None)` while the object is still absent. Transient
/// errors count as an absent read; anything else propagates immediately.
///
/// # Errors
///
/// `PveError::NotFound` when the budget is exhausted.
pub async fn retry_read<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    mut read: F,
) -> PveResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PveResult<Option<T>>>,
{
    for attempt in 1..=max_attempts {
        match read().await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                debug!(
                    "{} not visible yet (attempt {}/{})",
                    operation, attempt, max_attempts
                );
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "transient error reading {} (attempt {}/{}): {}",
                    operation, attempt, max_attempts, e
                );
            }
            Err(e) => return Err(e),
        }
        if attempt < max_attempts {
            sleep(Duration::from_secs(u64::from(attempt))).await;
        }
    }
    Err(PveError::NotFound(format!(
        "{} still absent after {} attempts",
        operation, max_attempts
    )))
}

async fn read_status(client: &ApiClient, node: &str, vm_id: VmId) -> PveResult<VmStatusCurrent> {
    client
        .get(&format!("nodes/{}/qemu/{}/status/current", node, vm_id))
        .await
}

/// Sleeps one poll interval, capped at the remaining budget; fails with a
/// timeout when the deadline has been reached.
async fn sleep_until_or_timeout(
    operation: &str,
    started: Instant,
    deadline: Instant,
) -> PveResult<()> {
    let now = Instant::now();
    if now >= deadline {
        return Err(PveError::Timeout {
            operation: operation.to_string(),
            elapsed_secs: now.duration_since(started).as_secs(),
        });
    }
    let remaining = deadline.duration_since(now);
    sleep(POLL_INTERVAL.min(remaining)).await;
    Ok(())
}
