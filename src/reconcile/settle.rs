//! Waiting for MAAS to settle
//!
//! Abort and release are asynchronous on the MAAS side. Instead of sleeping
//! for a fixed time the engine re-reads the machine with exponential backoff
//! until a predicate holds or the deadline passes.

use crate::domain::ports::MachineGateway;
use crate::domain::status::MachineStatus;
use crate::error::{Error, Result};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tracing::debug;

/// Polling policy for the settle points
#[derive(Debug, Clone)]
pub struct SettleConfig {
    /// First delay between two status reads
    pub initial_interval: Duration,
    /// Upper bound for the delay between two status reads
    pub max_interval: Duration,
    /// How long an aborted commission/deploy may take to stop
    pub abort_timeout: Duration,
    /// How long a release may take to finish
    pub release_timeout: Duration,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(15),
            abort_timeout: Duration::from_secs(120),
            release_timeout: Duration::from_secs(600),
        }
    }
}

impl SettleConfig {
    /// Same intervals, both deadlines set to `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.abort_timeout = timeout;
        self.release_timeout = timeout;
        self
    }
}

/// Statuses a machine passes through while a release is in flight
pub fn is_releasing(status: MachineStatus) -> bool {
    matches!(
        status,
        MachineStatus::Deployed
            | MachineStatus::Deploying
            | MachineStatus::Allocated
            | MachineStatus::Releasing
            | MachineStatus::DiskErasing
    )
}

/// Statuses an abort is meant to leave
pub fn is_aborting(status: MachineStatus) -> bool {
    matches!(
        status,
        MachineStatus::Commissioning | MachineStatus::Deploying
    )
}

/// Re-read the machine until `settled` returns true
///
/// Returns the first status that satisfied the predicate, or
/// [`Error::TimeoutExceeded`] carrying the last status seen. Gateway errors
/// stop the polling immediately.
pub async fn wait_for_status<F>(
    gateway: &dyn MachineGateway,
    system_id: &str,
    operation: &str,
    timeout: Duration,
    config: &SettleConfig,
    settled: F,
) -> Result<MachineStatus>
where
    F: Fn(MachineStatus) -> bool,
{
    let policy = ExponentialBackoff {
        current_interval: config.initial_interval,
        initial_interval: config.initial_interval,
        max_interval: config.max_interval,
        max_elapsed_time: Some(timeout),
        randomization_factor: 0.0,
        ..Default::default()
    };

    let settled = &settled;
    retry(policy, || async move {
        let status = match gateway.get_machine(system_id).await {
            Ok(machine) => machine.machine_status(),
            Err(e) => return Err(backoff::Error::permanent(e)),
        };

        if settled(status) {
            Ok(status)
        } else {
            debug!(system_id, operation, %status, "Waiting for MAAS to settle");
            Err(backoff::Error::transient(Error::TimeoutExceeded {
                operation: operation.to_string(),
                timeout,
                last_status: status,
            }))
        }
    })
    .await
}
