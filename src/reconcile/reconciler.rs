//! Lifecycle Reconciler
//!
//! Reads the machine's current status, looks the move up in the transition
//! table and runs the resulting steps in order. The first failing step ends
//! the run; steps already performed are not undone.

use super::network::NetworkReconfigurator;
use super::settle::{is_aborting, is_releasing, wait_for_status, SettleConfig};
use super::storage::{ResetMethod, StorageReconfigurator};
use super::transitions::{self, Action, Refusal, Transition};
use crate::domain::ports::{DeployRequest, MachineGatewayRef};
use crate::domain::spec::{ReconcileRequest, TargetState};
use crate::domain::status::MachineStatus;
use crate::error::{Error, Result};
use serde::Serialize;
use tracing::{info, instrument, warn};

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Performed,
    /// Nothing to do for this step, e.g. no boot disk requested
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub action: Action,
    pub outcome: StepOutcome,
}

/// Aggregate outcome of one reconciliation
#[derive(Debug)]
pub struct ReconcileResult {
    pub system_id: String,
    pub target: TargetState,
    /// Status read at the start, `None` if the run failed before reading it
    pub original_status: Option<MachineStatus>,
    /// Last status the engine observed
    pub status: Option<MachineStatus>,
    pub steps: Vec<StepRecord>,
    pub error: Option<Error>,
}

impl ReconcileResult {
    fn new(request: &ReconcileRequest) -> Self {
        Self {
            system_id: request.system_id.clone(),
            target: request.target,
            original_status: None,
            status: None,
            steps: Vec::new(),
            error: None,
        }
    }

    fn failed(mut self, error: Error) -> Self {
        self.error = Some(error);
        self
    }

    /// True when at least one step that modifies MAAS went through
    pub fn changed(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.outcome == StepOutcome::Performed && s.action.is_mutating())
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Turn a failed run into its error
    pub fn into_result(self) -> Result<Self> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }

    pub fn performed(&self) -> impl Iterator<Item = Action> + '_ {
        self.steps
            .iter()
            .filter(|s| s.outcome == StepOutcome::Performed)
            .map(|s| s.action)
    }
}

/// What a reconciliation would do, without doing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub system_id: String,
    pub status: MachineStatus,
    pub target: TargetState,
    /// Empty when the machine is already in the target state
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn would_change(&self) -> bool {
        self.actions.iter().any(Action::is_mutating)
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// Drives one machine towards a target state
pub struct LifecycleReconciler {
    gateway: MachineGatewayRef,
    settle: SettleConfig,
}

impl LifecycleReconciler {
    pub fn new(gateway: MachineGatewayRef) -> Self {
        Self {
            gateway,
            settle: SettleConfig::default(),
        }
    }

    pub fn with_settle(mut self, settle: SettleConfig) -> Self {
        self.settle = settle;
        self
    }

    /// Resolve the steps for the machine's current status without running them
    pub async fn plan(&self, request: &ReconcileRequest) -> Result<Plan> {
        request.validate()?;
        let status = self
            .gateway
            .get_machine(&request.system_id)
            .await?
            .machine_status();
        let actions = steps_for(status, request)?;

        Ok(Plan {
            system_id: request.system_id.clone(),
            status,
            target: request.target,
            actions: actions.to_vec(),
        })
    }

    /// Move the machine to the requested state
    ///
    /// Never returns an error directly: failures are carried in
    /// [`ReconcileResult::error`] next to the steps that did complete.
    #[instrument(skip(self, request), fields(system_id = %request.system_id, target = %request.target))]
    pub async fn reconcile(&self, request: &ReconcileRequest) -> ReconcileResult {
        let mut result = ReconcileResult::new(request);

        if let Err(e) = request.validate() {
            return result.failed(e);
        }

        let status = match self.gateway.get_machine(&request.system_id).await {
            Ok(machine) => machine.machine_status(),
            Err(e) => return result.failed(e),
        };
        result.original_status = Some(status);
        result.status = Some(status);

        let actions = match steps_for(status, request) {
            Ok(actions) => actions,
            Err(e) => {
                warn!(%status, error = %e, "Refusing transition");
                return result.failed(e);
            }
        };

        if actions.is_empty() {
            info!(%status, "Machine already in target state");
            return result;
        }
        info!(%status, steps = actions.len(), force = request.force, "Reconciling machine");

        for action in actions {
            match self.run_step(*action, request, &mut result).await {
                Ok(outcome) => {
                    info!(%action, ?outcome, "Step finished");
                    result.steps.push(StepRecord {
                        action: *action,
                        outcome,
                    });
                }
                Err(e) => {
                    warn!(%action, error = %e, "Step failed");
                    result.steps.push(StepRecord {
                        action: *action,
                        outcome: StepOutcome::Failed,
                    });
                    return result.failed(e);
                }
            }
        }

        result
    }

    async fn run_step(
        &self,
        action: Action,
        request: &ReconcileRequest,
        result: &mut ReconcileResult,
    ) -> Result<StepOutcome> {
        let gateway = self.gateway.as_ref();
        let system_id = request.system_id.as_str();
        let deployment = &request.deployment;

        match action {
            Action::Commission => {
                gateway.commission(system_id, &request.scripts).await?;
            }
            Action::Release => {
                gateway.release(system_id).await?;
            }
            Action::ReleaseAndWait => {
                gateway.release(system_id).await?;
                let status = wait_for_status(
                    gateway,
                    system_id,
                    "release",
                    self.settle.release_timeout,
                    &self.settle,
                    |s| !is_releasing(s),
                )
                .await?;
                result.status = Some(status);
                // FAILED_RELEASING, FAILED_DISK_ERASING and the like end the run here
                if status != MachineStatus::Ready {
                    return Err(Error::InvalidStateTransition {
                        status,
                        target: request.target,
                    });
                }
            }
            Action::Abort => {
                gateway.abort(system_id).await?;
            }
            Action::AwaitAbortSettled => {
                let status = wait_for_status(
                    gateway,
                    system_id,
                    "abort",
                    self.settle.abort_timeout,
                    &self.settle,
                    |s| !is_aborting(s),
                )
                .await?;
                result.status = Some(status);
            }
            Action::RequireDeployable => {
                let status = gateway.get_machine(system_id).await?.machine_status();
                result.status = Some(status);
                if !matches!(status, MachineStatus::Ready | MachineStatus::Allocated) {
                    return Err(Error::InvalidStateTransition {
                        status,
                        target: TargetState::Deployed,
                    });
                }
            }
            Action::ResetStorage => {
                if let ResetMethod::Cleared(outcome) =
                    StorageReconfigurator::new(gateway).reset(system_id).await?
                {
                    info!(deleted = outcome.deleted(), "Storage reset by deleting objects");
                }
            }
            Action::SelectBootDisk => match &deployment.boot_disk {
                Some(selector) => {
                    StorageReconfigurator::new(gateway)
                        .select_boot_disk(system_id, selector)
                        .await?;
                }
                None => return Ok(StepOutcome::Skipped),
            },
            Action::ApplyStorageLayout => match deployment.storage_layout {
                Some(layout) => {
                    StorageReconfigurator::new(gateway)
                        .set_layout(system_id, layout)
                        .await?;
                }
                None => return Ok(StepOutcome::Skipped),
            },
            Action::ClearInterfaces => {
                let outcome = NetworkReconfigurator::new(gateway)
                    .clear_interfaces(system_id)
                    .await?;
                if !outcome.touched() {
                    return Ok(StepOutcome::Skipped);
                }
            }
            Action::ApplyVlans => {
                if deployment.vlans.is_empty() {
                    return Ok(StepOutcome::Skipped);
                }
                let network = NetworkReconfigurator::new(gateway);
                for vlan in &deployment.vlans {
                    network.apply_vlan(system_id, vlan).await?;
                }
            }
            Action::Deploy => {
                let deploy = DeployRequest {
                    distro_series: deployment.distro_series.clone(),
                    user_data: deployment.b64_user_data.clone(),
                };
                gateway
                    .deploy(system_id, &deploy)
                    .await
                    .map_err(|e| match e {
                        Error::Connection { .. } | Error::Http(_) => e,
                        other => Error::Deployment(other.to_string()),
                    })?;
            }
        }

        Ok(StepOutcome::Performed)
    }
}

/// Table lookup with refusals turned into errors
fn steps_for(status: MachineStatus, request: &ReconcileRequest) -> Result<&'static [Action]> {
    let target = request.target;
    match transitions::plan(status, target, request.force) {
        Transition::Run(actions) => Ok(actions),
        Transition::NoOp => Ok(&[]),
        Transition::Refuse(Refusal::NeedsForce) => {
            Err(Error::PreconditionFailed { status, target })
        }
        Transition::Refuse(Refusal::Unsupported) => {
            Err(Error::InvalidStateTransition { status, target })
        }
    }
}
