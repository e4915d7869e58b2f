//! Lifecycle transition table
//!
//! Maps (current status, target, force) to the ordered list of steps that
//! moves a machine to its target. The table is plain data: each rule names a
//! target, the statuses it applies to, whether `force` is required, and the
//! steps to run. Any combination no rule covers is unsupported.

use crate::domain::spec::TargetState;
use crate::domain::status::MachineStatus;
use serde::Serialize;

// =============================================================================
// Actions
// =============================================================================

/// One step of a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Start commissioning with the requested scripts
    Commission,
    /// Release and return as soon as MAAS accepts
    Release,
    /// Release, then wait until the machine has left the deployed/releasing states
    ReleaseAndWait,
    /// Abort the running commission or deploy
    Abort,
    /// Wait until the aborted operation has stopped
    AwaitAbortSettled,
    /// Re-read the status and refuse to deploy unless it is READY or ALLOCATED
    RequireDeployable,
    /// Wipe the storage configuration
    ResetStorage,
    /// Mark the requested physical disk as boot disk
    SelectBootDisk,
    ApplyStorageLayout,
    /// Remove VLAN/bridge/bond interfaces and disconnect physical ones
    ClearInterfaces,
    ApplyVlans,
    Deploy,
}

impl Action {
    /// Whether the step changes anything in MAAS
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Action::AwaitAbortSettled | Action::RequireDeployable)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Commission => "commission",
            Action::Release => "release",
            Action::ReleaseAndWait => "release_and_wait",
            Action::Abort => "abort",
            Action::AwaitAbortSettled => "await_abort_settled",
            Action::RequireDeployable => "require_deployable",
            Action::ResetStorage => "reset_storage",
            Action::SelectBootDisk => "select_boot_disk",
            Action::ApplyStorageLayout => "apply_storage_layout",
            Action::ClearInterfaces => "clear_interfaces",
            Action::ApplyVlans => "apply_vlans",
            Action::Deploy => "deploy",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// Why a transition is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Refusal {
    /// Allowed, but only with `force: true`
    NeedsForce,
    /// Not allowed from this status at all
    Unsupported,
}

/// Outcome of looking up one cell of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "actions")]
pub enum Transition {
    Run(&'static [Action]),
    NoOp,
    Refuse(Refusal),
}

impl Transition {
    pub fn actions(&self) -> &'static [Action] {
        match self {
            Transition::Run(actions) => actions,
            Transition::NoOp | Transition::Refuse(_) => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    Always,
    Forced,
}

struct Rule {
    target: TargetState,
    from: &'static [MachineStatus],
    guard: Guard,
    /// Empty means the machine is already there
    actions: &'static [Action],
}

use Action::*;
use MachineStatus as S;

const DEPLOY: &[Action] = &[
    ResetStorage,
    SelectBootDisk,
    ApplyStorageLayout,
    ClearInterfaces,
    ApplyVlans,
    Deploy,
];

const REDEPLOY: &[Action] = &[
    ReleaseAndWait,
    RequireDeployable,
    ResetStorage,
    SelectBootDisk,
    ApplyStorageLayout,
    ClearInterfaces,
    ApplyVlans,
    Deploy,
];

static RULES: &[Rule] = &[
    // commissioned
    Rule {
        target: TargetState::Commissioned,
        from: &[S::New],
        guard: Guard::Always,
        actions: &[Commission],
    },
    Rule {
        target: TargetState::Commissioned,
        from: &[S::Ready, S::Allocated, S::Broken],
        guard: Guard::Forced,
        actions: &[Commission],
    },
    Rule {
        target: TargetState::Commissioned,
        from: &[S::Deployed],
        guard: Guard::Forced,
        actions: &[ReleaseAndWait, Commission],
    },
    Rule {
        target: TargetState::Commissioned,
        from: &[S::Commissioning, S::Deploying],
        guard: Guard::Forced,
        actions: &[Abort, AwaitAbortSettled, Commission],
    },
    // ready
    Rule {
        target: TargetState::Ready,
        from: &[S::Allocated, S::Deploying, S::Deployed],
        guard: Guard::Always,
        actions: &[Release],
    },
    Rule {
        target: TargetState::Ready,
        from: &[S::Ready],
        guard: Guard::Always,
        actions: &[],
    },
    // deployed
    Rule {
        target: TargetState::Deployed,
        from: &[S::Ready, S::Allocated],
        guard: Guard::Always,
        actions: DEPLOY,
    },
    Rule {
        target: TargetState::Deployed,
        from: &[S::Deployed, S::Deploying],
        guard: Guard::Forced,
        actions: REDEPLOY,
    },
];

/// Look up the steps that move a machine in `status` to `target`
pub fn plan(status: MachineStatus, target: TargetState, force: bool) -> Transition {
    let rule = RULES
        .iter()
        .find(|rule| rule.target == target && rule.from.contains(&status));

    match rule {
        None => Transition::Refuse(Refusal::Unsupported),
        Some(rule) if rule.guard == Guard::Forced && !force => {
            Transition::Refuse(Refusal::NeedsForce)
        }
        Some(rule) if rule.actions.is_empty() => Transition::NoOp,
        Some(rule) => Transition::Run(rule.actions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGETS: [TargetState; 3] = [
        TargetState::Commissioned,
        TargetState::Ready,
        TargetState::Deployed,
    ];

    #[test]
    fn test_commission_cells() {
        let t = TargetState::Commissioned;
        assert_eq!(plan(S::New, t, false), Transition::Run(&[Commission]));
        assert_eq!(plan(S::New, t, true), Transition::Run(&[Commission]));

        for status in [S::Ready, S::Allocated, S::Broken] {
            assert_eq!(plan(status, t, false), Transition::Refuse(Refusal::NeedsForce));
            assert_eq!(plan(status, t, true), Transition::Run(&[Commission]));
        }

        assert_eq!(
            plan(S::Deployed, t, false),
            Transition::Refuse(Refusal::NeedsForce)
        );
        assert_eq!(
            plan(S::Deployed, t, true),
            Transition::Run(&[ReleaseAndWait, Commission])
        );

        for status in [S::Commissioning, S::Deploying] {
            assert_eq!(plan(status, t, false), Transition::Refuse(Refusal::NeedsForce));
            assert_eq!(
                plan(status, t, true),
                Transition::Run(&[Abort, AwaitAbortSettled, Commission])
            );
        }

        for status in [S::FailedCommissioning, S::Releasing, S::Testing, S::Unknown] {
            assert_eq!(plan(status, t, true), Transition::Refuse(Refusal::Unsupported));
        }
    }

    #[test]
    fn test_release_cells() {
        let t = TargetState::Ready;
        for status in [S::Allocated, S::Deploying, S::Deployed] {
            assert_eq!(plan(status, t, false), Transition::Run(&[Release]));
            assert_eq!(plan(status, t, true), Transition::Run(&[Release]));
        }
        assert_eq!(plan(S::Ready, t, false), Transition::NoOp);
        assert_eq!(plan(S::Ready, t, true), Transition::NoOp);

        for status in [S::New, S::Commissioning, S::Broken, S::FailedDeployment] {
            assert_eq!(plan(status, t, true), Transition::Refuse(Refusal::Unsupported));
        }
    }

    #[test]
    fn test_deploy_cells() {
        let t = TargetState::Deployed;
        for status in [S::Ready, S::Allocated] {
            assert_eq!(plan(status, t, false), Transition::Run(DEPLOY));
        }
        for status in [S::Deployed, S::Deploying] {
            assert_eq!(plan(status, t, false), Transition::Refuse(Refusal::NeedsForce));
            let steps = plan(status, t, true).actions();
            assert_eq!(&steps[..2], &[ReleaseAndWait, RequireDeployable]);
            assert_eq!(&steps[2..], DEPLOY);
        }
        for status in [S::New, S::Broken, S::Commissioning, S::Releasing] {
            assert_eq!(plan(status, t, true), Transition::Refuse(Refusal::Unsupported));
        }
    }

    #[test]
    fn test_force_never_rescues_unsupported_cells() {
        for status in MachineStatus::all() {
            for target in TARGETS {
                if plan(status, target, true) == Transition::Refuse(Refusal::Unsupported) {
                    assert_eq!(
                        plan(status, target, false),
                        Transition::Refuse(Refusal::Unsupported),
                        "{} -> {}",
                        status,
                        target
                    );
                }
            }
        }
    }

    #[test]
    fn test_deploy_sequence_order() {
        let position = |a: Action| DEPLOY.iter().position(|x| *x == a).unwrap();
        assert!(position(ResetStorage) < position(SelectBootDisk));
        assert!(position(SelectBootDisk) < position(ApplyStorageLayout));
        assert!(position(ApplyStorageLayout) < position(ClearInterfaces));
        assert!(position(ClearInterfaces) < position(ApplyVlans));
        assert_eq!(DEPLOY.last(), Some(&Deploy));
    }

    #[test]
    fn test_transition_serializes_for_check_mode() {
        let json = serde_json::to_value(plan(S::Allocated, TargetState::Ready, false)).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "run", "actions": ["release"]}));
    }
}
