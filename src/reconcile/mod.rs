//! Lifecycle reconciliation
//!
//! - [`transitions`]: the (status, target, force) table
//! - [`reconciler`]: runs the steps the table selects
//! - [`storage`] / [`network`]: the reconfiguration done before a deploy
//! - [`settle`]: bounded polling after abort and release

pub mod network;
pub mod reconciler;
pub mod settle;
pub mod storage;
pub mod transitions;

pub use network::{ClearInterfacesOutcome, NetworkReconfigurator};
pub use reconciler::{LifecycleReconciler, Plan, ReconcileResult, StepOutcome, StepRecord};
pub use settle::SettleConfig;
pub use storage::{ClearOutcome, ResetMethod, StorageReconfigurator};
pub use transitions::{plan, Action, Refusal, Transition};
