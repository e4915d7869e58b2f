//! MAAS Machine State - lifecycle reconciliation for bare-metal machines
//!
//! Drives a machine managed by Canonical MAAS to a declared lifecycle state
//! (commissioned, ready or deployed). Before a deploy it resets storage and
//! networking, then applies the declared storage layout, boot disk and VLAN
//! interfaces.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          CLI (maas-machine-state)                            │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │         Lifecycle Reconciler          │  │          Lookup             │  │
//! │  │  transition table ─► step executor    │  │  system id / state / info   │  │
//! │  │        │                  │           │  │  hostname + domain          │  │
//! │  │   settle polling   ┌──────┴───────┐   │  └──────────────┬──────────────┘  │
//! │  │                    │ Storage  Net │   │                 │                 │
//! │  └────────────────────┴──────┬───────┴───┘                 │                 │
//! │                              └───────────┬─────────────────┘                 │
//! │                        ┌─────────────────┴──────────────┐                    │
//! │                        │   MachineGateway (domain port) │                    │
//! │                        └─────────────────┬──────────────┘                    │
//! ├──────────────────────────────────────────┼──────────────────────────────────┤
//! │                        MaasClient (REST 2.0, OAuth PLAINTEXT)                │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: Machine status, request types and the gateway port
//! - [`maas`]: MAAS REST client implementing the gateway
//! - [`reconcile`]: Transition table, reconciler and reconfigurators
//! - [`lookup`]: System id resolution, state/machine info, identity updates
//! - [`error`]: Error types and handling

pub mod domain;
pub mod error;
pub mod lookup;
pub mod maas;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod simulated;

// Re-export commonly used types
pub use domain::ports::{MachineGateway, MachineGatewayRef};
pub use domain::spec::{
    load_vlans, DeploymentSpec, ReconcileRequest, StorageLayout, TargetState, VlanDeclaration,
    VlanLinkMode,
};
pub use domain::status::MachineStatus;

pub use error::{Error, ErrorKind, Result};

pub use lookup::{IdentityChange, MachineInfo, MachineSelector, StateInfo};

pub use maas::{MaasClient, MaasConfig};

pub use reconcile::{
    Action, LifecycleReconciler, Plan, ReconcileResult, SettleConfig, StepOutcome, StepRecord,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
