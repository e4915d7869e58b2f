//! Reconciliation request types
//!
//! What the caller asks for: a target state, the force flag, and for
//! deployments the OS, storage and VLAN configuration to apply.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Target State
// =============================================================================

/// Lifecycle goal declared by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    Commissioned,
    Ready,
    Deployed,
}

impl TargetState {
    /// Verb naming the remote operation that reaches this state
    pub fn verb(&self) -> &'static str {
        match self {
            TargetState::Commissioned => "commission",
            TargetState::Ready => "release",
            TargetState::Deployed => "deploy",
        }
    }

    pub fn participle(&self) -> &'static str {
        match self {
            TargetState::Commissioned => "commissioned",
            TargetState::Ready => "released",
            TargetState::Deployed => "deployed",
        }
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetState::Commissioned => write!(f, "commissioned"),
            TargetState::Ready => write!(f, "ready"),
            TargetState::Deployed => write!(f, "deployed"),
        }
    }
}

// =============================================================================
// Storage Layout
// =============================================================================

/// Storage layouts MAAS can apply to a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageLayout {
    Blank,
    Flat,
    Lvm,
    Vmfs6,
}

impl StorageLayout {
    /// Value of the `storage_layout` form field
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageLayout::Blank => "blank",
            StorageLayout::Flat => "flat",
            StorageLayout::Lvm => "lvm",
            StorageLayout::Vmfs6 => "vmfs6",
        }
    }
}

impl std::fmt::Display for StorageLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// VLAN Declarations
// =============================================================================

/// How a VLAN interface obtains its address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VlanLinkMode {
    Static,
    Auto,
    Dhcp,
}

/// Whether a declared VLAN interface should exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

/// A VLAN-tagged interface to create on top of a physical parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanDeclaration {
    /// 802.1Q tag; must match the tag of the subnet's VLAN in MAAS
    pub vlan_id: u16,
    /// Name of the physical parent interface, e.g. `eth0`
    pub parent: String,
    /// CIDR of the MAAS subnet to link
    pub subnet_cidr: String,
    pub link_mode: VlanLinkMode,
    /// Required when `link_mode` is static
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, rename = "state")]
    pub presence: Presence,
}

impl VlanDeclaration {
    /// Reject declarations that cannot be applied
    pub fn validate(&self) -> Result<()> {
        if self.link_mode == VlanLinkMode::Static
            && self.ip_address.as_deref().map_or(true, |ip| ip.trim().is_empty())
        {
            return Err(Error::Validation(format!(
                "vlans.ip_address must be provided if vlans.link_mode: static (vlan {} on {})",
                self.vlan_id, self.parent
            )));
        }
        if self.presence == Presence::Absent {
            return Err(Error::Validation(format!(
                "vlans.state: absent is not supported (vlan {} on {})",
                self.vlan_id, self.parent
            )));
        }
        if self.parent.trim().is_empty() {
            return Err(Error::Validation(format!(
                "vlans.parent must be set (vlan {})",
                self.vlan_id
            )));
        }
        Ok(())
    }
}

/// Load VLAN declarations from a YAML list
pub fn load_vlans(path: &Path) -> Result<Vec<VlanDeclaration>> {
    let raw = std::fs::read_to_string(path)?;
    let vlans: Vec<VlanDeclaration> = serde_yaml::from_str(&raw)?;
    Ok(vlans)
}

// =============================================================================
// Deployment Spec
// =============================================================================

/// Deployment parameters, only used when the target is `deployed`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    /// OS/distro series; MAAS picks its default when absent
    #[serde(default)]
    pub distro_series: Option<String>,
    /// Cloud-init user data, already base64-encoded
    #[serde(default)]
    pub b64_user_data: Option<String>,
    /// Device name (e.g. `sda`) or serial of the physical boot disk
    #[serde(default)]
    pub boot_disk: Option<String>,
    #[serde(default)]
    pub storage_layout: Option<StorageLayout>,
    #[serde(default)]
    pub vlans: Vec<VlanDeclaration>,
}

impl DeploymentSpec {
    pub fn validate(&self) -> Result<()> {
        for vlan in &self.vlans {
            vlan.validate()?;
        }
        if let Some(disk) = &self.boot_disk {
            if disk.trim().is_empty() {
                return Err(Error::Validation("boot_disk must not be empty".into()));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Reconcile Request
// =============================================================================

/// Everything one reconciliation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub system_id: String,
    pub target: TargetState,
    pub force: bool,
    /// Commissioning scripts, ignored unless the target is `commissioned`
    pub scripts: Vec<String>,
    pub deployment: DeploymentSpec,
}

impl ReconcileRequest {
    pub fn new(system_id: impl Into<String>, target: TargetState) -> Self {
        Self {
            system_id: system_id.into(),
            target,
            force: false,
            scripts: Vec::new(),
            deployment: DeploymentSpec::default(),
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_scripts(mut self, scripts: Vec<String>) -> Self {
        self.scripts = scripts;
        self
    }

    pub fn with_deployment(mut self, deployment: DeploymentSpec) -> Self {
        self.deployment = deployment;
        self
    }

    /// Checks that need no remote call
    pub fn validate(&self) -> Result<()> {
        if self.system_id.trim().is_empty() {
            return Err(Error::Validation("system_id must not be empty".into()));
        }
        if self.target == TargetState::Deployed {
            self.deployment.validate()?;
        }
        Ok(())
    }
}
