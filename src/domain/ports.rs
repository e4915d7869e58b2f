//! Domain Ports - the gateway the reconciliation engine talks through
//!
//! The engine never speaks HTTP itself. Everything it needs from MAAS goes
//! through [`MachineGateway`]; `crate::maas::MaasClient` is the production
//! adapter and the tests substitute an in-memory one.

use crate::domain::status::MachineStatus;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Machine Records
// =============================================================================

/// DNS domain a machine belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: i64,
    pub name: String,
}

/// A machine as returned by `GET machines/{system_id}/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub system_id: String,
    #[serde(default)]
    pub hostname: String,
    /// Raw MAAS status code
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    /// Every other field MAAS sent, kept for the info output
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Machine {
    pub fn machine_status(&self) -> MachineStatus {
        MachineStatus::from_code(self.status)
    }
}

/// BMC parameters as returned by `op=power_parameters`
pub type PowerParameters = BTreeMap<String, serde_json::Value>;

// =============================================================================
// Storage Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockDeviceType {
    Physical,
    Virtual,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDevice {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(rename = "type")]
    pub device_type: BlockDeviceType,
    #[serde(default)]
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeGroup {
    pub id: i64,
    #[serde(default)]
    pub name: String,
}

// =============================================================================
// Network Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceType {
    Physical,
    Vlan,
    Bond,
    Bridge,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub interface_type: InterfaceType,
}

/// VLAN as embedded in a subnet record; `id` is the MAAS object id, `vid` the tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vlan {
    pub id: i64,
    pub vid: u16,
    #[serde(default)]
    pub fabric: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: i64,
    pub cidr: String,
    pub vlan: Vlan,
}

/// Link modes accepted by `op=link_subnet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkMode {
    LinkUp,
    Dhcp,
    Auto,
    Static,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::LinkUp => "link_up",
            LinkMode::Dhcp => "dhcp",
            LinkMode::Auto => "auto",
            LinkMode::Static => "static",
        }
    }
}

impl std::fmt::Display for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Arguments of one `op=link_subnet` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub mode: LinkMode,
    pub subnet_id: Option<i64>,
    pub ip_address: Option<String>,
    pub force: bool,
}

impl LinkRequest {
    pub fn new(mode: LinkMode) -> Self {
        Self {
            mode,
            subnet_id: None,
            ip_address: None,
            force: false,
        }
    }

    pub fn subnet(mut self, subnet_id: i64) -> Self {
        self.subnet_id = Some(subnet_id);
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Arguments of `op=deploy`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRequest {
    pub distro_series: Option<String>,
    pub user_data: Option<String>,
}

// =============================================================================
// Machine Gateway Port
// =============================================================================

/// Remote operations against MAAS used by the engine and the lookups
///
/// Every call is a blocking request/response from the engine's point of view
/// and may fail. Implementations must not cache machine state between calls.
#[async_trait]
pub trait MachineGateway: Send + Sync {
    // Machines

    async fn get_machine(&self, system_id: &str) -> Result<Machine>;

    /// List machines, optionally filtered by hostname
    async fn list_machines(&self, hostname: Option<&str>) -> Result<Vec<Machine>>;

    async fn power_parameters(&self, system_id: &str) -> Result<PowerParameters>;

    async fn commission(&self, system_id: &str, scripts: &[String]) -> Result<()>;

    /// Ask MAAS to release; returns once the request is accepted
    async fn release(&self, system_id: &str) -> Result<()>;

    async fn deploy(&self, system_id: &str, request: &DeployRequest) -> Result<()>;

    async fn abort(&self, system_id: &str) -> Result<()>;

    async fn update_identity(
        &self,
        system_id: &str,
        hostname: Option<&str>,
        domain_id: Option<i64>,
    ) -> Result<Machine>;

    async fn list_domains(&self) -> Result<Vec<Domain>>;

    // Storage

    async fn list_volume_groups(&self, system_id: &str) -> Result<Vec<VolumeGroup>>;

    async fn delete_volume_group(&self, system_id: &str, volume_group_id: i64) -> Result<()>;

    async fn list_block_devices(&self, system_id: &str) -> Result<Vec<BlockDevice>>;

    async fn delete_block_device(&self, system_id: &str, device_id: i64) -> Result<()>;

    async fn delete_partition(
        &self,
        system_id: &str,
        device_id: i64,
        partition_id: i64,
    ) -> Result<()>;

    async fn set_boot_disk(&self, system_id: &str, device_id: i64) -> Result<()>;

    async fn set_storage_layout(&self, system_id: &str, layout: &str) -> Result<()>;

    // Network

    async fn list_interfaces(&self, system_id: &str) -> Result<Vec<Interface>>;

    async fn delete_interface(&self, system_id: &str, interface_id: i64) -> Result<()>;

    async fn disconnect_interface(&self, system_id: &str, interface_id: i64) -> Result<()>;

    /// Create a VLAN interface; `vlan_id` is the MAAS object id of the VLAN
    async fn create_vlan_interface(
        &self,
        system_id: &str,
        parent_id: i64,
        vlan_id: i64,
    ) -> Result<Interface>;

    async fn link_subnet(
        &self,
        system_id: &str,
        interface_id: i64,
        link: &LinkRequest,
    ) -> Result<()>;

    async fn subnet_by_cidr(&self, cidr: &str) -> Result<Subnet>;
}

pub type MachineGatewayRef = Arc<dyn MachineGateway>;
