//! Read-only lookups and identity reconciliation
//!
//! Resolves system ids from hostnames or BMC addresses, reports a machine's
//! status or full record, and brings a machine's hostname and DNS domain in
//! line with a declared value.

use crate::domain::ports::{Machine, MachineGateway, PowerParameters};
use crate::domain::status::MachineStatus;
use crate::error::{Error, Result};
use serde::Serialize;
use tracing::{debug, info};

/// How the caller identifies a machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineSelector {
    SystemId(String),
    Hostname(String),
}

impl MachineSelector {
    /// Resolve to a system id; a hostname costs one list call
    pub async fn system_id(&self, gateway: &dyn MachineGateway) -> Result<String> {
        match self {
            MachineSelector::SystemId(id) => Ok(id.clone()),
            MachineSelector::Hostname(hostname) => system_id_by_hostname(gateway, hostname).await,
        }
    }
}

/// First machine whose hostname matches exactly
pub async fn system_id_by_hostname(gateway: &dyn MachineGateway, hostname: &str) -> Result<String> {
    gateway
        .list_machines(Some(hostname))
        .await?
        .into_iter()
        .next()
        .map(|m| m.system_id)
        .ok_or_else(|| Error::not_found("machine with hostname", hostname))
}

/// Machine whose BMC `power_address` equals `address`
///
/// Fetches the power parameters of every machine, one call each. `None` when
/// nothing matches.
pub async fn system_id_by_power_address(
    gateway: &dyn MachineGateway,
    address: &str,
) -> Result<Option<String>> {
    for machine in gateway.list_machines(None).await? {
        let params = gateway.power_parameters(&machine.system_id).await?;
        let matches = params
            .get("power_address")
            .and_then(|v| v.as_str())
            .map_or(false, |a| a == address);
        if matches {
            debug!(system_id = %machine.system_id, power_address = address, "Matched BMC address");
            return Ok(Some(machine.system_id));
        }
    }
    Ok(None)
}

// =============================================================================
// Status and Machine Info
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateInfo {
    pub system_id: String,
    /// Upper-case label, e.g. `DEPLOYED`
    pub status: MachineStatus,
    /// Raw MAAS code
    pub status_id: i64,
}

pub async fn state_info(gateway: &dyn MachineGateway, selector: &MachineSelector) -> Result<StateInfo> {
    let system_id = selector.system_id(gateway).await?;
    let machine = gateway.get_machine(&system_id).await?;
    Ok(StateInfo {
        status: machine.machine_status(),
        status_id: machine.status,
        system_id,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineInfo {
    pub data: Machine,
    pub power_data: PowerParameters,
}

pub async fn machine_info(
    gateway: &dyn MachineGateway,
    selector: &MachineSelector,
) -> Result<MachineInfo> {
    let system_id = selector.system_id(gateway).await?;
    let data = gateway.get_machine(&system_id).await?;
    let power_data = gateway.power_parameters(&system_id).await?;
    Ok(MachineInfo { data, power_data })
}

// =============================================================================
// Identity
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityChange {
    pub changed: bool,
    pub original_hostname: String,
    pub original_domain: String,
    pub hostname: String,
    pub domain: String,
}

/// Set a machine's hostname and DNS domain if they differ
///
/// The domain must already exist in MAAS. With `check` set, reports what
/// would change without saving anything.
pub async fn ensure_identity(
    gateway: &dyn MachineGateway,
    system_id: &str,
    hostname: &str,
    domain: &str,
    check: bool,
) -> Result<IdentityChange> {
    let machine = gateway.get_machine(system_id).await?;
    let original_domain = machine
        .domain
        .as_ref()
        .map(|d| d.name.clone())
        .unwrap_or_default();

    let domain_id = if original_domain != domain {
        let target = gateway
            .list_domains()
            .await?
            .into_iter()
            .find(|d| d.name == domain)
            .ok_or_else(|| Error::not_found("domain", domain))?;
        Some(target.id)
    } else {
        None
    };
    let new_hostname = (machine.hostname != hostname).then_some(hostname);
    let changed = domain_id.is_some() || new_hostname.is_some();

    if changed && !check {
        gateway
            .update_identity(system_id, new_hostname, domain_id)
            .await?;
        info!(system_id, hostname, domain, "Updated machine identity");
    }

    Ok(IdentityChange {
        changed,
        original_hostname: machine.hostname,
        original_domain,
        hostname: hostname.to_string(),
        domain: domain.to_string(),
    })
}
