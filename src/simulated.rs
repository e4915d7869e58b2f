//! In-memory MAAS used by the unit tests
//!
//! Holds one primary machine with its storage and network objects, plus any
//! number of extra machines for the lookup operations. Every gateway call is
//! recorded as a short string so tests can assert on the exact sequence.

use crate::domain::ports::*;
use crate::domain::status::MachineStatus;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Default)]
struct State {
    machines: BTreeMap<String, Machine>,
    power: BTreeMap<String, PowerParameters>,
    domains: Vec<Domain>,
    volume_groups: Vec<VolumeGroup>,
    block_devices: Vec<BlockDevice>,
    interfaces: Vec<Interface>,
    subnets: Vec<Subnet>,
    /// Statuses handed out one per `get_machine`, before falling back to the stored one
    pending: VecDeque<MachineStatus>,
    /// What release/abort leave behind once the queue is drained
    after_release: Vec<MachineStatus>,
    after_abort: Vec<MachineStatus>,
    failing: BTreeSet<String>,
    rejected_layouts: BTreeSet<String>,
    next_id: i64,
    calls: Vec<String>,
}

pub(crate) struct SimulatedMaas {
    state: Mutex<State>,
}

fn machine(system_id: &str, hostname: &str, status: MachineStatus) -> Machine {
    Machine {
        system_id: system_id.to_string(),
        hostname: hostname.to_string(),
        status: status.code().unwrap_or(-1),
        domain: Some(Domain {
            id: 0,
            name: "maas".into(),
        }),
        extra: BTreeMap::new(),
    }
}

impl SimulatedMaas {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                domains: vec![Domain {
                    id: 0,
                    name: "maas".into(),
                }],
                after_release: vec![MachineStatus::Ready],
                after_abort: vec![MachineStatus::New],
                next_id: 1000,
                ..Default::default()
            }),
        }
    }

    pub fn with_machine(system_id: &str, status: MachineStatus) -> Self {
        let maas = Self::new();
        maas.add_machine(system_id, &format!("host-{}", system_id), status);
        maas
    }

    pub fn add_machine(&self, system_id: &str, hostname: &str, status: MachineStatus) {
        self.state
            .lock()
            .machines
            .insert(system_id.to_string(), machine(system_id, hostname, status));
    }

    pub fn set_power_address(&self, system_id: &str, address: &str) {
        let mut params = PowerParameters::new();
        params.insert("power_address".into(), serde_json::json!(address));
        self.state.lock().power.insert(system_id.to_string(), params);
    }

    pub fn add_domain(&self, id: i64, name: &str) {
        self.state.lock().domains.push(Domain {
            id,
            name: name.to_string(),
        });
    }

    pub fn add_volume_group(&self, id: i64) {
        self.state.lock().volume_groups.push(VolumeGroup {
            id,
            name: format!("vg{}", id),
        });
    }

    pub fn add_disk(
        &self,
        id: i64,
        name: &str,
        serial: Option<&str>,
        device_type: BlockDeviceType,
        partitions: &[i64],
    ) {
        self.state.lock().block_devices.push(BlockDevice {
            id,
            name: name.to_string(),
            serial: serial.map(str::to_string),
            device_type,
            partitions: partitions.iter().map(|id| Partition { id: *id }).collect(),
        });
    }

    pub fn add_interface(&self, id: i64, name: &str, interface_type: InterfaceType) {
        self.state.lock().interfaces.push(Interface {
            id,
            name: name.to_string(),
            interface_type,
        });
    }

    pub fn add_subnet(&self, id: i64, cidr: &str, vlan_object_id: i64, vid: u16) {
        self.state.lock().subnets.push(Subnet {
            id,
            cidr: cidr.to_string(),
            vlan: Vlan {
                id: vlan_object_id,
                vid,
                fabric: None,
            },
        });
    }

    /// Statuses returned by the next `get_machine` calls, in order
    pub fn queue_statuses(&self, statuses: &[MachineStatus]) {
        self.state.lock().pending.extend(statuses.iter().copied());
    }

    pub fn release_goes_through(&self, statuses: &[MachineStatus]) {
        self.state.lock().after_release = statuses.to_vec();
    }

    pub fn abort_goes_through(&self, statuses: &[MachineStatus]) {
        self.state.lock().after_abort = statuses.to_vec();
    }

    /// Make every call of `operation` fail with HTTP 400
    pub fn fail_on(&self, operation: &str) {
        self.state.lock().failing.insert(operation.to_string());
    }

    pub fn reject_layout(&self, layout: &str) {
        self.state.lock().rejected_layouts.insert(layout.to_string());
    }

    pub fn status_of(&self, system_id: &str) -> MachineStatus {
        self.state
            .lock()
            .machines
            .get(system_id)
            .map(Machine::machine_status)
            .unwrap_or(MachineStatus::Unknown)
    }

    pub fn interfaces(&self) -> Vec<Interface> {
        self.state.lock().interfaces.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls that change something in MAAS
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !(call.starts_with("get_")
                    || call.starts_with("list_")
                    || call.starts_with("power_parameters")
                    || call.starts_with("subnet_by_cidr"))
            })
            .collect()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split('(').next() == Some(operation))
            .count()
    }
}

impl State {
    fn record(&mut self, operation: &str, call: String) -> Result<()> {
        self.calls.push(call);
        if self.failing.contains(operation) {
            return Err(Error::Remote {
                operation: operation.to_string(),
                status: 400,
                body: "simulated failure".into(),
            });
        }
        Ok(())
    }

    fn machine_mut(&mut self, system_id: &str) -> Result<&mut Machine> {
        self.machines
            .get_mut(system_id)
            .ok_or_else(|| Error::not_found("machine", system_id))
    }

    /// Move through `path`; all but the last status are served by `get_machine` first
    fn walk(&mut self, system_id: &str, path: Vec<MachineStatus>) -> Result<()> {
        let mut path: VecDeque<MachineStatus> = path.into();
        let last = path.pop_back();
        self.pending.extend(path);
        if let Some(status) = last {
            self.machine_mut(system_id)?.status = status.code().unwrap_or(-1);
        }
        Ok(())
    }

    fn set_status(&mut self, system_id: &str, status: MachineStatus) -> Result<()> {
        self.machine_mut(system_id)?.status = status.code().unwrap_or(-1);
        Ok(())
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl MachineGateway for SimulatedMaas {
    async fn get_machine(&self, system_id: &str) -> Result<Machine> {
        let mut state = self.state.lock();
        state.record("get_machine", format!("get_machine({})", system_id))?;
        let mut machine = state
            .machines
            .get(system_id)
            .cloned()
            .ok_or_else(|| Error::not_found("machine", system_id))?;
        if let Some(status) = state.pending.pop_front() {
            machine.status = status.code().unwrap_or(-1);
        }
        Ok(machine)
    }

    async fn list_machines(&self, hostname: Option<&str>) -> Result<Vec<Machine>> {
        let mut state = self.state.lock();
        state.record("list_machines", format!("list_machines({:?})", hostname))?;
        Ok(state
            .machines
            .values()
            .filter(|m| hostname.map_or(true, |h| m.hostname == h))
            .cloned()
            .collect())
    }

    async fn power_parameters(&self, system_id: &str) -> Result<PowerParameters> {
        let mut state = self.state.lock();
        state.record("power_parameters", format!("power_parameters({})", system_id))?;
        Ok(state.power.get(system_id).cloned().unwrap_or_default())
    }

    async fn commission(&self, system_id: &str, scripts: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        state.record("commission", format!("commission({})", scripts.join(",")))?;
        state.set_status(system_id, MachineStatus::Commissioning)
    }

    async fn release(&self, system_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record("release", "release".into())?;
        let path = state.after_release.clone();
        state.walk(system_id, path)
    }

    async fn deploy(&self, system_id: &str, request: &DeployRequest) -> Result<()> {
        let mut state = self.state.lock();
        state.record(
            "deploy",
            format!(
                "deploy(distro={}, user_data={})",
                request.distro_series.as_deref().unwrap_or("-"),
                request.user_data.as_deref().unwrap_or("-")
            ),
        )?;
        state.set_status(system_id, MachineStatus::Deploying)
    }

    async fn abort(&self, system_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record("abort", "abort".into())?;
        let path = state.after_abort.clone();
        state.walk(system_id, path)
    }

    async fn update_identity(
        &self,
        system_id: &str,
        hostname: Option<&str>,
        domain_id: Option<i64>,
    ) -> Result<Machine> {
        let mut state = self.state.lock();
        state.record(
            "update_identity",
            format!("update_identity({:?}, {:?})", hostname, domain_id),
        )?;
        let domain = match domain_id {
            Some(id) => Some(
                state
                    .domains
                    .iter()
                    .find(|d| d.id == id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("domain", id.to_string()))?,
            ),
            None => None,
        };
        let machine = state.machine_mut(system_id)?;
        if let Some(hostname) = hostname {
            machine.hostname = hostname.to_string();
        }
        if domain.is_some() {
            machine.domain = domain;
        }
        Ok(machine.clone())
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        let mut state = self.state.lock();
        state.record("list_domains", "list_domains".into())?;
        Ok(state.domains.clone())
    }

    async fn list_volume_groups(&self, _system_id: &str) -> Result<Vec<VolumeGroup>> {
        let mut state = self.state.lock();
        state.record("list_volume_groups", "list_volume_groups".into())?;
        Ok(state.volume_groups.clone())
    }

    async fn delete_volume_group(&self, _system_id: &str, volume_group_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.record(
            "delete_volume_group",
            format!("delete_volume_group({})", volume_group_id),
        )?;
        state.volume_groups.retain(|vg| vg.id != volume_group_id);
        Ok(())
    }

    async fn list_block_devices(&self, _system_id: &str) -> Result<Vec<BlockDevice>> {
        let mut state = self.state.lock();
        state.record("list_block_devices", "list_block_devices".into())?;
        Ok(state.block_devices.clone())
    }

    async fn delete_block_device(&self, _system_id: &str, device_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.record(
            "delete_block_device",
            format!("delete_block_device({})", device_id),
        )?;
        state.block_devices.retain(|d| d.id != device_id);
        Ok(())
    }

    async fn delete_partition(
        &self,
        _system_id: &str,
        device_id: i64,
        partition_id: i64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.record(
            "delete_partition",
            format!("delete_partition({}, {})", device_id, partition_id),
        )?;
        if let Some(device) = state.block_devices.iter_mut().find(|d| d.id == device_id) {
            device.partitions.retain(|p| p.id != partition_id);
        }
        Ok(())
    }

    async fn set_boot_disk(&self, _system_id: &str, device_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.record("set_boot_disk", format!("set_boot_disk({})", device_id))
    }

    async fn set_storage_layout(&self, _system_id: &str, layout: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.record(
            "set_storage_layout",
            format!("set_storage_layout({})", layout),
        )?;
        if state.rejected_layouts.contains(layout) {
            return Err(Error::Remote {
                operation: "set_storage_layout".into(),
                status: 400,
                body: format!("{} layout not available", layout),
            });
        }
        if layout == "blank" {
            state.volume_groups.clear();
            state
                .block_devices
                .retain(|d| d.device_type != BlockDeviceType::Virtual);
            for device in state.block_devices.iter_mut() {
                device.partitions.clear();
            }
        }
        Ok(())
    }

    async fn list_interfaces(&self, _system_id: &str) -> Result<Vec<Interface>> {
        let mut state = self.state.lock();
        state.record("list_interfaces", "list_interfaces".into())?;
        Ok(state.interfaces.clone())
    }

    async fn delete_interface(&self, _system_id: &str, interface_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.record(
            "delete_interface",
            format!("delete_interface({})", interface_id),
        )?;
        state.interfaces.retain(|i| i.id != interface_id);
        Ok(())
    }

    async fn disconnect_interface(&self, _system_id: &str, interface_id: i64) -> Result<()> {
        let mut state = self.state.lock();
        state.record(
            "disconnect_interface",
            format!("disconnect_interface({})", interface_id),
        )
    }

    async fn create_vlan_interface(
        &self,
        _system_id: &str,
        parent_id: i64,
        vlan_id: i64,
    ) -> Result<Interface> {
        let mut state = self.state.lock();
        state.record(
            "create_vlan_interface",
            format!("create_vlan_interface({}, {})", parent_id, vlan_id),
        )?;
        let parent = state
            .interfaces
            .iter()
            .find(|i| i.id == parent_id)
            .map(|i| i.name.clone())
            .ok_or_else(|| Error::not_found("interface", parent_id.to_string()))?;
        let vid = state
            .subnets
            .iter()
            .find(|s| s.vlan.id == vlan_id)
            .map(|s| s.vlan.vid)
            .unwrap_or_default();
        let interface = Interface {
            id: state.allocate_id(),
            name: format!("{}.{}", parent, vid),
            interface_type: InterfaceType::Vlan,
        };
        state.interfaces.push(interface.clone());
        Ok(interface)
    }

    async fn link_subnet(
        &self,
        _system_id: &str,
        interface_id: i64,
        link: &LinkRequest,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let mut call = format!("link_subnet({}, {}", interface_id, link.mode);
        if let Some(subnet) = link.subnet_id {
            call.push_str(&format!(", subnet={}", subnet));
        }
        if let Some(ip) = &link.ip_address {
            call.push_str(&format!(", ip={}", ip));
        }
        if link.force {
            call.push_str(", force");
        }
        call.push(')');
        state.record("link_subnet", call)
    }

    async fn subnet_by_cidr(&self, cidr: &str) -> Result<Subnet> {
        let mut state = self.state.lock();
        state.record("subnet_by_cidr", format!("subnet_by_cidr({})", cidr))?;
        state
            .subnets
            .iter()
            .find(|s| s.cidr == cidr)
            .cloned()
            .ok_or_else(|| Error::not_found("subnet", cidr))
    }
}
