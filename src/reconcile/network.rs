//! Network reconfiguration
//!
//! Resets a machine's interfaces to bare physical NICs and builds the
//! declared VLAN interfaces on top of them.

use crate::domain::ports::{
    Interface, InterfaceType, LinkMode, LinkRequest, MachineGateway, Subnet,
};
use crate::domain::spec::{VlanDeclaration, VlanLinkMode};
use crate::error::{Error, Result};
use tracing::{debug, info};

/// What [`NetworkReconfigurator::clear_interfaces`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearInterfacesOutcome {
    pub deleted: usize,
    pub disconnected: usize,
}

impl ClearInterfacesOutcome {
    pub fn touched(&self) -> bool {
        self.deleted + self.disconnected > 0
    }
}

/// Virtual interfaces go first: VLANs sit on bridges and bonds, bridges on bonds
const DELETE_ORDER: [InterfaceType; 3] = [
    InterfaceType::Vlan,
    InterfaceType::Bridge,
    InterfaceType::Bond,
];

pub struct NetworkReconfigurator<'a> {
    gateway: &'a dyn MachineGateway,
}

impl<'a> NetworkReconfigurator<'a> {
    pub fn new(gateway: &'a dyn MachineGateway) -> Self {
        Self { gateway }
    }

    /// Delete VLAN, bridge and bond interfaces, then disconnect the physical ones
    pub async fn clear_interfaces(&self, system_id: &str) -> Result<ClearInterfacesOutcome> {
        let mut outcome = ClearInterfacesOutcome::default();

        let interfaces = self.gateway.list_interfaces(system_id).await?;
        for kind in DELETE_ORDER {
            for iface in interfaces.iter().filter(|i| i.interface_type == kind) {
                debug!(system_id, interface = %iface.name, "Deleting interface");
                self.gateway.delete_interface(system_id, iface.id).await?;
                outcome.deleted += 1;
            }
        }

        for iface in self
            .gateway
            .list_interfaces(system_id)
            .await?
            .iter()
            .filter(|i| i.interface_type == InterfaceType::Physical)
        {
            debug!(system_id, interface = %iface.name, "Disconnecting interface");
            self.gateway.disconnect_interface(system_id, iface.id).await?;
            outcome.disconnected += 1;
        }

        info!(
            system_id,
            deleted = outcome.deleted,
            disconnected = outcome.disconnected,
            "Cleared network interfaces"
        );
        Ok(outcome)
    }

    /// Create one VLAN interface and link it to its subnet
    pub async fn apply_vlan(&self, system_id: &str, vlan: &VlanDeclaration) -> Result<Interface> {
        let subnet = self.resolve_subnet(vlan).await?;
        if subnet.vlan.vid != vlan.vlan_id {
            return Err(Error::Configuration(format!(
                "subnet {} is on VLAN {} in MAAS, not VLAN {}",
                subnet.cidr, subnet.vlan.vid, vlan.vlan_id
            )));
        }

        let parent = self
            .gateway
            .list_interfaces(system_id)
            .await?
            .into_iter()
            .find(|i| i.name == vlan.parent)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "no interface named {} on machine {}",
                    vlan.parent, system_id
                ))
            })?;

        // The parent has to be up on the untagged network before MAAS accepts a VLAN on it
        self.gateway
            .link_subnet(
                system_id,
                parent.id,
                &LinkRequest::new(LinkMode::LinkUp).subnet(subnet.id).forced(),
            )
            .await?;
        self.gateway
            .link_subnet(system_id, parent.id, &LinkRequest::new(LinkMode::LinkUp).forced())
            .await?;

        let iface = self
            .gateway
            .create_vlan_interface(system_id, parent.id, subnet.vlan.id)
            .await?;

        let link = match vlan.link_mode {
            VlanLinkMode::Dhcp => LinkRequest::new(LinkMode::Dhcp).subnet(subnet.id),
            VlanLinkMode::Auto => LinkRequest::new(LinkMode::Auto).subnet(subnet.id),
            VlanLinkMode::Static => {
                let ip = vlan.ip_address.as_deref().ok_or_else(|| {
                    Error::Validation(format!(
                        "vlans.ip_address must be provided if vlans.link_mode: static (vlan {})",
                        vlan.vlan_id
                    ))
                })?;
                LinkRequest::new(LinkMode::Static)
                    .subnet(subnet.id)
                    .ip_address(ip)
            }
        };
        self.gateway.link_subnet(system_id, iface.id, &link).await?;

        info!(
            system_id,
            interface = %iface.name,
            vid = vlan.vlan_id,
            subnet = %subnet.cidr,
            mode = %link.mode,
            "Created VLAN interface"
        );
        Ok(iface)
    }

    async fn resolve_subnet(&self, vlan: &VlanDeclaration) -> Result<Subnet> {
        match self.gateway.subnet_by_cidr(&vlan.subnet_cidr).await {
            Err(Error::NotFound { .. }) => Err(Error::Configuration(format!(
                "no subnet {} in MAAS",
                vlan.subnet_cidr
            ))),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::spec::Presence;
    use crate::domain::status::MachineStatus;
    use crate::simulated::SimulatedMaas;
    use assert_matches::assert_matches;

    fn vlan(link_mode: VlanLinkMode, ip: Option<&str>) -> VlanDeclaration {
        VlanDeclaration {
            vlan_id: 100,
            parent: "eth0".into(),
            subnet_cidr: "10.0.0.0/24".into(),
            link_mode,
            ip_address: ip.map(str::to_string),
            presence: Presence::Present,
        }
    }

    fn machine_with_network() -> SimulatedMaas {
        let maas = SimulatedMaas::with_machine("abc123", MachineStatus::Ready);
        maas.add_interface(1, "eth0", InterfaceType::Physical);
        maas.add_interface(2, "eth1", InterfaceType::Physical);
        maas.add_interface(3, "bond0", InterfaceType::Bond);
        maas.add_interface(4, "br0", InterfaceType::Bridge);
        maas.add_interface(5, "bond0.20", InterfaceType::Vlan);
        maas.add_subnet(1, "10.0.0.0/24", 5001, 100);
        maas
    }

    #[tokio::test]
    async fn test_clear_interfaces_order() {
        let maas = machine_with_network();
        let outcome = NetworkReconfigurator::new(&maas)
            .clear_interfaces("abc123")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ClearInterfacesOutcome {
                deleted: 3,
                disconnected: 2
            }
        );
        assert_eq!(
            maas.mutating_calls(),
            vec![
                "delete_interface(5)",
                "delete_interface(4)",
                "delete_interface(3)",
                "disconnect_interface(1)",
                "disconnect_interface(2)",
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_interfaces_on_empty_machine() {
        let maas = SimulatedMaas::with_machine("abc123", MachineStatus::Ready);
        let outcome = NetworkReconfigurator::new(&maas)
            .clear_interfaces("abc123")
            .await
            .unwrap();
        assert!(!outcome.touched());
    }

    #[tokio::test]
    async fn test_apply_dhcp_vlan() {
        let maas = machine_with_network();
        let iface = NetworkReconfigurator::new(&maas)
            .apply_vlan("abc123", &vlan(VlanLinkMode::Dhcp, None))
            .await
            .unwrap();

        assert_eq!(iface.interface_type, InterfaceType::Vlan);
        assert_eq!(iface.name, "eth0.100");
        assert_eq!(
            maas.mutating_calls(),
            vec![
                "link_subnet(1, link_up, subnet=1, force)".to_string(),
                "link_subnet(1, link_up, force)".to_string(),
                "create_vlan_interface(1, 5001)".to_string(),
                format!("link_subnet({}, dhcp, subnet=1)", iface.id),
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_static_vlan_passes_address() {
        let maas = machine_with_network();
        let iface = NetworkReconfigurator::new(&maas)
            .apply_vlan("abc123", &vlan(VlanLinkMode::Static, Some("10.0.0.10")))
            .await
            .unwrap();

        let calls = maas.mutating_calls();
        assert_eq!(
            calls.last().unwrap(),
            &format!("link_subnet({}, static, subnet=1, ip=10.0.0.10)", iface.id)
        );
    }

    #[tokio::test]
    async fn test_vid_mismatch_creates_nothing() {
        let maas = machine_with_network();
        let mut declared = vlan(VlanLinkMode::Auto, None);
        declared.vlan_id = 200;

        let err = NetworkReconfigurator::new(&maas)
            .apply_vlan("abc123", &declared)
            .await
            .unwrap_err();

        assert_matches!(err, Error::Configuration(ref msg) if msg.contains("VLAN 100"));
        assert!(maas.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_parent_or_subnet() {
        let maas = machine_with_network();
        let net = NetworkReconfigurator::new(&maas);

        let mut declared = vlan(VlanLinkMode::Dhcp, None);
        declared.parent = "eth9".into();
        assert_matches!(
            net.apply_vlan("abc123", &declared).await,
            Err(Error::Configuration(ref msg)) if msg.contains("eth9")
        );

        let mut declared = vlan(VlanLinkMode::Dhcp, None);
        declared.subnet_cidr = "192.168.0.0/16".into();
        assert_matches!(
            net.apply_vlan("abc123", &declared).await,
            Err(Error::Configuration(_))
        );
        assert!(maas.mutating_calls().is_empty());
    }
}
