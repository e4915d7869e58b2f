//! Storage reconfiguration
//!
//! Clears a machine's storage, picks the boot disk and applies a layout.
//! Used by the deploy steps of the reconciler.

use crate::domain::ports::{BlockDevice, BlockDeviceType, MachineGateway};
use crate::domain::spec::StorageLayout;
use crate::error::{Error, Result};
use tracing::{debug, info, warn};

/// What [`StorageReconfigurator::clear`] removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearOutcome {
    pub volume_groups: usize,
    pub virtual_devices: usize,
    pub partitions: usize,
}

impl ClearOutcome {
    pub fn deleted(&self) -> usize {
        self.volume_groups + self.virtual_devices + self.partitions
    }

    /// At least one object was removed
    pub fn cleared(&self) -> bool {
        self.deleted() > 0
    }
}

/// How the storage got reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMethod {
    /// MAAS accepted the `blank` layout
    BlankLayout,
    /// `blank` was refused and the objects were deleted one by one
    Cleared(ClearOutcome),
}

pub struct StorageReconfigurator<'a> {
    gateway: &'a dyn MachineGateway,
}

impl<'a> StorageReconfigurator<'a> {
    pub fn new(gateway: &'a dyn MachineGateway) -> Self {
        Self { gateway }
    }

    /// Delete volume groups, then virtual devices, then partitions of physical disks
    ///
    /// Safe to call when nothing exists.
    pub async fn clear(&self, system_id: &str) -> Result<ClearOutcome> {
        let mut outcome = ClearOutcome::default();

        for vg in self.gateway.list_volume_groups(system_id).await? {
            debug!(system_id, volume_group = vg.id, "Deleting volume group");
            self.gateway.delete_volume_group(system_id, vg.id).await?;
            outcome.volume_groups += 1;
        }

        // Re-read: deleting a volume group may remove the logical volumes on it
        let devices = self.gateway.list_block_devices(system_id).await?;
        for device in devices
            .iter()
            .filter(|d| d.device_type == BlockDeviceType::Virtual)
        {
            debug!(system_id, device = %device.name, "Deleting virtual block device");
            self.gateway.delete_block_device(system_id, device.id).await?;
            outcome.virtual_devices += 1;
        }

        for device in devices
            .iter()
            .filter(|d| d.device_type == BlockDeviceType::Physical)
        {
            for partition in &device.partitions {
                debug!(system_id, device = %device.name, partition = partition.id, "Deleting partition");
                self.gateway
                    .delete_partition(system_id, device.id, partition.id)
                    .await?;
                outcome.partitions += 1;
            }
        }

        info!(
            system_id,
            volume_groups = outcome.volume_groups,
            virtual_devices = outcome.virtual_devices,
            partitions = outcome.partitions,
            "Cleared storage configuration"
        );
        Ok(outcome)
    }

    /// Wipe the storage configuration, preferring the `blank` layout
    ///
    /// Falls back to [`clear`](Self::clear) when MAAS refuses `blank`. Fails
    /// with a configuration error only if both are refused.
    pub async fn reset(&self, system_id: &str) -> Result<ResetMethod> {
        let blank = match self
            .gateway
            .set_storage_layout(system_id, StorageLayout::Blank.as_str())
            .await
        {
            Ok(()) => return Ok(ResetMethod::BlankLayout),
            Err(e @ Error::Remote { .. }) => e,
            Err(e) => return Err(e),
        };

        warn!(system_id, error = %blank, "MAAS refused the blank layout, clearing storage manually");
        match self.clear(system_id).await {
            Ok(outcome) => Ok(ResetMethod::Cleared(outcome)),
            Err(Error::Remote { body, .. }) => Err(Error::Configuration(format!(
                "Unable to reset storage ({}), then unable to clear it manually: {}",
                blank, body
            ))),
            Err(e) => Err(e),
        }
    }

    /// Apply a MAAS storage layout
    pub async fn set_layout(&self, system_id: &str, layout: StorageLayout) -> Result<()> {
        match self
            .gateway
            .set_storage_layout(system_id, layout.as_str())
            .await
        {
            Ok(()) => {
                info!(system_id, %layout, "Applied storage layout");
                Ok(())
            }
            Err(Error::Remote { body, .. }) => Err(Error::Configuration(format!(
                "Unable to apply the {} layout, please check the server in MAAS: {}",
                layout, body
            ))),
            Err(e) => Err(e),
        }
    }

    /// Mark the physical disk whose name, or failing that serial, equals `selector`
    pub async fn select_boot_disk(&self, system_id: &str, selector: &str) -> Result<BlockDevice> {
        let devices = self.gateway.list_block_devices(system_id).await?;
        let disk = find_boot_disk(&devices, selector).cloned().ok_or_else(|| {
            Error::Configuration(format!(
                "No physical disk found with name or serial number matching {}",
                selector
            ))
        })?;

        self.gateway.set_boot_disk(system_id, disk.id).await?;
        info!(system_id, disk = %disk.name, "Selected boot disk");
        Ok(disk)
    }
}

/// Exact name match wins over an exact serial match; only physical disks count
fn find_boot_disk<'d>(devices: &'d [BlockDevice], selector: &str) -> Option<&'d BlockDevice> {
    let physical = || {
        devices
            .iter()
            .filter(|d| d.device_type == BlockDeviceType::Physical)
    };
    physical()
        .find(|d| d.name == selector)
        .or_else(|| physical().find(|d| d.serial.as_deref() == Some(selector)))
}
