//! Machine status translation
//!
//! MAAS reports node status as a bare integer. The codes are an enumeration,
//! not a lifecycle ordering, so the mapping is an explicit table and nothing
//! in the crate compares codes numerically.

use serde::{Serialize, Serializer};

/// Symbolic machine status as reported by MAAS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MachineStatus {
    New,
    Commissioning,
    FailedCommissioning,
    Missing,
    Ready,
    Reserved,
    Deployed,
    Retired,
    Broken,
    Deploying,
    Allocated,
    FailedDeployment,
    Releasing,
    FailedReleasing,
    DiskErasing,
    FailedDiskErasing,
    RescueMode,
    EnteringRescueMode,
    FailedEnteringRescueMode,
    ExitingRescueMode,
    FailedExitingRescueMode,
    Testing,
    FailedTesting,
    /// Any code this crate does not know about
    Unknown,
}

/// Code table, kept in sync with MAAS `NODE_STATUS`
const STATUS_TABLE: [(i64, MachineStatus); 23] = [
    (0, MachineStatus::New),
    (1, MachineStatus::Commissioning),
    (2, MachineStatus::FailedCommissioning),
    (3, MachineStatus::Missing),
    (4, MachineStatus::Ready),
    (5, MachineStatus::Reserved),
    (6, MachineStatus::Deployed),
    (7, MachineStatus::Retired),
    (8, MachineStatus::Broken),
    (9, MachineStatus::Deploying),
    (10, MachineStatus::Allocated),
    (11, MachineStatus::FailedDeployment),
    (12, MachineStatus::Releasing),
    (13, MachineStatus::FailedReleasing),
    (14, MachineStatus::DiskErasing),
    (15, MachineStatus::FailedDiskErasing),
    (16, MachineStatus::RescueMode),
    (17, MachineStatus::EnteringRescueMode),
    (18, MachineStatus::FailedEnteringRescueMode),
    (19, MachineStatus::ExitingRescueMode),
    (20, MachineStatus::FailedExitingRescueMode),
    (21, MachineStatus::Testing),
    (22, MachineStatus::FailedTesting),
];

impl MachineStatus {
    /// Translate a MAAS status code; unrecognised codes become `Unknown`
    pub fn from_code(code: i64) -> Self {
        STATUS_TABLE
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, status)| *status)
            .unwrap_or(MachineStatus::Unknown)
    }

    /// The MAAS code for this status, `None` for `Unknown`
    pub fn code(&self) -> Option<i64> {
        STATUS_TABLE
            .iter()
            .find(|(_, status)| status == self)
            .map(|(c, _)| *c)
    }

    /// Upper-case label, e.g. `FAILED_COMMISSIONING`
    pub fn label(&self) -> &'static str {
        match self {
            MachineStatus::New => "NEW",
            MachineStatus::Commissioning => "COMMISSIONING",
            MachineStatus::FailedCommissioning => "FAILED_COMMISSIONING",
            MachineStatus::Missing => "MISSING",
            MachineStatus::Ready => "READY",
            MachineStatus::Reserved => "RESERVED",
            MachineStatus::Deployed => "DEPLOYED",
            MachineStatus::Retired => "RETIRED",
            MachineStatus::Broken => "BROKEN",
            MachineStatus::Deploying => "DEPLOYING",
            MachineStatus::Allocated => "ALLOCATED",
            MachineStatus::FailedDeployment => "FAILED_DEPLOYMENT",
            MachineStatus::Releasing => "RELEASING",
            MachineStatus::FailedReleasing => "FAILED_RELEASING",
            MachineStatus::DiskErasing => "DISK_ERASING",
            MachineStatus::FailedDiskErasing => "FAILED_DISK_ERASING",
            MachineStatus::RescueMode => "RESCUE_MODE",
            MachineStatus::EnteringRescueMode => "ENTERING_RESCUE_MODE",
            MachineStatus::FailedEnteringRescueMode => "FAILED_ENTERING_RESCUE_MODE",
            MachineStatus::ExitingRescueMode => "EXITING_RESCUE_MODE",
            MachineStatus::FailedExitingRescueMode => "FAILED_EXITING_RESCUE_MODE",
            MachineStatus::Testing => "TESTING",
            MachineStatus::FailedTesting => "FAILED_TESTING",
            MachineStatus::Unknown => "UNKNOWN",
        }
    }

    /// Every known status, in code order
    pub fn all() -> impl Iterator<Item = MachineStatus> {
        STATUS_TABLE.iter().map(|(_, status)| *status)
    }
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl Serialize for MachineStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}
