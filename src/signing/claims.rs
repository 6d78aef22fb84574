use serde::{Deserialize, Serialize};

use crate::identity::{Email, LicenseCode, MachineId};

/// A claim that may be sealed. Implemented only for fully typed claim
/// structs, so a half-populated claim cannot reach the signer.
pub trait Claim: Serialize {}

/// Issued for a machine's trial period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialClaim {
    pub machine_id: MachineId,
    pub version: u32,
    /// Unix seconds.
    pub expiration: i64,
}

/// Issued for a purchased license bound to a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseClaim {
    pub email: Email,
    pub license_code: LicenseCode,
    pub machine_id: MachineId,
    pub version: u32,
}

impl Claim for TrialClaim {}
impl Claim for LicenseClaim {}
