use serde::Deserialize;

use crate::error::LicenseError;
use crate::identity::{
    LicenseCode, MachineId, canonicalize_email, canonicalize_license_code, canonicalize_machine_id,
    clamp_machine_info, user_id,
};
use crate::models::{Binding, DBLicenses};
use crate::signing::{LicenseClaim, SealedLicense};
use crate::store::Mutation;

use super::Licensor;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRequest {
    pub email: String,
    pub license_code: String,
    pub machine_id: String,
    #[serde(default)]
    pub machine_info: String,
}

/// Transaction body: bind `machine_id` to the license under `code`.
/// Returns the license version to seal.
fn bind_machine(
    doc: Option<DBLicenses>,
    code: &LicenseCode,
    machine_id: &MachineId,
    info: &str,
    now: i64,
    max_machines: usize,
) -> Result<(Mutation<DBLicenses>, u32), LicenseError> {
    // Missing account and wrong code must look the same to the caller.
    let mut doc = doc.ok_or(LicenseError::NotFound)?;
    let license = doc.licenses.get_mut(code).ok_or(LicenseError::NotFound)?;

    match license.bind(machine_id, info.to_string(), now, max_machines) {
        Binding::LimitReached => Err(LicenseError::MachineLimitReached),
        Binding::Added | Binding::Rebound => {
            let version = license.version;
            Ok((Mutation::Put(doc), version))
        }
    }
}

impl Licensor {
    /// Bind a machine to a purchased license and seal the result.
    pub fn lookup_license(&self, request: &LicenseRequest) -> Result<SealedLicense, LicenseError> {
        let email = canonicalize_email(&request.email)?;
        let code = canonicalize_license_code(&request.license_code)?;
        let machine_id = canonicalize_machine_id(&request.machine_id)?;
        let info = clamp_machine_info(&request.machine_info);
        let user = user_id(&self.policy.product_id, &email);

        let now = self.clock.now();
        let max_machines = self.policy.machine_count_max;

        let version = self
            .store
            .with_licenses(&user, |doc| {
                bind_machine(doc, &code, &machine_id, &info, now, max_machines)
            })
            .inspect_err(|e| {
                if *e == LicenseError::MachineLimitReached {
                    tracing::info!(machine_id = %machine_id, "Machine limit reached");
                }
            })?;

        let claim = LicenseClaim {
            email,
            license_code: code,
            machine_id,
            version,
        };
        Ok(self.signer.seal(&claim)?)
    }
}
