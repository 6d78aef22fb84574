use serde::Deserialize;

use crate::error::LicenseError;
use crate::identity::{canonicalize_machine_id, clamp_machine_info};
use crate::models::{DBTrial, MachineEntry};
use crate::signing::{SealedLicense, TrialClaim};
use crate::store::Mutation;

use super::Licensor;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRequest {
    pub machine_id: String,
    #[serde(default)]
    pub machine_info: String,
}

/// Transaction body: create the trial if absent, latch expiry once `now`
/// passes it, otherwise bump its issue counter up to `cap`. Returns the
/// committed trial.
fn issue_trial(
    current: Option<DBTrial>,
    candidate: &DBTrial,
    cap: u32,
    now: i64,
) -> (Mutation<DBTrial>, DBTrial) {
    match current {
        None => (Mutation::Put(candidate.clone()), candidate.clone()),
        Some(trial) if trial.expired => (Mutation::Keep, trial),
        Some(mut trial) => {
            if trial.observe_expiry(now) || trial.record_issue(cap) {
                (Mutation::Put(trial.clone()), trial)
            } else {
                // Many machines can share one fingerprint; stop writing
                // rather than contend on a hot document.
                (Mutation::Keep, trial)
            }
        }
    }
}

impl Licensor {
    /// Create or fetch the trial for a machine and seal it.
    ///
    /// Expiry is judged again after the transaction against the server clock.
    /// An expired trial is terminal: it is never renewed and never sealed,
    /// and the stored latch keeps it expired if the clock moves backwards.
    pub fn lookup_trial(&self, request: &TrialRequest) -> Result<SealedLicense, LicenseError> {
        let machine_id = canonicalize_machine_id(&request.machine_id)?;
        let info = clamp_machine_info(&request.machine_info);

        let now = self.clock.now();
        let candidate = DBTrial::new(
            self.policy.license_version,
            now.saturating_add(self.policy.trial_duration_secs),
            MachineEntry::new(info, now),
        );
        let cap = self.policy.trial_issue_count_max;

        let trial = self
            .store
            .with_trial(&machine_id, |current| {
                Ok::<_, LicenseError>(issue_trial(current, &candidate, cap, now))
            })?;

        if trial.is_expired(self.clock.now()) {
            tracing::info!(machine_id = %machine_id, expiration = trial.expiration, "Trial expired");
            return Err(LicenseError::Expired);
        }

        tracing::debug!(
            machine_id = %machine_id,
            issue_count = trial.machine.issue_count,
            "Issuing trial"
        );

        let claim = TrialClaim {
            machine_id,
            version: trial.version,
            expiration: trial.expiration,
        };
        Ok(self.signer.seal(&claim)?)
    }
}
