use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::{Email, LicenseCode, MachineId};
use super::MachineEntry;

/// One purchased license and the machines bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DBLicense {
    pub version: u32,
    pub created_at: i64,
    /// Payment processor id of the purchase that created this license.
    pub payment_id: String,
    #[serde(default)]
    pub machines: BTreeMap<MachineId, MachineEntry>,
}

/// Outcome of trying to bind a machine to a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Machine was already bound; its issue counter was bumped.
    Rebound,
    /// Machine took a free slot.
    Added,
    /// All slots are taken by other machines.
    LimitReached,
}

impl DBLicense {
    pub fn new(version: u32, payment_id: &str, now: i64) -> Self {
        Self {
            version,
            created_at: now,
            payment_id: payment_id.to_string(),
            machines: BTreeMap::new(),
        }
    }

    /// Bind `machine_id`, never exceeding `max_machines` distinct entries.
    pub fn bind(&mut self, machine_id: &MachineId, info: String, now: i64, max_machines: usize) -> Binding {
        if let Some(entry) = self.machines.get_mut(machine_id) {
            entry.issue_count = entry.issue_count.saturating_add(1);
            return Binding::Rebound;
        }

        if self.machines.len() >= max_machines {
            return Binding::LimitReached;
        }

        self.machines
            .insert(machine_id.clone(), MachineEntry::new(info, now));
        Binding::Added
    }
}

/// All licenses owned by one user, keyed by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DBLicenses {
    pub email: Email,
    #[serde(default)]
    pub licenses: BTreeMap<LicenseCode, DBLicense>,
    /// Unix seconds of the last reminder email, 0 if none was sent.
    #[serde(default)]
    pub last_email_sent_at: i64,
}

impl DBLicenses {
    pub fn new(email: Email) -> Self {
        Self {
            email,
            licenses: BTreeMap::new(),
            last_email_sent_at: 0,
        }
    }

    /// Codes of licenses created by the given payment, in key order.
    pub fn codes_for_payment(&self, payment_id: &str) -> Vec<LicenseCode> {
        self.licenses
            .iter()
            .filter(|(_, license)| license.payment_id == payment_id)
            .map(|(code, _)| code.clone())
            .collect()
    }

    pub fn codes(&self) -> Vec<LicenseCode> {
        self.licenses.keys().cloned().collect()
    }
}
