use serde::{Deserialize, Serialize};

use super::MachineEntry;

/// Per-machine trial record, keyed by machine id.
///
/// Created once and never re-created: an expired trial stays expired, even
/// if the server clock later reads earlier than `expiration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DBTrial {
    pub version: u32,
    pub expiration: i64,
    /// Latched by the first lookup that sees the trial past `expiration`.
    #[serde(default)]
    pub expired: bool,
    pub machine: MachineEntry,
}

impl DBTrial {
    pub fn new(version: u32, expiration: i64, machine: MachineEntry) -> Self {
        Self {
            version,
            expiration,
            expired: false,
            machine,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expired || now >= self.expiration
    }

    /// Latch expiry if `now` is past `expiration`. Returns whether the
    /// record changed.
    pub fn observe_expiry(&mut self, now: i64) -> bool {
        if !self.expired && now >= self.expiration {
            self.expired = true;
            true
        } else {
            false
        }
    }

    /// Bump the issue counter unless it already sits at `cap`.
    /// Returns whether the record changed.
    pub fn record_issue(&mut self, cap: u32) -> bool {
        if self.machine.issue_count < cap {
            self.machine.issue_count += 1;
            true
        } else {
            false
        }
    }
}
