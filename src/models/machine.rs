use serde::{Deserialize, Serialize};

/// One machine bound to a license or holding a trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEntry {
    /// Advisory, client-supplied description. Never used as a key.
    pub info: String,
    pub first_seen: i64,
    /// Times this machine has been issued a sealed license.
    pub issue_count: u32,
}

impl MachineEntry {
    pub fn new(info: String, now: i64) -> Self {
        Self {
            info,
            first_seen: now,
            issue_count: 1,
        }
    }
}
