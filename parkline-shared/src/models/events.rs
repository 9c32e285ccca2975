use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use super::SlotStatus;

/// Published after every committed slot status change.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SlotStatusChanged {
    pub slot_number: i32,
    pub previous: SlotStatus,
    pub current: SlotStatus,
    pub changed_at: DateTime<Utc>,
}
