use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical state of a parking slot as last decided by admission or reconciliation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SlotStatus {
    Vacant,
    Occupied,
    Reserved,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Vacant => "Vacant",
            SlotStatus::Occupied => "Occupied",
            SlotStatus::Reserved => "Reserved",
        }
    }

    /// Status a slot falls back to when no booking holds it.
    pub fn from_sensor(occupied: bool) -> Self {
        if occupied {
            SlotStatus::Occupied
        } else {
            SlotStatus::Vacant
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Vacant" => Ok(SlotStatus::Vacant),
            "Occupied" => Ok(SlotStatus::Occupied),
            "Reserved" => Ok(SlotStatus::Reserved),
            other => Err(format!("unknown slot status: {}", other)),
        }
    }
}

/// One physical parking space. Provisioned once, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub number: i32,
    pub status: SlotStatus,
}

impl Slot {
    pub fn new(number: i32) -> Self {
        Self {
            number,
            status: SlotStatus::Vacant,
        }
    }

    pub fn is_vacant(&self) -> bool {
        self.status == SlotStatus::Vacant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_matches_storage_form() {
        for status in [SlotStatus::Vacant, SlotStatus::Occupied, SlotStatus::Reserved] {
            assert_eq!(status.as_str().parse::<SlotStatus>().unwrap(), status);
        }
        assert!("Parked".parse::<SlotStatus>().is_err());
    }

    #[test]
    fn test_sensor_fallback() {
        assert_eq!(SlotStatus::from_sensor(true), SlotStatus::Occupied);
        assert_eq!(SlotStatus::from_sensor(false), SlotStatus::Vacant);
    }
}
