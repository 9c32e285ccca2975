use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use crate::pii::Masked;

/// The slice of an account the reservation core needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Masked<String>,
    pub contact_number: Masked<String>,
    pub is_banned: bool,
    pub ban_end_time: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vehicle {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub license_plate: String,
    pub make: String,
    pub model: String,
    pub color: String,
}
