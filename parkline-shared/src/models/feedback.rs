use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Rating {
    Excellent,
    Good,
    Medium,
    Poor,
    #[serde(rename = "Very Bad")]
    VeryBad,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Medium => "Medium",
            Rating::Poor => "Poor",
            Rating::VeryBad => "Very Bad",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Excellent" => Ok(Rating::Excellent),
            "Good" => Ok(Rating::Good),
            "Medium" => Ok(Rating::Medium),
            "Poor" => Ok(Rating::Poor),
            "Very Bad" => Ok(Rating::VeryBad),
            other => Err(format!("unknown rating: {}", other)),
        }
    }
}

/// A driver's rating of a paid reservation. At most one per reservation payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub rating: Rating,
    pub comments: String,
    pub submitted_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(payment_id: Uuid, rating: Rating, comments: String, submitted_at: DateTime<Utc>) -> Self {
        Self { id: Uuid::new_v4(), payment_id, rating, comments, submitted_at }
    }
}
