use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One slot's occupancy as reported by the vision feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorReading {
    pub number: i32,
    pub occupied: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Transport(String),
    #[error("Feed returned status {0}")]
    Status(u16),
    #[error("Feed payload malformed: {0}")]
    Decode(String),
}

#[async_trait]
pub trait OccupancyFeed: Send + Sync {
    /// Current occupancy of every slot the camera covers
    async fn poll_occupancy(&self) -> Result<Vec<SensorReading>, FeedError>;
}

/// Feed that replays a fixed snapshot. Used for pushed snapshots and tests.
pub struct StaticFeed {
    readings: Vec<SensorReading>,
}

impl StaticFeed {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self { readings }
    }
}

#[async_trait]
impl OccupancyFeed for StaticFeed {
    async fn poll_occupancy(&self) -> Result<Vec<SensorReading>, FeedError> {
        Ok(self.readings.clone())
    }
}
