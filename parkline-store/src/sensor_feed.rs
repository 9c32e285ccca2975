use std::time::Duration;

use async_trait::async_trait;
use parkline_core::sensor::{FeedError, OccupancyFeed, SensorReading};

use crate::app_config::SensorConfig;

/// Polls the camera service for a `[{ "number", "occupied" }]` snapshot.
#[derive(Clone)]
pub struct HttpOccupancyFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpOccupancyFeed {
    pub fn new(config: &SensorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, url: config.url.clone() })
    }
}

#[async_trait]
impl OccupancyFeed for HttpOccupancyFeed {
    async fn poll_occupancy(&self) -> Result<Vec<SensorReading>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::Status(response.status().as_u16()));
        }

        response
            .json::<Vec<SensorReading>>()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_unreachable_feed_is_a_transport_error() {
        let port = closed_port().await;
        let feed = HttpOccupancyFeed::new(&SensorConfig {
            url: format!("http://127.0.0.1:{}/occupancy", port),
            timeout_seconds: 2,
        })
        .unwrap();

        assert!(matches!(feed.poll_occupancy().await, Err(FeedError::Transport(_))));
    }
}
