use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Open a connection and round-trip a PING.
    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Fixed-window counter. Returns whether the caller is still under `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// Rate-limit bucket for one client address in the current minute.
pub fn rate_limit_key(client: &str, minute: i64) -> String {
    format!("ratelimit:{}:{}", client, minute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_is_per_minute() {
        assert_eq!(rate_limit_key("10.0.0.1", 42), "ratelimit:10.0.0.1:42");
        assert_ne!(rate_limit_key("10.0.0.1", 42), rate_limit_key("10.0.0.1", 43));
    }

    #[tokio::test]
    async fn test_ping_fails_when_nothing_listens() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RedisClient::new(&format!("redis://127.0.0.1:{}", port)).await.unwrap();
        assert!(client.ping().await.is_err());
    }
}
