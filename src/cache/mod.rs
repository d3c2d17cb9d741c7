use crate::redis_client::RedisClient;

pub mod tokens;
pub mod trips;

#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    search_ttl_seconds: u64,
    search_enabled: bool,
}

impl CacheService {
    pub fn new(redis: RedisClient, search_ttl_seconds: u64, search_enabled: bool) -> Self {
        Self {
            redis,
            search_ttl_seconds,
            search_enabled: search_enabled && cfg!(feature = "search-cache"),
        }
    }

    /// Round trip to redis, used by the health check.
    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
