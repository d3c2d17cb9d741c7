use crate::cache::CacheService;
use redis::AsyncCommands;
use tracing::info;

fn blacklist_key(jti: &str) -> String {
    format!("auth:blacklist:{}", jti)
}

impl CacheService {
    /// Blacklist a refresh token until it would have expired anyway.
    pub async fn blacklist_refresh(&self, jti: &str, ttl_seconds: u64) -> Result<(), redis::RedisError> {
        // SETEX rejects a zero TTL
        let ttl = ttl_seconds.max(1);
        let mut conn = self.redis.conn.clone();
        let _: () = conn.set_ex(blacklist_key(jti), 1, ttl).await?;
        info!("Refresh token {} blacklisted for {}s", jti, ttl);
        Ok(())
    }

    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.exists(blacklist_key(jti)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(blacklist_key("abc"), "auth:blacklist:abc");
    }
}
