use redis::{aio::ConnectionManager, Client};

#[derive(Clone)]
pub struct RedisClient {
    pub conn: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        // Reconnects on its own if redis restarts underneath us
        let conn = ConnectionManager::new(client).await?;
        Ok(RedisClient { conn })
    }
}
