use super::{MemoryError, MemoryRecord, MemoryStore};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

impl From<redis::RedisError> for MemoryError {
    fn from(e: redis::RedisError) -> Self {
        MemoryError::Backend(e.to_string())
    }
}

/// Redis-backed memory log
///
/// One sorted set per symbol, `memory:{SYMBOL}`, scored by the time the
/// record was appended (milliseconds). Members are JSON records.
#[derive(Clone)]
pub struct RedisMemoryStore {
    conn: ConnectionManager,
}

impl RedisMemoryStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn connect(redis_url: &str) -> Result<Self, MemoryError> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| MemoryError::Backend("Redis connection timeout after 5 seconds".to_string()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn key(symbol: &str) -> String {
        format!("memory:{}", symbol.to_uppercase())
    }
}

#[async_trait]
impl MemoryStore for RedisMemoryStore {
    async fn append(&self, record: &MemoryRecord) -> Result<(), MemoryError> {
        let member = serde_json::to_string(record)?;
        let score = record.recorded_at.timestamp_millis() as f64;

        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(Self::key(&record.symbol), member, score)
            .await?;
        Ok(())
    }

    async fn history(&self, symbol: &str, max: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrevrange(Self::key(symbol), 0, max as isize - 1)
            .await?;

        let records = members
            .iter()
            .filter_map(|json| match serde_json::from_str::<MemoryRecord>(json) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(symbol, error = %e, "Skipping unreadable memory record");
                    None
                }
            })
            .collect();

        Ok(records)
    }
}
