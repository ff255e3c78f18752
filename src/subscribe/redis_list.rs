//! Redis list message source.
//!
//! Producers LPUSH event bodies onto the list and the subscriber pops them
//! from the right with BRPOP, so events are consumed in FIFO order.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{MessageSource, QuizCompleteEvent, SubscribeError};

/// Message source reading from one Redis list.
#[derive(Clone)]
pub struct RedisListSource {
    /// Connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    queue_name: String,
}

impl RedisListSource {
    /// Connects to Redis and reads events from `queue_name`.
    ///
    /// # Errors
    ///
    /// Returns `SubscribeError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, SubscribeError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| SubscribeError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| SubscribeError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a source from an existing connection manager.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Publishes a quiz-complete event for `quiz_id`.
    pub async fn publish(&self, quiz_id: &str) -> Result<(), SubscribeError> {
        let body = serde_json::to_string(&QuizCompleteEvent::new(quiz_id))?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, body).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageSource for RedisListSource {
    async fn next_message(&self, wait: Duration) -> Result<Option<String>, SubscribeError> {
        let mut conn = self.redis.clone();
        let timeout_secs = wait.as_secs().max(1) as usize;

        // Reply is [list, body] or nil on timeout
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.queue_name)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        Ok(popped.map(|(_, body)| body))
    }
}
