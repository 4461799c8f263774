//! Per-topic locks that keep concurrent restructurer instances apart.
//!
//! With Redis configured, a lock is a `SET NX EX` key whose TTL guarantees
//! liveness if a holder dies ungracefully. Without Redis the lock degrades to
//! an in-process set, which is exactly as strong as a single instance needs.

use std::collections::HashSet;
use std::sync::Mutex;

use fred::prelude::{Client, ClientLike, KeysInterface, ReconnectPolicy, Server, ServerConfig};
use fred::types::{Builder, Expiration, SetOptions};
use restructure_config::shared::CoordinationConfig;
use tracing::debug;

use crate::error::{ErrorKind, RestructureResult};
use crate::restructure_error;

/// A held topic lock. Must be handed back to [`LockManager::release`].
#[derive(Debug)]
pub struct TopicLock {
    key: String,
}

/// Topic lock backend selected at startup.
pub enum LockManager {
    Redis(RedisLockManager),
    Local(LocalLockManager),
}

impl LockManager {
    /// Builds the lock manager: Redis-backed when coordination is configured,
    /// in-process otherwise.
    pub async fn from_config(config: Option<&CoordinationConfig>) -> RestructureResult<Self> {
        match config {
            Some(config) => Ok(LockManager::Redis(RedisLockManager::connect(config).await?)),
            None => Ok(LockManager::Local(LocalLockManager::new())),
        }
    }

    /// Attempts to take the lock for a topic. `None` means another holder has
    /// it; the topic should be skipped this pass.
    pub async fn try_acquire(&self, topic: &str) -> RestructureResult<Option<TopicLock>> {
        match self {
            LockManager::Redis(manager) => manager.try_acquire(topic).await,
            LockManager::Local(manager) => manager.try_acquire(topic),
        }
    }

    /// Releases a previously acquired lock.
    pub async fn release(&self, lock: TopicLock) -> RestructureResult<()> {
        match self {
            LockManager::Redis(manager) => manager.release(lock).await,
            LockManager::Local(manager) => manager.release(lock),
        }
    }
}

/// Redis-backed lock manager for multi-process deployments.
pub struct RedisLockManager {
    client: Client,
    prefix: String,
    ttl_secs: i64,
    token: String,
}

impl RedisLockManager {
    async fn connect(config: &CoordinationConfig) -> RestructureResult<Self> {
        let client = Builder::default_centralized()
            .with_config(|redis_config| {
                redis_config.username = config.username.clone();
                redis_config.password = config.password.clone();
                redis_config.server = ServerConfig::Centralized {
                    server: Server::new(config.host.clone(), config.port),
                };
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 1, 2000, 5))
            .build()
            .map_err(|err| {
                restructure_error!(ErrorKind::LockUnavailable, "failed to build redis client")
                    .with_source(err)
            })?;

        let _connection = client.connect();
        client.wait_for_connect().await.map_err(|err| {
            restructure_error!(
                ErrorKind::LockUnavailable,
                "failed to connect to redis",
                format!("{}:{}", config.host, config.port)
            )
            .with_source(err)
        })?;

        Ok(Self {
            client,
            prefix: config.lock_prefix.clone(),
            ttl_secs: config.lock_ttl_secs as i64,
            token: format!("restructure-{}", std::process::id()),
        })
    }

    async fn try_acquire(&self, topic: &str) -> RestructureResult<Option<TopicLock>> {
        let key = format!("{}/{}", self.prefix, topic);

        let reply: Option<String> = self
            .client
            .set(
                key.as_str(),
                self.token.as_str(),
                Some(Expiration::EX(self.ttl_secs)),
                Some(SetOptions::NX),
                false,
            )
            .await
            .map_err(|err| {
                restructure_error!(ErrorKind::LockUnavailable, "failed to acquire topic lock", key)
                    .with_source(err)
            })?;

        match reply {
            Some(_) => {
                debug!(key = %key, "acquired topic lock");
                Ok(Some(TopicLock { key }))
            }
            None => Ok(None),
        }
    }

    async fn release(&self, lock: TopicLock) -> RestructureResult<()> {
        self.client
            .del::<(), _>(lock.key.as_str())
            .await
            .map_err(|err| {
                restructure_error!(
                    ErrorKind::LockUnavailable,
                    "failed to release topic lock",
                    lock.key
                )
                .with_source(err)
            })
    }
}

/// In-process lock manager for single-instance runs.
pub struct LocalLockManager {
    held: Mutex<HashSet<String>>,
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
        }
    }

    fn try_acquire(&self, topic: &str) -> RestructureResult<Option<TopicLock>> {
        let mut held = self.held.lock().expect("lock set poisoned");
        if held.insert(topic.to_string()) {
            Ok(Some(TopicLock {
                key: topic.to_string(),
            }))
        } else {
            Ok(None)
        }
    }

    fn release(&self, lock: TopicLock) -> RestructureResult<()> {
        let mut held = self.held.lock().expect("lock set poisoned");
        held.remove(&lock.key);
        Ok(())
    }
}

impl Default for LocalLockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_lock_is_exclusive_until_released() {
        let manager = LockManager::Local(LocalLockManager::new());

        let lock = manager.try_acquire("topic").await.unwrap().unwrap();
        assert!(manager.try_acquire("topic").await.unwrap().is_none());

        manager.release(lock).await.unwrap();
        assert!(manager.try_acquire("topic").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn local_locks_are_per_topic() {
        let manager = LockManager::Local(LocalLockManager::new());

        let _a = manager.try_acquire("a").await.unwrap().unwrap();
        assert!(manager.try_acquire("b").await.unwrap().is_some());
    }
}
