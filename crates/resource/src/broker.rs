//! Keyed pool broker with TTL eviction.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;

use crate::error::ResourceError;
use crate::pool::{Guard, Pool, PoolConfig};
use crate::resource::PooledResource;

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Configuration applied to every pool the broker creates.
    pub pool: PoolConfig,
    /// Pools idle longer than this are closed by the reaper.
    pub idle_ttl: Duration,
    /// How often the reaper scans.
    pub reap_interval: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            idle_ttl: Duration::from_secs(300),
            reap_interval: Duration::from_secs(30),
        }
    }
}

/// A shared cache of [`Pool`]s for one client type, keyed by a content hash
/// of the connection parameters.
///
/// Shared process-wide across executions. Pools appear lazily on first
/// request and disappear when the reaper finds them idle past the TTL or
/// when [`shutdown`](Self::shutdown) closes everything.
pub struct Broker<R: PooledResource> {
    pools: DashMap<String, Pool<R>>,
    config: BrokerConfig,
    pools_created: AtomicU64,
    reaper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<R: PooledResource> Broker<R> {
    /// Create a broker. Call [`spawn_reaper`](Self::spawn_reaper) to enable
    /// TTL eviction.
    #[must_use]
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            pools: DashMap::new(),
            config,
            pools_created: AtomicU64::new(0),
            reaper: parking_lot::Mutex::new(None),
        })
    }

    /// The pool for one set of connection parameters, created on first use.
    pub fn pool_for(&self, params: &R::Params) -> Result<Pool<R>, ResourceError>
    where
        R::Params: Clone,
    {
        let key = params_key(params)?;
        if let Some(existing) = self.pools.get(&key) {
            return Ok(existing.clone());
        }
        // Entry API keeps the race benign: one winner inserts, losers reuse.
        use dashmap::mapref::entry::Entry;
        match self.pools.entry(key) {
            Entry::Occupied(occupied) => Ok(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let pool = Pool::new(params.clone(), self.config.pool.clone())?;
                self.pools_created.fetch_add(1, Ordering::SeqCst);
                vacant.insert(pool.clone());
                Ok(pool)
            }
        }
    }

    /// Check a client out of the pool for `params`.
    pub async fn acquire(&self, params: &R::Params) -> Result<Guard<R>, ResourceError>
    where
        R::Params: Clone,
    {
        self.pool_for(params)?.acquire().await
    }

    /// Total pools ever created. Test hook for observing idle eviction.
    #[must_use]
    pub fn pools_created(&self) -> u64 {
        self.pools_created.load(Ordering::SeqCst)
    }

    /// Number of live pools.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Close and remove every pool idle past the TTL with no checkouts.
    pub async fn reap_idle(&self) {
        let mut stale = Vec::new();
        for entry in self.pools.iter() {
            let pool = entry.value();
            if pool.active() == 0 && pool.last_activity().elapsed() > self.config.idle_ttl {
                stale.push((entry.key().clone(), pool.clone()));
            }
        }
        for (key, pool) in stale {
            tracing::debug!(pool = %key, "closing idle resource pool");
            pool.shutdown().await;
            self.pools.remove(&key);
        }
    }

    /// Start the background reaper. Idempotent; the task ends at
    /// [`shutdown`](Self::shutdown).
    pub fn spawn_reaper(self: &Arc<Self>) {
        let mut slot = self.reaper.lock();
        if slot.is_some() {
            return;
        }
        let broker = Arc::clone(self);
        let interval = self.config.reap_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                broker.reap_idle().await;
            }
        }));
    }

    /// Stop the reaper and close every pool.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.reaper.lock().take() {
            handle.abort();
        }
        let pools: Vec<Pool<R>> = self.pools.iter().map(|e| e.value().clone()).collect();
        self.pools.clear();
        for pool in pools {
            pool.shutdown().await;
        }
    }
}

impl<R: PooledResource> std::fmt::Debug for Broker<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("pools", &self.pools.len())
            .field("pools_created", &self.pools_created())
            .finish()
    }
}

fn params_key<P: serde::Serialize>(params: &P) -> Result<String, ResourceError> {
    let canonical = serde_json::to_vec(params)
        .map_err(|e| ResourceError::configuration(format!("unserializable params: {e}")))?;
    let digest = Sha256::digest(&canonical);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(hex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct Params {
        host: String,
        port: u16,
    }

    struct FakeClient;

    #[async_trait]
    impl PooledResource for FakeClient {
        type Params = Params;

        async fn create(_params: &Params) -> Result<Self, ResourceError> {
            Ok(Self)
        }
    }

    fn params(host: &str) -> Params {
        Params {
            host: host.to_owned(),
            port: 5432,
        }
    }

    fn broker(idle_ttl: Duration) -> Arc<Broker<FakeClient>> {
        Broker::new(BrokerConfig {
            pool: PoolConfig {
                max_size: 2,
                acquire_timeout: Duration::from_secs(1),
                idle_timeout: Duration::from_secs(600),
            },
            idle_ttl,
            reap_interval: Duration::from_millis(10),
        })
    }

    #[tokio::test]
    async fn equal_params_share_a_pool() {
        let b = broker(Duration::from_secs(300));
        let _a = b.acquire(&params("db1")).await.unwrap();
        let _b = b.acquire(&params("db1")).await.unwrap();
        assert_eq!(b.pools_created(), 1);
        assert_eq!(b.pool_count(), 1);
    }

    #[tokio::test]
    async fn distinct_params_get_distinct_pools() {
        let b = broker(Duration::from_secs(300));
        let _a = b.acquire(&params("db1")).await.unwrap();
        let _b = b.acquire(&params("db2")).await.unwrap();
        assert_eq!(b.pools_created(), 2);
        assert_eq!(b.pool_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_pool_is_reaped_and_recreated() {
        let b = broker(Duration::from_secs(300));
        drop(b.acquire(&params("db1")).await.unwrap());
        assert_eq!(b.pools_created(), 1);

        // Well past the TTL with no further use of the key.
        tokio::time::advance(Duration::from_secs(301)).await;
        b.reap_idle().await;
        assert_eq!(b.pool_count(), 0);

        // A subsequent flow using the same key observes a fresh pool.
        drop(b.acquire(&params("db1")).await.unwrap());
        assert_eq!(b.pools_created(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn active_pool_survives_reaping() {
        let b = broker(Duration::from_secs(300));
        let _held = b.acquire(&params("db1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;
        b.reap_idle().await;
        assert_eq!(b.pool_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_everything() {
        let b = broker(Duration::from_secs(300));
        b.spawn_reaper();
        drop(b.acquire(&params("db1")).await.unwrap());
        drop(b.acquire(&params("db2")).await.unwrap());
        b.shutdown().await;
        assert_eq!(b.pool_count(), 0);
    }
}
