//! Bounded client pool.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ResourceError;
use crate::resource::PooledResource;

/// Pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum concurrent clients (checked out + idle).
    pub max_size: usize,
    /// How long an acquire may wait before failing with
    /// [`ResourceError::Exhausted`].
    #[serde(with = "duration_secs")]
    pub acquire_timeout: Duration,
    /// Idle clients older than this are destroyed on the next checkout
    /// attempt.
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl PoolConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ResourceError> {
        if self.max_size == 0 {
            return Err(ResourceError::configuration("max_size must be greater than 0"));
        }
        if self.acquire_timeout.is_zero() {
            return Err(ResourceError::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Pool statistics, exposed for tests and operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful checkouts.
    pub acquisitions: u64,
    /// Returns to the idle queue.
    pub releases: u64,
    /// Clients ever created.
    pub created: u64,
    /// Clients ever destroyed.
    pub destroyed: u64,
    /// Currently checked out.
    pub active: usize,
    /// Currently idle.
    pub idle: usize,
}

struct Entry<R> {
    instance: R,
    last_used: Instant,
}

struct PoolState<R> {
    idle: VecDeque<Entry<R>>,
    stats: PoolStats,
    /// After `shutdown()`, Guard drops destroy instead of reinserting.
    shutdown: bool,
    /// Last acquire or release; the broker's reaper reads this.
    last_activity: Instant,
}

struct PoolInner<R: PooledResource> {
    params: R::Params,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState<R>>,
}

/// A bounded pool of one client type for one set of connection parameters.
pub struct Pool<R: PooledResource> {
    inner: Arc<PoolInner<R>>,
}

impl<R: PooledResource> Clone for Pool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: PooledResource> Pool<R> {
    /// Create a pool. No client is opened until the first acquire.
    pub fn new(params: R::Params, config: PoolConfig) -> Result<Self, ResourceError> {
        config.validate()?;
        let semaphore = Arc::new(Semaphore::new(config.max_size));
        Ok(Self {
            inner: Arc::new(PoolInner {
                params,
                config,
                semaphore,
                state: Mutex::new(PoolState {
                    idle: VecDeque::new(),
                    stats: PoolStats::default(),
                    shutdown: false,
                    last_activity: Instant::now(),
                }),
            }),
        })
    }

    /// Check out a client, waiting at most the configured acquire timeout.
    pub async fn acquire(&self) -> Result<Guard<R>, ResourceError> {
        if self.inner.state.lock().shutdown {
            return Err(ResourceError::Shutdown);
        }

        let permit = tokio::time::timeout(
            self.inner.config.acquire_timeout,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| ResourceError::Exhausted(self.inner.config.acquire_timeout))?
        .map_err(|_| ResourceError::Shutdown)?;

        // Reuse the freshest idle client, discarding expired or invalid ones.
        let mut expired = Vec::new();
        let reused = {
            let mut state = self.inner.state.lock();
            state.last_activity = Instant::now();
            let mut found = None;
            while let Some(entry) = state.idle.pop_back() {
                if entry.last_used.elapsed() > self.inner.config.idle_timeout
                    || !entry.instance.is_valid()
                {
                    state.stats.destroyed += 1;
                    expired.push(entry.instance);
                    continue;
                }
                found = Some(entry.instance);
                break;
            }
            if found.is_some() {
                state.stats.acquisitions += 1;
                state.stats.active += 1;
                state.stats.idle = state.idle.len();
            }
            found
        };
        for instance in expired {
            instance.close().await;
        }

        let instance = match reused {
            Some(instance) => instance,
            None => {
                let instance = R::create(&self.inner.params).await?;
                let mut state = self.inner.state.lock();
                state.stats.created += 1;
                state.stats.acquisitions += 1;
                state.stats.active += 1;
                instance
            }
        };

        Ok(Guard {
            instance: Some(instance),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Current statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        let mut stats = state.stats;
        stats.idle = state.idle.len();
        stats
    }

    /// Last acquire/release time, read by the broker's reaper.
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        self.inner.state.lock().last_activity
    }

    /// Number of clients currently checked out.
    #[must_use]
    pub fn active(&self) -> usize {
        self.inner.state.lock().stats.active
    }

    /// Close every idle client and refuse further checkouts.
    pub async fn shutdown(&self) {
        let drained: Vec<R> = {
            let mut state = self.inner.state.lock();
            state.shutdown = true;
            let drained: Vec<R> = state.idle.drain(..).map(|e| e.instance).collect();
            state.stats.destroyed += drained.len() as u64;
            state.stats.idle = 0;
            drained
        };
        for instance in drained {
            instance.close().await;
        }
    }
}

/// RAII checkout. Dropping returns the client to the pool (or destroys it
/// after shutdown or when invalid).
pub struct Guard<R: PooledResource> {
    instance: Option<R>,
    pool: Arc<PoolInner<R>>,
    _permit: OwnedSemaphorePermit,
}

impl<R: PooledResource> std::fmt::Debug for Guard<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

impl<R: PooledResource> Deref for Guard<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.instance.as_ref().expect("present until drop")
    }
}

impl<R: PooledResource> DerefMut for Guard<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.instance.as_mut().expect("present until drop")
    }
}

impl<R: PooledResource> Drop for Guard<R> {
    fn drop(&mut self) {
        let Some(instance) = self.instance.take() else {
            return;
        };
        let mut state = self.pool.state.lock();
        state.stats.active = state.stats.active.saturating_sub(1);
        state.last_activity = Instant::now();
        if state.shutdown || !instance.is_valid() {
            state.stats.destroyed += 1;
            // Dropped without async close; close() runs on the shutdown
            // and eviction paths where an executor is available.
            return;
        }
        state.stats.releases += 1;
        state.idle.push_back(Entry {
            instance,
            last_used: Instant::now(),
        });
        state.stats.idle = state.idle.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};

    static CREATED: AtomicU64 = AtomicU64::new(0);

    struct FakeClient {
        healthy: bool,
    }

    #[async_trait]
    impl PooledResource for FakeClient {
        type Params = String;

        async fn create(_params: &String) -> Result<Self, ResourceError> {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Ok(Self { healthy: true })
        }

        fn is_valid(&self) -> bool {
            self.healthy
        }
    }

    fn pool(max_size: usize, acquire_timeout: Duration) -> Pool<FakeClient> {
        Pool::new(
            "db://test".to_owned(),
            PoolConfig {
                max_size,
                acquire_timeout,
                idle_timeout: Duration::from_secs(300),
            },
        )
        .unwrap()
    }

    #[test]
    fn config_validation() {
        assert!(
            PoolConfig {
                max_size: 0,
                ..PoolConfig::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            PoolConfig {
                acquire_timeout: Duration::ZERO,
                ..PoolConfig::default()
            }
            .validate()
            .is_err()
        );
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn lazy_creation_and_reuse() {
        let before = CREATED.load(Ordering::SeqCst);
        let p = pool(4, Duration::from_secs(1));
        assert_eq!(CREATED.load(Ordering::SeqCst), before);

        {
            let _guard = p.acquire().await.unwrap();
            assert_eq!(p.active(), 1);
        }
        // Returned to idle; the next acquire reuses it.
        let _guard = p.acquire().await.unwrap();
        assert_eq!(CREATED.load(Ordering::SeqCst), before + 1);

        let stats = p.stats();
        assert_eq!(stats.acquisitions, 2);
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.created, 1);
    }

    #[tokio::test]
    async fn acquire_timeout_is_exhaustion() {
        let p = pool(1, Duration::from_millis(20));
        let _held = p.acquire().await.unwrap();
        let err = p.acquire().await.unwrap_err();
        assert!(matches!(err, ResourceError::Exhausted(_)));
    }

    #[tokio::test]
    async fn released_permit_unblocks_waiter() {
        let p = pool(1, Duration::from_secs(5));
        let guard = p.acquire().await.unwrap();
        let waiter = {
            let p = p.clone();
            tokio::spawn(async move { p.acquire().await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        drop(guard);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn invalid_clients_are_destroyed_not_reused() {
        let before = CREATED.load(Ordering::SeqCst);
        let p = pool(2, Duration::from_secs(1));
        {
            let mut guard = p.acquire().await.unwrap();
            guard.healthy = false;
        }
        // The unhealthy client was dropped; a fresh one is created.
        let guard = p.acquire().await.unwrap();
        assert!(guard.healthy);
        assert_eq!(CREATED.load(Ordering::SeqCst), before + 2);
        assert_eq!(p.stats().destroyed, 1);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_checkouts() {
        let p = pool(2, Duration::from_secs(1));
        drop(p.acquire().await.unwrap());
        p.shutdown().await;
        assert!(matches!(p.acquire().await, Err(ResourceError::Shutdown)));
        assert_eq!(p.stats().idle, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_discards_stale_clients() {
        let before = CREATED.load(Ordering::SeqCst);
        let p = Pool::<FakeClient>::new(
            "db://stale".to_owned(),
            PoolConfig {
                max_size: 2,
                acquire_timeout: Duration::from_secs(1),
                idle_timeout: Duration::from_secs(60),
            },
        )
        .unwrap();

        drop(p.acquire().await.unwrap());
        tokio::time::advance(Duration::from_secs(120)).await;
        let _guard = p.acquire().await.unwrap();
        // The stale idle client was discarded and a new one created.
        assert_eq!(CREATED.load(Ordering::SeqCst), before + 2);
    }
}
