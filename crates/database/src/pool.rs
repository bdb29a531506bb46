//! Per-tenant client pool
//!
//! Caches one live database client per schema name, bounded by capacity
//! with LRU admission, and evicts idle entries from a background sweeper.
//! Client construction is supplied by the caller through [`ClientFactory`];
//! the pool guarantees at most one in-flight construction per schema name.

use crate::error::{DatabaseError, Result};
use crate::sanitize::sanitize_error;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A pooled client handle. Implementations must be cheap to clone; the pool
/// hands out clones and keeps one for itself.
#[async_trait]
pub trait PoolClient: Send + Sync + 'static {
    async fn disconnect(&self);
}

/// Caller-supplied client construction, one client per schema name.
#[async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    type Client: PoolClient + Clone;

    async fn create_client(&self, schema_name: &str) -> Result<Self::Client>;
}

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of cached clients.
    pub max_clients: usize,
    /// Idle time after which a cached client is evicted.
    pub idle_timeout: Duration,
    /// How often the idle sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_clients: 50,
            idle_timeout: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        Self {
            max_clients: std::env::var("TENANT_POOL_MAX_CLIENTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
            idle_timeout: Duration::from_millis(
                std::env::var("TENANT_POOL_IDLE_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300_000),
            ),
            sweep_interval: Duration::from_millis(
                std::env::var("TENANT_POOL_SWEEP_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60_000),
            ),
        }
    }
}

/// Pool counters. `active_clients` is the current cache size; the totals
/// are monotonic.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub active_clients: usize,
    pub max_clients: usize,
    pub total_created: u64,
    pub total_evicted: u64,
}

struct CachedClient<C> {
    client: C,
    schema_name: String,
    #[allow(dead_code)]
    created_at: Instant,
    last_accessed_at: Instant,
}

struct PoolInner<C> {
    entries: HashMap<String, CachedClient<C>>,
    total_created: u64,
    total_evicted: u64,
}

/// Pool of per-schema clients.
///
/// Owned explicitly by the application (no globals): construct at startup,
/// share via `Arc`, and call [`TenantClientPool::disconnect_all`] on
/// shutdown.
pub struct TenantClientPool<F: ClientFactory> {
    factory: F,
    config: PoolConfig,
    inner: Mutex<PoolInner<F::Client>>,
    // Per-key creation locks: at most one in-flight construction per schema.
    creating: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    sweeper: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<F: ClientFactory> TenantClientPool<F> {
    /// Create the pool and start its idle sweeper. Must be called from
    /// within a Tokio runtime.
    pub fn new(factory: F, config: PoolConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            factory,
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                total_created: 0,
                total_evicted: 0,
            }),
            creating: Mutex::new(HashMap::new()),
            sweeper: parking_lot::Mutex::new(None),
            config,
        });

        // The sweeper holds only a Weak so the pool can drop normally.
        let weak = Arc::downgrade(&pool);
        let sweep_interval = pool.config.sweep_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick completes immediately
            loop {
                ticker.tick().await;
                let Some(pool) = weak.upgrade() else { break };
                pool.evict_idle().await;
            }
        });
        *pool.sweeper.lock() = Some(handle);

        pool
    }

    /// Get the cached client for a schema, constructing it on first use.
    ///
    /// Concurrent callers for the same schema are serialized so the factory
    /// runs exactly once; a factory failure propagates and caches nothing.
    /// At capacity, the least-recently-accessed entry is disconnected and
    /// evicted to admit the new one.
    pub async fn get_client(&self, schema_name: &str) -> Result<F::Client> {
        if let Some(client) = self.touch(schema_name).await {
            return Ok(client);
        }

        let creation_lock = {
            let mut creating = self.creating.lock().await;
            creating
                .entry(schema_name.to_string())
                .or_default()
                .clone()
        };
        let guard = creation_lock.lock().await;

        // Another caller may have finished while this one waited.
        if let Some(client) = self.touch(schema_name).await {
            drop(guard);
            self.release_creation_lock(schema_name, &creation_lock).await;
            return Ok(client);
        }

        let result = match self.factory.create_client(schema_name).await {
            Ok(client) => {
                let evicted = {
                    let mut inner = self.inner.lock().await;
                    let mut evicted = None;
                    if inner.entries.len() >= self.config.max_clients {
                        let lru = inner
                            .entries
                            .iter()
                            .min_by_key(|(_, entry)| entry.last_accessed_at)
                            .map(|(key, _)| key.clone());
                        if let Some(key) = lru {
                            evicted = inner.entries.remove(&key);
                            inner.total_evicted += 1;
                        }
                    }
                    let now = Instant::now();
                    inner.entries.insert(
                        schema_name.to_string(),
                        CachedClient {
                            client: client.clone(),
                            schema_name: schema_name.to_string(),
                            created_at: now,
                            last_accessed_at: now,
                        },
                    );
                    inner.total_created += 1;
                    evicted
                };
                if let Some(entry) = evicted {
                    tracing::debug!(
                        schema = %entry.schema_name,
                        "evicting least-recently-used client at capacity"
                    );
                    entry.client.disconnect().await;
                }
                Ok(client)
            }
            Err(e) => Err(e),
        };

        drop(guard);
        self.release_creation_lock(schema_name, &creation_lock).await;
        result
    }

    /// Hint that the caller is done with a client. Intentionally a no-op:
    /// clients are reused across requests and eviction stays timer- or
    /// capacity-driven.
    pub fn release_client(&self, _schema_name: &str) {}

    /// Whether a client is cached for this schema. Never triggers creation.
    pub async fn has_client(&self, schema_name: &str) -> bool {
        self.inner.lock().await.entries.contains_key(schema_name)
    }

    /// Remove and disconnect the cached client for one schema, if any.
    /// Used when a schema is deprovisioned; not counted as an eviction.
    pub async fn remove_client(&self, schema_name: &str) -> bool {
        let entry = self.inner.lock().await.entries.remove(schema_name);
        match entry {
            Some(entry) => {
                entry.client.disconnect().await;
                true
            }
            None => false,
        }
    }

    /// Snapshot of the pool counters. Does not wait on in-flight creations.
    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            active_clients: inner.entries.len(),
            max_clients: self.config.max_clients,
            total_created: inner.total_created,
            total_evicted: inner.total_evicted,
        }
    }

    /// Stop the idle sweeper, leaving cached clients connected.
    pub fn close(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }

    /// Stop the sweeper and disconnect every cached client. Part of
    /// graceful shutdown.
    pub async fn disconnect_all(&self) {
        self.close();
        let entries: Vec<CachedClient<F::Client>> = {
            let mut inner = self.inner.lock().await;
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };
        for entry in entries {
            entry.client.disconnect().await;
        }
    }

    async fn touch(&self, schema_name: &str) -> Option<F::Client> {
        let mut inner = self.inner.lock().await;
        inner.entries.get_mut(schema_name).map(|entry| {
            entry.last_accessed_at = Instant::now();
            entry.client.clone()
        })
    }

    async fn evict_idle(&self) {
        let expired: Vec<CachedClient<F::Client>> = {
            let mut inner = self.inner.lock().await;
            let now = Instant::now();
            let idle: Vec<String> = inner
                .entries
                .iter()
                .filter(|(_, entry)| {
                    now.duration_since(entry.last_accessed_at) >= self.config.idle_timeout
                })
                .map(|(key, _)| key.clone())
                .collect();
            let removed: Vec<CachedClient<F::Client>> = idle
                .iter()
                .filter_map(|key| inner.entries.remove(key))
                .collect();
            inner.total_evicted += removed.len() as u64;
            removed
        };
        for entry in expired {
            tracing::debug!(schema = %entry.schema_name, "evicting idle client");
            entry.client.disconnect().await;
        }
    }

    // Drop the per-key lock once no other caller is waiting on it.
    async fn release_creation_lock(&self, schema_name: &str, lock: &Arc<Mutex<()>>) {
        let mut creating = self.creating.lock().await;
        if Arc::strong_count(lock) <= 2 {
            creating.remove(schema_name);
        }
    }
}

impl<F: ClientFactory> Drop for TenantClientPool<F> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Postgres-backed pooled client: a small sqlx pool whose connections are
/// pinned to one schema via `search_path`.
#[derive(Clone)]
pub struct PgTenantClient {
    pool: PgPool,
    schema_name: String,
}

impl PgTenantClient {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }
}

#[async_trait]
impl PoolClient for PgTenantClient {
    async fn disconnect(&self) {
        self.pool.close().await;
    }
}

/// Default [`ClientFactory`]: one sqlx pool per schema against the shared
/// cluster, `search_path` set at connect time.
pub struct PgClientFactory {
    options: PgConnectOptions,
    max_connections: u32,
}

impl PgClientFactory {
    pub fn new(base_url: &str, max_connections: u32) -> Result<Self> {
        let options: PgConnectOptions = base_url.parse().map_err(|e: sqlx::Error| {
            DatabaseError::Internal(format!(
                "Invalid base connection URL: {}",
                sanitize_error(&e.to_string())
            ))
        })?;
        Ok(Self {
            options,
            max_connections,
        })
    }
}

#[async_trait]
impl ClientFactory for PgClientFactory {
    type Client = PgTenantClient;

    async fn create_client(&self, schema_name: &str) -> Result<PgTenantClient> {
        let options = self
            .options
            .clone()
            .options([("search_path", schema_name)]);

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                DatabaseError::ConnectionFailed(format!(
                    "Failed to connect client for schema {}: {}",
                    schema_name,
                    sanitize_error(&e.to_string())
                ))
            })?;

        tracing::info!(schema = %schema_name, "created tenant client");
        Ok(PgTenantClient {
            pool,
            schema_name: schema_name.to_string(),
        })
    }
}
