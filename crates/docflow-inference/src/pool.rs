//! Bounded client pool for the external document-AI service.
//!
//! Two independent controls:
//! - Per processor type, a small set of reusable clients balanced by request
//!   count and retired by a periodic sweep (idle TTL or request cap).
//! - A global admission semaphore capping concurrent in-flight calls. Waiters
//!   are released in FIFO order as permits return. The permit is held by an
//!   RAII guard so every exit path releases it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use docflow_core::defaults;
use docflow_core::{Error, Result};

/// Configuration for [`ProcessorPool`].
#[derive(Debug, Clone)]
pub struct ProcessorPoolConfig {
    /// Global ceiling on concurrently admitted calls.
    pub max_concurrent_requests: usize,
    /// Maximum clients kept per processor type.
    pub max_clients_per_processor: usize,
    /// Idle time before the sweep retires a client.
    pub client_ttl: Duration,
    /// Requests served before a client is recycled.
    pub client_max_requests: u64,
}

impl Default for ProcessorPoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: defaults::POOL_MAX_CONCURRENT_REQUESTS,
            max_clients_per_processor: defaults::POOL_MAX_CLIENTS_PER_PROCESSOR,
            client_ttl: Duration::from_secs(defaults::POOL_CLIENT_TTL_SECS),
            client_max_requests: defaults::POOL_CLIENT_MAX_REQUESTS,
        }
    }
}

impl ProcessorPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    pub fn max_clients_per_processor(mut self, n: usize) -> Self {
        self.max_clients_per_processor = n;
        self
    }

    pub fn client_ttl(mut self, ttl: Duration) -> Self {
        self.client_ttl = ttl;
        self
    }

    pub fn client_max_requests(mut self, n: u64) -> Self {
        self.client_max_requests = n;
        self
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            max_concurrent_requests: std::env::var("POOL_MAX_CONCURRENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.max_concurrent_requests),
            max_clients_per_processor: std::env::var("POOL_MAX_CLIENTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.max_clients_per_processor),
            client_ttl: std::env::var("POOL_CLIENT_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(base.client_ttl),
            client_max_requests: std::env::var("POOL_CLIENT_MAX_REQUESTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.client_max_requests),
        }
    }
}

struct ClientEntry<C> {
    client: Arc<C>,
    created_at: Instant,
    last_used: Mutex<Instant>,
    request_count: AtomicU64,
    in_flight: Arc<AtomicUsize>,
}

/// Bounded, recyclable pool of per-processor clients with global admission
/// control.
///
/// `C` is the underlying client type; `factory` builds one for a processor
/// type when the pool decides to grow.
pub struct ProcessorPool<C> {
    config: ProcessorPoolConfig,
    factory: Box<dyn Fn(&str) -> Result<C> + Send + Sync>,
    clients: Mutex<HashMap<String, Vec<Arc<ClientEntry<C>>>>>,
    semaphore: Arc<Semaphore>,
    shutting_down: AtomicBool,
}

/// RAII guard for an admitted pooled client.
///
/// Holds the admission permit; dropping it releases the concurrency slot and
/// decrements the client's in-flight count on every exit path.
pub struct PoolGuard<C> {
    client: Arc<C>,
    in_flight: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl<C> PoolGuard<C> {
    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C> std::fmt::Debug for PoolGuard<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard").finish_non_exhaustive()
    }
}

impl<C> Drop for PoolGuard<C> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<C> std::ops::Deref for PoolGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C: Send + Sync + 'static> ProcessorPool<C> {
    pub fn new(
        config: ProcessorPoolConfig,
        factory: impl Fn(&str) -> Result<C> + Send + Sync + 'static,
    ) -> Self {
        info!(
            subsystem = "inference",
            component = "processor_pool",
            op = "create",
            max_concurrent = config.max_concurrent_requests,
            max_clients = config.max_clients_per_processor,
            "Creating processor pool"
        );

        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            config,
            factory: Box::new(factory),
            clients: Mutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Acquire an admitted client for a processor type.
    ///
    /// Waits FIFO on the admission semaphore if the global concurrency
    /// ceiling is reached.
    pub async fn acquire(&self, processor_type: &str) -> Result<PoolGuard<C>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::Queue("processor pool is shutting down".to_string()));
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Queue("processor pool is shutting down".to_string()))?;

        // Re-check after the potentially long wait.
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::Queue("processor pool is shutting down".to_string()));
        }

        let entry = self.select_entry(processor_type)?;
        *entry.last_used.lock().unwrap() = Instant::now();
        entry.request_count.fetch_add(1, Ordering::SeqCst);
        entry.in_flight.fetch_add(1, Ordering::SeqCst);

        Ok(PoolGuard {
            client: entry.client.clone(),
            in_flight: entry.in_flight.clone(),
            _permit: permit,
        })
    }

    fn select_entry(&self, processor_type: &str) -> Result<Arc<ClientEntry<C>>> {
        let mut clients = self.clients.lock().unwrap();
        let entries = clients.entry(processor_type.to_string()).or_default();

        // Grow eagerly up to a quarter of the cap, then balance by request
        // count across the existing clients.
        let grow_threshold = self.config.max_clients_per_processor.div_ceil(4);
        let should_create = entries.len() < grow_threshold
            || (entries.is_empty() && self.config.max_clients_per_processor > 0);

        if should_create && entries.len() < self.config.max_clients_per_processor {
            let client = (self.factory)(processor_type)?;
            let entry = Arc::new(ClientEntry {
                client: Arc::new(client),
                created_at: Instant::now(),
                last_used: Mutex::new(Instant::now()),
                request_count: AtomicU64::new(0),
                in_flight: Arc::new(AtomicUsize::new(0)),
            });
            debug!(
                subsystem = "inference",
                component = "processor_pool",
                op = "grow",
                processor_type = %processor_type,
                pool_size = entries.len() + 1,
                "Created pooled client"
            );
            entries.push(entry.clone());
            return Ok(entry);
        }

        entries
            .iter()
            .min_by_key(|e| e.request_count.load(Ordering::SeqCst))
            .cloned()
            .ok_or_else(|| Error::Internal("processor pool has no clients".to_string()))
    }

    /// Retire clients idle past the TTL or past the request cap.
    ///
    /// Clients with in-flight requests are skipped; the next sweep catches
    /// them.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap();
        let mut retired = 0;

        for (processor_type, entries) in clients.iter_mut() {
            let before = entries.len();
            entries.retain(|entry| {
                if entry.in_flight.load(Ordering::SeqCst) > 0 {
                    return true;
                }
                let idle = now.duration_since(*entry.last_used.lock().unwrap());
                let age = now.duration_since(entry.created_at);
                let expired = idle > self.config.client_ttl || age > self.config.client_ttl;
                let exhausted =
                    entry.request_count.load(Ordering::SeqCst) >= self.config.client_max_requests;
                !(expired || exhausted)
            });
            if entries.len() < before {
                retired += before - entries.len();
                debug!(
                    subsystem = "inference",
                    component = "processor_pool",
                    op = "sweep",
                    processor_type = %processor_type,
                    retired = before - entries.len(),
                    "Retired pooled clients"
                );
            }
        }
        clients.retain(|_, entries| !entries.is_empty());
        retired
    }

    /// Number of clients currently pooled across all processor types.
    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().values().map(Vec::len).sum()
    }

    /// Concurrency slots currently available.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Stop accepting work, wait for in-flight calls to finish, then clear
    /// all clients.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        info!(
            subsystem = "inference",
            component = "processor_pool",
            op = "shutdown",
            "Draining processor pool"
        );

        // Acquiring every permit means no call is still in flight.
        match self
            .semaphore
            .acquire_many(self.config.max_concurrent_requests as u32)
            .await
        {
            Ok(permits) => drop(permits),
            Err(_) => warn!(
                subsystem = "inference",
                component = "processor_pool",
                "Admission semaphore closed during drain"
            ),
        }

        self.clients.lock().unwrap().clear();
        info!(
            subsystem = "inference",
            component = "processor_pool",
            op = "shutdown",
            "Processor pool drained"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeClient {
        #[allow(dead_code)]
        processor_type: String,
    }

    fn test_pool(max_concurrent: usize) -> ProcessorPool<FakeClient> {
        ProcessorPool::new(
            ProcessorPoolConfig::new()
                .max_concurrent_requests(max_concurrent)
                .max_clients_per_processor(4),
            |pt| {
                Ok(FakeClient {
                    processor_type: pt.to_string(),
                })
            },
        )
    }

    #[tokio::test]
    async fn test_acquire_release_cycles_permits() {
        let pool = test_pool(2);
        assert_eq!(pool.available_permits(), 2);

        let guard = pool.acquire("form-parser").await.unwrap();
        assert_eq!(pool.available_permits(), 1);
        drop(guard);
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_admission_limit_never_exceeded() {
        let pool = Arc::new(test_pool(3));
        let peak = Arc::new(AtomicUsize::new(0));
        let current = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let pool = pool.clone();
            let peak = peak.clone();
            let current = current.clone();
            handles.push(tokio::spawn(async move {
                let _guard = pool.acquire("form-parser").await.unwrap();
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_waiter_released_when_permit_returns() {
        let pool = Arc::new(test_pool(1));
        let first = pool.acquire("form-parser").await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move { pool2.acquire("form-parser").await.unwrap() });

        // The waiter cannot complete while the permit is held.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let guard = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        drop(guard);
    }

    #[tokio::test]
    async fn test_clients_reused_per_processor_type() {
        let pool = test_pool(10);

        for _ in 0..8 {
            let guard = pool.acquire("form-parser").await.unwrap();
            drop(guard);
        }

        // Growth threshold is a quarter of the cap, so a single client
        // serves all sequential requests.
        assert_eq!(pool.client_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_retires_exhausted_clients() {
        let pool = ProcessorPool::new(
            ProcessorPoolConfig::new()
                .max_concurrent_requests(4)
                .max_clients_per_processor(4)
                .client_max_requests(2),
            |pt| {
                Ok(FakeClient {
                    processor_type: pt.to_string(),
                })
            },
        );

        for _ in 0..2 {
            drop(pool.acquire("ocr").await.unwrap());
        }
        assert_eq!(pool.client_count(), 1);

        let retired = pool.sweep();
        assert_eq!(retired, 1);
        assert_eq!(pool.client_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_skips_in_flight_clients() {
        let pool = ProcessorPool::new(
            ProcessorPoolConfig::new()
                .max_concurrent_requests(4)
                .max_clients_per_processor(4)
                .client_max_requests(1),
            |pt| {
                Ok(FakeClient {
                    processor_type: pt.to_string(),
                })
            },
        );

        let guard = pool.acquire("ocr").await.unwrap();
        assert_eq!(pool.sweep(), 0);
        drop(guard);
        assert_eq!(pool.sweep(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let pool = test_pool(2);
        pool.shutdown().await;

        let err = pool.acquire("form-parser").await.unwrap_err();
        assert!(err.to_string().contains("shutting down"));
        assert_eq!(pool.client_count(), 0);
    }
}
