//! Best-effort cache of match results.
//!
//! [`ResultCache`] wraps a [`CacheBackend`] and never fails its caller: every
//! backend call runs under a short timeout, and errors or timeouts degrade to
//! a miss (for reads) or a no-op (for writes). The connection state it tracks
//! is what health checks report, so they never have to re-probe the backend.
//!
//! After a failure the cache stops calling the backend for `retry_after`,
//! then lets the next operation through as a reconnection attempt.
//! Invalidation is the exception: it always reaches the backend. When it
//! fails, a flush stays pending and every read is a miss until a later call
//! clears the namespace.
//!
//! Each invalidation also bumps a write generation. A match list computed
//! under an older generation is never stored, so a scan that raced a write
//! cannot repopulate the cache with pre-write results.

pub mod backend;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use backend::{CacheBackend, CacheError, InMemoryCacheBackend};

/// Namespace of match-result keys
pub const MATCH_NAMESPACE: &str = "match:";

/// Minimum spacing between repeated "cache unavailable" warnings
const WARN_INTERVAL: Duration = Duration::from_secs(5);

/// Connection state as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Connected,
    Disconnected,
    Reconnecting,
    /// No backend configured
    Disabled,
}

impl CacheState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for CacheState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing knobs of the result cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Lifetime of a cached match list
    pub ttl: Duration,
    /// Deadline for each backend call
    pub op_timeout: Duration,
    /// Pause after a failure before the backend is tried again
    pub retry_after: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            op_timeout: Duration::from_secs(2),
            retry_after: Duration::from_secs(5),
        }
    }
}

/// Key of a cached match list.
///
/// Only the matching engine mints keys, which keeps every write in the
/// match namespace under its control.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key from the normalized query; the payload must serialize
    /// deterministically.
    pub(crate) fn for_matches<T: Serialize>(normalized_query: &T) -> Result<Self, CacheError> {
        let json = serde_json::to_string(normalized_query)
            .map_err(|e| CacheError::Encoding(e.to_string()))?;
        Ok(Self(format!(
            "{MATCH_NAMESPACE}{:x}",
            md5::compute(json.as_bytes())
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
struct ConnectionTracker {
    state: CacheState,
    changed_at: Instant,
    last_warning: Option<Instant>,
    /// Generation of the last invalidation the backend did not acknowledge
    pending_flush: Option<u64>,
}

impl ConnectionTracker {
    fn new(state: CacheState) -> Self {
        Self {
            state,
            changed_at: Instant::now(),
            last_warning: None,
            pending_flush: None,
        }
    }
}

/// Fail-soft cache of match results
#[derive(Clone)]
pub struct ResultCache {
    backend: Option<Arc<dyn CacheBackend>>,
    settings: CacheSettings,
    tracker: Arc<Mutex<ConnectionTracker>>,
    generation: Arc<AtomicU64>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    pub fn new(backend: Arc<dyn CacheBackend>, settings: CacheSettings) -> Self {
        Self {
            backend: Some(backend),
            settings,
            tracker: Arc::new(Mutex::new(ConnectionTracker::new(CacheState::Connected))),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A cache that never stores anything
    pub fn disabled() -> Self {
        Self {
            backend: None,
            settings: CacheSettings::default(),
            tracker: Arc::new(Mutex::new(ConnectionTracker::new(CacheState::Disabled))),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> CacheState {
        self.tracker.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == CacheState::Connected
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Current write generation; read it before computing a result that
    /// will be passed to [`put_matches`](Self::put_matches)
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Whether an unacknowledged invalidation is waiting to be replayed
    pub fn flush_pending(&self) -> bool {
        self.tracker.lock().pending_flush.is_some()
    }

    /// Look up a cached match list; any failure is a miss
    pub async fn get_matches<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let backend = self.backend.as_ref()?;
        if !self.settle_pending_flush(backend.as_ref()).await {
            return None;
        }
        let raw = self.guard("get", backend.get(key.as_str())).await??;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = key.as_str(), error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Store a match list computed under `generation`.
    ///
    /// Nothing is stored when an invalidation happened since `generation`
    /// was read. Failures are logged only.
    pub async fn put_matches<T: Serialize + ?Sized>(
        &self,
        key: &CacheKey,
        value: &T,
        generation: u64,
    ) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if self.generation() != generation {
            tracing::debug!(key = key.as_str(), "Skipping cache fill computed before a write");
            return;
        }
        if !self.settle_pending_flush(backend.as_ref()).await {
            return;
        }
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Match list could not be encoded for caching");
                return;
            }
        };
        self.guard("set", backend.set_with_ttl(key.as_str(), self.settings.ttl, raw))
            .await;

        // An invalidation that started while the entry was being written may
        // have cleared the namespace before the entry landed.
        if self.generation() != generation {
            self.call("delete", backend.delete_by_prefix(key.as_str()))
                .await;
        }
    }

    /// Clear every cached match list, returning how many were removed.
    ///
    /// Always calls the backend, even while it is considered disconnected. A
    /// failed call leaves a flush pending instead of stale entries.
    pub async fn invalidate_matches(&self) -> usize {
        let Some(backend) = self.backend.as_ref() else {
            return 0;
        };
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        match self
            .call("delete_by_prefix", backend.delete_by_prefix(MATCH_NAMESPACE))
            .await
        {
            Some(removed) => {
                self.clear_pending_flush(generation);
                tracing::debug!(removed, "Invalidated cached match results");
                removed
            }
            None => {
                self.tracker.lock().pending_flush = Some(generation);
                tracing::debug!("Invalidation deferred until the result cache recovers");
                0
            }
        }
    }

    /// Replay a pending invalidation; `false` while it cannot be applied
    async fn settle_pending_flush(&self, backend: &dyn CacheBackend) -> bool {
        let pending = self.tracker.lock().pending_flush;
        let Some(generation) = pending else {
            return true;
        };
        if self
            .guard("delete_by_prefix", backend.delete_by_prefix(MATCH_NAMESPACE))
            .await
            .is_none()
        {
            return false;
        }
        self.clear_pending_flush(generation);
        tracing::debug!("Replayed deferred cache invalidation");
        !self.flush_pending()
    }

    /// Clear the pending flush unless a newer one was recorded meanwhile
    fn clear_pending_flush(&self, generation: u64) {
        let mut tracker = self.tracker.lock();
        if tracker.pending_flush.is_some_and(|pending| pending <= generation) {
            tracker.pending_flush = None;
        }
    }

    /// Probe the backend, updating the connection state
    pub async fn ping(&self) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        self.guard("ping", backend.ping()).await.is_some()
    }

    /// Run one backend call under the timeout and connection policy
    async fn guard<T, F>(&self, operation: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        if !self.admit() {
            return None;
        }
        self.call(operation, call).await
    }

    /// Run one backend call under the timeout, bypassing the retry pause
    async fn call<T, F>(&self, operation: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        let result = match tokio::time::timeout(self.settings.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(operation)),
        };

        match result {
            Ok(value) => {
                self.mark_connected();
                Some(value)
            }
            Err(e) => {
                self.mark_disconnected(operation, &e);
                None
            }
        }
    }

    /// Whether the backend may be called right now
    fn admit(&self) -> bool {
        let mut tracker = self.tracker.lock();
        match tracker.state {
            CacheState::Disabled => false,
            CacheState::Connected | CacheState::Reconnecting => true,
            CacheState::Disconnected => {
                if tracker.changed_at.elapsed() < self.settings.retry_after {
                    return false;
                }
                tracker.state = CacheState::Reconnecting;
                tracker.changed_at = Instant::now();
                true
            }
        }
    }

    fn mark_connected(&self) {
        let mut tracker = self.tracker.lock();
        if tracker.state != CacheState::Connected {
            tracing::info!("Result cache reconnected");
            tracker.state = CacheState::Connected;
            tracker.changed_at = Instant::now();
        }
    }

    fn mark_disconnected(&self, operation: &'static str, error: &CacheError) {
        let mut tracker = self.tracker.lock();
        tracker.state = CacheState::Disconnected;
        tracker.changed_at = Instant::now();

        let should_warn = tracker
            .last_warning
            .is_none_or(|at| at.elapsed() >= WARN_INTERVAL);
        if should_warn {
            tracker.last_warning = Some(Instant::now());
            tracing::warn!(operation, error = %error, "Result cache unavailable, bypassing");
        } else {
            tracing::debug!(operation, error = %error, "Result cache still unavailable");
        }
    }
}
