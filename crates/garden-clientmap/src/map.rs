//! Generic client map: a keyed cache of client sets built by one factory
//!
//! # Entry lifecycle
//!
//! ```text
//!   get_client(K), K unseen
//!        │
//!        ▼
//!   [building] ── shared one-time future; every caller for K awaits it
//!        │  ok                         │ err
//!        ▼                             ▼
//!   [published(F1)]               entry removed, all waiters get the error
//!        │  fingerprint now F2
//!        ▼
//!   [refreshing] ── per-entry lock; callers for K wait, other keys don't
//!        │  ok                         │ err
//!        ▼                             ▼
//!   [published(F2)]               [published(F1)] + failed F2 remembered
//! ```
//!
//! Publication replaces an `Arc`, so a caller either sees the old client set
//! or the new one, never a partially built one. A caller dropping its future
//! only abandons its own wait: the initial build stays in the entry and the
//! next caller resumes it, unless it has outlived the build timeout.
//!
//! At most one factory call per key is outstanding. Invalidating a key while
//! it is building or refreshing marks the entry instead of removing it; the
//! running build's result is discarded and it is built once more.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use garden_common::{metrics, Error, Result};

use crate::clock::Clock;
use crate::config::ClientMapConfig;
use crate::factory::{ensure_category, ClientSetFactory};
use crate::key::ClientSetKey;

/// Smallest period accepted by [`spawn_eviction`]
const MIN_EVICTION_PERIOD: Duration = Duration::from_secs(1);

/// Consumer surface of a client map
///
/// Reconcilers depend on this trait only; they never see factories or
/// cache internals.
#[async_trait]
pub trait ClientMap: Send + Sync {
    /// Client set type handed out
    type ClientSet: Send + Sync + 'static;

    /// Get the client set for `key`, building or refreshing it if needed
    async fn get_client(&self, key: &ClientSetKey) -> Result<Arc<Self::ClientSet>>;

    /// Drop the cached client set for `key` so the next access rebuilds it
    fn invalidate_client(&self, key: &ClientSetKey) -> Result<()>;

    /// Remove entries idle for longer than the configured idle timeout
    ///
    /// Returns the number of evicted entries.
    fn evict_idle(&self) -> usize;
}

/// A client set together with the fingerprint it was built from
struct Published<CS> {
    client_set: Arc<CS>,
    fingerprint: String,
}

impl<CS> Clone for Published<CS> {
    fn clone(&self) -> Self {
        Self {
            client_set: self.client_set.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

type BuildFuture<CS> = Shared<BoxFuture<'static, Result<Published<CS>>>>;

// Lock order: the map's `entries` before an entry's `state`.
struct Entry<CS> {
    state: Mutex<EntryState<CS>>,
    /// Serialises rebuilds after a fingerprint change
    refresh: tokio::sync::Mutex<()>,
}

struct EntryState<CS> {
    /// Initial build, set until the first waiter publishes its result
    build: Option<BuildFuture<CS>>,
    /// When `build` was started, by the map's clock
    build_started: Instant,
    published: Option<Published<CS>>,
    /// Fingerprint whose rebuild already failed once
    failed_fingerprint: Option<String>,
    /// Finished rotation rebuilds, successful or not
    rebuild_attempts: u64,
    /// Invalidated while a build or rebuild was running
    invalidated: bool,
    next_check: Instant,
    last_access: Instant,
}

impl<CS> Entry<CS> {
    fn new(build: BuildFuture<CS>, now: Instant) -> Self {
        Self {
            state: Mutex::new(EntryState {
                build: Some(build),
                build_started: now,
                published: None,
                failed_fingerprint: None,
                rebuild_attempts: 0,
                invalidated: false,
                next_check: now,
                last_access: now,
            }),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    /// True while a factory call for this entry may be running
    fn is_busy(&self) -> bool {
        self.state.lock().build.is_some() || self.refresh.try_lock().is_err()
    }

    fn is_idle(
        &self,
        now: Instant,
        idle_timeout: Duration,
        build_timeout: Option<Duration>,
    ) -> bool {
        let state = self.state.lock();
        // A pending build is only dropped once it has outlived its timeout
        let settled = match state.build {
            None => self.refresh.try_lock().is_ok(),
            Some(_) => build_expired(&*state, now, build_timeout),
        };
        settled && now.saturating_duration_since(state.last_access) >= idle_timeout
    }
}

fn build_expired<CS>(
    state: &EntryState<CS>,
    now: Instant,
    build_timeout: Option<Duration>,
) -> bool {
    build_timeout.is_some_and(|after| now.saturating_duration_since(state.build_started) >= after)
}

/// Keyed cache of client sets for the category served by `F`
pub struct GenericClientMap<F: ClientSetFactory> {
    factory: Arc<F>,
    clock: Arc<dyn Clock>,
    config: ClientMapConfig,
    entries: Mutex<HashMap<ClientSetKey, Arc<Entry<F::ClientSet>>>>,
}

impl<F: ClientSetFactory> GenericClientMap<F> {
    /// Create an empty map building client sets with `factory`
    pub fn new(factory: Arc<F>, clock: Arc<dyn Clock>, config: ClientMapConfig) -> Self {
        Self {
            factory,
            clock,
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached entries, including builds in flight
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// True when an entry (built or building) exists for `key`
    pub fn contains(&self, key: &ClientSetKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    fn category(&self) -> &'static str {
        self.factory.category().as_str()
    }

    fn check_category(&self, key: &ClientSetKey) -> Result<()> {
        ensure_category(key, self.factory.category())
    }

    /// True when `entry` is still the one the map holds for `key`
    fn is_current(&self, key: &ClientSetKey, entry: &Arc<Entry<F::ClientSet>>) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
    }

    fn remove_if_current(&self, key: &ClientSetKey, entry: &Arc<Entry<F::ClientSet>>) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            entries.remove(key);
        }
    }

    /// Get the client set for `key`
    ///
    /// Concurrent callers for an unseen key share a single build and its
    /// outcome. Cached entries are checked against the current credential
    /// fingerprint (at most once per refresh interval) and rebuilt when it
    /// changed.
    #[instrument(skip(self, key), fields(key = %key, category = self.category()))]
    pub async fn get_client(&self, key: &ClientSetKey) -> Result<Arc<F::ClientSet>> {
        self.check_category(key)?;

        loop {
            let now = self.clock.now();
            let entry = {
                let mut entries = self.entries.lock();
                entries
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Entry::new(self.build_future(key.clone()), now)))
                    .clone()
            };

            let build = {
                let mut state = entry.state.lock();
                state.last_access = now;
                let expired = state.build.is_some()
                    && build_expired(&*state, now, self.config.build_timeout);
                if expired {
                    debug!(key = %key, "Pending build outlived its timeout, starting over");
                    Some(self.restart_build(key, &mut *state))
                } else {
                    state.build.clone()
                }
            };

            if let Some(build) = build {
                metrics::record_request(self.category(), false);
                return self.await_build(key, &entry, build).await;
            }

            metrics::record_request(self.category(), true);
            if let Some(client_set) = self.ensure_fresh(key, &entry).await? {
                return Ok(client_set);
            }
            debug!(key = %key, "Entry was replaced while refreshing, retrying");
        }
    }

    /// Remove the entry for `key` and let the factory drop its auxiliary state
    ///
    /// An entry that is still building stays in place, marked so its result
    /// is discarded and built again. The factory is told even when nothing was
    /// cached: it may hold routing state from a build that failed.
    pub fn invalidate_client(&self, key: &ClientSetKey) -> Result<()> {
        self.check_category(key)?;

        {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get(key) {
                if entry.is_busy() {
                    entry.state.lock().invalidated = true;
                    debug!(key = %key, "Build in flight, discarding its result when done");
                } else {
                    entries.remove(key);
                }
                info!(key = %key, "Invalidated client set");
                metrics::record_removal(self.category(), "invalidated", 1);
            }
        }
        self.factory.invalidate(key);
        Ok(())
    }

    /// Remove entries not accessed within the idle timeout
    pub fn evict_idle(&self) -> usize {
        let Some(idle_timeout) = self.config.idle_timeout else {
            return 0;
        };
        let now = self.clock.now();
        let build_timeout = self.config.build_timeout;

        let mut evicted = Vec::new();
        self.entries.lock().retain(|key, entry| {
            let idle = entry.is_idle(now, idle_timeout, build_timeout);
            if idle {
                evicted.push(key.clone());
            }
            !idle
        });

        for key in &evicted {
            debug!(key = %key, "Evicted idle client set");
            self.factory.invalidate(key);
        }
        metrics::record_removal(self.category(), "idle", evicted.len() as u64);
        evicted.len()
    }

    /// Initial build for `key` as a future any number of callers can await
    fn build_future(&self, key: ClientSetKey) -> BuildFuture<F::ClientSet> {
        let factory = self.factory.clone();
        let timeout = self.config.build_timeout;
        let category = self.category();

        async move {
            let started = Instant::now();
            let result = bounded(timeout, &key, factory.new_client_set(&key)).await;
            metrics::record_build(
                category,
                "initial",
                result.is_ok(),
                started.elapsed().as_secs_f64(),
            );

            match result {
                Ok((client_set, fingerprint)) => {
                    info!(key = %key, category, "Built client set");
                    Ok(Published {
                        client_set: Arc::new(client_set),
                        fingerprint,
                    })
                }
                Err(e) => {
                    warn!(key = %key, category, error = %e, "Failed to build client set");
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Replace the entry's pending build with a new one
    ///
    /// Dropping the old future here cancels it unless a caller still awaits
    /// it. A pending invalidation is settled by the new build.
    fn restart_build(
        &self,
        key: &ClientSetKey,
        state: &mut EntryState<F::ClientSet>,
    ) -> BuildFuture<F::ClientSet> {
        if std::mem::take(&mut state.invalidated) {
            self.factory.invalidate(key);
        }
        let build = self.build_future(key.clone());
        state.build = Some(build.clone());
        state.build_started = self.clock.now();
        build
    }

    async fn await_build(
        &self,
        key: &ClientSetKey,
        entry: &Arc<Entry<F::ClientSet>>,
        mut build: BuildFuture<F::ClientSet>,
    ) -> Result<Arc<F::ClientSet>> {
        loop {
            // Await a clone: a completed `Shared` no longer compares equal
            let result = build.clone().await;

            let mut state = entry.state.lock();
            let pending = state.build.as_ref().is_some_and(|b| b.ptr_eq(&build));
            if !pending {
                // Another waiter published this build or replaced it
                if let Some(next) = state.build.clone() {
                    build = next;
                    continue;
                }
                return state
                    .published
                    .as_ref()
                    .map(|p| p.client_set.clone())
                    .ok_or_else(|| {
                        Error::internal_with_context("client map", "built entry has no client set")
                    });
            }

            if state.invalidated {
                info!(key = %key, "Invalidated during build, building again");
                build = self.restart_build(key, &mut *state);
                continue;
            }

            match result {
                Ok(published) => {
                    state.build = None;
                    state.next_check = self.clock.now() + self.config.refresh_interval;
                    let client_set = published.client_set.clone();
                    state.published = Some(published);
                    return Ok(client_set);
                }
                Err(e) => {
                    // The failed future stays in the entry so late waiters see
                    // the same error, but the next caller starts over
                    drop(state);
                    self.remove_if_current(key, entry);
                    return Err(e);
                }
            }
        }
    }

    /// Serve the published client set, rebuilding it if the credentials moved
    ///
    /// Returns None when the entry left the map meanwhile; the caller retries
    /// with the current one.
    async fn ensure_fresh(
        &self,
        key: &ClientSetKey,
        entry: &Arc<Entry<F::ClientSet>>,
    ) -> Result<Option<Arc<F::ClientSet>>> {
        let now = self.clock.now();
        let current = {
            let state = entry.state.lock();
            if state.invalidated {
                None
            } else {
                let published = state.published.clone().ok_or_else(|| {
                    Error::internal_with_context("client map", "published entry has no client set")
                })?;
                if now < state.next_check {
                    return Ok(Some(published.client_set));
                }
                Some(published)
            }
        };

        let Some(current) = current else {
            let refreshing = entry.refresh.try_lock().is_err();
            if refreshing {
                // The running rebuild handles the invalidation
                drop(entry.refresh.lock().await);
            } else {
                // Invalidated just as a rebuild finished
                self.remove_if_current(key, entry);
                self.factory.invalidate(key);
            }
            return Ok(None);
        };

        let fingerprint = bounded(
            self.config.build_timeout,
            key,
            self.factory.calculate_fingerprint(key),
        )
        .await?;

        if fingerprint == current.fingerprint {
            entry.state.lock().next_check = self.clock.now() + self.config.refresh_interval;
            return Ok(Some(current.client_set));
        }

        self.refresh(key, entry, fingerprint).await
    }

    /// Rebuild after the credentials changed to `fingerprint`
    ///
    /// Callers for the same key queue on the entry's refresh lock. Whoever
    /// gets it after a successful rebuild finds the new client set published;
    /// after a failed one, the last good client set. Neither builds again.
    async fn refresh(
        &self,
        key: &ClientSetKey,
        entry: &Arc<Entry<F::ClientSet>>,
        fingerprint: String,
    ) -> Result<Option<Arc<F::ClientSet>>> {
        let attempts_seen = entry.state.lock().rebuild_attempts;
        let _refreshing = entry.refresh.lock().await;
        if !self.is_current(key, entry) {
            return Ok(None);
        }

        let (current, failed_before) = {
            let state = entry.state.lock();
            let published = state.published.clone().ok_or_else(|| {
                Error::internal_with_context("client map", "published entry has no client set")
            })?;
            let failed_before = state.failed_fingerprint.as_deref() == Some(fingerprint.as_str());
            if failed_before && state.rebuild_attempts != attempts_seen {
                debug!(key = %key, "Rebuild failed while waiting, serving last good client set");
                return Ok(Some(published.client_set));
            }
            (published, failed_before)
        };
        if current.fingerprint == fingerprint {
            return Ok(Some(current.client_set));
        }

        info!(key = %key, "Credentials changed, rebuilding client set");
        loop {
            let started = Instant::now();
            let result = bounded(
                self.config.build_timeout,
                key,
                self.factory.new_client_set(key),
            )
            .await;
            metrics::record_build(
                self.category(),
                "rotation",
                result.is_ok(),
                started.elapsed().as_secs_f64(),
            );

            let mut state = entry.state.lock();
            state.rebuild_attempts += 1;
            if state.invalidated {
                state.invalidated = false;
                drop(state);
                info!(key = %key, "Invalidated during rebuild, building again");
                self.factory.invalidate(key);
                continue;
            }

            return match result {
                Ok((client_set, new_fingerprint)) => {
                    let client_set = Arc::new(client_set);
                    state.published = Some(Published {
                        client_set: client_set.clone(),
                        fingerprint: new_fingerprint,
                    });
                    state.failed_fingerprint = None;
                    state.next_check = self.clock.now() + self.config.refresh_interval;
                    Ok(Some(client_set))
                }
                Err(e) if failed_before => {
                    warn!(
                        key = %key,
                        error = %e,
                        "Rebuild failed again, serving last known good client set"
                    );
                    Ok(Some(current.client_set))
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to rebuild client set");
                    state.failed_fingerprint = Some(fingerprint);
                    Err(e)
                }
            };
        }
    }
}

#[async_trait]
impl<F: ClientSetFactory> ClientMap for GenericClientMap<F> {
    type ClientSet = F::ClientSet;

    async fn get_client(&self, key: &ClientSetKey) -> Result<Arc<F::ClientSet>> {
        GenericClientMap::get_client(self, key).await
    }

    fn invalidate_client(&self, key: &ClientSetKey) -> Result<()> {
        GenericClientMap::invalidate_client(self, key)
    }

    fn evict_idle(&self) -> usize {
        GenericClientMap::evict_idle(self)
    }
}

/// Run `fut`, failing with a timeout error once `timeout` elapses
async fn bounded<T>(
    timeout: Option<Duration>,
    key: &ClientSetKey,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| Error::timeout(key.key(), after))?,
        None => fut.await,
    }
}

/// Periodically evict idle entries from `map` until `cancel` fires
pub fn spawn_eviction<M>(map: Arc<M>, period: Duration, cancel: CancellationToken) -> JoinHandle<()>
where
    M: ClientMap + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(MIN_EVICTION_PERIOD));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Idle eviction stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = map.evict_idle();
                    if evicted > 0 {
                        debug!(evicted, "Evicted idle client sets");
                    }
                }
            }
        }
    })
}
