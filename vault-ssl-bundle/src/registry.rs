//! Bundle registry
//!
//! Maps `vault:` names to built bundles. Each name is Unloaded, Loading or
//! Loaded. The first caller for an unloaded name becomes the leader and runs
//! the fetch/decode/build pipeline; callers arriving while it runs subscribe
//! to its outcome instead of fetching again. Failures are delivered to every
//! waiter and leave the name Unloaded, so the next call retries.
//!
//! The lock only guards the slot map. Fetching and building happen outside
//! it, so a slow load for one name never blocks lookups of another.

use crate::defaults;
use crate::fetcher::SecretFetcher;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use vault_ssl_bundle_core::{
    BundleBuilder, BundleError, BundleName, Result, SslBundle, pem::decode_key_material,
};

type LoadOutcome = Result<Arc<SslBundle>>;

/// Lifecycle state of one name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    Unloaded,
    Loading,
    Loaded,
}

/// Cache change notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEvent {
    /// A name became available for the first time since it was last unloaded
    Loaded(String),
    /// A loaded name was overwritten by [`BundleRegistry::put`] or
    /// [`BundleRegistry::update`]
    Replaced(String),
    /// A loaded name was dropped from the cache
    Invalidated(String),
}

struct InFlight {
    id: u64,
    done: broadcast::Sender<LoadOutcome>,
}

enum Slot {
    Loading(InFlight),
    Loaded(Arc<SslBundle>),
}

enum LoadBegin {
    Cached(Arc<SslBundle>),
    Wait(broadcast::Receiver<LoadOutcome>),
    Leader {
        id: u64,
        done: broadcast::Sender<LoadOutcome>,
    },
}

/// Clears an abandoned in-flight slot if the leader's future is dropped
/// before it publishes. Once the leader's sender is gone too, waiters see
/// the channel close and start over.
struct LoadGuard<'a> {
    registry: &'a BundleRegistry,
    name: &'a str,
    id: u64,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.abandon(self.name, self.id);
        }
    }
}

/// Caches built bundles by name and loads each name at most once at a time
pub struct BundleRegistry {
    fetcher: Arc<dyn SecretFetcher>,
    builder: BundleBuilder,
    slots: Mutex<HashMap<String, Slot>>,
    next_load_id: AtomicU64,
    events: broadcast::Sender<BundleEvent>,
}

impl BundleRegistry {
    pub fn new(fetcher: Arc<dyn SecretFetcher>) -> Self {
        Self::with_builder(fetcher, BundleBuilder::default())
    }

    pub fn with_builder(fetcher: Arc<dyn SecretFetcher>, builder: BundleBuilder) -> Self {
        let (events, _) = broadcast::channel(defaults::EVENT_CHANNEL_CAPACITY);
        Self {
            fetcher,
            builder,
            slots: Mutex::new(HashMap::new()),
            next_load_id: AtomicU64::new(1),
            events,
        }
    }

    /// Return the bundle for `name`, loading it on first use.
    ///
    /// Names without the `vault:` marker fail before any fetch. Concurrent
    /// callers for the same name share one load and receive the same
    /// `Arc` or an equal error.
    pub async fn get(&self, name: &str) -> Result<Arc<SslBundle>> {
        let name = BundleName::parse(name)?;

        loop {
            match self.begin(name.as_str()) {
                LoadBegin::Cached(bundle) => {
                    tracing::debug!(bundle = %name, "SSL bundle cache hit");
                    return Ok(bundle);
                }
                LoadBegin::Wait(mut done) => match done.recv().await {
                    Ok(outcome) => return outcome,
                    Err(_) => {
                        tracing::debug!(bundle = %name, "In-flight load was abandoned, retrying");
                        continue;
                    }
                },
                LoadBegin::Leader { id, done } => return self.lead(&name, id, done).await,
            }
        }
    }

    fn begin(&self, name: &str) -> LoadBegin {
        let mut slots = self.slots.lock();
        match slots.get(name) {
            Some(Slot::Loaded(bundle)) => LoadBegin::Cached(Arc::clone(bundle)),
            Some(Slot::Loading(flight)) => LoadBegin::Wait(flight.done.subscribe()),
            None => {
                let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
                let (done, _) = broadcast::channel(1);
                let flight = InFlight {
                    id,
                    done: done.clone(),
                };
                slots.insert(name.to_string(), Slot::Loading(flight));
                LoadBegin::Leader { id, done }
            }
        }
    }

    /// Run the load for slot `id`. The leader keeps its own sender, so
    /// waiters subscribed before an invalidate or put still get this outcome.
    async fn lead(
        &self,
        name: &BundleName,
        id: u64,
        done: broadcast::Sender<LoadOutcome>,
    ) -> LoadOutcome {
        let mut guard = LoadGuard {
            registry: self,
            name: name.as_str(),
            id,
            armed: true,
        };

        let outcome = self.load(name).await.map(Arc::new);
        guard.armed = false;
        self.publish(name.as_str(), id, &outcome);
        let _ = done.send(outcome.clone());
        outcome
    }

    async fn load(&self, name: &BundleName) -> Result<SslBundle> {
        tracing::debug!(bundle = %name, path = name.path(), "Loading SSL bundle");

        let result = self.fetch_and_build(name.path()).await;
        match &result {
            Ok(bundle) => {
                let info = bundle.certificate_info();
                tracing::info!(
                    bundle = %name,
                    subject = %info.subject,
                    days_until_expiry = info.days_until_expiry(),
                    "Loaded SSL bundle"
                );
            }
            Err(e) => tracing::warn!(bundle = %name, "Failed to load SSL bundle: {}", e),
        }
        result
    }

    async fn fetch_and_build(&self, path: &str) -> Result<SslBundle> {
        let record = self
            .fetcher
            .read(path)
            .await?
            .ok_or_else(|| BundleError::missing(path, "no secret at path"))?;
        let material = record.material(path)?;
        let parsed = decode_key_material(&material)?;
        self.builder.build(parsed)
    }

    /// Settle the in-flight slot `id` with `outcome`.
    ///
    /// Only a slot still owned by this load is updated. If it was invalidated
    /// or replaced while loading, nothing is cached.
    fn publish(&self, name: &str, id: u64, outcome: &LoadOutcome) {
        {
            let mut slots = self.slots.lock();
            let owned = matches!(slots.get(name), Some(Slot::Loading(flight)) if flight.id == id);
            if !owned {
                tracing::debug!(bundle = name, "Load invalidated or superseded, result not cached");
                return;
            }
            match outcome {
                Ok(bundle) => {
                    slots.insert(name.to_string(), Slot::Loaded(Arc::clone(bundle)));
                }
                Err(_) => {
                    slots.remove(name);
                    return;
                }
            }
        }

        let _ = self.events.send(BundleEvent::Loaded(name.to_string()));
    }

    fn abandon(&self, name: &str, id: u64) {
        let mut slots = self.slots.lock();
        if matches!(slots.get(name), Some(Slot::Loading(flight)) if flight.id == id) {
            slots.remove(name);
            tracing::debug!(bundle = name, "Load cancelled before completion");
        }
    }

    /// Drop `name` from the cache so the next `get` fetches it again.
    ///
    /// Callers holding the old bundle keep using it. An in-flight load is
    /// detached: its leader and waiters still receive the outcome, but it is
    /// not cached. Returns whether anything was removed.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.slots.lock().remove(name);
        match removed {
            Some(Slot::Loaded(_)) => {
                tracing::info!(bundle = name, "Invalidated SSL bundle");
                let _ = self.events.send(BundleEvent::Invalidated(name.to_string()));
                true
            }
            Some(Slot::Loading(_)) => {
                tracing::debug!(bundle = name, "Detached in-flight load");
                true
            }
            None => false,
        }
    }

    /// Invalidate and load `name` again
    pub async fn reload(&self, name: &str) -> Result<Arc<SslBundle>> {
        BundleName::parse(name)?;
        self.invalidate(name);
        self.get(name).await
    }

    /// Store a bundle under `name` without fetching, replacing any existing
    /// entry or in-flight load.
    pub fn put(&self, name: &str, bundle: Arc<SslBundle>) -> Result<()> {
        let name = BundleName::parse(name)?;
        let previous = self
            .slots
            .lock()
            .insert(name.as_str().to_string(), Slot::Loaded(bundle));

        let event = match previous {
            Some(Slot::Loaded(_)) => BundleEvent::Replaced(name.as_str().to_string()),
            _ => BundleEvent::Loaded(name.as_str().to_string()),
        };
        tracing::info!(bundle = %name, "Registered SSL bundle");
        let _ = self.events.send(event);
        Ok(())
    }

    /// Replace an already loaded bundle
    pub fn update(&self, name: &str, bundle: Arc<SslBundle>) -> Result<()> {
        let name = BundleName::parse(name)?;
        {
            let mut slots = self.slots.lock();
            match slots.get_mut(name.as_str()) {
                Some(slot) if matches!(slot, Slot::Loaded(_)) => *slot = Slot::Loaded(bundle),
                _ => return Err(BundleError::NoSuchBundle(name.as_str().to_string())),
            }
        }
        tracing::info!(bundle = %name, "Updated SSL bundle");
        let _ = self.events.send(BundleEvent::Replaced(name.as_str().to_string()));
        Ok(())
    }

    pub fn state(&self, name: &str) -> BundleState {
        match self.slots.lock().get(name) {
            Some(Slot::Loaded(_)) => BundleState::Loaded,
            Some(Slot::Loading(_)) => BundleState::Loading,
            None => BundleState::Unloaded,
        }
    }

    /// Cached bundle for `name`, without loading
    pub fn cached(&self, name: &str) -> Option<Arc<SslBundle>> {
        match self.slots.lock().get(name) {
            Some(Slot::Loaded(bundle)) => Some(Arc::clone(bundle)),
            _ => None,
        }
    }

    /// Names currently loaded, sorted
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Loaded(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Loaded names whose leaf certificate expires within `window`, sorted
    pub fn bundles_needing_renewal(&self, window: Duration) -> Vec<String> {
        let mut names: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Loaded(bundle) if bundle.certificate_info().needs_renewal(window) => {
                    Some(name.clone())
                }
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BundleEvent> {
        self.events.subscribe()
    }
}

/// Periodically reload bundles whose certificates are close to expiry.
///
/// A failed reload leaves the name unloaded; the next `get` retries it.
pub fn spawn_renewal_task(
    registry: Arc<BundleRegistry>,
    interval: Duration,
    window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            interval_secs = interval.as_secs(),
            window_days = window.as_secs() / 86_400,
            "Starting SSL bundle renewal task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let due = registry.bundles_needing_renewal(window);
            if due.is_empty() {
                continue;
            }
            tracing::info!(count = due.len(), "Reloading SSL bundles near expiry");

            for name in due {
                match registry.reload(&name).await {
                    Ok(bundle) => tracing::info!(
                        bundle = %name,
                        days_until_expiry = bundle.certificate_info().days_until_expiry(),
                        "Renewed SSL bundle"
                    ),
                    Err(e) => tracing::error!(bundle = %name, "SSL bundle renewal failed: {}", e),
                }
            }
        }
    })
}
