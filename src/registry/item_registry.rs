use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::{CloudError, Result};
use crate::registry::item::Item;
use crate::registry::snapshot::{RefreshStats, Snapshot};
use crate::remote::gateway::RemoteGateway;

/// The published snapshot plus the invalidation count it satisfies
struct Published {
    snapshot: Arc<Snapshot>,
    invalidation_epoch: u64,
    /// Ids installed since the running refresh asked for its listing
    installed_since_listing: HashSet<String>,
}

/// How a finished refresh attempt ended
#[derive(Debug, Clone)]
struct AttemptOutcome {
    attempt: u64,
    failure: Option<String>,
}

/// In-memory index of remote items, refreshed from the full listing.
///
/// Readers always get a whole snapshot. A refresh fetches the listing, then
/// reconciles and swaps the new snapshot in under one write lock with no
/// suspension point in between, so a cancelled refresh leaves nothing behind.
/// Concurrent refresh triggers queue on a single lock. A waiter behind a
/// failed attempt reuses that failure; a waiter that is still stale after a
/// successful attempt refreshes again, since that attempt's listing may
/// predate the invalidation.
pub struct ItemRegistry {
    gateway: RemoteGateway,
    published: RwLock<Published>,
    refresh_lock: Mutex<()>,
    /// Bumped by every `invalidate_cache`
    invalidations: AtomicU64,
    /// Bumped when a refresh attempt starts; the new value is its attempt id
    refresh_started: AtomicU64,
    /// How the most recent finished attempt ended
    last_outcome: StdMutex<Option<AttemptOutcome>>,
    refresh_threshold: Duration,
    root: Arc<Item>,
    trash: Arc<Item>,
}

impl ItemRegistry {
    /// Create an empty registry; the first access performs the first refresh
    pub fn new(gateway: RemoteGateway, refresh_threshold: Duration) -> Self {
        Self {
            gateway,
            published: RwLock::new(Published {
                snapshot: Arc::new(Snapshot::empty()),
                invalidation_epoch: 0,
                installed_since_listing: HashSet::new(),
            }),
            refresh_lock: Mutex::new(()),
            invalidations: AtomicU64::new(0),
            refresh_started: AtomicU64::new(0),
            last_outcome: StdMutex::new(None),
            refresh_threshold,
            root: Arc::new(Item::root()),
            trash: Arc::new(Item::trash()),
        }
    }

    /// The current snapshot, without refreshing
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.published
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .snapshot
            .clone()
    }

    pub fn is_stale(&self) -> bool {
        let published = self
            .published
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if published.invalidation_epoch != self.invalidations.load(Ordering::SeqCst) {
            return true;
        }
        match published.snapshot.last_refresh() {
            None => true,
            Some(at) => at.elapsed() > self.refresh_threshold,
        }
    }

    /// Force the next access to refresh, however recent the last refresh was
    pub fn invalidate_cache(&self) {
        debug!("🗑️ Item registry invalidated");
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }

    /// The current snapshot, refreshed first if it is stale.
    ///
    /// Only the caller whose access actually ran a failed refresh sees the
    /// error; callers that were queued behind it are served the stale
    /// snapshot, and the registry stays stale so the next access retries.
    /// Before any refresh succeeded there is nothing to serve, so queued
    /// callers get the failure too.
    pub async fn current(&self) -> Result<Arc<Snapshot>> {
        if !self.is_stale() {
            return Ok(self.snapshot());
        }

        let finished_seen = self.last_finished_attempt();
        let _guard = self.refresh_lock.lock().await;

        if !self.is_stale() {
            debug!("🤝 Joined a refresh that completed while waiting");
            return Ok(self.snapshot());
        }

        match self.outcome_after(finished_seen) {
            Some(AttemptOutcome {
                failure: Some(message),
                ..
            }) => {
                if self.snapshot().last_refresh().is_none() {
                    return Err(CloudError::Transport(message));
                }
                warn!("⚠️ Refresh failed while waiting, serving stale snapshot: {}", message);
            }
            // nothing finished meanwhile, or the attempt that did listed
            // before the invalidation that makes us stale now
            _ => {
                self.refresh_locked().await?;
            }
        }
        Ok(self.snapshot())
    }

    /// Reconcile against a fresh listing now, or join a refresh that started
    /// after this call and has finished meanwhile
    pub async fn refresh(&self) -> Result<()> {
        let started_seen = self.refresh_started.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;

        match self.outcome_after(started_seen) {
            Some(AttemptOutcome { failure: None, .. }) => {
                debug!("🤝 Joined a refresh that finished while waiting");
                Ok(())
            }
            Some(AttemptOutcome {
                failure: Some(message),
                ..
            }) => Err(CloudError::Transport(message)),
            None => self.refresh_locked().await.map(|_| ()),
        }
    }

    fn last_outcome(&self) -> Option<AttemptOutcome> {
        self.last_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Id of the latest attempt that ran to completion, 0 before the first
    fn last_finished_attempt(&self) -> u64 {
        self.last_outcome().map_or(0, |outcome| outcome.attempt)
    }

    /// Outcome of the latest finished attempt if its id is above `attempt`.
    /// Cancelled attempts never record an outcome.
    fn outcome_after(&self, attempt: u64) -> Option<AttemptOutcome> {
        self.last_outcome().filter(|outcome| outcome.attempt > attempt)
    }

    fn record_outcome(&self, attempt: u64, failure: Option<String>) {
        *self
            .last_outcome
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(AttemptOutcome { attempt, failure });
    }

    /// Must be called with `refresh_lock` held
    async fn refresh_locked(&self) -> Result<RefreshStats> {
        let attempt = self.refresh_started.fetch_add(1, Ordering::SeqCst) + 1;
        let epoch = self.invalidations.load(Ordering::SeqCst);
        info!("🔄 Refreshing item registry (attempt {})", attempt);

        self.published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .installed_since_listing
            .clear();

        let listing = match self.gateway.list().await {
            Ok(listing) => listing,
            Err(e) => {
                self.record_outcome(attempt, Some(e.to_string()));
                warn!("⚠️ Refresh failed, continuing to serve the previous snapshot: {}", e);
                return Err(e);
            }
        };

        let (stats, orphans) = {
            let mut published = self
                .published
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let installed = std::mem::take(&mut published.installed_since_listing);
            let (next, stats) =
                published
                    .snapshot
                    .reconcile_preserving(listing, Instant::now(), &installed);
            let orphans = next.orphans().len();
            published.snapshot = Arc::new(next);
            published.invalidation_epoch = epoch;
            (stats, orphans)
        };
        self.record_outcome(attempt, None);

        info!(
            "✅ Registry refreshed: {} inserted, {} updated, {} unchanged, {} tombstoned",
            stats.inserted, stats.updated, stats.unchanged, stats.tombstoned
        );
        if orphans > 0 {
            warn!("⚠️ {} items have a parent that does not resolve to a folder", orphans);
        }
        Ok(stats)
    }

    /// Resolve `id`, refreshing first if the registry is stale.
    ///
    /// The virtual root and trash folders always resolve, without touching
    /// the remote.
    pub async fn get_by_id(&self, id: &str) -> Result<Arc<Item>> {
        if let Some(folder) = self.virtual_folder(id) {
            return Ok(folder);
        }

        let snapshot = self.current().await?;
        snapshot.get(id).ok_or_else(|| {
            if snapshot.is_tombstone(id) {
                CloudError::NotFound(format!("{} (removed remotely)", id))
            } else {
                CloudError::NotFound(id.to_string())
            }
        })
    }

    pub fn virtual_folder(&self, id: &str) -> Option<Arc<Item>> {
        if id == self.root.id {
            Some(self.root.clone())
        } else if id == self.trash.id {
            Some(self.trash.clone())
        } else {
            None
        }
    }

    /// Publish an item the remote just created, keeping the refresh time.
    ///
    /// A refresh whose listing was requested before the create keeps the item
    /// instead of tombstoning it.
    pub fn install_item(&self, item: Item) -> Arc<Item> {
        let mut published = self
            .published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = published.snapshot.with_item(item.clone());
        let installed = next.get(&item.id).unwrap_or_else(|| Arc::new(item));
        published.snapshot = Arc::new(next);
        // a listing already in flight predates this item
        published.installed_since_listing.insert(installed.id.clone());
        debug!("➕ Installed new item {}", installed.id);
        installed
    }
}
