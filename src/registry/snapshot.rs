use log::warn;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;

use crate::registry::item::{Item, TRASH_ID, is_virtual_id};
use crate::remote::remote_client::RemoteEntry;

/// Outcome counts of one reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub tombstoned: usize,
}

/// Immutable view of the registry at one point in time.
///
/// Snapshots are never mutated once published: a refresh builds a new one
/// next to the current one and the registry swaps it in as a whole.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    items: HashMap<String, Arc<Item>>,
    tombstones: HashSet<String>,
    last_refresh: Option<Instant>,
    generation: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Item>> {
        self.items.get(id).cloned()
    }

    /// True for ids that vanished from a listing and have not come back
    pub fn is_tombstone(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &Arc<Item>> {
        self.items.values()
    }

    /// When the listing behind this snapshot was fetched; `None` before the first refresh
    pub fn last_refresh(&self) -> Option<Instant> {
        self.last_refresh
    }

    /// Number of refreshes installed so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Build the snapshot that follows `self` given a fresh full listing.
    ///
    /// Unknown ids are inserted, ids with a strictly greater remote version are
    /// replaced, ids at the same version keep their existing `Arc` (so handed
    /// out references stay the current ones), and ids missing from the listing
    /// become tombstones. A listed version lower than the recorded one is
    /// ignored: versions never go backwards.
    pub fn reconcile(&self, listing: Vec<RemoteEntry>, refreshed_at: Instant) -> (Snapshot, RefreshStats) {
        self.reconcile_preserving(listing, refreshed_at, &HashSet::new())
    }

    /// [`reconcile`](Self::reconcile), except that ids in `preserve` which the
    /// listing lacks keep their current entry instead of becoming tombstones.
    /// Used for items installed after the listing was requested.
    pub fn reconcile_preserving(
        &self,
        listing: Vec<RemoteEntry>,
        refreshed_at: Instant,
        preserve: &HashSet<String>,
    ) -> (Snapshot, RefreshStats) {
        let mut latest: HashMap<String, RemoteEntry> = HashMap::with_capacity(listing.len());
        for entry in listing {
            if is_virtual_id(&entry.id) {
                warn!("⚠️ Listing contains reserved id {:?}, ignoring it", entry.id);
                continue;
            }
            let superseded = latest
                .get(&entry.id)
                .is_some_and(|seen| seen.version >= entry.version);
            if superseded {
                warn!("⚠️ Duplicate id {} in listing, dropping version {}", entry.id, entry.version);
            } else {
                latest.insert(entry.id.clone(), entry);
            }
        }

        let mut stats = RefreshStats::default();
        let mut items = HashMap::with_capacity(latest.len());
        for (id, entry) in latest {
            let item = match self.items.get(&id) {
                None => {
                    stats.inserted += 1;
                    Arc::new(Item::from(entry))
                }
                Some(old) if entry.version > old.version => {
                    stats.updated += 1;
                    Arc::new(Item::from(entry))
                }
                Some(old) => {
                    if entry.version < old.version {
                        warn!(
                            "⚠️ Listing reports {} at version {} below recorded {}, keeping recorded",
                            id, entry.version, old.version
                        );
                    }
                    stats.unchanged += 1;
                    old.clone()
                }
            };
            items.insert(id, item);
        }

        let mut tombstones: HashSet<String> = self
            .tombstones
            .iter()
            .filter(|id| !items.contains_key(*id))
            .cloned()
            .collect();
        for (id, item) in &self.items {
            if items.contains_key(id) {
                continue;
            }
            if preserve.contains(id) {
                stats.unchanged += 1;
                items.insert(id.clone(), item.clone());
            } else {
                stats.tombstoned += 1;
                tombstones.insert(id.clone());
            }
        }

        let next = Snapshot {
            items,
            tombstones,
            last_refresh: Some(refreshed_at),
            generation: self.generation + 1,
        };
        (next, stats)
    }

    /// Copy of `self` with `item` added or replaced, keeping the refresh time
    pub fn with_item(&self, item: Item) -> Snapshot {
        let mut next = self.clone();
        next.tombstones.remove(&item.id);
        next.items.insert(item.id.clone(), Arc::new(item));
        next
    }

    /// Items whose `parent` is `folder_id`, or every trashed item for the trash folder
    pub fn children_of(&self, folder_id: &str) -> Vec<Arc<Item>> {
        self.items
            .values()
            .filter(|item| {
                if folder_id == TRASH_ID {
                    item.trashed
                } else {
                    item.parent.as_deref() == Some(folder_id)
                }
            })
            .cloned()
            .collect()
    }

    /// Items whose parent resolves to neither a folder nor a virtual folder
    pub fn orphans(&self) -> Vec<Arc<Item>> {
        self.items
            .values()
            .filter(|item| match item.parent.as_deref() {
                None => true,
                Some(parent) if is_virtual_id(parent) => false,
                Some(parent) => !self.items.get(parent).is_some_and(|p| p.is_folder()),
            })
            .cloned()
            .collect()
    }
}
