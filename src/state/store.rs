use std::collections::HashSet;
use std::sync::Arc;

use super::data::{AssetId, AssetRef, MaterializedAsset, SyncState};

/// The AssetStore holds the authoritative library order and the list of
/// assets whose thumbnails have loaded.
///
/// It performs no I/O and does not infer additions or removals on its own;
/// the sync engine is its only writer. Both sequences live behind `Arc` so a
/// [`StoreView`] handed to readers is an immutable snapshot: writes after
/// publication copy on write instead of mutating what readers hold.
#[derive(Debug, Clone, Default)]
pub struct AssetStore {
    snapshot: Arc<Vec<AssetRef>>,
    materialized: Arc<Vec<MaterializedAsset>>,
    /// Identity index over `snapshot` for membership checks
    present: HashSet<AssetId>,
}

impl AssetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Library assets, newest first
    pub fn snapshot(&self) -> &[AssetRef] {
        &self.snapshot
    }

    /// Assets with a loaded thumbnail, in completion order
    pub fn materialized(&self) -> &[MaterializedAsset] {
        &self.materialized
    }

    /// Whether an asset is part of the current snapshot
    pub fn contains(&self, id: &AssetId) -> bool {
        self.present.contains(id)
    }

    /// Whether an asset already has a list entry
    pub fn is_materialized(&self, id: &AssetId) -> bool {
        self.materialized.iter().any(|m| &m.asset.id == id)
    }

    /// Swap in a new library order.
    ///
    /// Callers must reconcile `materialized` around this call; the store
    /// only keeps its own index in step.
    pub fn replace_snapshot(&mut self, new_order: Vec<AssetRef>) {
        self.present = new_order.iter().map(|asset| asset.id.clone()).collect();
        self.snapshot = Arc::new(new_order);
    }

    /// Add a list entry. Returns false (and changes nothing) when an entry
    /// for the same asset already exists.
    pub fn append_materialized(&mut self, item: MaterializedAsset) -> bool {
        if self.is_materialized(&item.asset.id) {
            return false;
        }
        Arc::make_mut(&mut self.materialized).push(item);
        true
    }

    /// Remove the list entry for an asset. Returns whether one was removed.
    pub fn remove_materialized(&mut self, id: &AssetId) -> bool {
        let Some(position) = self.materialized.iter().position(|m| &m.asset.id == id) else {
            return false;
        };
        Arc::make_mut(&mut self.materialized).remove(position);
        true
    }

    /// Resolve a list position (as tapped in the UI) to its library asset
    pub fn asset_at(&self, index: usize) -> Option<&AssetRef> {
        self.materialized.get(index).map(|m| &m.asset)
    }

    /// Every list entry refers to an asset in the snapshot
    pub fn is_consistent(&self) -> bool {
        self.materialized
            .iter()
            .all(|m| self.present.contains(&m.asset.id))
    }

    /// Cheap immutable view for readers
    pub fn view(&self, sync_state: SyncState) -> StoreView {
        StoreView {
            snapshot: Arc::clone(&self.snapshot),
            materialized: Arc::clone(&self.materialized),
            sync_state,
        }
    }
}

/// A consistent, read-only picture of the store as published to the UI
#[derive(Debug, Clone, Default)]
pub struct StoreView {
    pub snapshot: Arc<Vec<AssetRef>>,
    pub materialized: Arc<Vec<MaterializedAsset>>,
    pub sync_state: SyncState,
}

impl StoreView {
    pub fn snapshot_ids(&self) -> Vec<&str> {
        self.snapshot.iter().map(|a| a.id.as_str()).collect()
    }

    pub fn materialized_ids(&self) -> Vec<&str> {
        self.materialized.iter().map(|m| m.asset.id.as_str()).collect()
    }

    pub fn asset_at(&self, index: usize) -> Option<&AssetRef> {
        self.materialized.get(index).map(|m| &m.asset)
    }

    pub fn is_consistent(&self) -> bool {
        let present: HashSet<&AssetId> = self.snapshot.iter().map(|a| &a.id).collect();
        self.materialized
            .iter()
            .all(|m| present.contains(&m.asset.id))
    }
}

/// Membership change between two library orders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibraryDiff {
    /// In the new order but not the old, in new-order
    pub added: Vec<AssetRef>,
    /// In the old order but not the new, in old-order
    pub removed: Vec<AssetRef>,
}

impl LibraryDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Set difference of two library orders by asset identity.
///
/// Position changes are not reported; an asset that moved is neither
/// added nor removed.
pub fn diff(old: &[AssetRef], new: &[AssetRef]) -> LibraryDiff {
    let old_ids: HashSet<&AssetId> = old.iter().map(|a| &a.id).collect();
    let new_ids: HashSet<&AssetId> = new.iter().map(|a| &a.id).collect();

    let added = new
        .iter()
        .filter(|a| !old_ids.contains(&a.id))
        .cloned()
        .collect();
    let removed = old
        .iter()
        .filter(|a| !new_ids.contains(&a.id))
        .cloned()
        .collect();

    LibraryDiff { added, removed }
}
