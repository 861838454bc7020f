use indexmap::IndexMap;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use thiserror::Error;

use crate::member::MemberSnapshot;
use crate::member::UserId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("refusing to cache a member with an empty user id")]
    EmptyUserId,
}

/// Online members keyed by user id, in first-seen order.
///
/// The keyset is exactly the set of members currently considered online.
/// Writers replace whole records under the write lock, so a reader never sees
/// a half-updated entry. A poisoned lock is recovered rather than propagated:
/// every critical section leaves the map consistent.
#[derive(Debug, Default)]
pub struct PresenceCache {
    entries: RwLock<IndexMap<UserId, MemberSnapshot>>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry for `snapshot.id`. An overwrite keeps
    /// the member's original position.
    pub fn upsert(&self, snapshot: MemberSnapshot) -> Result<(), CacheError> {
        if snapshot.id.is_empty() {
            return Err(CacheError::EmptyUserId);
        }
        self.write().insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    /// Returns whether an entry was present.
    pub fn remove(&self, id: &UserId) -> bool {
        self.write().shift_remove(id).is_some()
    }

    pub fn get(&self, id: &UserId) -> Option<MemberSnapshot> {
        self.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Up to `limit` members in iteration order. Best-effort point-in-time
    /// view; order may shift between calls while ingestion runs.
    pub fn snapshot(&self, limit: usize) -> Vec<MemberSnapshot> {
        self.view(limit).1
    }

    /// Total member count together with up to `limit` members, read under a
    /// single lock acquisition so the two agree.
    pub fn view(&self, limit: usize) -> (usize, Vec<MemberSnapshot>) {
        let guard = self.read();
        let members = guard.values().take(limit).cloned().collect();
        (guard.len(), members)
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<UserId, MemberSnapshot>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<UserId, MemberSnapshot>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
