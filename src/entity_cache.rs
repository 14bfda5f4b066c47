//! # Entity Cache Module
//!
//! This module provides the in-memory cache of reference entities (tags,
//! correspondents and document types) owned by a [`PaperlessClient`].
//! Keyboards are rendered from these lists on every button press, so
//! refetching them each time would make the bot sluggish.
//!
//! [`PaperlessClient`]: crate::paperless::PaperlessClient

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::paperless_models::{Entity, EntityKind};

/// Read-through cache of entity lists keyed by kind
///
/// # Invalidation
///
/// Entries never expire on their own. A successful create for a kind must call
/// [`EntityCache::invalidate`] before returning, so the next read within the
/// same handler sees the new entity.
///
/// Every invalidation bumps the kind's generation. A fetch records the
/// generation before it starts and [`EntityCache::store`] refuses a list
/// fetched under an older one, so a slow read that raced a create cannot put
/// the pre-create list back.
///
/// # Inbox tag
///
/// The resolved inbox tag is memoized separately and survives invalidation of
/// the tag list: at most one inbox tag is active per process.
///
/// # Thread Safety
///
/// Uses `RwLock` internally; readers clone an `Arc` to the list and release
/// the lock immediately, so no guard is ever held across an `.await`.
#[derive(Debug, Default)]
pub struct EntityCache {
    lists: RwLock<Lists>,
    inbox_tag: RwLock<Option<Entity>>,
}

#[derive(Debug, Default)]
struct Lists {
    entries: HashMap<EntityKind, Arc<Vec<Entity>>>,
    generations: HashMap<EntityKind, u64>,
}

impl Lists {
    fn generation(&self, kind: EntityKind) -> u64 {
        self.generations.get(&kind).copied().unwrap_or_default()
    }
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached list for a kind, if present
    pub fn get(&self, kind: EntityKind) -> Option<Arc<Vec<Entity>>> {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        lists.entries.get(&kind).map(Arc::clone)
    }

    /// Current generation of a kind; take it before fetching
    pub fn generation(&self, kind: EntityKind) -> u64 {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        lists.generation(kind)
    }

    /// Store a list fetched under `generation`, sorted case-insensitively by name
    ///
    /// The sorted list is always returned to the caller; it is only cached when
    /// no invalidation happened since the fetch started.
    pub fn store(
        &self,
        kind: EntityKind,
        mut entities: Vec<Entity>,
        generation: u64,
    ) -> Arc<Vec<Entity>> {
        entities.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        let list = Arc::new(entities);

        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        if lists.generation(kind) != generation {
            debug!(kind = ?kind, "Discarding entity list fetched before an invalidation");
            return list;
        }
        debug!(kind = ?kind, count = list.len(), "Caching entity list");
        lists.entries.insert(kind, Arc::clone(&list));
        list
    }

    /// Drop the cached list for a kind and fence off fetches already in flight
    pub fn invalidate(&self, kind: EntityKind) {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        *lists.generations.entry(kind).or_default() += 1;
        if lists.entries.remove(&kind).is_some() {
            info!(kind = ?kind, "Invalidated entity cache");
        }
    }

    pub fn inbox_tag(&self) -> Option<Entity> {
        self.inbox_tag
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Memoize the resolved inbox tag
    ///
    /// The first resolution wins; later calls return the memoized tag.
    pub fn remember_inbox_tag(&self, tag: Entity) -> Entity {
        let mut slot = self.inbox_tag.write().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert(tag).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_sorts_by_name() {
        let cache = EntityCache::new();
        let list = cache.store(
            EntityKind::Tag,
            vec![
                Entity::new(3, "receipt"),
                Entity::new(1, "Bank"),
                Entity::new(2, "archive"),
            ],
            cache.generation(EntityKind::Tag),
        );

        let names: Vec<&str> = list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["archive", "Bank", "receipt"]);
        assert_eq!(cache.get(EntityKind::Tag).unwrap(), list);
        assert!(cache.get(EntityKind::Correspondent).is_none());
    }

    #[test]
    fn test_invalidate_only_touches_one_kind() {
        let cache = EntityCache::new();
        cache.store(EntityKind::Tag, vec![Entity::new(1, "a")], 0);
        cache.store(EntityKind::DocumentType, vec![Entity::new(1, "Bill")], 0);

        cache.invalidate(EntityKind::Tag);

        assert!(cache.get(EntityKind::Tag).is_none());
        assert!(cache.get(EntityKind::DocumentType).is_some());
        assert_eq!(cache.generation(EntityKind::Tag), 1);
        assert_eq!(cache.generation(EntityKind::DocumentType), 0);
    }

    #[test]
    fn test_list_fetched_before_invalidation_is_not_cached() {
        let cache = EntityCache::new();
        let started = cache.generation(EntityKind::Tag);

        // A create lands while the fetch is still in flight
        cache.invalidate(EntityKind::Tag);
        let stale = cache.store(EntityKind::Tag, vec![Entity::new(1, "Bank")], started);

        assert_eq!(stale.len(), 1);
        assert!(cache.get(EntityKind::Tag).is_none());

        let fresh = cache.store(
            EntityKind::Tag,
            vec![Entity::new(1, "Bank"), Entity::new(2, "Receipts")],
            cache.generation(EntityKind::Tag),
        );
        assert_eq!(cache.get(EntityKind::Tag), Some(fresh));
    }

    #[test]
    fn test_inbox_tag_first_resolution_wins() {
        let cache = EntityCache::new();
        assert!(cache.inbox_tag().is_none());

        let first = cache.remember_inbox_tag(Entity::new(7, "Inbox"));
        let second = cache.remember_inbox_tag(Entity::new(8, "Other"));

        assert_eq!(first.id, 7);
        assert_eq!(second.id, 7);

        cache.invalidate(EntityKind::Tag);
        assert_eq!(cache.inbox_tag().map(|t| t.id), Some(7));
    }
}
