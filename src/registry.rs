//! Field descriptor registry.
//!
//! Two tiers, both unbounded and never evicted (cardinality is the number of
//! distinct accessors in the program):
//! - canonical: accessor identity → descriptor as declared
//! - specialized: (entity type, identity) → descriptor rebound to an entity
//!   that inherits the field
//!
//! The registry is an explicit object. Build one at startup and lend it to
//! every query.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::descriptor::FieldDescriptor;
use crate::error::CriteriaResult;
use crate::field::{Accessor, AccessorId};
use crate::schema::SchemaProvider;

/// Thread-safe, process-lifetime descriptor cache.
pub struct FieldRegistry {
    provider: Box<dyn SchemaProvider>,
    canonical: DashMap<AccessorId, FieldDescriptor>,
    specialized: DashMap<(String, AccessorId), FieldDescriptor>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Builder-scoped short-circuit in front of the registry.
#[derive(Debug, Default, Clone)]
pub struct LocalCache {
    entries: HashMap<(String, AccessorId), FieldDescriptor>,
}

impl LocalCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FieldRegistry {
    pub fn new(provider: impl SchemaProvider + 'static) -> Self {
        Self {
            provider: Box::new(provider),
            canonical: DashMap::new(),
            specialized: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Canonical descriptor for an identity, created on first use.
    ///
    /// Two threads missing at once may both build a descriptor; only the
    /// first insert is kept and both callers observe it.
    pub fn resolve(&self, id: &AccessorId) -> CriteriaResult<FieldDescriptor> {
        if let Some(found) = self.canonical.get(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found.value().clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let info = self.provider.field_info(&id.declaring_type, &id.method)?;
        let built = FieldDescriptor::from_info(id, info);
        tracing::debug!("Resolved accessor {} -> {}", id, built.field_name);

        Ok(Self::insert_once(&self.canonical, id.clone(), built))
    }

    /// Descriptor for `id` as used against `entity_type`.
    pub fn compose(&self, id: &AccessorId, entity_type: &str) -> CriteriaResult<FieldDescriptor> {
        let canonical = self.resolve(id)?;
        if canonical.owner == entity_type {
            return Ok(canonical);
        }

        let key = (entity_type.to_string(), id.clone());
        if let Some(found) = self.specialized.get(&key) {
            return Ok(found.value().clone());
        }

        let info = self
            .provider
            .specialize(entity_type, &canonical.owner, &id.method);
        let built = canonical.specialized(entity_type, info);
        tracing::debug!(
            "Specialized {} for {} as {}",
            id,
            entity_type,
            built.field_type
        );

        Ok(Self::insert_once(&self.specialized, key, built))
    }

    /// Public entry point: identify, consult the builder cache, then the
    /// registry. Always hands back an owned copy.
    pub fn get_or_init<A: Accessor + ?Sized>(
        &self,
        accessor: &A,
        local: &mut LocalCache,
    ) -> CriteriaResult<FieldDescriptor> {
        let id = accessor.identify()?;
        let key = (accessor.entity().to_string(), id);
        if let Some(found) = local.entries.get(&key) {
            return Ok(found.clone());
        }

        let descriptor = self.compose(&key.1, &key.0)?;
        local.entries.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    fn insert_once<K>(
        map: &DashMap<K, FieldDescriptor>,
        key: K,
        built: FieldDescriptor,
    ) -> FieldDescriptor
    where
        K: std::hash::Hash + Eq,
    {
        match map.entry(key) {
            Entry::Occupied(existing) => {
                tracing::trace!("Discarded concurrent construction of {}", built.field_name);
                existing.get().clone()
            }
            Entry::Vacant(slot) => slot.insert(built).value().clone(),
        }
    }

    /// Number of canonical descriptors.
    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            entries: self.canonical.len(),
            specialized: self.specialized.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub entries: usize,
    pub specialized: usize,
    pub hits: u64,
    pub misses: u64,
}

impl RegistryStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CriteriaError;
    use crate::field::{DynField, Field};
    use crate::schema::Schema;

    struct Person;

    const NAME: Field<Person, String> = Field::new("Person", "name", "String");
    const ID: Field<Person, i64> = Field::inherited("Person", "BaseEntity", "id", "i64");

    fn registry() -> FieldRegistry {
        let mut schema = Schema::new();
        schema
            .add_field("Person", "name", "name", "String", None, None)
            .add_field("BaseEntity", "id", "id", "ID", Some("ID"), None)
            .set_parent("Person", "BaseEntity")
            .set_generic("Person", "id", "i64");
        FieldRegistry::new(schema)
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let reg = registry();
        let id = NAME.identify().unwrap();
        let a = reg.resolve(&id).unwrap();
        let b = reg.resolve(&id).unwrap();
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);

        let stats = reg.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn test_clone_isolation() {
        let reg = registry();
        let mut local = LocalCache::default();
        let mut first = reg.get_or_init(&NAME, &mut local).unwrap();
        first.set_alias("c9");

        let second = reg.get_or_init(&NAME, &mut local).unwrap();
        assert!(second.has_no_alias());
        assert!(reg.resolve(&NAME.identify().unwrap()).unwrap().has_no_alias());
        assert_eq!(local.len(), 1);
    }

    #[test]
    fn test_compose_specializes_inherited_field() {
        let reg = registry();
        let mut local = LocalCache::default();
        let d = reg.get_or_init(&ID, &mut local).unwrap();
        assert_eq!(d.owner, "Person");
        assert_eq!(d.field_type, "i64");
        assert_eq!(d.generic_type.as_deref(), Some("i64"));

        let canonical = reg.resolve(&ID.identify().unwrap()).unwrap();
        assert_eq!(canonical.owner, "BaseEntity");
        assert_eq!(canonical.field_type, "ID");
        assert_eq!(reg.stats().specialized, 1);
    }

    #[test]
    fn test_compose_dyn_field_through_parent() {
        let reg = registry();
        let mut local = LocalCache::default();
        let d = reg.get_or_init(&DynField::new("Person", "id"), &mut local).unwrap();
        assert_eq!(d.owner, "Person");
        assert_eq!(d.field_type, "i64");
    }

    #[test]
    fn test_unknown_accessor_fails() {
        let reg = registry();
        let mut local = LocalCache::default();
        let err = reg
            .get_or_init(&DynField::new("Person", "nickname"), &mut local)
            .unwrap_err();
        assert!(matches!(err, CriteriaError::FieldNotFound { .. }));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_concurrent_first_use_keeps_one_entry() {
        let reg = registry();
        let id = NAME.identify().unwrap();
        let results: Vec<FieldDescriptor> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| reg.resolve(&id).unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(reg.len(), 1);
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }
}
