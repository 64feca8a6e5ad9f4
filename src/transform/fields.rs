//! Date field lookup sets and their cache
//!
//! Building a `FieldSet` is cheap, but hosts tend to call the transformer
//! with the same handful of configurations on every response, so sets are
//! shared through a `FieldSetCache` keyed by the configured name list.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, trace};

static GLOBAL_CACHE: Lazy<FieldSetCache> = Lazy::new(FieldSetCache::new);

/// The set of keys whose values are treated as dates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    names: HashSet<String>,
}

impl FieldSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSet {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Shared field sets keyed by the exact name list they were built from.
///
/// Two callers racing on the same key may both run their factory; whichever
/// insert lands first is kept and both get that set back.
#[derive(Debug, Default)]
pub struct FieldSetCache {
    sets: DashMap<Vec<String>, Arc<FieldSet>>,
}

impl FieldSetCache {
    pub fn new() -> Self {
        FieldSetCache::default()
    }

    /// The process-wide cache used by `convert_date_fields` and `ok`
    pub fn global() -> &'static FieldSetCache {
        &GLOBAL_CACHE
    }

    /// Return the cached set for `key`, building it with `factory` on a miss
    pub fn get_or_build<F>(&self, key: &[String], factory: F) -> Arc<FieldSet>
    where
        F: FnOnce() -> FieldSet,
    {
        if let Some(set) = self.sets.get(key) {
            trace!(fields = ?key, "field set cache hit");
            return Arc::clone(set.value());
        }

        trace!(fields = ?key, "field set cache miss");
        let entry = self
            .sets
            .entry(key.to_vec())
            .or_insert_with(|| Arc::new(factory()));
        Arc::clone(entry.value())
    }

    /// Field set for a list of names
    pub fn field_set(&self, names: &[String]) -> Arc<FieldSet> {
        self.get_or_build(names, || FieldSet::new(names.iter().cloned()))
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Drop every cached set. Sets already handed out stay valid.
    pub fn clear(&self) {
        self.sets.clear();
    }
}

/// Clear the process-wide field set cache
pub fn clear_field_set_cache() {
    let cache = FieldSetCache::global();
    debug!(entries = cache.len(), "clearing field set cache");
    cache.clear();
}
