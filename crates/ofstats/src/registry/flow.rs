//! Content-addressed flow identity registry.

use crate::error::{Result, StatsError};
use ofstats_types::{FlowId, FlowMatch, FlowStats, TableId};
use std::collections::HashMap;
use std::fmt;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Semantic identity of a flow entry.
///
/// Counters are not part of the key: two reports of the same entry with
/// different counters have equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowRegistryKey {
    pub table_id: TableId,
    pub priority: u16,
    pub cookie: u64,
    pub flow_match: FlowMatch,
}

impl FlowRegistryKey {
    /// Creates a key.
    pub fn new(table_id: TableId, priority: u16, cookie: u64, flow_match: FlowMatch) -> Self {
        Self {
            table_id,
            priority,
            cookie,
            flow_match,
        }
    }

    /// Extracts the semantic key of a reported flow.
    pub fn from_stats(stats: &FlowStats) -> Self {
        Self::new(
            stats.table_id,
            stats.priority,
            stats.cookie,
            stats.flow_match.clone(),
        )
    }

    /// Unambiguous encoding hashed into the flow id.
    ///
    /// Match fields and values are length-prefixed, so separators inside a
    /// value cannot make two distinct keys encode alike.
    fn canonical(&self) -> String {
        let mut out = format!(
            "table={};priority={};cookie={:#x};match=",
            self.table_id, self.priority, self.cookie
        );
        for (field, value) in self.flow_match.iter() {
            out.push_str(&format!("{}:{}{}:{}", field.len(), field, value.len(), value));
        }
        out
    }
}

impl fmt::Display for FlowRegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table[{}] priority {} match {}",
            self.table_id, self.priority, self.flow_match
        )
    }
}

/// Derives the id for a key at the given probe depth.
fn derive_id(key: &FlowRegistryKey, probe: u64) -> FlowId {
    let hash = xxh3_64_with_seed(key.canonical().as_bytes(), probe);
    FlowId::new(format!("#UF$TABLE*{}-{:016x}", key.table_id, hash))
}

/// Per-device mapping from flow semantic key to assigned flow id.
///
/// Ids are derived from a content hash of the key rather than allocated
/// sequentially, so `remove` followed by `resolve` yields the same id again
/// unless another key has claimed it in the meantime. A hash collision
/// between distinct keys is resolved by re-hashing with an increasing seed.
///
/// # Example
///
/// ```
/// use ofstats::{FlowRegistry, FlowRegistryKey};
/// use ofstats_types::{FlowMatch, TableId};
///
/// let mut registry = FlowRegistry::new();
/// let key = FlowRegistryKey::new(
///     TableId::new(0).unwrap(),
///     100,
///     0,
///     FlowMatch::new().with("ipv4-destination", "10.0.0.1/32"),
/// );
///
/// let first = registry.resolve(&key);
/// assert_eq!(registry.resolve(&key), first);
/// assert!(first.as_str().starts_with("#UF$TABLE*0-"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlowRegistry {
    ids: HashMap<FlowRegistryKey, FlowId>,
    owners: HashMap<FlowId, FlowRegistryKey>,
}

impl FlowRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for a key, minting and recording one if absent.
    pub fn resolve(&mut self, key: &FlowRegistryKey) -> FlowId {
        if let Some(id) = self.ids.get(key) {
            return id.clone();
        }

        let mut probe = 0u64;
        let id = loop {
            let candidate = derive_id(key, probe);
            if !self.owners.contains_key(&candidate) {
                break candidate;
            }
            log::debug!(
                "Flow id {} already owned, re-deriving for {} (probe {})",
                candidate,
                key,
                probe + 1
            );
            probe += 1;
        };

        self.ids.insert(key.clone(), id.clone());
        self.owners.insert(id.clone(), key.clone());
        id
    }

    /// Returns the id for a key without minting one.
    ///
    /// **This never creates entries.**
    pub fn lookup(&self, key: &FlowRegistryKey) -> Option<FlowId> {
        self.ids.get(key).cloned()
    }

    /// Returns the id for a key, failing if it was never resolved.
    pub fn retrieve_id(&self, key: &FlowRegistryKey) -> Result<FlowId> {
        self.lookup(key).ok_or_else(|| StatsError::FlowNotRegistered {
            key: key.to_string(),
        })
    }

    /// Deletes the mapping for a key.
    ///
    /// Returns the id that was assigned, if any.
    pub fn remove(&mut self, key: &FlowRegistryKey) -> Option<FlowId> {
        let id = self.ids.remove(key)?;
        self.owners.remove(&id);
        Some(id)
    }

    /// Returns the number of registered flows.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no flows are registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns an iterator over registered keys.
    pub fn keys(&self) -> impl Iterator<Item = &FlowRegistryKey> {
        self.ids.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    fn key(table: u8, priority: u16, dst: &str) -> FlowRegistryKey {
        FlowRegistryKey::new(
            TableId::new(table).unwrap(),
            priority,
            0,
            FlowMatch::new().with("ipv4-destination", dst),
        )
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut registry = FlowRegistry::new();
        let k = key(0, 100, "10.0.0.1/32");

        let first = registry.resolve(&k);
        let second = registry.resolve(&k);

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_counters_do_not_affect_identity() {
        let mut registry = FlowRegistry::new();
        let table = TableId::new(0).unwrap();
        let flow_match = FlowMatch::new().with("ipv4-destination", "10.0.0.1/32");

        let a = FlowStats::new(table, 100, flow_match.clone()).with_counters(5, 500);
        let b = FlowStats::new(table, 100, flow_match).with_counters(12, 1200);

        assert_eq!(
            registry.resolve(&FlowRegistryKey::from_stats(&a)),
            registry.resolve(&FlowRegistryKey::from_stats(&b))
        );
    }

    #[test]
    fn test_distinct_keys_get_distinct_ids() {
        let mut registry = FlowRegistry::new();

        let a = registry.resolve(&key(0, 100, "10.0.0.1/32"));
        let b = registry.resolve(&key(0, 200, "10.0.0.1/32"));
        let c = registry.resolve(&key(1, 100, "10.0.0.1/32"));

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(c.as_str().starts_with("#UF$TABLE*1-"));
    }

    #[test]
    fn test_remove_then_resolve_rederives_same_id() {
        let mut registry = FlowRegistry::new();
        let k = key(0, 100, "10.0.0.1/32");

        let first = registry.resolve(&k);
        assert_eq!(registry.remove(&k), Some(first.clone()));
        assert!(registry.lookup(&k).is_none());
        assert!(registry.remove(&k).is_none());

        assert_eq!(registry.resolve(&k), first);
    }

    #[test]
    fn test_lookup_never_creates() {
        let registry = FlowRegistry::new();
        let k = key(0, 100, "10.0.0.1/32");

        assert!(registry.lookup(&k).is_none());
        assert!(matches!(
            registry.retrieve_id(&k),
            Err(StatsError::FlowNotRegistered { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_separators_in_match_values_stay_distinct() {
        let table = TableId::new(0).unwrap();
        let joined = FlowRegistryKey::new(table, 10, 0, FlowMatch::new().with("a", "1,b=2"));
        let split = FlowRegistryKey::new(
            table,
            10,
            0,
            FlowMatch::new().with("a", "1").with("b", "2"),
        );
        assert_eq!(joined.flow_match.to_string(), split.flow_match.to_string());

        assert_ne!(joined.canonical(), split.canonical());
        assert_ne!(derive_id(&joined, 0), derive_id(&split, 0));

        // Each key gets its unprobed id whichever is resolved first.
        let mut forward = FlowRegistry::new();
        let mut reverse = FlowRegistry::new();
        let joined_id = forward.resolve(&joined);
        let split_id = forward.resolve(&split);
        assert_eq!(reverse.resolve(&split), split_id);
        assert_eq!(reverse.resolve(&joined), joined_id);
        assert_eq!(joined_id, derive_id(&joined, 0));
    }

    #[test]
    fn test_collision_is_reprobed() {
        let mut registry = FlowRegistry::new();
        let victim = key(0, 100, "10.0.0.1/32");
        let squatter = key(0, 300, "10.0.0.9/32");

        // Claim the victim's natural id for an unrelated key.
        let natural = derive_id(&victim, 0);
        registry.ids.insert(squatter.clone(), natural.clone());
        registry.owners.insert(natural.clone(), squatter.clone());

        let assigned = registry.resolve(&victim);
        assert_ne!(assigned, natural);
        assert_eq!(assigned, derive_id(&victim, 1));
        assert_eq!(registry.lookup(&squatter), Some(natural));
    }
}
