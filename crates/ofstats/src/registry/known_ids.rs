//! Set-membership registry for device-assigned ids (groups, meters).

use std::collections::BTreeSet;

/// Set of ids currently believed to exist on a device.
///
/// Used only to drive the delete sweep. Ids are kept sorted so that sweeps
/// queue their deletes in a stable order.
///
/// # Example
///
/// ```
/// use ofstats::KnownIdRegistry;
/// use ofstats_types::GroupId;
///
/// let mut groups: KnownIdRegistry<GroupId> = KnownIdRegistry::new();
/// groups.store(GroupId::new(1));
/// groups.store(GroupId::new(1));
/// assert_eq!(groups.len(), 1);
///
/// groups.remove(&GroupId::new(7)); // absent: no-op
/// assert!(groups.contains(&GroupId::new(1)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownIdRegistry<T> {
    known: BTreeSet<T>,
}

impl<T> KnownIdRegistry<T>
where
    T: Ord + Clone,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            known: BTreeSet::new(),
        }
    }

    /// Adds an id to the known set.
    ///
    /// Returns true if the id was not known before.
    pub fn store(&mut self, id: T) -> bool {
        self.known.insert(id)
    }

    /// Removes an id from the known set.
    ///
    /// Returns true if the id was known. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: &T) -> bool {
        self.known.remove(id)
    }

    /// Returns a snapshot of every id stored and not yet removed.
    pub fn all_known_ids(&self) -> BTreeSet<T> {
        self.known.clone()
    }

    /// Returns true if the id is known.
    pub fn contains(&self, id: &T) -> bool {
        self.known.contains(id)
    }

    /// Returns the number of known ids.
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Returns true if no ids are known.
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Forgets every id.
    pub fn clear(&mut self) {
        self.known.clear();
    }

    /// Returns an iterator over known ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.known.iter()
    }
}

impl<T> Default for KnownIdRegistry<T>
where
    T: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for KnownIdRegistry<T>
where
    T: Ord + Clone,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            known: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ofstats_types::{GroupId, MeterId};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_store_is_idempotent() {
        let mut registry: KnownIdRegistry<GroupId> = KnownIdRegistry::new();

        assert!(registry.store(GroupId::new(1)));
        assert!(!registry.store(GroupId::new(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry: KnownIdRegistry<MeterId> = KnownIdRegistry::new();
        registry.store(MeterId::new(3));

        assert!(!registry.remove(&MeterId::new(4)));
        assert!(registry.remove(&MeterId::new(3)));
        assert!(!registry.remove(&MeterId::new(3)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_all_known_ids_reflects_store_and_remove() {
        let mut registry: KnownIdRegistry<GroupId> =
            [1, 2, 3].into_iter().map(GroupId::new).collect();
        registry.remove(&GroupId::new(2));

        let known: Vec<u32> = registry.all_known_ids().iter().map(|g| g.as_u32()).collect();
        assert_eq!(known, vec![1, 3]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut registry: KnownIdRegistry<GroupId> = KnownIdRegistry::new();
        registry.store(GroupId::new(5));

        let snapshot = registry.all_known_ids();
        registry.clear();

        assert!(snapshot.contains(&GroupId::new(5)));
        assert!(registry.is_empty());
    }
}
