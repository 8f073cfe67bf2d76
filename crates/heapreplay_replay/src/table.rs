//! Address translation from original to live addresses.

use ahash::AHashMap;
use heapreplay_core::{LiveAddress, OriginalAddress};

/// Maps each outstanding original address to the live allocation made for it.
///
/// Holds at most one entry per original address: the most recent allocation
/// that has not yet been freed. The table is owned by a single replay pass
/// and is not iterable.
#[derive(Debug, Default)]
pub struct AddressTable {
    entries: AHashMap<OriginalAddress, LiveAddress>,
}

impl AddressTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table sized for `capacity` outstanding entries
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: AHashMap::with_capacity(capacity),
        }
    }

    /// Map `original` to `live`, replacing any existing mapping.
    ///
    /// Returns the mapping that was replaced, if any.
    pub fn record_allocation(
        &mut self,
        original: OriginalAddress,
        live: LiveAddress,
    ) -> Option<LiveAddress> {
        self.entries.insert(original, live)
    }

    /// Look up and remove the mapping for `original`.
    ///
    /// `None` means no allocation is outstanding for that address.
    pub fn resolve_and_clear(&mut self, original: OriginalAddress) -> Option<LiveAddress> {
        self.entries.remove(&original)
    }

    /// Number of outstanding mappings
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no mappings are outstanding
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty the table, yielding the live addresses still outstanding
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = LiveAddress> + '_ {
        self.entries.drain().map(|(_, live)| live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::ptr::NonNull;

    /// Live addresses for tests; never dereferenced
    fn live(n: usize) -> LiveAddress {
        let ptr = NonNull::new((n + 1) as *mut u8).unwrap();
        LiveAddress::new(ptr, n as u64)
    }

    fn orig(raw: u64) -> OriginalAddress {
        OriginalAddress::from_raw(raw)
    }

    #[test]
    fn test_table_new() {
        let table = AddressTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_record_then_resolve() {
        let mut table = AddressTable::new();
        assert_eq!(table.record_allocation(orig(0xAAA), live(1)), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve_and_clear(orig(0xAAA)), Some(live(1)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_resolve_twice_is_not_found() {
        let mut table = AddressTable::new();
        table.record_allocation(orig(0xAAA), live(1));
        assert!(table.resolve_and_clear(orig(0xAAA)).is_some());
        assert_eq!(table.resolve_and_clear(orig(0xAAA)), None);
    }

    #[test]
    fn test_resolve_unknown() {
        let mut table = AddressTable::with_capacity(4);
        assert_eq!(table.resolve_and_clear(orig(0xBBB)), None);
    }

    #[test]
    fn test_record_overwrites() {
        let mut table = AddressTable::new();
        table.record_allocation(orig(0xAAA), live(1));
        assert_eq!(table.record_allocation(orig(0xAAA), live(2)), Some(live(1)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve_and_clear(orig(0xAAA)), Some(live(2)));
    }

    #[test]
    fn test_reuse_after_clear() {
        let mut table = AddressTable::new();
        table.record_allocation(orig(0xAAA), live(1));
        table.resolve_and_clear(orig(0xAAA));
        assert_eq!(table.record_allocation(orig(0xAAA), live(3)), None);
        assert_eq!(table.resolve_and_clear(orig(0xAAA)), Some(live(3)));
    }

    #[test]
    fn test_drain() {
        let mut table = AddressTable::new();
        table.record_allocation(orig(1), live(1));
        table.record_allocation(orig(2), live(2));
        let drained: HashSet<usize> = table.drain().map(|l| l.addr()).collect();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_original_address(ops in proptest::collection::vec((any::<bool>(), 0u64..8), 0..200)) {
            let mut table = AddressTable::new();
            let mut outstanding: HashSet<u64> = HashSet::new();

            for (i, (is_alloc, raw)) in ops.into_iter().enumerate() {
                if is_alloc {
                    table.record_allocation(orig(raw), live(i));
                    outstanding.insert(raw);
                } else {
                    let resolved = table.resolve_and_clear(orig(raw));
                    prop_assert_eq!(resolved.is_some(), outstanding.remove(&raw));
                }
                prop_assert_eq!(table.len(), outstanding.len());
            }
        }
    }
}
