//! Property-based tests for connection id allocation.

use std::collections::BTreeSet;

use fastsync_core::{ConnId, IdAllocator, RESERVED_ID};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: allocate always returns the lowest id not currently held,
    /// never the reserved id, and never an id that is already live
    #[test]
    fn prop_allocate_returns_lowest_free(
        ops in prop::collection::vec(prop::option::of(any::<prop::sample::Index>()), 1..128)
    ) {
        let mut ids = IdAllocator::new();
        let mut live: BTreeSet<ConnId> = BTreeSet::new();

        for op in ops {
            match op {
                // Release a random live id
                Some(index) if !live.is_empty() => {
                    let id = *live.iter().nth(index.index(live.len())).unwrap();
                    prop_assert!(ids.release(id));
                    live.remove(&id);
                },
                _ => {
                    let expected = (1..).find(|id| !live.contains(id)).unwrap();
                    let id = ids.allocate();
                    prop_assert_ne!(id, RESERVED_ID);
                    prop_assert_eq!(id, expected);
                    live.insert(id);
                },
            }

            prop_assert_eq!(ids.allocated_count(), live.len());
        }
    }

    /// Property: capacity only grows when every slot is in use
    #[test]
    fn prop_capacity_tracks_high_water_mark(churn in 1usize..64) {
        let mut ids = IdAllocator::new();
        let mut high_water = 0;

        for round in 0..churn {
            let held: Vec<_> = (0..=(round % 7)).map(|_| ids.allocate()).collect();
            high_water = high_water.max(held.len());
            for id in held {
                ids.release(id);
            }
        }

        prop_assert_eq!(ids.capacity(), high_water + 1);
    }
}
