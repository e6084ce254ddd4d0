use std::collections::{BTreeSet, HashMap};
use std::thread::scope;

use lmap::{Error, LockMap};

proptest::proptest! {
    #[test]
    fn lockmap_get_consistent(values: BTreeSet<u8>, key: u8) {
        let hash_map: HashMap<u8, u8> = values.iter().cloned().map(|v| (v, v)).collect();
        let lock_map: LockMap<u8, u8> = values.iter().cloned().map(|v| (v, v)).collect();

        assert_eq!(hash_map.get(&key).cloned(), lock_map.get(&key));
        assert_eq!(hash_map.contains_key(&key), lock_map.contains_key(&key));
        assert_eq!(hash_map.len(), lock_map.len());
    }

    #[test]
    fn lockmap_remove_consistent(values in proptest::collection::btree_set(proptest::arbitrary::any::<u8>(), 1..64), indices: Vec<proptest::sample::Index>) {
        let mut hash_map: HashMap<String, u8> =
            values.iter().cloned().map(|v| (v.to_string(), v)).collect();
        let lock_map: LockMap<String, u8> =
            values.iter().cloned().map(|v| (v.to_string(), v)).collect();

        for index in indices {
            let index = index.index(values.len());
            let key = values.iter().nth(index).unwrap().to_string();

            assert_eq!(hash_map.remove(&key), lock_map.remove(&key));
            assert_eq!(hash_map.get(&key), None);
            assert_eq!(lock_map.get(&key), None);
            assert_eq!(hash_map.len(), lock_map.len());
        }
    }

    #[test]
    fn lockmap_insert_sequence_consistent(pairs: Vec<(u8, u8)>) {
        let mut hash_map: HashMap<u8, u8> = HashMap::new();
        let lock_map: LockMap<u8, u8> = LockMap::new();

        for (k, v) in pairs {
            assert_eq!(hash_map.insert(k, v), lock_map.insert(k, v));
        }

        let mut expected: Vec<(u8, u8)> = hash_map.into_iter().collect();
        let mut found: Vec<(u8, u8)> =
            lock_map.entries().into_iter().map(|e| (e.key, e.value)).collect();
        expected.sort_unstable();
        found.sort_unstable();
        assert_eq!(expected, found);
    }

    #[test]
    fn lockmap_remove_if_partitions(values: BTreeSet<u8>, threshold: u8) {
        let lock_map: LockMap<u8, u8> = values.iter().cloned().map(|v| (v, v)).collect();

        let removed = lock_map.remove_if(|_k, v| *v < threshold);

        let expected_removed = values.iter().filter(|v| **v < threshold).count();
        assert_eq!(removed, expected_removed);
        assert_eq!(lock_map.len(), values.len() - expected_removed);
        assert!(lock_map.all_match(|_k, v| *v >= threshold));
    }
}

#[test]
fn lockmap_end_to_end_example() {
    let map = LockMap::from_keys_values(vec!["a", "b", "c"], vec![1i64, 2, 3]).unwrap();

    assert_eq!(map.sum_of(|_k, v| *v), 6);
    assert_eq!(map.max_of(|_k, v| *v), Some(3));
    assert_eq!(map.min_of(|_k, v| *v), Some(1));

    map.remove_if(|_k, v| *v < 2);

    let keys: BTreeSet<&str> = map.keys().into_iter().collect();
    assert_eq!(keys, BTreeSet::from(["b", "c"]));
}

#[test]
fn lockmap_from_keys_values_rejects_mismatch() {
    let r: Result<LockMap<u8, u8>, _> = LockMap::from_keys_values(vec![1, 2, 3], vec![1]);
    assert_eq!(r.unwrap_err(), Error::LengthMismatch { keys: 3, values: 1 });
}

// A key inserted during the unlocked window of a bulk operation survives
// the apply phase: only snapshot-time keys are deleted.
#[test]
fn lockmap_clear_spares_keys_missed_by_snapshot() {
    let map: LockMap<&str, i64> = LockMap::new();
    map.insert("old", 1);

    map.clear_and(|_k, _v| {
        map.insert("new", 2);
    });

    assert!(!map.contains_key("old"));
    assert_eq!(map.get("new"), Some(2));
}

#[test]
#[cfg_attr(miri, ignore)]
fn lockmap_stress_mixed_operations() {
    const WRITERS: usize = 4;
    const READERS: usize = 4;
    const KEYS: usize = 512;

    let map: LockMap<usize, usize> = LockMap::new();

    scope(|scope| {
        let map_ref = &map;

        let writers: Vec<_> = (0..WRITERS)
            .map(|t| {
                scope.spawn(move || {
                    for i in 0..KEYS {
                        map_ref.insert(i, t);
                    }
                    map_ref.remove_if(|k, _v| k % (t + 2) == 0);
                })
            })
            .collect();

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                scope.spawn(move || {
                    for i in 0..KEYS {
                        let _ = map_ref.get(&i);
                        let _ = map_ref.len();
                    }
                    map_ref.for_each_safe(|k, _v| {
                        let _ = map_ref.contains_key(k);
                    });
                })
            })
            .collect();

        for h in writers {
            h.join().unwrap();
        }
        for h in readers {
            h.join().unwrap();
        }
    });

    // Every surviving value was written by some writer.
    assert!(map.all_match(|_k, v| *v < WRITERS));
}

#[cfg(feature = "serde")]
#[test]
fn lockmap_serde_round_trip() {
    let map: LockMap<String, u64> = (0..16u64).map(|i| (i.to_string(), i)).collect();

    let json = serde_json::to_string(&map).unwrap();
    let back: LockMap<String, u64> = serde_json::from_str(&json).unwrap();

    assert_eq!(back.len(), map.len());
    assert!(map.all_match(|k, v| back.get(k) == Some(*v)));
}
