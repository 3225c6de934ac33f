//! A map type implemented as a list of key/value pairs.
//!
//! Symbol tables, the function table, and the assembly table of a message are all small
//! (a handful to a few dozen entries), which is exactly where a flat vector beats the tree and hash maps.

use alloc::vec::Vec;
use alloc::borrow::Borrow;

#[cfg(feature = "serde")]
use serde::{Serialize, Deserialize};

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct Entry<K, V> {
    key: K,
    value: V,
}

/// A map type implemented as a list of key/value pairs.
///
/// If `SORTED` is `true`, entries are kept in ascending key order and lookups are a binary search.
/// If `SORTED` is `false`, entries are kept in insertion order and lookups are a linear scan.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VecMap<K: Ord, V, const SORTED: bool> {
    entries: Vec<Entry<K, V>>,
}
impl<K: Ord, V, const SORTED: bool> VecMap<K, V, SORTED> {
    /// Creates a new, empty map.
    pub fn new() -> Self {
        Self { entries: vec![] }
    }
    fn position<Q: ?Sized + Ord>(&self, key: &Q) -> Result<usize, usize> where K: Borrow<Q> {
        match SORTED {
            true => self.entries.binary_search_by(|x| x.key.borrow().cmp(key)),
            false => self.entries.iter().position(|x| x.key.borrow() == key).ok_or(self.entries.len()),
        }
    }
    /// Gets a reference to the value stored under `key`, if any.
    pub fn get<Q: ?Sized + Ord>(&self, key: &Q) -> Option<&V> where K: Borrow<Q> {
        self.position(key).ok().map(|i| &self.entries[i].value)
    }
    /// Gets a mutable reference to the value stored under `key`, if any.
    pub fn get_mut<Q: ?Sized + Ord>(&mut self, key: &Q) -> Option<&mut V> where K: Borrow<Q> {
        self.position(key).ok().map(|i| &mut self.entries[i].value)
    }
    /// Checks if a value is stored under `key`.
    pub fn contains_key<Q: ?Sized + Ord>(&self, key: &Q) -> bool where K: Borrow<Q> {
        self.position(key).is_ok()
    }
    /// Inserts a value into the map, returning the previous value stored under the same key (if any).
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.position(&key) {
            Ok(i) => Some(core::mem::replace(&mut self.entries[i].value, value)),
            Err(i) => {
                self.entries.insert(i, Entry { key, value });
                None
            }
        }
    }
    /// Gets the number of entries in the map.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    /// Checks if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Iterates through the entries in map order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|x| (&x.key, &x.value))
    }
    /// Iterates through the keys in map order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|x| &x.key)
    }
}

impl<K: Ord, V, const SORTED: bool> Default for VecMap<K, V, SORTED> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V, const SORTED: bool> FromIterator<(K, V)> for VecMap<K, V, SORTED> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut res = Self::new();
        for (k, v) in iter {
            res.insert(k, v);
        }
        res
    }
}

#[test]
fn test_vecmap_sorted() {
    let mut v = VecMap::<&str, i32, true>::new();
    assert!(v.is_empty());
    assert_eq!(v.insert("sum", 1), None);
    assert_eq!(v.insert("count", 2), None);
    assert_eq!(v.insert("average", 3), None);
    assert_eq!(v.keys().copied().collect::<Vec<_>>(), ["average", "count", "sum"]);
    assert_eq!(v.insert("count", 7), Some(2));
    assert_eq!(v.len(), 3);
    assert_eq!(v.get("count"), Some(&7));
    assert_eq!(v.get("missing"), None);
    *v.get_mut("sum").unwrap() += 10;
    assert_eq!(v.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(), [("average", 3), ("count", 7), ("sum", 11)]);
    assert!(v.contains_key("average"));
    assert!(!v.contains_key("aardvark"));
}

#[test]
fn test_vecmap_unsorted() {
    let mut v = VecMap::<i32, &str, false>::new();
    assert_eq!(v.insert(2, "raptor"), None);
    assert_eq!(v.insert(0, "mscorlib"), None);
    assert_eq!(v.insert(3, "System.Drawing"), None);
    assert_eq!(v.keys().copied().collect::<Vec<_>>(), [2, 0, 3]);
    assert_eq!(v.insert(0, "System"), Some("mscorlib"));
    assert_eq!(v.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(), [(2, "raptor"), (0, "System"), (3, "System.Drawing")]);
    assert_eq!(v.get(&3), Some(&"System.Drawing"));
    assert_eq!(v.get(&1), None);

    let collected = [(5, "a"), (1, "b"), (5, "c")].into_iter().collect::<VecMap<_, _, false>>();
    assert_eq!(collected.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(), [(5, "c"), (1, "b")]);
}
