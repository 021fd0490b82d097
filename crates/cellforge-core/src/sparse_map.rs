use std::fmt::{Display, Formatter};

/// A sparse, generational map keyed by [`Key`].
///
/// `SparseMap` provides stable keys with versioning to prevent
/// use-after-free bugs: a [`Key`] returned for a cell stays valid for
/// the lifetime of that cell and is never silently aliased to a later
/// cell that happens to reuse the same slot.
///
/// ## Guarantees
///
/// - Insertion is **O(1)**.
/// - Removal is **O(1)**.
/// - Lookup is **O(1)**.
/// - Keys are invalidated once their value is removed.
#[derive(Debug)]
pub struct SparseMap<T> {
    buffer: Vec<Item<T>>,
    empty_slots: Vec<usize>,
}

impl<T> SparseMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value into the map and returns a unique [`Key`].
    ///
    /// Vacant slots are reused when possible. If a slot is reused,
    /// its generation counter is incremented to invalidate old keys.
    #[must_use = "the returned key is the only way to reference back the inserted value"]
    pub fn insert(&mut self, value: T) -> Key {
        self.alloc_slot(
            value,
            |value, item| item.replace(value),
            |value| Item::new(value),
        )
    }

    /// Similar to [`Self::insert()`] but provides a [`Key`] before
    /// inserting the value, so the value can reference its own key
    /// (used when a cell needs to know its own identity up front).
    pub fn insert_with_key<F>(&mut self, f: F) -> Key
    where
        F: FnOnce(&mut Self, Key) -> T,
    {
        let key = self.alloc_slot(
            (),
            |_, item| item.replace_empty(),
            |_| Item::new_empty(),
        );

        let value = f(self, key);
        self.buffer[key.index].inner = Some(value);

        key
    }

    fn alloc_slot<V, R, C>(&mut self, value: V, replace: R, create: C) -> Key
    where
        R: FnOnce(V, &mut Item<T>) -> u32,
        C: FnOnce(V) -> Item<T>,
    {
        if let Some(index) = self.empty_slots.pop() {
            let version = replace(value, &mut self.buffer[index]);
            Key::new(index, version)
        } else {
            let index = self.buffer.len();
            let item = create(value);
            let version = item.version;
            self.buffer.push(item);
            Key::new(index, version)
        }
    }

    /// Removes a value associated with the given key.
    ///
    /// Returns `None` if the key is invalid or already removed. The
    /// slot is marked for reuse.
    pub fn remove(&mut self, key: &Key) -> Option<T> {
        let item = self.buffer.get_mut(key.index)?;
        if item.version != key.version {
            return None;
        }
        self.empty_slots.push(key.index);
        item.take()
    }

    pub fn get(&self, key: &Key) -> Option<&T> {
        let item = self.buffer.get(key.index)?;
        if item.version == key.version {
            return item.inner.as_ref();
        }
        None
    }

    pub fn get_mut(&mut self, key: &Key) -> Option<&mut T> {
        let item = self.buffer.get_mut(key.index)?;
        if item.version == key.version {
            return item.inner.as_mut();
        }
        None
    }

    /// Returns `true` if the key currently refers to a live value.
    pub fn contains(&self, key: &Key) -> bool {
        self.buffer
            .get(key.index)
            .is_some_and(|item| item.inner.is_some() && item.version == key.version)
    }

    pub fn len(&self) -> usize {
        self.buffer.len() - self.empty_slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SparseMap<T> {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            empty_slots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key {
    index: usize,
    version: u32,
}

impl Key {
    fn new(index: usize, version: u32) -> Self {
        Self { index, version }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("#{}v{}", self.index, self.version))
    }
}

/// A versioned item holder used by [`SparseMap`].
#[derive(Debug)]
struct Item<T> {
    inner: Option<T>,
    version: u32,
}

impl<T> Item<T> {
    fn new(value: T) -> Self {
        Self {
            inner: Some(value),
            version: 0,
        }
    }

    fn new_empty() -> Self {
        Self {
            inner: None,
            version: 0,
        }
    }

    fn take(&mut self) -> Option<T> {
        self.inner.take()
    }

    fn replace(&mut self, value: T) -> u32 {
        self.inner.replace(value);
        self.version = self.version.wrapping_add(1);
        self.version
    }

    fn replace_empty(&mut self) -> u32 {
        self.inner = None;
        self.version = self.version.wrapping_add(1);
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut map = SparseMap::new();

        let key = map.insert(42);
        assert_eq!(map.get(&key), Some(&42));
        assert!(map.contains(&key));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn insert_with_key_receives_valid_key_before_insert() {
        let mut map = SparseMap::new();

        let key = map.insert_with_key(|map, key| {
            assert_eq!(key.index, 0);
            assert!(map.buffer[key.index].inner.is_none());
            42
        });

        assert_eq!(map.get(&key), Some(&42));
    }

    #[test]
    fn remove_invalidates_key() {
        let mut map = SparseMap::new();

        let key = map.insert(10);
        let removed = map.remove(&key);

        assert_eq!(removed, Some(10));
        assert_eq!(map.get(&key), None);
        assert!(!map.contains(&key));
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn insert_reuse_bumps_version() {
        let mut map = SparseMap::new();

        let k1 = map.insert(1);
        map.remove(&k1);
        let k2 = map.insert(2);

        assert_eq!(k1.index, k2.index);
        assert_ne!(k1.version, k2.version);
        assert_eq!(map.get(&k1), None);
        assert_eq!(map.get(&k2), Some(&2));
    }

    #[test]
    fn removing_twice_is_safe() {
        let mut map = SparseMap::new();

        let key = map.insert(7);
        assert_eq!(map.remove(&key), Some(7));
        assert_eq!(map.remove(&key), None);
    }

    #[test]
    fn invalid_index_returns_none() {
        let map = SparseMap::<usize>::new();

        let fake_key = Key::new(999, 0);
        assert_eq!(map.get(&fake_key), None);
        assert!(!map.contains(&fake_key));
    }
}
