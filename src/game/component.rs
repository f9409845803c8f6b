//! Sparse per-object storage
//!
//! `ComponentStorage<T>` maps object slots to data. Each slot remembers the
//! full `ObjectId` it was filled for, so lookups with a stale id miss instead
//! of returning whatever now lives in the recycled slot.

use super::object::ObjectId;

/// Sparse array indexed by `ObjectId::index`, checked against the generation.
#[derive(Debug)]
pub struct ComponentStorage<T> {
    data: Vec<Option<(ObjectId, T)>>,
}

impl<T> ComponentStorage<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    fn ensure_capacity(&mut self, index: usize) {
        if index >= self.data.len() {
            self.data.resize_with(index + 1, || None);
        }
    }

    /// Insert data for an object, replacing whatever occupied the slot.
    pub fn insert(&mut self, id: ObjectId, value: T) {
        let idx = id.index() as usize;
        self.ensure_capacity(idx);
        self.data[idx] = Some((id, value));
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        self.data[id.index() as usize].take().map(|(_, value)| value)
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        match self.data.get(id.index() as usize)? {
            Some((owner, value)) if *owner == id => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        match self.data.get_mut(id.index() as usize)? {
            Some((owner, value)) if *owner == id => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &T)> {
        self.data
            .iter()
            .filter_map(|slot| slot.as_ref().map(|(id, value)| (*id, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ObjectId, &mut T)> {
        self.data
            .iter_mut()
            .filter_map(|slot| slot.as_mut().map(|(id, value)| (*id, value)))
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ComponentStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut storage = ComponentStorage::new();
        let id = ObjectId::new(5, 0);

        storage.insert(id, 42);
        assert_eq!(storage.get(id), Some(&42));
        assert!(storage.contains(id));
        assert!(!storage.contains(ObjectId::new(4, 0)));
    }

    #[test]
    fn test_stale_generation_misses() {
        let mut storage = ComponentStorage::new();
        let old = ObjectId::new(3, 0);
        let new = ObjectId::new(3, 1);

        storage.insert(old, "old");
        storage.insert(new, "new");
        assert_eq!(storage.get(old), None);
        assert_eq!(storage.remove(old), None);
        assert_eq!(storage.remove(new), Some("new"));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_iteration_in_slot_order() {
        let mut storage = ComponentStorage::new();
        storage.insert(ObjectId::new(5, 0), "five");
        storage.insert(ObjectId::new(0, 0), "zero");
        storage.insert(ObjectId::new(2, 1), "two");

        let items: Vec<_> = storage.iter().map(|(id, v)| (id.index(), *v)).collect();
        assert_eq!(items, vec![(0, "zero"), (2, "two"), (5, "five")]);
    }
}
