//! Object ids with generational indices
//!
//! Rooms, the physics world and collider tags all refer to objects by
//! `ObjectId`. When an object is despawned its slot is recycled with a bumped
//! generation, so a stale id held by a room list or a collider tag can never
//! resolve to the object that reused the slot.

use std::fmt;

use serde::{Serialize, Deserialize};

/// Handle to a world object: slot index plus slot generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    /// Only the allocator and the collider tag decoder build ids from parts.
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Hands out object ids and tracks which are alive.
#[derive(Debug, Default)]
pub struct ObjectAllocator {
    /// Current generation of each slot
    generations: Vec<u32>,
    /// Freed slots, reused LIFO
    free_indices: Vec<u32>,
    alive_count: usize,
}

impl ObjectAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> ObjectId {
        self.alive_count += 1;

        if let Some(index) = self.free_indices.pop() {
            // Generation was already bumped on free
            ObjectId::new(index, self.generations[index as usize])
        } else {
            let index = self.generations.len() as u32;
            self.generations.push(0);
            ObjectId::new(index, 0)
        }
    }

    /// Free an id, making its slot available for reuse.
    /// Returns false if the id was already dead.
    pub fn free(&mut self, id: ObjectId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        self.generations[id.index as usize] = id.generation.wrapping_add(1);
        self.free_indices.push(id.index);
        self.alive_count -= 1;
        true
    }

    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.generations
            .get(id.index as usize)
            .is_some_and(|&gen| gen == id.generation)
            && !self.free_indices.contains(&id.index)
    }

    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Highest slot index ever handed out, plus one
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_free() {
        let mut alloc = ObjectAllocator::new();

        let a = alloc.allocate();
        let b = alloc.allocate();
        assert_eq!(alloc.alive_count(), 2);
        assert!(alloc.is_alive(a));
        assert!(alloc.is_alive(b));

        assert!(alloc.free(a));
        assert!(!alloc.free(a));
        assert_eq!(alloc.alive_count(), 1);
        assert!(!alloc.is_alive(a));
        assert!(alloc.is_alive(b));
    }

    #[test]
    fn test_stale_id_does_not_match_reused_slot() {
        let mut alloc = ObjectAllocator::new();

        let old = alloc.allocate();
        alloc.free(old);

        let new = alloc.allocate();
        assert_eq!(new.index(), old.index());
        assert_ne!(new.generation(), old.generation());
        assert!(!alloc.is_alive(old));
        assert!(alloc.is_alive(new));
        assert_eq!(alloc.capacity(), 1);
    }
}
