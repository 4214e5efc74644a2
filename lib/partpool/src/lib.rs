// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A fixed-partition memory pool.
//!
//! `Pool` slices a caller-supplied byte buffer into equal-size elements and
//! hands them out in O(1) through a LIFO free list. The list is threaded
//! through the first word of each *free* element, so the pool needs no side
//! storage of its own; an allocated element is entirely the caller's.
//!
//! Elements are identified by their byte offset into the buffer rather than
//! by pointer. That keeps the API safe to hold across unrelated calls: a
//! stale or fabricated offset is caught by a containment-and-stride check
//! and rejected without touching the free list.
//!
//! Allocation zero-fills the element, so callers never observe a previous
//! occupant's bytes (or the link word of the free list).

use zerocopy::{FromBytes, IntoBytes};

/// Smallest allowed element size: each free element must be able to hold the
/// free-list link word.
pub const MIN_ELEM_SIZE: usize = core::mem::size_of::<u32>();

/// Terminator for the free list. Not a valid element offset, since offsets
/// are strictly less than the storage length.
const NIL: u32 = u32::MAX;

/// Errors from [`Pool::new`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PoolError {
    /// The element size is zero or smaller than [`MIN_ELEM_SIZE`].
    ElemTooSmall,
    /// The storage is empty, or too small to hold even one element.
    StorageTooSmall,
    /// The storage is too large for 32-bit element offsets.
    StorageTooLarge,
}

/// A fixed-partition pool over owned storage.
pub struct Pool {
    storage: Box<[u8]>,
    elem_size: usize,
    capacity: u32,
    free_head: u32,
    free_count: u32,
}

impl Pool {
    /// Partitions `storage` into elements of `elem_size` bytes and links
    /// them all onto the free list. Trailing bytes that don't make up a
    /// whole element are unused.
    pub fn new(storage: Box<[u8]>, elem_size: usize) -> Result<Self, PoolError> {
        if elem_size < MIN_ELEM_SIZE {
            return Err(PoolError::ElemTooSmall);
        }
        if storage.len() >= NIL as usize {
            return Err(PoolError::StorageTooLarge);
        }
        let capacity = storage.len() / elem_size;
        if capacity == 0 {
            return Err(PoolError::StorageTooSmall);
        }

        let mut pool = Self {
            storage,
            elem_size,
            capacity: capacity as u32,
            free_head: NIL,
            free_count: 0,
        };
        // Link every element, last to first, so the list comes out in
        // ascending-offset order with element 0 at the head.
        for i in (0..capacity).rev() {
            let offset = (i * elem_size) as u32;
            pool.write_link(offset, pool.free_head);
            pool.free_head = offset;
        }
        pool.free_count = pool.capacity;
        Ok(pool)
    }

    /// Takes one element off the free list, zero-filled. Returns its offset,
    /// or `None` when the pool is exhausted. Never blocks.
    pub fn alloc(&mut self) -> Option<u32> {
        if self.free_count == 0 {
            return None;
        }
        let offset = self.free_head;
        self.free_head = self.read_link(offset);
        self.free_count -= 1;
        self.elem_bytes_mut(offset).fill(0);
        Some(offset)
    }

    /// Returns an element to the free list. The offset must lie inside the
    /// storage on an element boundary; anything else is rejected (returning
    /// `false`) without touching the list, so a foreign or corrupted offset
    /// cannot poison future allocations.
    #[must_use]
    pub fn free(&mut self, offset: u32) -> bool {
        if !self.contains(offset) {
            return false;
        }
        self.write_link(offset, self.free_head);
        self.free_head = offset;
        self.free_count += 1;
        true
    }

    /// Borrows an allocated element's bytes. `None` for an offset outside
    /// the pool or off-stride.
    pub fn elem(&self, offset: u32) -> Option<&[u8]> {
        if !self.contains(offset) {
            return None;
        }
        let start = offset as usize;
        Some(&self.storage[start..start + self.elem_size])
    }

    /// Mutably borrows an allocated element's bytes.
    pub fn elem_mut(&mut self, offset: u32) -> Option<&mut [u8]> {
        if !self.contains(offset) {
            return None;
        }
        let start = offset as usize;
        Some(&mut self.storage[start..start + self.elem_size])
    }

    /// Number of elements currently on the free list.
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    /// Number of elements currently handed out.
    pub fn allocated_count(&self) -> u32 {
        self.capacity - self.free_count
    }

    /// Total number of elements.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Element stride in bytes.
    pub fn elem_size(&self) -> usize {
        self.elem_size
    }

    fn contains(&self, offset: u32) -> bool {
        let offset = offset as usize;
        offset < self.capacity as usize * self.elem_size
            && offset % self.elem_size == 0
    }

    fn elem_bytes_mut(&mut self, offset: u32) -> &mut [u8] {
        let start = offset as usize;
        &mut self.storage[start..start + self.elem_size]
    }

    fn read_link(&self, offset: u32) -> u32 {
        let start = offset as usize;
        // Unwrap is fine: contains() guarantees at least elem_size >= 4
        // bytes past `start`.
        let (link, _) =
            u32::read_from_prefix(&self.storage[start..]).unwrap();
        link
    }

    fn write_link(&mut self, offset: u32, link: u32) {
        let start = offset as usize;
        link.write_to_prefix(&mut self.storage[start..]).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pool(elems: u32, elem_size: usize) -> Pool {
        let storage = vec![0u8; elems as usize * elem_size].into_boxed_slice();
        Pool::new(storage, elem_size).unwrap()
    }

    #[test]
    fn rejects_tiny_elements() {
        let storage = vec![0u8; 64].into_boxed_slice();
        assert_eq!(
            Pool::new(storage, 2).err(),
            Some(PoolError::ElemTooSmall)
        );
    }

    #[test]
    fn rejects_empty_storage() {
        let storage = vec![0u8; 0].into_boxed_slice();
        assert_eq!(
            Pool::new(storage, 16).err(),
            Some(PoolError::StorageTooSmall)
        );
    }

    #[test]
    fn alloc_yields_distinct_in_range_offsets() {
        let mut pool = make_pool(4, 1024);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let off = pool.alloc().unwrap();
            assert!(off < 4 * 1024);
            assert_eq!(off % 1024, 0);
            assert!(!seen.contains(&off));
            seen.push(off);
        }
        // Fifth allocation must fail, and must not hand out a duplicate.
        assert_eq!(pool.alloc(), None);
        assert_eq!(pool.free_count(), 0);
    }

    #[test]
    fn free_then_alloc_reuses() {
        let mut pool = make_pool(4, 64);
        let offs: Vec<u32> = (0..4).map(|_| pool.alloc().unwrap()).collect();
        assert!(pool.free(offs[1]));
        assert!(pool.free(offs[3]));
        assert_eq!(pool.free_count(), 2);

        // LIFO: the most recently freed element comes back first.
        assert_eq!(pool.alloc(), Some(offs[3]));
        assert_eq!(pool.alloc(), Some(offs[1]));
        assert_eq!(pool.alloc(), None);
    }

    #[test]
    fn count_invariant_holds() {
        let mut pool = make_pool(8, 32);
        assert_eq!(pool.free_count() + pool.allocated_count(), 8);
        let a = pool.alloc().unwrap();
        let b = pool.alloc().unwrap();
        assert_eq!(pool.free_count() + pool.allocated_count(), 8);
        assert!(pool.free(a));
        assert_eq!(pool.free_count() + pool.allocated_count(), 8);
        assert!(pool.free(b));
        assert_eq!(pool.free_count(), 8);
    }

    #[test]
    fn foreign_offsets_are_rejected() {
        let mut pool = make_pool(4, 64);
        let _ = pool.alloc().unwrap();
        let before = pool.free_count();

        // Out of range entirely.
        assert!(!pool.free(4 * 64));
        assert!(!pool.free(u32::MAX - 1));
        // In range but off-stride.
        assert!(!pool.free(17));

        assert_eq!(pool.free_count(), before);
    }

    #[test]
    fn alloc_zero_fills() {
        let mut pool = make_pool(2, 16);
        let off = pool.alloc().unwrap();
        pool.elem_mut(off).unwrap().fill(0xA5);
        assert!(pool.free(off));
        // The link word overwrote part of the element; the rest still holds
        // 0xA5. A fresh allocation must see all zeroes regardless.
        let off2 = pool.alloc().unwrap();
        assert_eq!(off2, off);
        assert!(pool.elem(off2).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn trailing_bytes_are_unused() {
        // 100 bytes at stride 16 -> 6 elements, 4 bytes of slack.
        let storage = vec![0u8; 100].into_boxed_slice();
        let mut pool = Pool::new(storage, 16).unwrap();
        assert_eq!(pool.capacity(), 6);
        for _ in 0..6 {
            assert!(pool.alloc().is_some());
        }
        assert_eq!(pool.alloc(), None);
    }
}
