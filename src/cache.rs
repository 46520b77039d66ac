//! Write-back LRU buffer caches for blocks and on-disk inode records.
//!
//! Both caches share the same structure: a doubly-linked LRU list of fixed
//! capacity over parallel arrays, as `spec.md` §4.2 describes. [`Lru`] is the
//! shared list; [`BlockCache`] and [`InodeCache`] wrap it with the
//! device-facing read/write/flush contract.

use log::warn;

use crate::config::{BLOCK_CACHE_CAPACITY, BLOCK_SIZE, DISK_INODE_SIZE, INODE_CACHE_CAPACITY};
use crate::device::ImageDevice;
use crate::error::Result;

/// A fixed-capacity, doubly-linked LRU list over `N`-byte buffers, keyed by
/// a `u32` id (a block index or an inode number).
struct Lru<const N: usize> {
    capacity: usize,
    prev: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    number: Vec<Option<u32>>,
    dirty: Vec<bool>,
    data: Vec<[u8; N]>,
    head: Option<usize>,
    rear: Option<usize>,
    used: usize,
}

/// The previous occupant of a slot that was just evicted to make room.
struct Evicted<const N: usize> {
    id: u32,
    dirty: bool,
    data: [u8; N],
}

impl<const N: usize> Lru<N> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            prev: vec![None; capacity],
            next: vec![None; capacity],
            number: vec![None; capacity],
            dirty: vec![false; capacity],
            data: vec![[0u8; N]; capacity],
            head: None,
            rear: None,
            used: 0,
        }
    }

    /// Unlinks `slot` from the list without touching `number`/`data`.
    fn unlink(&mut self, slot: usize) {
        let p = self.prev[slot];
        let n = self.next[slot];
        match p {
            Some(p) => self.next[p] = n,
            None => self.head = n,
        }
        match n {
            Some(n) => self.prev[n] = p,
            None => self.rear = p,
        }
        self.prev[slot] = None;
        self.next[slot] = None;
    }

    /// Inserts `slot` at the head of the list (most recently used).
    fn push_front(&mut self, slot: usize) {
        self.prev[slot] = None;
        self.next[slot] = self.head;
        if let Some(h) = self.head {
            self.prev[h] = Some(slot);
        }
        self.head = Some(slot);
        if self.rear.is_none() {
            self.rear = Some(slot);
        }
    }

    /// Linear search from head for `id`; on hit, moves the slot to head.
    fn lookup(&mut self, id: u32) -> Option<usize> {
        let mut cur = self.head;
        while let Some(slot) = cur {
            if self.number[slot] == Some(id) {
                self.unlink(slot);
                self.push_front(slot);
                return Some(slot);
            }
            cur = self.next[slot];
        }
        None
    }

    /// Allocates a slot for `id`, evicting the least-recently-used slot if
    /// the list is at capacity. The evicted entry, if dirty, must be written
    /// back by the caller before the slot's old data is discarded.
    fn alloc(&mut self, id: u32) -> (usize, Option<Evicted<N>>) {
        if self.used < self.capacity {
            let slot = self.used;
            self.used += 1;
            self.push_front(slot);
            self.number[slot] = Some(id);
            self.dirty[slot] = false;
            (slot, None)
        } else {
            let slot = self.rear.expect("non-empty cache at capacity");
            let evicted = self.number[slot].map(|old_id| Evicted {
                id: old_id,
                dirty: self.dirty[slot],
                data: self.data[slot],
            });
            self.unlink(slot);
            self.push_front(slot);
            self.number[slot] = Some(id);
            self.dirty[slot] = false;
            (slot, evicted)
        }
    }

    fn mark_dirty(&mut self, slot: usize) {
        self.dirty[slot] = true;
    }

    /// Returns `(id, data)` for every dirty slot, in no particular order.
    fn dirty_slots(&self) -> Vec<(u32, [u8; N])> {
        (0..self.used)
            .filter(|&s| self.dirty[s])
            .filter_map(|s| self.number[s].map(|id| (id, self.data[s])))
            .collect()
    }

    fn clear_dirty(&mut self, slot: usize) {
        self.dirty[slot] = false;
    }
}

/// Write-back cache of raw data blocks.
pub struct BlockCache {
    lru: Lru<BLOCK_SIZE>,
}

impl BlockCache {
    pub fn new() -> Self {
        Self {
            lru: Lru::new(BLOCK_CACHE_CAPACITY),
        }
    }

    /// Returns the content of block `n`, reading through the cache.
    pub fn read(&mut self, device: &mut ImageDevice, n: u64) -> Result<[u8; BLOCK_SIZE]> {
        let id = n as u32;
        if let Some(slot) = self.lru.lookup(id) {
            return Ok(self.lru.data[slot]);
        }
        let mut buf = [0u8; BLOCK_SIZE];
        device.read_block(n, &mut buf)?;
        let (slot, evicted) = self.lru.alloc(id);
        if let Some(ev) = evicted {
            if ev.dirty {
                device.write_block(ev.id as u64, &ev.data)?;
            }
        }
        self.lru.data[slot] = buf;
        Ok(buf)
    }

    /// Writes `buf` into block `n` through the cache, marking it dirty.
    pub fn write(&mut self, device: &mut ImageDevice, n: u64, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        let id = n as u32;
        if let Some(slot) = self.lru.lookup(id) {
            self.lru.data[slot] = *buf;
            self.lru.mark_dirty(slot);
            return Ok(());
        }
        let (slot, evicted) = self.lru.alloc(id);
        if let Some(ev) = evicted {
            if ev.dirty {
                device.write_block(ev.id as u64, &ev.data)?;
            }
        }
        self.lru.data[slot] = *buf;
        self.lru.mark_dirty(slot);
        Ok(())
    }

    /// Writes every dirty block back to `device`.
    pub fn flush(&mut self, device: &mut ImageDevice) -> Result<()> {
        for (id, data) in self.lru.dirty_slots() {
            device.write_block(id as u64, &data)?;
            if let Some(slot) = self.lru.lookup(id) {
                self.lru.clear_dirty(slot);
            } else {
                warn!("block {id} vanished from the cache during flush");
            }
        }
        Ok(())
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Write-back cache of raw on-disk inode records.
pub struct InodeCache {
    lru: Lru<DISK_INODE_SIZE>,
}

impl InodeCache {
    pub fn new() -> Self {
        Self {
            lru: Lru::new(INODE_CACHE_CAPACITY),
        }
    }

    /// Returns the raw record for inode `n`, reading through the cache.
    pub fn read(&mut self, device: &mut ImageDevice, n: u32) -> Result<[u8; DISK_INODE_SIZE]> {
        if let Some(slot) = self.lru.lookup(n) {
            return Ok(self.lru.data[slot]);
        }
        let mut buf = [0u8; DISK_INODE_SIZE];
        device.read_inode(n, &mut buf)?;
        let (slot, evicted) = self.lru.alloc(n);
        if let Some(ev) = evicted {
            if ev.dirty {
                device.write_inode(ev.id, &ev.data)?;
            }
        }
        self.lru.data[slot] = buf;
        Ok(buf)
    }

    /// Writes `buf` into inode record `n` through the cache, marking it dirty.
    pub fn write(&mut self, device: &mut ImageDevice, n: u32, buf: &[u8; DISK_INODE_SIZE]) -> Result<()> {
        if let Some(slot) = self.lru.lookup(n) {
            self.lru.data[slot] = *buf;
            self.lru.mark_dirty(slot);
            return Ok(());
        }
        let (slot, evicted) = self.lru.alloc(n);
        if let Some(ev) = evicted {
            if ev.dirty {
                device.write_inode(ev.id, &ev.data)?;
            }
        }
        self.lru.data[slot] = *buf;
        self.lru.mark_dirty(slot);
        Ok(())
    }

    /// Writes every dirty inode record back to `device`.
    pub fn flush(&mut self, device: &mut ImageDevice) -> Result<()> {
        for (id, data) in self.lru.dirty_slots() {
            device.write_inode(id, &data)?;
            if let Some(slot) = self.lru.lookup(id) {
                self.lru.clear_dirty(slot);
            } else {
                warn!("inode {id} vanished from the cache during flush");
            }
        }
        Ok(())
    }
}

impl Default for InodeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lru_eviction_order() {
        let mut lru: Lru<4> = Lru::new(2);
        let (s0, ev) = lru.alloc(0);
        assert!(ev.is_none());
        lru.data[s0] = [1, 0, 0, 0];
        let (s1, ev) = lru.alloc(1);
        assert!(ev.is_none());
        lru.data[s1] = [2, 0, 0, 0];
        // touch 0 so 1 becomes the LRU victim
        lru.lookup(0);
        let (_s2, ev) = lru.alloc(2);
        let ev = ev.expect("cache at capacity must evict");
        assert_eq!(ev.id, 1);
    }

    #[test]
    fn lru_lookup_hit_returns_same_slot_data() {
        let mut lru: Lru<4> = Lru::new(2);
        let (s0, _) = lru.alloc(7);
        lru.data[s0] = [9, 9, 9, 9];
        let slot = lru.lookup(7).unwrap();
        assert_eq!(lru.data[slot], [9, 9, 9, 9]);
    }
}
