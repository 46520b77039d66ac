//! The bounded global pool of in-memory inodes ("systemMemInodeTable" in the
//! original sources), addressed by generation-checked handles so a stale
//! reference can never alias a later occupant of the same slot.

use log::debug;

use crate::cache::{BlockCache, InodeCache};
use crate::config::MEM_INODE_TABLE_CAPACITY;
use crate::device::ImageDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{DiskInode, InodeHandle, MemInode};
use crate::superblock::Superblock;
use crate::{blockmap, util};

pub struct InodeTable {
    slots: Vec<MemInode>,
    generation: Vec<u32>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            slots: (0..MEM_INODE_TABLE_CAPACITY).map(|_| MemInode::unused()).collect(),
            generation: vec![0; MEM_INODE_TABLE_CAPACITY],
        }
    }

    fn find_resident(&self, inumber: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.i_used && s.i_number == inumber)
    }

    fn find_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.i_used)
    }

    fn find_evictable_slot(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.i_used && s.i_count == 0)
    }

    /// Returns a handle to the resident (possibly freshly loaded) inode
    /// numbered `inumber`. Does not touch `i_count`; callers bump it once
    /// they actually attach a descriptor.
    pub fn acquire(
        &mut self,
        inumber: u32,
        device: &mut ImageDevice,
        inode_cache: &mut InodeCache,
    ) -> Result<InodeHandle> {
        if let Some(slot) = self.find_resident(inumber) {
            return Ok(InodeHandle {
                slot,
                generation: self.generation[slot],
            });
        }
        let slot = match self.find_free_slot() {
            Some(slot) => slot,
            None => {
                let slot = self.find_evictable_slot().ok_or(Error::Fs(ErrorKind::NoMem))?;
                self.write_back_slot(slot, device, inode_cache)?;
                slot
            }
        };
        let raw = inode_cache.read(device, inumber)?;
        let disk = DiskInode::decode(&raw);
        self.slots[slot] = MemInode::from_disk(inumber, &disk);
        self.generation[slot] = self.generation[slot].wrapping_add(1);
        debug!("loaded inode {inumber} into table slot {slot}");
        Ok(InodeHandle {
            slot,
            generation: self.generation[slot],
        })
    }

    /// Allocates a table slot for a brand-new on-disk inode, without
    /// reading anything from the device.
    pub fn acquire_new(
        &mut self,
        inumber: u32,
        device: &mut ImageDevice,
        inode_cache: &mut InodeCache,
    ) -> Result<InodeHandle> {
        let slot = match self.find_free_slot() {
            Some(slot) => slot,
            None => {
                let slot = self.find_evictable_slot().ok_or(Error::Fs(ErrorKind::NoMem))?;
                self.write_back_slot(slot, device, inode_cache)?;
                slot
            }
        };
        self.slots[slot] = MemInode::unused();
        self.generation[slot] = self.generation[slot].wrapping_add(1);
        Ok(InodeHandle {
            slot,
            generation: self.generation[slot],
        })
    }

    fn resolve(&self, handle: InodeHandle) -> Result<usize> {
        if handle.slot < self.slots.len()
            && self.generation[handle.slot] == handle.generation
            && self.slots[handle.slot].i_used
        {
            Ok(handle.slot)
        } else {
            Err(Error::Fs(ErrorKind::BadFd))
        }
    }

    pub fn get(&self, handle: InodeHandle) -> Result<&MemInode> {
        self.resolve(handle).map(|slot| &self.slots[slot])
    }

    pub fn get_mut(&mut self, handle: InodeHandle) -> Result<&mut MemInode> {
        let slot = self.resolve(handle)?;
        Ok(&mut self.slots[slot])
    }

    pub fn inc_count(&mut self, handle: InodeHandle) -> Result<u32> {
        let slot = self.resolve(handle)?;
        self.slots[slot].i_count += 1;
        Ok(self.slots[slot].i_count)
    }

    pub fn dec_count(&mut self, handle: InodeHandle) -> Result<u32> {
        let slot = self.resolve(handle)?;
        self.slots[slot].i_count = self.slots[slot].i_count.saturating_sub(1);
        Ok(self.slots[slot].i_count)
    }

    fn write_back_slot(
        &mut self,
        slot: usize,
        device: &mut ImageDevice,
        inode_cache: &mut InodeCache,
    ) -> Result<()> {
        let inode = &mut self.slots[slot];
        if inode.i_used && inode.i_dirty {
            let number = inode.i_number;
            let raw = inode.to_disk().encode();
            inode_cache.write(device, number, &raw)?;
            inode.i_dirty = false;
        }
        Ok(())
    }

    /// Writes `handle`'s inode back to the inode buffer cache if dirty,
    /// optionally stamping access/modify times first.
    pub fn write_back(
        &mut self,
        handle: InodeHandle,
        device: &mut ImageDevice,
        inode_cache: &mut InodeCache,
        stamp: Option<(u32, u32)>,
    ) -> Result<()> {
        let slot = self.resolve(handle)?;
        if let Some((atime, mtime)) = stamp {
            self.slots[slot].i_atime = atime;
            self.slots[slot].i_mtime = mtime;
            self.slots[slot].i_dirty = true;
        }
        self.write_back_slot(slot, device, inode_cache)
    }

    /// If `handle`'s inode has no references and no links, releases its
    /// blocks and returns its number to the allocator, freeing the slot.
    /// Returns whether the inode was released.
    pub fn release_if_orphan(
        &mut self,
        handle: InodeHandle,
        device: &mut ImageDevice,
        block_cache: &mut BlockCache,
        inode_cache: &mut InodeCache,
        sb: &mut Superblock,
    ) -> Result<bool> {
        let slot = self.resolve(handle)?;
        let inode = &self.slots[slot];
        if inode.i_count != 0 || inode.i_nlink != 0 {
            return Ok(false);
        }
        let number = inode.i_number;
        blockmap::release_blocks(&mut self.slots[slot], device, block_cache, sb)?;
        sb.release_inode(device, block_cache, number)?;
        let empty = DiskInode::empty().encode();
        inode_cache.write(device, number, &empty)?;
        self.slots[slot] = MemInode::unused();
        debug!("released orphan inode {number}");
        Ok(true)
    }

    /// Flushes every dirty resident inode to the inode buffer cache.
    pub fn flush_all(&mut self, device: &mut ImageDevice, inode_cache: &mut InodeCache) -> Result<()> {
        for slot in 0..self.slots.len() {
            self.write_back_slot(slot, device, inode_cache)?;
        }
        Ok(())
    }

    pub fn timestamp_now() -> u32 {
        util::get_timestamp()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
