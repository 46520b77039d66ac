//! Translation from logical file offsets to physical blocks, and the file
//! read/write/grow/release operations built on top of that translation.
//!
//! Addressing layout (`i_addr[0..10]`): 0-5 direct, 6-7 single-indirect
//! (each points at a block of 128 pointers), 8-9 double-indirect (each
//! points at a block of 128 single-indirect pointers). This module fixes
//! the two addressing bugs `spec.md` §9 calls out: `Read`'s head-partial
//! copy starts at `offset % BLOCK_SIZE`, and `Expand`'s second
//! single-indirect tier patches `i_addr[7]`.

use crate::cache::BlockCache;
use crate::config::{
    BLOCK_SIZE, MAX_FILE_SIZE, N_DIRECT, N_DOUBLE_INDIRECT, N_SINGLE_INDIRECT, PTRS_PER_BLOCK,
};
use crate::device::ImageDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::MemInode;
use crate::superblock::Superblock;
use crate::util::ceil_division;

const ZERO_BLOCK: [u8; BLOCK_SIZE] = [0u8; BLOCK_SIZE];

fn decode_index_block(buf: &[u8; BLOCK_SIZE]) -> [u32; PTRS_PER_BLOCK] {
    let mut out = [0u32; PTRS_PER_BLOCK];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u32::from_ne_bytes(buf[i * 4..i * 4 + 4].try_into().unwrap());
    }
    out
}

fn encode_index_block(table: &[u32; PTRS_PER_BLOCK]) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    for (i, &v) in table.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&v.to_ne_bytes());
    }
    out
}

/// Returns the physical block backing logical block `logical`, or `None` if
/// that range of the file was never written (a hole).
pub fn block_map(
    inode: &MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    logical: u64,
) -> Result<Option<u32>> {
    if logical < N_DIRECT as u64 {
        let a = inode.i_addr[logical as usize];
        return Ok((a != 0).then_some(a));
    }
    let l1 = logical - N_DIRECT as u64;
    if l1 < (N_SINGLE_INDIRECT * PTRS_PER_BLOCK) as u64 {
        let which = (l1 / PTRS_PER_BLOCK as u64) as usize;
        let slot = (l1 % PTRS_PER_BLOCK as u64) as usize;
        let ind = inode.i_addr[N_DIRECT + which];
        if ind == 0 {
            return Ok(None);
        }
        let table = decode_index_block(&cache.read(device, ind as u64)?);
        return Ok((table[slot] != 0).then_some(table[slot]));
    }
    let l2 = l1 - (N_SINGLE_INDIRECT * PTRS_PER_BLOCK) as u64;
    let per_double = (PTRS_PER_BLOCK * PTRS_PER_BLOCK) as u64;
    if l2 < N_DOUBLE_INDIRECT as u64 * per_double {
        let which = (l2 / per_double) as usize;
        let rem = l2 % per_double;
        let outer_idx = (rem / PTRS_PER_BLOCK as u64) as usize;
        let inner_idx = (rem % PTRS_PER_BLOCK as u64) as usize;
        let dbl = inode.i_addr[N_DIRECT + N_SINGLE_INDIRECT + which];
        if dbl == 0 {
            return Ok(None);
        }
        let outer = decode_index_block(&cache.read(device, dbl as u64)?);
        let ind = outer[outer_idx];
        if ind == 0 {
            return Ok(None);
        }
        let inner = decode_index_block(&cache.read(device, ind as u64)?);
        return Ok((inner[inner_idx] != 0).then_some(inner[inner_idx]));
    }
    Err(Error::Fs(ErrorKind::Unsupported))
}

/// Returns the physical block backing logical block `logical`, allocating
/// it (and any index blocks on the path to it) if necessary.
fn ensure_mapped(
    inode: &mut MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    sb: &mut Superblock,
    logical: u64,
) -> Result<u32> {
    if logical < N_DIRECT as u64 {
        let idx = logical as usize;
        if inode.i_addr[idx] == 0 {
            let b = sb.alloc_block(device, cache)?;
            cache.write(device, b as u64, &ZERO_BLOCK)?;
            inode.i_addr[idx] = b;
            inode.mark_dirty();
        }
        return Ok(inode.i_addr[idx]);
    }
    let l1 = logical - N_DIRECT as u64;
    if l1 < (N_SINGLE_INDIRECT * PTRS_PER_BLOCK) as u64 {
        let which = (l1 / PTRS_PER_BLOCK as u64) as usize;
        let slot = (l1 % PTRS_PER_BLOCK as u64) as usize;
        let addr_idx = N_DIRECT + which;
        if inode.i_addr[addr_idx] == 0 {
            let ib = sb.alloc_block(device, cache)?;
            cache.write(device, ib as u64, &ZERO_BLOCK)?;
            inode.i_addr[addr_idx] = ib;
            inode.mark_dirty();
        }
        let ind = inode.i_addr[addr_idx];
        let mut table = decode_index_block(&cache.read(device, ind as u64)?);
        if table[slot] == 0 {
            let b = sb.alloc_block(device, cache)?;
            cache.write(device, b as u64, &ZERO_BLOCK)?;
            table[slot] = b;
            cache.write(device, ind as u64, &encode_index_block(&table))?;
        }
        return Ok(table[slot]);
    }
    let l2 = l1 - (N_SINGLE_INDIRECT * PTRS_PER_BLOCK) as u64;
    let per_double = (PTRS_PER_BLOCK * PTRS_PER_BLOCK) as u64;
    if l2 < N_DOUBLE_INDIRECT as u64 * per_double {
        let which = (l2 / per_double) as usize;
        let rem = l2 % per_double;
        let outer_idx = (rem / PTRS_PER_BLOCK as u64) as usize;
        let inner_idx = (rem % PTRS_PER_BLOCK as u64) as usize;
        // Second single-indirect-sized tier patches i_addr[7], i.e. here
        // `N_DIRECT + N_SINGLE_INDIRECT + which`, not `i_addr[6]`.
        let addr_idx = N_DIRECT + N_SINGLE_INDIRECT + which;
        if inode.i_addr[addr_idx] == 0 {
            let ob = sb.alloc_block(device, cache)?;
            cache.write(device, ob as u64, &ZERO_BLOCK)?;
            inode.i_addr[addr_idx] = ob;
            inode.mark_dirty();
        }
        let dbl = inode.i_addr[addr_idx];
        let mut outer = decode_index_block(&cache.read(device, dbl as u64)?);
        if outer[outer_idx] == 0 {
            let ib = sb.alloc_block(device, cache)?;
            cache.write(device, ib as u64, &ZERO_BLOCK)?;
            outer[outer_idx] = ib;
            cache.write(device, dbl as u64, &encode_index_block(&outer))?;
        }
        let ind = outer[outer_idx];
        let mut inner = decode_index_block(&cache.read(device, ind as u64)?);
        if inner[inner_idx] == 0 {
            let b = sb.alloc_block(device, cache)?;
            cache.write(device, b as u64, &ZERO_BLOCK)?;
            inner[inner_idx] = b;
            cache.write(device, ind as u64, &encode_index_block(&inner))?;
        }
        return Ok(inner[inner_idx]);
    }
    Err(Error::Fs(ErrorKind::Unsupported))
}

/// Grows the addressing tree to cover `ceil(new_size / BLOCK_SIZE)` logical
/// blocks. Leaves partial growth in place on allocation failure, per
/// `spec.md` §4.4.
pub fn expand(
    inode: &mut MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    sb: &mut Superblock,
    new_size: u64,
) -> Result<()> {
    if new_size > MAX_FILE_SIZE {
        return Err(Error::Fs(ErrorKind::Unsupported));
    }
    let target_blocks = ceil_division(new_size, BLOCK_SIZE as u64);
    for logical in 0..target_blocks {
        if block_map(inode, device, cache, logical)?.is_none() {
            ensure_mapped(inode, device, cache, sb, logical)?;
        }
    }
    Ok(())
}

/// Reads up to `buf.len()` bytes starting at `offset`, clipped to the
/// inode's current size. Holes read back as zero.
pub fn read(
    inode: &MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize> {
    let end = offset.saturating_add(buf.len() as u64).min(inode.i_size);
    if offset >= end {
        return Ok(0);
    }
    let mut done = 0usize;
    let mut off = offset;
    while off < end {
        let logical = off / BLOCK_SIZE as u64;
        let block_off = (off % BLOCK_SIZE as u64) as usize;
        let to_copy = (BLOCK_SIZE - block_off).min((end - off) as usize);
        match block_map(inode, device, cache, logical)? {
            Some(phys) => {
                let data = cache.read(device, phys as u64)?;
                buf[done..done + to_copy].copy_from_slice(&data[block_off..block_off + to_copy]);
            }
            None => buf[done..done + to_copy].fill(0),
        }
        done += to_copy;
        off += to_copy as u64;
    }
    Ok(done)
}

/// Writes `buf` at `offset`, expanding the file first if the write extends
/// past the current size. Returns the number of bytes actually written,
/// which is less than `buf.len()` only if the write would exceed the
/// maximum file size.
pub fn write(
    inode: &mut MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    sb: &mut Superblock,
    offset: u64,
    buf: &[u8],
) -> Result<usize> {
    let requested_end = offset.saturating_add(buf.len() as u64);
    let end = requested_end.min(MAX_FILE_SIZE);
    if end > inode.i_size {
        expand(inode, device, cache, sb, end)?;
    }
    let mut done = 0usize;
    let mut off = offset;
    while off < end {
        let logical = off / BLOCK_SIZE as u64;
        let block_off = (off % BLOCK_SIZE as u64) as usize;
        let to_copy = (BLOCK_SIZE - block_off).min((end - off) as usize);
        let phys = ensure_mapped(inode, device, cache, sb, logical)?;
        let mut data = cache.read(device, phys as u64)?;
        data[block_off..block_off + to_copy].copy_from_slice(&buf[done..done + to_copy]);
        cache.write(device, phys as u64, &data)?;
        done += to_copy;
        off += to_copy as u64;
    }
    let new_size = offset + done as u64;
    if new_size > inode.i_size {
        inode.i_size = new_size;
        inode.mark_dirty();
    }
    Ok(done)
}

/// Releases every data and index block owned by `inode`, post-order, and
/// resets its addressing table and size.
pub fn release_blocks(
    inode: &mut MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    sb: &mut Superblock,
) -> Result<()> {
    for i in 0..N_DIRECT {
        if inode.i_addr[i] != 0 {
            sb.release_block(device, cache, inode.i_addr[i])?;
        }
    }
    for which in 0..N_SINGLE_INDIRECT {
        let addr = inode.i_addr[N_DIRECT + which];
        if addr == 0 {
            continue;
        }
        let table = decode_index_block(&cache.read(device, addr as u64)?);
        for &b in table.iter() {
            if b != 0 {
                sb.release_block(device, cache, b)?;
            }
        }
        sb.release_block(device, cache, addr)?;
    }
    for which in 0..N_DOUBLE_INDIRECT {
        let addr = inode.i_addr[N_DIRECT + N_SINGLE_INDIRECT + which];
        if addr == 0 {
            continue;
        }
        let outer = decode_index_block(&cache.read(device, addr as u64)?);
        for &ind in outer.iter() {
            if ind == 0 {
                continue;
            }
            let inner = decode_index_block(&cache.read(device, ind as u64)?);
            for &b in inner.iter() {
                if b != 0 {
                    sb.release_block(device, cache, b)?;
                }
            }
            sb.release_block(device, cache, ind)?;
        }
        sb.release_block(device, cache, addr)?;
    }
    inode.i_addr = [0; crate::config::N_ADDR];
    inode.i_size = 0;
    inode.mark_dirty();
    Ok(())
}
