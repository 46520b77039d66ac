//! Fixed-size directory entries and directory content operations.

use crate::cache::BlockCache;
use crate::config::{DIRENT_SIZE, NAME_MAX_LENGTH};
use crate::device::ImageDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::MemInode;
use crate::superblock::Superblock;
use crate::{blockmap, util};

/// A directory entry as read from a directory file's content: a signed
/// inode index (`<= 0` marks a free slot) and a NUL-padded name.
#[derive(Debug, Clone)]
pub struct DirEntryView {
    pub ino: i32,
    pub name: String,
    /// Byte offset of this entry within the directory file, for `Remove`.
    pub offset: u64,
}

fn encode_name(name: &str) -> Result<[u8; NAME_MAX_LENGTH]> {
    let bytes = name.as_bytes();
    if bytes.len() >= NAME_MAX_LENGTH {
        return Err(Error::Fs(ErrorKind::NameTooLong));
    }
    let mut buf = [0u8; NAME_MAX_LENGTH];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

fn decode_name(buf: &[u8; NAME_MAX_LENGTH]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn encode_entry(ino: i32, name: &str) -> Result<[u8; DIRENT_SIZE]> {
    let name = encode_name(name)?;
    let mut raw = [0u8; DIRENT_SIZE];
    raw[0..4].copy_from_slice(&ino.to_ne_bytes());
    raw[4..4 + NAME_MAX_LENGTH].copy_from_slice(&name);
    Ok(raw)
}

fn decode_entry(raw: &[u8; DIRENT_SIZE]) -> (i32, String) {
    let ino = i32::from_ne_bytes(raw[0..4].try_into().unwrap());
    let mut name_buf = [0u8; NAME_MAX_LENGTH];
    name_buf.copy_from_slice(&raw[4..4 + NAME_MAX_LENGTH]);
    (ino, decode_name(&name_buf))
}

/// Reads the entry at byte offset `offset` in `dir`'s content.
fn read_entry(
    dir: &MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    offset: u64,
) -> Result<Option<(i32, String)>> {
    if offset >= dir.i_size {
        return Ok(None);
    }
    let mut raw = [0u8; DIRENT_SIZE];
    let n = blockmap::read(dir, device, cache, offset, &mut raw)?;
    if n < DIRENT_SIZE {
        return Ok(None);
    }
    Ok(Some(decode_entry(&raw)))
}

/// A lazy, forward-only cursor over a directory's entries. Re-seek by
/// constructing a new cursor; this is not a buffer-returning API.
pub struct DirCursor<'a> {
    dir: &'a MemInode,
    device: &'a mut ImageDevice,
    cache: &'a mut BlockCache,
    pos: u64,
}

impl<'a> DirCursor<'a> {
    pub fn new(dir: &'a MemInode, device: &'a mut ImageDevice, cache: &'a mut BlockCache) -> Self {
        Self {
            dir,
            device,
            cache,
            pos: 0,
        }
    }
}

impl<'a> Iterator for DirCursor<'a> {
    type Item = Result<DirEntryView>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let offset = self.pos;
            match read_entry(self.dir, self.device, self.cache, offset) {
                Ok(Some((ino, name))) => {
                    self.pos += DIRENT_SIZE as u64;
                    return Some(Ok(DirEntryView { ino, name, offset }));
                }
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Searches `dir` for an entry named `name`, returning its inode number.
pub fn search(
    dir: &MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    name: &str,
) -> Result<Option<u32>> {
    let mut pos = 0u64;
    while let Some((ino, entry_name)) = read_entry(dir, device, cache, pos)? {
        if ino > 0 && entry_name == name {
            return Ok(Some(ino as u32));
        }
        pos += DIRENT_SIZE as u64;
    }
    Ok(None)
}

/// Inserts a `(name, ino)` entry into `dir`, reusing the first free slot
/// (`ino <= 0`) if one exists, else appending at EOF. Stamps `dir`'s mtime.
pub fn insert(
    dir: &mut MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    sb: &mut Superblock,
    name: &str,
    ino: u32,
) -> Result<()> {
    let raw = encode_entry(ino as i32, name)?;
    let mut pos = 0u64;
    while let Some((slot_ino, _)) = read_entry(dir, device, cache, pos)? {
        if slot_ino <= 0 {
            blockmap::write(dir, device, cache, sb, pos, &raw)?;
            stamp_mtime(dir);
            return Ok(());
        }
        pos += DIRENT_SIZE as u64;
    }
    blockmap::write(dir, device, cache, sb, dir.i_size, &raw)?;
    stamp_mtime(dir);
    Ok(())
}

/// Marks the entry named `name` as free (`ino = -1`) and writes the block
/// back. Stamps `dir`'s mtime. Returns the removed entry's inode number.
pub fn remove(
    dir: &mut MemInode,
    device: &mut ImageDevice,
    cache: &mut BlockCache,
    sb: &mut Superblock,
    name: &str,
) -> Result<u32> {
    let mut pos = 0u64;
    while let Some((ino, entry_name)) = read_entry(dir, device, cache, pos)? {
        if ino > 0 && entry_name == name {
            let raw = encode_entry(-1, "")?;
            blockmap::write(dir, device, cache, sb, pos, &raw)?;
            stamp_mtime(dir);
            return Ok(ino as u32);
        }
        pos += DIRENT_SIZE as u64;
    }
    Err(Error::Fs(ErrorKind::NoEnt))
}

/// Tells whether `dir` contains any live entry (`ino > 0`).
pub fn has_entries(dir: &MemInode, device: &mut ImageDevice, cache: &mut BlockCache) -> Result<bool> {
    let mut pos = 0u64;
    while let Some((ino, _)) = read_entry(dir, device, cache, pos)? {
        if ino > 0 {
            return Ok(true);
        }
        pos += DIRENT_SIZE as u64;
    }
    Ok(false)
}

fn stamp_mtime(dir: &mut MemInode) {
    dir.i_mtime = util::get_timestamp();
    dir.mark_dirty();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_round_trips_through_raw_bytes() {
        let raw = encode_entry(42, "hello.txt").unwrap();
        let (ino, name) = decode_entry(&raw);
        assert_eq!(ino, 42);
        assert_eq!(name, "hello.txt");
    }

    #[test]
    fn name_at_max_length_minus_one_is_accepted() {
        let name = "a".repeat(NAME_MAX_LENGTH - 1);
        assert!(encode_entry(1, &name).is_ok());
    }

    #[test]
    fn name_at_max_length_is_rejected() {
        let name = "a".repeat(NAME_MAX_LENGTH);
        assert!(matches!(
            encode_entry(1, &name),
            Err(Error::Fs(ErrorKind::NameTooLong))
        ));
    }
}
