//! Per-session open file descriptors and the access-mode/permission checks
//! primitives apply before touching an inode's content.

use crate::config::MAX_FILE_SIZE;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::{InodeHandle, MemInode};

/// Bit flags accepted by `Open`/`Creat`.
pub const O_RDONLY: u32 = 0x01;
pub const O_WRONLY: u32 = 0x02;
pub const O_RDWR: u32 = 0x03;
pub const O_CREAT: u32 = 0x04;
pub const O_APPEND: u32 = 0x08;
pub const O_DIRECTORY: u32 = 0x10;

/// `Seek` origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

fn readable(flags: u32) -> bool {
    flags & O_RDWR == O_RDONLY || flags & O_RDWR == O_RDWR
}

fn writable(flags: u32) -> bool {
    flags & O_RDWR == O_WRONLY || flags & O_RDWR == O_RDWR
}

/// Checks `flags` against an inode's owner/group/other permission bits,
/// selecting the field the way the reference implementation's `CheckFlags`
/// does: owner match first, else group match, else other.
pub fn check_access(inode: &MemInode, uid: u16, gid: u16, flags: u32) -> Result<()> {
    let perm = inode.i_mode & 0o777;
    let (read_bit, write_bit) = if inode.i_uid == uid {
        (0o400, 0o200)
    } else if inode.i_gid == gid {
        (0o040, 0o020)
    } else {
        (0o004, 0o002)
    };
    if readable(flags) && perm & read_bit == 0 {
        return Err(Error::Fs(ErrorKind::Perm));
    }
    if writable(flags) && perm & write_bit == 0 {
        return Err(Error::Fs(ErrorKind::Perm));
    }
    if flags & O_DIRECTORY != 0 && !inode.is_dir() {
        return Err(Error::Fs(ErrorKind::NotDir));
    }
    Ok(())
}

/// A single open-file-table entry, as referenced by a session's descriptor
/// array.
#[derive(Clone, Copy)]
pub struct OpenFile {
    pub inode: InodeHandle,
    pub flags: u32,
    pub offset: u64,
}

impl OpenFile {
    pub fn new(inode: InodeHandle, flags: u32) -> Self {
        Self {
            inode,
            flags,
            offset: 0,
        }
    }

    pub fn readable(&self) -> bool {
        readable(self.flags)
    }

    pub fn writable(&self) -> bool {
        writable(self.flags)
    }

    /// Applies `Seek` semantics. Rejects negative resulting offsets and
    /// offsets beyond the maximum file size.
    pub fn seek(&mut self, whence: Whence, delta: i64, size: u64) -> Result<u64> {
        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => self.offset as i64,
            Whence::End => size as i64,
        };
        let target = base.checked_add(delta).ok_or(Error::Fs(ErrorKind::Unsupported))?;
        if target < 0 {
            return Err(Error::Fs(ErrorKind::Unsupported));
        }
        if target as u64 > MAX_FILE_SIZE {
            return Err(Error::Fs(ErrorKind::Unsupported));
        }
        self.offset = target as u64;
        Ok(self.offset)
    }
}

/// The fixed-size per-session descriptor table.
pub struct FileTable {
    slots: Vec<Option<OpenFile>>,
}

impl FileTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn install(&mut self, file: OpenFile) -> Result<i32> {
        for (fd, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(fd as i32);
            }
        }
        Err(Error::Fs(ErrorKind::NFile))
    }

    pub fn get(&self, fd: i32) -> Result<&OpenFile> {
        self.slots
            .get(fd as usize)
            .and_then(|s| s.as_ref())
            .ok_or(Error::Fs(ErrorKind::BadFd))
    }

    pub fn get_mut(&mut self, fd: i32) -> Result<&mut OpenFile> {
        self.slots
            .get_mut(fd as usize)
            .and_then(|s| s.as_mut())
            .ok_or(Error::Fs(ErrorKind::BadFd))
    }

    /// Removes and returns the descriptor at `fd`.
    pub fn take(&mut self, fd: i32) -> Result<OpenFile> {
        self.slots
            .get_mut(fd as usize)
            .and_then(|s| s.take())
            .ok_or(Error::Fs(ErrorKind::BadFd))
    }

    /// Removes and returns every still-open descriptor, for session teardown.
    pub fn drain(&mut self) -> Vec<OpenFile> {
        self.slots.iter_mut().filter_map(|s| s.take()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(slot: usize) -> InodeHandle {
        InodeHandle {
            slot,
            generation: 1,
        }
    }

    #[test]
    fn seek_cur_accumulates_from_offset() {
        let mut file = OpenFile::new(handle(0), O_RDWR);
        file.offset = 10;
        assert_eq!(file.seek(Whence::Cur, 5, 100).unwrap(), 15);
    }

    #[test]
    fn seek_rejects_negative_result() {
        let mut file = OpenFile::new(handle(0), O_RDWR);
        assert!(file.seek(Whence::Set, -1, 100).is_err());
    }

    #[test]
    fn seek_rejects_offset_beyond_max_file_size() {
        let mut file = OpenFile::new(handle(0), O_RDWR);
        assert!(file
            .seek(Whence::Set, MAX_FILE_SIZE as i64 + 1, 100)
            .is_err());
        assert!(file.seek(Whence::Set, MAX_FILE_SIZE as i64, 100).is_ok());
    }

    #[test]
    fn file_table_reuses_freed_slots() {
        let mut table = FileTable::new(4);
        let a = table.install(OpenFile::new(handle(0), O_RDONLY)).unwrap();
        table.take(a).unwrap();
        let b = table.install(OpenFile::new(handle(1), O_RDONLY)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn file_table_exhaustion_is_nfile() {
        let mut table = FileTable::new(1);
        table.install(OpenFile::new(handle(0), O_RDONLY)).unwrap();
        assert!(matches!(
            table.install(OpenFile::new(handle(1), O_RDONLY)),
            Err(Error::Fs(ErrorKind::NFile))
        ));
    }
}
