//! On-disk and in-memory inode representations.

use crate::config::{DISK_INODE_SIZE, N_ADDR};
use crate::error::{Error, ErrorKind, Result};
use crate::util::{get_timestamp, reinterpret, reinterpret_mut};

/// Inode is allocated (in use).
pub const MODE_IALLOC: u16 = 0x8000;
/// Type field mask.
pub const MODE_IFMT: u16 = 0x6000;
/// Type: directory.
pub const MODE_IFDIR: u16 = 0x4000;
/// Type: regular file.
pub const MODE_IFREG: u16 = 0x6000;
/// Permission bits mask (rwxrwxrwx).
pub const MODE_PERM_MASK: u16 = 0o777;

/// The kind of filesystem object an inode represents, as a tagged variant
/// at the in-memory boundary only (`spec.md` §9 Design Notes). The on-disk
/// boundary keeps the bit pattern in [`DiskInode::d_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
}

impl FileKind {
    fn from_mode(mode: u16) -> Result<Self> {
        match mode & MODE_IFMT {
            MODE_IFREG => Ok(Self::Regular),
            _ if mode & MODE_IFDIR == MODE_IFDIR => Ok(Self::Directory),
            _ => Err(Error::Fs(ErrorKind::Unsupported)),
        }
    }

    fn type_bits(self) -> u16 {
        match self {
            Self::Regular => MODE_IFREG,
            Self::Directory => MODE_IFDIR,
        }
    }
}

/// The 64-byte packed on-disk inode record.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct DiskInode {
    pub d_mode: u16,
    pub d_nlink: u16,
    pub d_uid: u16,
    pub d_gid: u16,
    pub d_size: u32,
    pub d_addr: [u32; N_ADDR],
    pub d_atime: u32,
    pub d_mtime: u32,
}

const _: () = assert!(std::mem::size_of::<DiskInode>() <= DISK_INODE_SIZE);

impl DiskInode {
    /// A fully zeroed, unallocated record.
    pub fn empty() -> Self {
        Self {
            d_mode: 0,
            d_nlink: 0,
            d_uid: 0,
            d_gid: 0,
            d_size: 0,
            d_addr: [0; N_ADDR],
            d_atime: 0,
            d_mtime: 0,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.d_mode & MODE_IALLOC != 0
    }

    pub fn kind(&self) -> Result<FileKind> {
        FileKind::from_mode(self.d_mode)
    }

    /// Decodes a raw record read through [`crate::cache::InodeCache`].
    pub fn decode(raw: &[u8; DISK_INODE_SIZE]) -> Self {
        let mut inode = Self::empty();
        unsafe {
            let dst = reinterpret_mut(&mut inode);
            dst.copy_from_slice(&raw[..dst.len()]);
        }
        inode
    }

    /// Encodes into a raw record ready for [`crate::cache::InodeCache`].
    pub fn encode(&self) -> [u8; DISK_INODE_SIZE] {
        let mut raw = [0u8; DISK_INODE_SIZE];
        unsafe {
            let src = reinterpret(self);
            raw[..src.len()].copy_from_slice(src);
        }
        raw
    }
}

/// A handle to a slot in the in-memory inode table. The generation counter
/// ensures a stale handle (held across an eviction) cannot silently alias a
/// later occupant of the same slot (`spec.md` §9 Design Notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeHandle {
    pub(crate) slot: usize,
    pub(crate) generation: u32,
}

/// The in-memory inode: mirrors the on-disk fields plus runtime state.
pub struct MemInode {
    pub i_number: u32,
    pub i_mode: u16,
    pub i_nlink: u16,
    pub i_uid: u16,
    pub i_gid: u16,
    pub i_size: u64,
    pub i_addr: [u32; N_ADDR],
    pub i_atime: u32,
    pub i_mtime: u32,

    /// Number of open descriptors referencing this inode.
    pub i_count: u32,
    /// Set when any field has been modified since the last write-back.
    pub i_dirty: bool,
    /// Whether this slot currently holds a live inode.
    pub i_used: bool,
}

impl MemInode {
    /// An empty, unoccupied table slot.
    pub(crate) fn unused() -> Self {
        Self {
            i_number: 0,
            i_mode: 0,
            i_nlink: 0,
            i_uid: 0,
            i_gid: 0,
            i_size: 0,
            i_addr: [0; N_ADDR],
            i_atime: 0,
            i_mtime: 0,
            i_count: 0,
            i_dirty: false,
            i_used: false,
        }
    }

    pub(crate) fn from_disk(number: u32, disk: &DiskInode) -> Self {
        Self {
            i_number: number,
            i_mode: disk.d_mode,
            i_nlink: disk.d_nlink,
            i_uid: disk.d_uid,
            i_gid: disk.d_gid,
            i_size: disk.d_size as u64,
            i_addr: disk.d_addr,
            i_atime: disk.d_atime,
            i_mtime: disk.d_mtime,
            i_count: 0,
            i_dirty: false,
            i_used: true,
        }
    }

    pub(crate) fn to_disk(&self) -> DiskInode {
        DiskInode {
            d_mode: self.i_mode,
            d_nlink: self.i_nlink,
            d_uid: self.i_uid,
            d_gid: self.i_gid,
            d_size: self.i_size as u32,
            d_addr: self.i_addr,
            d_atime: self.i_atime,
            d_mtime: self.i_mtime,
        }
    }

    pub fn kind(&self) -> Result<FileKind> {
        FileKind::from_mode(self.i_mode)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind(), Ok(FileKind::Directory))
    }

    /// Initializes a freshly allocated inode's fields. The caller is
    /// responsible for inserting the corresponding directory entry.
    pub(crate) fn init(&mut self, number: u32, kind: FileKind, perm: u16, uid: u16, gid: u16) {
        self.i_number = number;
        self.i_mode = MODE_IALLOC | kind.type_bits() | (perm & MODE_PERM_MASK);
        self.i_nlink = 0;
        self.i_uid = uid;
        self.i_gid = gid;
        self.i_size = 0;
        self.i_addr = [0; N_ADDR];
        let now = get_timestamp();
        self.i_atime = now;
        self.i_mtime = now;
        self.i_count = 0;
        self.i_dirty = true;
        self.i_used = true;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.i_dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disk_inode_round_trips_through_raw_bytes() {
        let mut inode = DiskInode::empty();
        inode.d_mode = MODE_IALLOC | MODE_IFREG | 0o644;
        inode.d_nlink = 1;
        inode.d_uid = 3;
        inode.d_gid = 4;
        inode.d_size = 12345;
        inode.d_addr[0] = 7;
        inode.d_atime = 111;
        inode.d_mtime = 222;

        let raw = inode.encode();
        let back = DiskInode::decode(&raw);
        let back_d_mode = back.d_mode;
        let inode_d_mode = inode.d_mode;
        assert_eq!(back_d_mode, inode_d_mode);
        let back_d_size = back.d_size;
        assert_eq!(back_d_size, 12345);
        let back_d_addr_0 = back.d_addr[0];
        assert_eq!(back_d_addr_0, 7);
        assert!(back.is_allocated());
        assert_eq!(back.kind().unwrap(), FileKind::Regular);
    }

    #[test]
    fn file_kind_rejects_unallocated_type_bits() {
        let inode = DiskInode::empty();
        assert!(inode.kind().is_err());
    }
}
