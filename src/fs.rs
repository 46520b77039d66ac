//! The top-level filesystem handle: device, caches, allocator, and the
//! in-memory inode pool, wired together behind a single-writer borrow.

use std::path::Path;

use log::info;

use crate::cache::{BlockCache, InodeCache};
use crate::config::ROOT_INODE;
use crate::device::ImageDevice;
use crate::error::Result;
use crate::inode::{FileKind, InodeHandle};
use crate::mem_inode_table::InodeTable;
use crate::session::UserSession;
use crate::superblock::{FsParams, Superblock};

pub struct FileSystem {
    pub(crate) device: ImageDevice,
    pub(crate) block_cache: BlockCache,
    pub(crate) inode_cache: InodeCache,
    pub(crate) superblock: Superblock,
    pub(crate) table: InodeTable,
    pub(crate) root: InodeHandle,
}

impl FileSystem {
    /// Opens an existing, already-formatted image at `path`.
    pub fn mount<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut device = ImageDevice::open(path)?;
        let superblock = Superblock::load(&mut device)?;
        let mut table = InodeTable::new();
        let mut inode_cache = InodeCache::new();
        let root = table.acquire(ROOT_INODE, &mut device, &mut inode_cache)?;
        table.inc_count(root)?;
        info!("mounted image with {} data blocks", superblock.s_fsize);
        Ok(Self {
            device,
            block_cache: BlockCache::new(),
            inode_cache,
            superblock,
            table,
            root,
        })
    }

    /// Creates (or truncates) the image at `path` and formats a new,
    /// empty filesystem of the requested size.
    pub fn format<P: AsRef<Path>>(path: P, params: FsParams) -> Result<Self> {
        let mut device = ImageDevice::open(path)?;
        let (superblock, root_number) = Superblock::make_fs(&mut device, params)?;
        let mut table = InodeTable::new();
        let mut inode_cache = InodeCache::new();
        let mut block_cache = BlockCache::new();
        let root = table.acquire(root_number, &mut device, &mut inode_cache)?;
        table.inc_count(root)?;

        let fs = Self {
            device,
            block_cache,
            inode_cache,
            superblock,
            table,
            root,
        };
        info!("formatted new image at root inode {root_number}");
        Ok(fs)
    }

    pub fn root_handle(&self) -> InodeHandle {
        self.root
    }

    pub fn new_session(&mut self, uid: u16, gid: u16) -> Result<UserSession> {
        self.table.inc_count(self.root)?;
        let mut session = UserSession::new(uid, gid, self.root);
        session.start();
        Ok(session)
    }

    /// Creates a new on-disk inode of the given kind, pinned in the table
    /// but not yet linked into any directory.
    pub(crate) fn new_inode(&mut self, kind: FileKind, perm: u16, uid: u16, gid: u16) -> Result<InodeHandle> {
        let number = self.superblock.alloc_disk_inode(&mut self.device, &mut self.block_cache)?;
        let handle = self.table.acquire_new(number, &mut self.device, &mut self.inode_cache)?;
        let inode = self.table.get_mut(handle)?;
        inode.init(number, kind, perm, uid, gid);
        Ok(handle)
    }

    /// Closes every descriptor still open in `session`, flushes all dirty
    /// state, and stores the superblock.
    pub fn shutdown(&mut self, mut session: UserSession) -> Result<()> {
        let now = crate::mem_inode_table::InodeTable::timestamp_now();
        for file in session.files.drain() {
            self.table.write_back(file.inode, &mut self.device, &mut self.inode_cache, Some((now, now)))?;
            self.table.dec_count(file.inode)?;
            self.table.release_if_orphan(
                file.inode,
                &mut self.device,
                &mut self.block_cache,
                &mut self.inode_cache,
                &mut self.superblock,
            )?;
        }
        session.shutdown();
        self.table.dec_count(session.cwd)?;
        self.flush()
    }

    /// Writes back every dirty in-memory inode, flushes both buffer caches,
    /// stores the superblock, and syncs the underlying image file.
    pub fn flush(&mut self) -> Result<()> {
        self.table.flush_all(&mut self.device, &mut self.inode_cache)?;
        self.inode_cache.flush(&mut self.device)?;
        self.block_cache.flush(&mut self.device)?;
        self.superblock.store(&mut self.device)?;
        self.device.sync()?;
        Ok(())
    }
}
