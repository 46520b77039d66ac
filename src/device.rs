//! The image device: byte-exact block/inode I/O against a single host file.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, trace};

use crate::config::{BLOCK_SIZE, DISK_INODE_SIZE, HEADER_SIG_SIZE, SB_RECORD_SIZE};
use crate::error::{Error, ErrorKind, Result};

/// A fixed-size byte container backed by a regular host file.
///
/// Byte offsets, locking the layout documented in `SPEC_FULL.md` §3:
/// - superblock record: `HEADER_SIG_SIZE`
/// - inode `n`: `HEADER_SIG_SIZE + SB_RECORD_SIZE + n * DISK_INODE_SIZE`
/// - data block `n`: `data_offset + n * BLOCK_SIZE`, where `data_offset` is
///   set once the superblock has been loaded (see [`ImageDevice::set_data_offset`]).
pub struct ImageDevice {
    file: File,
    data_offset: u64,
}

impl ImageDevice {
    /// Opens the image at `path`, creating a new (empty) host file if none
    /// exists yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|_| ErrorKind::Img)?;
        Ok(Self {
            file,
            data_offset: HEADER_SIG_SIZE + SB_RECORD_SIZE,
        })
    }

    /// Sets the offset, in bytes, of block index 0 in the data region. Must
    /// be called once the superblock's `s_isize` is known.
    pub fn set_data_offset(&mut self, offset: u64) {
        self.data_offset = offset;
    }

    fn exact_read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                Error::Fs(ErrorKind::Io)
            } else {
                Error::Io(e)
            }
        })
    }

    fn exact_write(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Reads block `n` into `buf`, which must be exactly [`BLOCK_SIZE`] bytes.
    pub fn read_block(&mut self, n: u64, buf: &mut [u8; BLOCK_SIZE]) -> Result<()> {
        trace!("read_block({n})");
        let off = self.data_offset + n * BLOCK_SIZE as u64;
        self.exact_read(off, buf)
    }

    /// Writes block `n` from `buf`, which must be exactly [`BLOCK_SIZE`] bytes.
    pub fn write_block(&mut self, n: u64, buf: &[u8; BLOCK_SIZE]) -> Result<()> {
        trace!("write_block({n})");
        let off = self.data_offset + n * BLOCK_SIZE as u64;
        self.exact_write(off, buf)
    }

    /// Reads the raw inode record `n` into `dst`.
    pub fn read_inode(&mut self, n: u32, dst: &mut [u8; DISK_INODE_SIZE]) -> Result<()> {
        let off = HEADER_SIG_SIZE + SB_RECORD_SIZE + n as u64 * DISK_INODE_SIZE as u64;
        self.exact_read(off, dst)
    }

    /// Writes the raw inode record `n` from `src`.
    pub fn write_inode(&mut self, n: u32, src: &[u8; DISK_INODE_SIZE]) -> Result<()> {
        let off = HEADER_SIG_SIZE + SB_RECORD_SIZE + n as u64 * DISK_INODE_SIZE as u64;
        self.exact_write(off, src)
    }

    /// Loads the superblock record into `dst`.
    pub fn load_superblock(&mut self, dst: &mut [u8; SB_RECORD_SIZE as usize]) -> Result<()> {
        debug!("loading superblock");
        self.exact_read(HEADER_SIG_SIZE, dst)
    }

    /// Stores the superblock record from `src`.
    pub fn store_superblock(&mut self, src: &[u8; SB_RECORD_SIZE as usize]) -> Result<()> {
        debug!("storing superblock");
        self.exact_write(HEADER_SIG_SIZE, src)
    }

    /// Flushes the host file handle, making all prior writes durable.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
