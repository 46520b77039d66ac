//! A self-contained UNIX-V6-style filesystem, stored entirely inside a
//! single host image file.
//!
//! The crate is organized bottom-up, mirroring the layering in `SPEC_FULL.md`:
//! [`device`] talks to the host file, [`cache`] buffers reads/writes over
//! it, [`superblock`] owns the free-block/free-inode allocators,
//! [`inode`]/[`mem_inode_table`] manage the in-memory inode pool,
//! [`blockmap`] translates file offsets to physical blocks, [`dirent`]
//! implements directory content, [`resolver`] walks paths, and
//! [`primitives`] exposes the POSIX-like surface on top of a mounted
//! [`fs::FileSystem`].

pub mod blockmap;
pub mod cache;
pub mod config;
pub mod device;
pub mod dirent;
pub mod error;
pub mod fs;
pub mod inode;
pub mod mem_inode_table;
pub mod openfile;
pub mod primitives;
pub mod resolver;
pub mod session;
mod util;

pub use error::{Error, ErrorKind, Result};
pub use fs::FileSystem;
pub use session::UserSession;
pub use superblock::FsParams;

mod superblock;
