//! Compile-time geometry constants for the image format.
//!
//! The layout mirrors the reference `MoFS` sources: a reserved header, a
//! single padded superblock record, a packed inode region, then the data
//! region. See `SPEC_FULL.md` for the offset convention this crate locks in.

/// Size of a disk block, in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Size of the reserved header region (boot signature / kernel), in blocks.
pub const HEADER_BLOCKS: usize = 200;

/// Size of the reserved header region, in bytes.
pub const HEADER_SIG_SIZE: u64 = (HEADER_BLOCKS * BLOCK_SIZE) as u64;

/// On-disk size of the padded superblock record, in bytes.
pub const SB_RECORD_SIZE: u64 = 1024;

/// On-disk size of a single inode record, in bytes.
pub const DISK_INODE_SIZE: usize = 64;

/// Size of a directory entry: a 4-byte inode index plus a 28-byte name.
pub const DIRENT_SIZE: usize = 32;

/// Maximum length of a single path component, not counting the terminator.
pub const NAME_MAX_LENGTH: usize = 28;

/// Number of direct block pointers in `i_addr`.
pub const N_DIRECT: usize = 6;
/// Number of single-indirect block pointers in `i_addr` (indices 6-7).
pub const N_SINGLE_INDIRECT: usize = 2;
/// Number of double-indirect block pointers in `i_addr` (indices 8-9).
pub const N_DOUBLE_INDIRECT: usize = 2;
/// Total number of slots in `i_addr`.
pub const N_ADDR: usize = N_DIRECT + N_SINGLE_INDIRECT + N_DOUBLE_INDIRECT;

/// Number of block pointers that fit in one index block.
pub const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

/// Maximum number of logical blocks addressable by a single inode.
pub const MAX_FILE_BLOCKS: u64 = (N_DIRECT
    + N_SINGLE_INDIRECT * PTRS_PER_BLOCK
    + N_DOUBLE_INDIRECT * PTRS_PER_BLOCK * PTRS_PER_BLOCK) as u64;

/// Maximum file size in bytes.
pub const MAX_FILE_SIZE: u64 = MAX_FILE_BLOCKS * BLOCK_SIZE as u64;

/// Number of entries directly held by the free-block chain's head group.
pub const FREE_BLOCK_GROUP: usize = 100;
/// Number of entries directly held by the free-inode cache's head group.
pub const FREE_INODE_GROUP: usize = 100;

/// Capacity of the block buffer cache, in slots.
pub const BLOCK_CACHE_CAPACITY: usize = 128;
/// Capacity of the inode buffer cache, in slots.
pub const INODE_CACHE_CAPACITY: usize = 128;
/// Capacity of the in-memory inode table (the "systemMemInodeTable" arena).
pub const MEM_INODE_TABLE_CAPACITY: usize = 512;

/// Maximum number of descriptors open by a single session at a time,
/// including the descriptor holding the current working directory.
pub const MAX_OPEN_FILES: usize = 64;

/// Inode number of the filesystem root directory, fixed at creation time.
pub const ROOT_INODE: u32 = 0;
