//! The POSIX-like primitive surface: `creat`, `mkdir`, `open`, `read`,
//! `write`, `lseek`, `close`, `link`, `unlink`, `stat`, `inode_stat`,
//! `chdir`.

use crate::blockmap;
use crate::dirent;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::FileSystem;
use crate::inode::{FileKind, InodeHandle};
use crate::openfile::{self, OpenFile, Whence, O_APPEND, O_CREAT, O_DIRECTORY};
use crate::resolver;
use crate::session::UserSession;
use crate::util::get_timestamp;

/// `{ino, mode, nlink, uid, gid, size, atime, mtime}`, as filled by `stat`
/// and `inode_stat`.
#[derive(Debug, Clone, Copy)]
pub struct Stat {
    pub ino: u32,
    pub mode: u16,
    pub nlink: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u64,
    pub atime: u32,
    pub mtime: u32,
}

fn stat_of(fs: &FileSystem, handle: InodeHandle) -> Result<Stat> {
    let inode = fs.table.get(handle)?;
    Ok(Stat {
        ino: inode.i_number,
        mode: inode.i_mode,
        nlink: inode.i_nlink,
        uid: inode.i_uid,
        gid: inode.i_gid,
        size: inode.i_size,
        atime: inode.i_atime,
        mtime: inode.i_mtime,
    })
}

/// Creates a fresh inode of `kind` named by the final component of `path`
/// and opens it with `WRONLY`. Shared by `creat` and `mkdir`.
fn create_entry(
    fs: &mut FileSystem,
    session: &UserSession,
    path: &str,
    kind: FileKind,
    perm: u16,
) -> Result<InodeHandle> {
    let (parent, leaf) = resolver::resolve_parent(
        &mut fs.table,
        &mut fs.device,
        &mut fs.block_cache,
        &mut fs.inode_cache,
        fs.root,
        session.cwd,
        path,
    )?;
    if leaf.is_empty() {
        return Err(Error::Fs(ErrorKind::Exist));
    }
    {
        let parent_inode = fs.table.get(parent)?;
        if dirent::search(parent_inode, &mut fs.device, &mut fs.block_cache, leaf)?.is_some() {
            return Err(Error::Fs(ErrorKind::Exist));
        }
    }
    let child = fs.new_inode(kind, perm, session.uid, session.gid)?;
    let child_number = fs.table.get(child)?.i_number;
    {
        let parent_inode = fs.table.get_mut(parent)?;
        dirent::insert(
            parent_inode,
            &mut fs.device,
            &mut fs.block_cache,
            &mut fs.superblock,
            leaf,
            child_number,
        )?;
    }
    {
        let child_inode = fs.table.get_mut(child)?;
        child_inode.i_nlink = child_inode.i_nlink.saturating_add(1);
        child_inode.mark_dirty();
    }
    fs.table.write_back(parent, &mut fs.device, &mut fs.inode_cache, None)?;
    fs.table.write_back(child, &mut fs.device, &mut fs.inode_cache, None)?;
    Ok(child)
}

/// Creates a regular file, failing with `EXIST` if the leaf is already
/// present. Returns an open `WRONLY` descriptor.
pub fn creat(fs: &mut FileSystem, session: &mut UserSession, path: &str, mode: u16) -> Result<i32> {
    let handle = create_entry(fs, session, path, FileKind::Regular, mode)?;
    fs.table.inc_count(handle)?;
    let now = get_timestamp();
    {
        let inode = fs.table.get_mut(handle)?;
        inode.i_atime = now;
    }
    session.files.install(OpenFile::new(handle, openfile::O_WRONLY))
}

/// Creates a directory; same as `creat` with `FileKind::Directory`, closing
/// the descriptor on success.
pub fn mkdir(fs: &mut FileSystem, session: &mut UserSession, path: &str, mode: u16) -> Result<()> {
    create_entry(fs, session, path, FileKind::Directory, mode)?;
    Ok(())
}

/// Resolves `path`; if absent and `oflags` carries `CREAT`, falls back to
/// `creat`. Honors `DIRECTORY` and `APPEND`.
pub fn open(fs: &mut FileSystem, session: &mut UserSession, path: &str, oflags: u32, mode: u16) -> Result<i32> {
    let resolved = resolver::resolve(
        &mut fs.table,
        &mut fs.device,
        &mut fs.block_cache,
        &mut fs.inode_cache,
        fs.root,
        session.cwd,
        path,
    );
    let handle = match resolved {
        Ok(handle) => {
            fs.table.inc_count(handle)?;
            handle
        }
        Err(Error::Fs(ErrorKind::NoEnt)) if oflags & O_CREAT != 0 => {
            let handle = create_entry(fs, session, path, FileKind::Regular, mode)?;
            fs.table.inc_count(handle)?;
            handle
        }
        Err(e) => return Err(e),
    };

    {
        let inode = fs.table.get(handle)?;
        if let Err(e) = openfile::check_access(inode, session.uid, session.gid, oflags) {
            fs.table.dec_count(handle)?;
            return Err(e);
        }
        if oflags & O_DIRECTORY != 0 && !inode.is_dir() {
            fs.table.dec_count(handle)?;
            return Err(Error::Fs(ErrorKind::NotDir));
        }
    }

    let now = get_timestamp();
    let size = {
        let inode = fs.table.get_mut(handle)?;
        inode.i_atime = now;
        inode.i_size
    };
    let mut file = OpenFile::new(handle, oflags & openfile::O_RDWR | (oflags & O_APPEND));
    if oflags & O_APPEND != 0 {
        file.seek(Whence::Set, size as i64, size)?;
    }
    match session.files.install(file) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            fs.table.dec_count(handle)?;
            Err(e)
        }
    }
}

pub fn read(fs: &mut FileSystem, session: &mut UserSession, fd: i32, buf: &mut [u8]) -> Result<usize> {
    let (handle, offset) = {
        let file = session.files.get(fd)?;
        if !file.readable() {
            return Err(Error::Fs(ErrorKind::Perm));
        }
        (file.inode, file.offset)
    };
    let n = {
        let inode = fs.table.get(handle)?;
        blockmap::read(inode, &mut fs.device, &mut fs.block_cache, offset, buf)?
    };
    session.files.get_mut(fd)?.offset += n as u64;
    Ok(n)
}

pub fn write(fs: &mut FileSystem, session: &mut UserSession, fd: i32, buf: &[u8]) -> Result<usize> {
    let (handle, offset) = {
        let file = session.files.get(fd)?;
        if !file.writable() {
            return Err(Error::Fs(ErrorKind::Perm));
        }
        (file.inode, file.offset)
    };
    let n = {
        let inode = fs.table.get_mut(handle)?;
        blockmap::write(inode, &mut fs.device, &mut fs.block_cache, &mut fs.superblock, offset, buf)?
    };
    session.files.get_mut(fd)?.offset += n as u64;
    Ok(n)
}

pub fn lseek(fs: &FileSystem, session: &mut UserSession, fd: i32, offset: i64, whence: Whence) -> Result<u64> {
    let handle = session.files.get(fd)?.inode;
    let size = fs.table.get(handle)?.i_size;
    session.files.get_mut(fd)?.seek(whence, offset, size)
}

/// Rejects closing the session's working-directory descriptor; otherwise
/// decrements the inode's reference count and writes it back on last close,
/// releasing it if it is now an orphan.
pub fn close(fs: &mut FileSystem, session: &mut UserSession, fd: i32) -> Result<()> {
    let file = session.files.get(fd)?;
    if file.inode == session.cwd {
        return Err(Error::Fs(ErrorKind::Busy));
    }
    let file = session.files.take(fd)?;
    let now = get_timestamp();
    fs.table.write_back(file.inode, &mut fs.device, &mut fs.inode_cache, Some((now, now)))?;
    fs.table.dec_count(file.inode)?;
    fs.table.release_if_orphan(
        file.inode,
        &mut fs.device,
        &mut fs.block_cache,
        &mut fs.inode_cache,
        &mut fs.superblock,
    )?;
    Ok(())
}

/// Links a new directory entry at `dst` pointing at the inode resolved
/// from `src`.
pub fn link(fs: &mut FileSystem, session: &UserSession, src: &str, dst: &str) -> Result<()> {
    let target = resolver::resolve(
        &mut fs.table,
        &mut fs.device,
        &mut fs.block_cache,
        &mut fs.inode_cache,
        fs.root,
        session.cwd,
        src,
    )?;
    fs.table.inc_count(target)?;
    let result = (|| -> Result<()> {
        let (parent, leaf) = resolver::resolve_parent(
            &mut fs.table,
            &mut fs.device,
            &mut fs.block_cache,
            &mut fs.inode_cache,
            fs.root,
            session.cwd,
            dst,
        )?;
        if leaf.is_empty() {
            return Err(Error::Fs(ErrorKind::Exist));
        }
        {
            let parent_inode = fs.table.get(parent)?;
            if dirent::search(parent_inode, &mut fs.device, &mut fs.block_cache, leaf)?.is_some() {
                return Err(Error::Fs(ErrorKind::Exist));
            }
        }
        let target_number = fs.table.get(target)?.i_number;
        {
            let parent_inode = fs.table.get_mut(parent)?;
            dirent::insert(parent_inode, &mut fs.device, &mut fs.block_cache, &mut fs.superblock, leaf, target_number)?;
        }
        fs.table.write_back(parent, &mut fs.device, &mut fs.inode_cache, None)?;
        {
            let target_inode = fs.table.get_mut(target)?;
            target_inode.i_nlink = target_inode.i_nlink.saturating_add(1);
            target_inode.mark_dirty();
        }
        fs.table.write_back(target, &mut fs.device, &mut fs.inode_cache, None)?;
        Ok(())
    })();
    fs.table.dec_count(target)?;
    result
}

/// Removes the directory entry named by `path`'s final component. Fails if
/// the target is a non-empty directory, or `BUSY` if any descriptor still
/// holds the target open.
pub fn unlink(fs: &mut FileSystem, session: &UserSession, path: &str) -> Result<()> {
    let (parent, leaf) = resolver::resolve_parent(
        &mut fs.table,
        &mut fs.device,
        &mut fs.block_cache,
        &mut fs.inode_cache,
        fs.root,
        session.cwd,
        path,
    )?;
    if leaf.is_empty() {
        return Err(Error::Fs(ErrorKind::Perm));
    }
    let target_number = {
        let parent_inode = fs.table.get(parent)?;
        dirent::search(parent_inode, &mut fs.device, &mut fs.block_cache, leaf)?
            .ok_or(Error::Fs(ErrorKind::NoEnt))?
    };
    let target = fs.table.acquire(target_number, &mut fs.device, &mut fs.inode_cache)?;
    {
        let target_inode = fs.table.get(target)?;
        if target_inode.i_count > 0 {
            return Err(Error::Fs(ErrorKind::Busy));
        }
        if target_inode.is_dir() && dirent::has_entries(target_inode, &mut fs.device, &mut fs.block_cache)? {
            return Err(Error::Fs(ErrorKind::NotEmpty));
        }
    }
    {
        let parent_inode = fs.table.get_mut(parent)?;
        dirent::remove(parent_inode, &mut fs.device, &mut fs.block_cache, &mut fs.superblock, leaf)?;
    }
    fs.table.write_back(parent, &mut fs.device, &mut fs.inode_cache, None)?;
    let now_empty = {
        let target_inode = fs.table.get_mut(target)?;
        target_inode.i_nlink = target_inode.i_nlink.saturating_sub(1);
        target_inode.mark_dirty();
        target_inode.i_nlink == 0
    };
    fs.table.write_back(target, &mut fs.device, &mut fs.inode_cache, None)?;
    if now_empty {
        fs.table.release_if_orphan(
            target,
            &mut fs.device,
            &mut fs.block_cache,
            &mut fs.inode_cache,
            &mut fs.superblock,
        )?;
    }
    Ok(())
}

pub fn stat(fs: &mut FileSystem, session: &UserSession, path: &str) -> Result<Stat> {
    let handle = resolver::resolve(
        &mut fs.table,
        &mut fs.device,
        &mut fs.block_cache,
        &mut fs.inode_cache,
        fs.root,
        session.cwd,
        path,
    )?;
    stat_of(fs, handle)
}

pub fn inode_stat(fs: &mut FileSystem, ino: u32) -> Result<Stat> {
    let handle = fs.table.acquire(ino, &mut fs.device, &mut fs.inode_cache)?;
    stat_of(fs, handle)
}

/// Opens `path` as a directory with read/write access, closes the previous
/// working directory without updating its time, and installs the new one.
pub fn chdir(fs: &mut FileSystem, session: &mut UserSession, path: &str) -> Result<()> {
    let handle = resolver::resolve(
        &mut fs.table,
        &mut fs.device,
        &mut fs.block_cache,
        &mut fs.inode_cache,
        fs.root,
        session.cwd,
        path,
    )?;
    {
        let inode = fs.table.get(handle)?;
        if !inode.is_dir() {
            return Err(Error::Fs(ErrorKind::NotDir));
        }
        openfile::check_access(inode, session.uid, session.gid, openfile::O_RDWR)?;
    }
    fs.table.inc_count(handle)?;
    let previous = session.cwd;
    session.cwd = handle;
    fs.table.dec_count(previous)?;
    Ok(())
}
