//! Path resolution: walking a slash-separated path from either the root or
//! a session's working directory down to a target inode or its parent.

use crate::cache::{BlockCache, InodeCache};
use crate::config::NAME_MAX_LENGTH;
use crate::device::ImageDevice;
use crate::dirent;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::InodeHandle;
use crate::mem_inode_table::InodeTable;

fn split(path: &str) -> Result<Vec<&str>> {
    let path = if path == "." {
        ""
    } else {
        path.strip_prefix("./").unwrap_or(path)
    };
    let mut parts = Vec::new();
    for component in path.split('/') {
        if component.is_empty() {
            continue;
        }
        if component.len() >= NAME_MAX_LENGTH {
            return Err(Error::Fs(ErrorKind::NameTooLong));
        }
        parts.push(component);
    }
    Ok(parts)
}

fn starting_point(path: &str, root: InodeHandle, cwd: InodeHandle) -> InodeHandle {
    if path.starts_with('/') {
        root
    } else {
        cwd
    }
}

/// Descends into `dir` by one named component, returning the child's handle.
/// `dir` must be a directory; the caller's count on `dir` is left untouched.
fn step(
    table: &mut InodeTable,
    device: &mut ImageDevice,
    block_cache: &mut BlockCache,
    inode_cache: &mut InodeCache,
    dir: InodeHandle,
    name: &str,
) -> Result<InodeHandle> {
    let child_ino = {
        let dir_inode = table.get(dir)?;
        if !dir_inode.is_dir() {
            return Err(Error::Fs(ErrorKind::NotDir));
        }
        dirent::search(dir_inode, device, block_cache, name)?
    };
    let child_ino = child_ino.ok_or(Error::Fs(ErrorKind::NoEnt))?;
    table.acquire(child_ino, device, inode_cache)
}

/// Resolves `path` entirely, returning a handle to the target inode. The
/// returned handle is not pinned; callers that hold onto it across further
/// table activity must call `inc_count` themselves.
pub fn resolve(
    table: &mut InodeTable,
    device: &mut ImageDevice,
    block_cache: &mut BlockCache,
    inode_cache: &mut InodeCache,
    root: InodeHandle,
    cwd: InodeHandle,
    path: &str,
) -> Result<InodeHandle> {
    let parts = split(path)?;
    let mut current = starting_point(path, root, cwd);
    table.inc_count(current)?;
    for name in parts {
        let next = step(table, device, block_cache, inode_cache, current, name)?;
        table.dec_count(current)?;
        table.inc_count(next)?;
        current = next;
    }
    table.dec_count(current)?;
    Ok(current)
}

/// Resolves `path` down to its parent directory, returning the parent's
/// handle and the final component's name. Fails with [`ErrorKind::NoEnt`]
/// for a path with no final component (e.g. `"/"` or `""`).
pub fn resolve_parent<'p>(
    table: &mut InodeTable,
    device: &mut ImageDevice,
    block_cache: &mut BlockCache,
    inode_cache: &mut InodeCache,
    root: InodeHandle,
    cwd: InodeHandle,
    path: &'p str,
) -> Result<(InodeHandle, &'p str)> {
    let parts = split(path)?;
    let (leaf, parents) = parts.split_last().ok_or(Error::Fs(ErrorKind::NoEnt))?;
    let mut current = starting_point(path, root, cwd);
    table.inc_count(current)?;
    for name in parents {
        let next = step(table, device, block_cache, inode_cache, current, name)?;
        table.dec_count(current)?;
        table.inc_count(next)?;
        current = next;
    }
    table.dec_count(current)?;
    if !table.get(current)?.is_dir() {
        return Err(Error::Fs(ErrorKind::NotDir));
    }
    Ok((current, leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_collapses_consecutive_slashes() {
        assert_eq!(split("/a//b/").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn split_rejects_overlong_component() {
        let long = "a".repeat(NAME_MAX_LENGTH);
        assert!(matches!(
            split(&format!("/{long}")),
            Err(Error::Fs(ErrorKind::NameTooLong))
        ));
    }

    #[test]
    fn split_ignores_leading_dot_slash() {
        assert_eq!(split("./a/b").unwrap(), vec!["a", "b"]);
        assert!(split(".").unwrap().is_empty());
    }
}
