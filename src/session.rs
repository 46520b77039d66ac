//! A single user's login session: credentials, working directory, and open
//! file table.

use crate::config::{MAX_OPEN_FILES, ROOT_INODE};
use crate::inode::InodeHandle;
use crate::openfile::FileTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Running,
    Shutdown,
}

pub struct UserSession {
    pub uid: u16,
    pub gid: u16,
    pub cwd: InodeHandle,
    pub files: FileTable,
    state: SessionState,
}

impl UserSession {
    /// Begins a session rooted at `cwd` (typically the filesystem root).
    pub fn new(uid: u16, gid: u16, cwd: InodeHandle) -> Self {
        Self {
            uid,
            gid,
            cwd,
            files: FileTable::new(MAX_OPEN_FILES),
            state: SessionState::Init,
        }
    }

    pub fn start(&mut self) {
        self.state = SessionState::Running;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn shutdown(&mut self) {
        self.state = SessionState::Shutdown;
    }

    pub fn root_inode() -> u32 {
        ROOT_INODE
    }
}
