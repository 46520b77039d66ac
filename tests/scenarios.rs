//! Literal end-to-end scenarios, verbatim from the design document's
//! concrete-scenario list (S1-S6).

use mofs::openfile::{Whence, O_CREAT, O_DIRECTORY, O_RDONLY, O_RDWR, O_WRONLY};
use mofs::{primitives as p, ErrorKind, FileSystem, FsParams};

fn format(path: &std::path::Path, total_bytes: u64, inode_count: u32) -> FileSystem {
    FileSystem::format(
        path,
        FsParams {
            total_bytes,
            inode_count,
        },
    )
    .expect("format")
}

/// S1: create a nested file, write a short string, close, reopen read-only,
/// read it back.
#[test]
fn s1_write_then_reopen_reads_back() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 32 * 1024 * 1024, 2048);
    let mut session = fs.new_session(0, 0).unwrap();

    p::mkdir(&mut fs, &mut session, "/hello", 0o777).unwrap();
    let fd = p::creat(&mut fs, &mut session, "/hello/2.txt", 0o777).unwrap();
    let n = p::write(&mut fs, &mut session, fd, b"Hello Morning!").unwrap();
    assert_eq!(n, 14);
    p::close(&mut fs, &mut session, fd).unwrap();

    let fd2 = p::open(&mut fs, &mut session, "/hello/2.txt", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 14];
    let read = p::read(&mut fs, &mut session, fd2, &mut buf).unwrap();
    assert_eq!(read, 14);
    assert_eq!(&buf, b"Hello Morning!");
}

/// S2: hard-linking bumps nlink on the shared inode; unlinking the link
/// drops it back down without touching the original.
#[test]
fn s2_link_and_unlink_track_nlink() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 32 * 1024 * 1024, 2048);
    let mut session = fs.new_session(0, 0).unwrap();

    p::mkdir(&mut fs, &mut session, "/hello", 0o777).unwrap();
    let fd = p::creat(&mut fs, &mut session, "/hello/2.txt", 0o777).unwrap();
    p::close(&mut fs, &mut session, fd).unwrap();

    let before = p::stat(&mut fs, &session, "/hello/2.txt").unwrap();
    assert_eq!(before.nlink, 1);

    p::link(&mut fs, &session, "/hello/2.txt", "/3.txt").unwrap();
    let linked = p::stat(&mut fs, &session, "/hello/2.txt").unwrap();
    assert_eq!(linked.nlink, 2);
    let original_ino = linked.ino;

    p::unlink(&mut fs, &session, "/3.txt").unwrap();
    let after = p::stat(&mut fs, &session, "/hello/2.txt").unwrap();
    assert_eq!(after.nlink, 1);
    assert_eq!(after.ino, original_ino);
}

/// S3: a directory containing an entry cannot be unlinked until the entry
/// is removed first.
#[test]
fn s3_unlink_nonempty_directory_fails_then_succeeds() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 32 * 1024 * 1024, 2048);
    let mut session = fs.new_session(0, 0).unwrap();

    p::mkdir(&mut fs, &mut session, "/d", 0o777).unwrap();
    let fd = p::creat(&mut fs, &mut session, "/d/x", 0o777).unwrap();
    p::close(&mut fs, &mut session, fd).unwrap();

    let err = p::unlink(&mut fs, &session, "/d").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotEmpty);

    p::unlink(&mut fs, &session, "/d/x").unwrap();
    p::unlink(&mut fs, &session, "/d").unwrap();
}

/// S4: writing a byte just before and just after the direct/single-indirect
/// boundary (logical block 6) round-trips and leaves the expected size.
#[test]
fn s4_write_across_single_indirect_boundary() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 32 * 1024 * 1024, 2048);
    let mut session = fs.new_session(0, 0).unwrap();

    const BLOCK_SIZE: u64 = 512;
    let fd = p::creat(&mut fs, &mut session, "/boundary", 0o777).unwrap();

    p::lseek(&fs, &mut session, fd, (6 * BLOCK_SIZE - 1) as i64, Whence::Set).unwrap();
    p::write(&mut fs, &mut session, fd, &[0xAA]).unwrap();
    p::lseek(&fs, &mut session, fd, (6 * BLOCK_SIZE) as i64, Whence::Set).unwrap();
    p::write(&mut fs, &mut session, fd, &[0xBB]).unwrap();
    p::close(&mut fs, &mut session, fd).unwrap();

    let fd2 = p::open(&mut fs, &mut session, "/boundary", O_RDONLY, 0).unwrap();
    let mut byte = [0u8; 1];
    p::lseek(&fs, &mut session, fd2, (6 * BLOCK_SIZE - 1) as i64, Whence::Set).unwrap();
    p::read(&mut fs, &mut session, fd2, &mut byte).unwrap();
    assert_eq!(byte[0], 0xAA);
    p::lseek(&fs, &mut session, fd2, (6 * BLOCK_SIZE) as i64, Whence::Set).unwrap();
    p::read(&mut fs, &mut session, fd2, &mut byte).unwrap();
    assert_eq!(byte[0], 0xBB);

    let st = p::stat(&mut fs, &session, "/boundary").unwrap();
    assert_eq!(st.size, 6 * BLOCK_SIZE + 1);
}

/// S5: writing more distinct blocks than the buffer cache holds, then a
/// clean shutdown and remount, must not lose any dirty-buffer content to
/// eviction.
#[test]
fn s5_cache_eviction_survives_shutdown_and_remount() {
    let image = tempfile::NamedTempFile::new().unwrap();
    const BLOCK_SIZE: usize = 512;
    let blocks = mofs::config::BLOCK_CACHE_CAPACITY + 32;

    {
        let mut fs = format(image.path(), 64 * 1024 * 1024, 2048);
        let mut session = fs.new_session(0, 0).unwrap();
        let fd = p::creat(&mut fs, &mut session, "/wide", 0o777).unwrap();
        for i in 0..blocks {
            let pattern = (i % 256) as u8;
            p::lseek(&fs, &mut session, fd, (i * BLOCK_SIZE) as i64, Whence::Set).unwrap();
            p::write(&mut fs, &mut session, fd, &[pattern; BLOCK_SIZE]).unwrap();
        }
        p::close(&mut fs, &mut session, fd).unwrap();
        fs.shutdown(session).unwrap();
    }

    let mut fs = FileSystem::mount(image.path()).unwrap();
    let mut session = fs.new_session(0, 0).unwrap();
    let fd = p::open(&mut fs, &mut session, "/wide", O_RDONLY, 0).unwrap();
    let mut buf = [0u8; BLOCK_SIZE];
    for i in 0..blocks {
        p::lseek(&fs, &mut session, fd, (i * BLOCK_SIZE) as i64, Whence::Set).unwrap();
        let n = p::read(&mut fs, &mut session, fd, &mut buf).unwrap();
        assert_eq!(n, BLOCK_SIZE);
        assert!(buf.iter().all(|&b| b == (i % 256) as u8));
    }
}

/// S6: a session without read permission on a file it does not own is
/// denied.
#[test]
fn s6_permission_denied_across_sessions() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 32 * 1024 * 1024, 2048);

    let mut owner = fs.new_session(0, 0).unwrap();
    let fd = p::creat(&mut fs, &mut owner, "/a", 0o700).unwrap();
    p::close(&mut fs, &mut owner, fd).unwrap();

    let mut other = fs.new_session(2, 2).unwrap();
    let err = p::open(&mut fs, &mut other, "/a", O_RDONLY, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Perm);
}

/// `creat` then `stat` observes the requested mode and zero size.
#[test]
fn creat_then_stat_observes_mode_and_zero_size() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 8 * 1024 * 1024, 256);
    let mut session = fs.new_session(0, 0).unwrap();

    let fd = p::creat(&mut fs, &mut session, "/f", 0o640).unwrap();
    let st = p::stat(&mut fs, &session, "/f").unwrap();
    assert_eq!(st.mode & 0o777, 0o640);
    assert_eq!(st.size, 0);
    p::close(&mut fs, &mut session, fd).unwrap();
}

/// `write` then `seek(SET, 0)` then `read` reproduces the written bytes and
/// leaves the offset at the read length.
#[test]
fn write_seek_read_round_trips_and_advances_offset() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 8 * 1024 * 1024, 256);
    let mut session = fs.new_session(0, 0).unwrap();

    let fd = p::creat(&mut fs, &mut session, "/rt", 0o644).unwrap();
    p::write(&mut fs, &mut session, fd, b"round trip").unwrap();
    p::lseek(&fs, &mut session, fd, 0, Whence::Set).unwrap();
    let mut out = [0u8; 10];
    p::read(&mut fs, &mut session, fd, &mut out).unwrap();
    assert_eq!(&out, b"round trip");
    let offset_after = p::lseek(&fs, &mut session, fd, 0, Whence::Cur).unwrap();
    assert_eq!(offset_after, 10);
}

/// A second `mkdir` of the same path fails with `EXIST`.
#[test]
fn mkdir_twice_fails_with_exist() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 8 * 1024 * 1024, 256);
    let mut session = fs.new_session(0, 0).unwrap();

    p::mkdir(&mut fs, &mut session, "/again", 0o777).unwrap();
    let err = p::mkdir(&mut fs, &mut session, "/again", 0o777).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Exist);
}

/// Opening a directory with `DIRECTORY` set succeeds; opening a regular
/// file the same way fails with `NOTDIR`.
#[test]
fn open_directory_flag_enforces_directory_type() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 8 * 1024 * 1024, 256);
    let mut session = fs.new_session(0, 0).unwrap();

    p::mkdir(&mut fs, &mut session, "/dir", 0o777).unwrap();
    let fd = p::open(&mut fs, &mut session, "/dir", O_RDONLY | O_DIRECTORY, 0).unwrap();
    p::close(&mut fs, &mut session, fd).unwrap();

    let fd2 = p::creat(&mut fs, &mut session, "/plain", 0o644).unwrap();
    p::close(&mut fs, &mut session, fd2).unwrap();
    let err = p::open(&mut fs, &mut session, "/plain", O_RDONLY | O_DIRECTORY, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotDir);
}

/// `open` with `CREAT` on a missing path falls back to creating it.
#[test]
fn open_with_creat_falls_back_to_creating() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 8 * 1024 * 1024, 256);
    let mut session = fs.new_session(0, 0).unwrap();

    let fd = p::open(&mut fs, &mut session, "/new", O_WRONLY | O_CREAT, 0o644).unwrap();
    p::write(&mut fs, &mut session, fd, b"x").unwrap();
    p::close(&mut fs, &mut session, fd).unwrap();

    let st = p::stat(&mut fs, &session, "/new").unwrap();
    assert_eq!(st.size, 1);
}

/// `close` on a descriptor referring to the session's current working
/// directory inode is rejected.
#[test]
fn close_rejects_cwd_descriptor() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 8 * 1024 * 1024, 256);
    let mut session = fs.new_session(0, 0).unwrap();

    p::mkdir(&mut fs, &mut session, "/cd", 0o777).unwrap();
    p::chdir(&mut fs, &mut session, "/cd").unwrap();
    let cwd_fd = p::open(&mut fs, &mut session, ".", O_RDWR | O_DIRECTORY, 0).unwrap();
    let err = p::close(&mut fs, &mut session, cwd_fd).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
}

/// Unlinking a file still held open by a descriptor fails with `BUSY`.
#[test]
fn unlink_while_open_is_busy() {
    let image = tempfile::NamedTempFile::new().unwrap();
    let mut fs = format(image.path(), 8 * 1024 * 1024, 256);
    let mut session = fs.new_session(0, 0).unwrap();

    let fd = p::creat(&mut fs, &mut session, "/held", 0o644).unwrap();
    let err = p::unlink(&mut fs, &session, "/held").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);
    p::close(&mut fs, &mut session, fd).unwrap();
    p::unlink(&mut fs, &session, "/held").unwrap();
}
