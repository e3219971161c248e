//! Integration test: buffered read/write/flush/close round-trips.
//!
//! Run: cargo test -p prepio-core --test buffered_file_test

use std::path::{Path, PathBuf};

use prepio_core::{BufferedFile, BufferedFileError, ErrorKind, OpenMode, OpenOptions};

fn scratch_dir(prefix: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn write_file(path: &Path, data: &[u8], capacity: usize) {
    let opts = OpenOptions::new(OpenMode::ReadWrite)
        .create(true)
        .truncate(true)
        .permissions(0o644)
        .capacity(capacity);
    let mut bf = BufferedFile::open(path, &opts).expect("open for write");
    for chunk in data.chunks(capacity) {
        assert_eq!(bf.write(chunk).expect("write"), chunk.len());
    }
    bf.flush().expect("flush");
    bf.close().expect("close");
}

fn read_all(path: &Path, capacity: usize) -> Vec<u8> {
    let opts = OpenOptions::new(OpenMode::ReadOnly).capacity(capacity);
    let mut bf = BufferedFile::open(path, &opts).expect("open for read");
    let mut out = Vec::new();
    let mut chunk = [0u8; 7];
    loop {
        let n = bf.read(&mut chunk).expect("read");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    bf.close().expect("close");
    out
}

#[test]
fn round_trip_through_buffered_handles() {
    let dir = scratch_dir("prepio-roundtrip");
    let cases: [&[u8]; 4] = [
        b"Hello, Buffered World!",
        b"",
        b"\x00\x01\x02binary\xff\xfe",
        &[b'z'; 300],
    ];
    for (i, data) in cases.iter().enumerate() {
        let path = dir.join(format!("case{i}.bin"));
        write_file(&path, data, 16);

        let mut bf = BufferedFile::open(&path, &OpenOptions::new(OpenMode::ReadOnly))
            .expect("reopen");
        let mut buf = vec![0u8; data.len()];
        assert_eq!(bf.read(&mut buf).expect("read"), data.len());
        assert_eq!(&buf, data);
        bf.close().expect("close");

        assert_eq!(read_all(&path, 5), *data);
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn append_composes_after_existing_content() {
    let dir = scratch_dir("prepio-append");
    let path = dir.join("append.txt");
    write_file(&path, b"Hello, Buffered World!", 64);

    let opts = OpenOptions::from_oflags(libc::O_RDWR | libc::O_APPEND, 0o644).expect("flags");
    let mut bf = BufferedFile::open(&path, &opts).expect("open append");
    assert!(bf.is_append_mode());
    assert!(!bf.is_insertion_mode());
    bf.write(b" Append!").expect("write");
    bf.close().expect("close");

    assert_eq!(read_all(&path, 8), b"Hello, Buffered World! Append!");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn append_handle_keeps_reading_where_it_was() {
    let dir = scratch_dir("prepio-append-read");
    let path = dir.join("mixed.txt");
    write_file(&path, b"abcdefghij", 64);

    let opts = OpenOptions::new(OpenMode::Append).capacity(4);
    let mut bf = BufferedFile::open(&path, &opts).expect("open append");
    let mut head = [0u8; 2];
    assert_eq!(bf.read(&mut head).expect("read"), 2);
    bf.write(b"XYZ").expect("write");
    bf.flush().expect("flush");

    let mut rest = [0u8; 16];
    let n = bf.read(&mut rest).expect("read rest");
    assert_eq!(&rest[..n], b"cdefghijXYZ");
    bf.close().expect("close");
    assert_eq!(std::fs::read(&path).expect("read back"), b"abcdefghijXYZ");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn empty_flush_never_touches_the_file() {
    let dir = scratch_dir("prepio-empty-flush");
    let path = dir.join("stable.txt");
    write_file(&path, b"Test2Test1Test3", 64);

    for mode in [
        OpenMode::ReadOnly,
        OpenMode::ReadWrite,
        OpenMode::Append,
        OpenMode::Prepend,
    ] {
        let mut bf = BufferedFile::open(&path, &OpenOptions::new(mode)).expect("open");
        let mut four = [0u8; 4];
        bf.read(&mut four).expect("read");
        assert_eq!(&four, b"Test");
        bf.flush().expect("empty flush");
        bf.flush().expect("second empty flush");
        assert_eq!(std::fs::read(&path).expect("read"), b"Test2Test1Test3");
        bf.close().expect("close");
        assert_eq!(std::fs::read(&path).expect("read"), b"Test2Test1Test3");
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn successive_small_reads_match_one_large_read() {
    let dir = scratch_dir("prepio-continuity");
    let path = dir.join("twenty.txt");
    let content = b"Test5Test5Test5Test2Test1Test3";
    write_file(&path, content, 64);

    for capacity in [1usize, 3, 7, 8, 20, 4096] {
        let opts = OpenOptions::new(OpenMode::ReadWrite).capacity(capacity);

        let mut whole = BufferedFile::open(&path, &opts).expect("open");
        let mut one = [0u8; 20];
        assert_eq!(whole.read(&mut one).expect("read 20"), 20);
        whole.close().expect("close");

        let mut pieces = BufferedFile::open(&path, &opts).expect("open");
        let mut four = [0u8; 20];
        for i in 0..4 {
            let n = pieces.read(&mut four[i * 5..(i + 1) * 5]).expect("read 5");
            assert_eq!(n, 5, "capacity {capacity}, chunk {i}");
        }
        pieces.flush().expect("empty flush");
        pieces.close().expect("close");

        assert_eq!(one, four, "capacity {capacity}");
        assert_eq!(&one, b"Test5Test5Test5Test2");
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn short_read_at_end_of_file_then_zero() {
    let dir = scratch_dir("prepio-eof");
    let path = dir.join("short.txt");
    write_file(&path, b"0123456789", 64);

    let opts = OpenOptions::new(OpenMode::ReadOnly).capacity(4);
    let mut bf = BufferedFile::open(&path, &opts).expect("open");
    let mut first = [0u8; 6];
    assert_eq!(bf.read(&mut first).expect("read"), 6);
    let mut big = [0u8; 100];
    assert_eq!(bf.read(&mut big).expect("read"), 4);
    assert_eq!(&big[..4], b"6789");
    assert_eq!(bf.read(&mut big).expect("read at eof"), 0);
    assert_eq!(bf.read(&mut big).expect("read at eof again"), 0);
    bf.close().expect("close");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn zero_length_read_and_write_are_no_ops() {
    let dir = scratch_dir("prepio-zero");
    let path = dir.join("zero.txt");
    write_file(&path, b"abc", 8);

    let mut bf = BufferedFile::open(&path, &OpenOptions::new(OpenMode::ReadWrite)).expect("open");
    assert_eq!(bf.read(&mut []).expect("read"), 0);
    assert_eq!(bf.buffered_read_len(), 0);
    assert_eq!(bf.write(b"").expect("write"), 0);
    assert_eq!(bf.pending_write_len(), 0);
    bf.close().expect("close");
    assert_eq!(std::fs::read(&path).expect("read"), b"abc");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn oversized_single_write_is_a_hard_error() {
    let dir = scratch_dir("prepio-overflow");
    let path = dir.join("overflow.txt");
    let opts = OpenOptions::new(OpenMode::WriteOnly)
        .create(true)
        .truncate(true)
        .capacity(8);
    let mut bf = BufferedFile::open(&path, &opts).expect("open");
    let err = bf.write(&[0u8; 9]).expect_err("must overflow");
    assert_eq!(err.kind(), ErrorKind::BufferOverflow);
    assert_eq!(err.errno(), libc::EFBIG);
    assert_eq!(bf.write(&[1u8; 8]).expect("exact fit"), 8);
    bf.close().expect("close");
    assert_eq!(std::fs::read(&path).expect("read"), vec![1u8; 8]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn write_only_handle_reports_read_errors() {
    let dir = scratch_dir("prepio-wronly");
    let path = dir.join("wronly.txt");
    write_file(&path, b"abc", 8);

    let mut bf = BufferedFile::open(&path, &OpenOptions::new(OpenMode::WriteOnly)).expect("open");
    let mut buf = [0u8; 2];
    let err = bf.read(&mut buf).expect_err("read on write-only");
    assert!(matches!(err, BufferedFileError::Read { errno: libc::EBADF }));
    bf.close().expect("close");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn write_only_append_opens_a_write_only_file() {
    use std::os::unix::fs::PermissionsExt;

    let dir = scratch_dir("prepio-append-wronly");
    let path = dir.join("sink.log");
    write_file(&path, b"first\n", 16);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o200)).expect("chmod");

    let mut bf = BufferedFile::open_with_flags(&path, libc::O_WRONLY | libc::O_APPEND, 0)
        .expect("write permission is enough to append");
    assert_eq!(bf.mode(), OpenMode::AppendOnly);
    assert!(bf.is_append_mode());
    bf.write(b"second\n").expect("write");
    let mut buf = [0u8; 2];
    let err = bf.read(&mut buf).expect_err("no read access");
    assert!(matches!(err, BufferedFileError::Read { errno: libc::EBADF }));
    bf.close().expect("close");

    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).expect("chmod");
    assert_eq!(std::fs::read(&path).expect("read"), b"first\nsecond\n");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn flush_failure_surfaces_and_close_reports_it() {
    // /dev/full accepts the open and fails every write with ENOSPC.
    let opts = OpenOptions::new(OpenMode::WriteOnly).capacity(16);
    let Ok(mut bf) = BufferedFile::open("/dev/full", &opts) else {
        return;
    };
    bf.write(b"doomed").expect("buffered");
    let err = bf.flush().expect_err("flush to /dev/full");
    assert!(matches!(
        err,
        BufferedFileError::Write {
            errno: libc::ENOSPC,
            committed: 0,
            pending: 6
        }
    ));
    // Nothing was committed, so the bytes are still pending.
    assert_eq!(bf.pending_write_len(), 6);

    let err = bf.close().expect_err("close must report the flush failure");
    assert_eq!(err.kind(), ErrorKind::Write);
    assert_eq!(err.errno(), libc::ENOSPC);
}

#[test]
fn implicit_flush_failure_fails_the_write() {
    let opts = OpenOptions::new(OpenMode::WriteOnly).capacity(4);
    let Ok(mut bf) = BufferedFile::open("/dev/full", &opts) else {
        return;
    };
    assert_eq!(bf.write(b"abc").expect("fits"), 3);
    let err = bf.write(b"de").expect_err("needs a flush that fails");
    assert_eq!(err.errno(), libc::ENOSPC);
    assert_eq!(bf.pending_write_len(), 3);
    let _ = bf.close();
}

#[test]
fn conflicting_flags_are_rejected_at_open() {
    let dir = scratch_dir("prepio-conflict");
    let path = dir.join("c.txt");
    let err = BufferedFile::open_with_flags(
        &path,
        libc::O_RDWR | libc::O_CREAT | libc::O_APPEND | prepio_core::O_PREAPPEND,
        0o644,
    )
    .expect_err("append+prepend");
    assert!(matches!(err, BufferedFileError::ConflictingModes));
    assert!(!path.exists(), "rejected before reaching the kernel");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn metrics_track_operations() {
    let before = prepio_core::global_metrics().snapshot();
    let dir = scratch_dir("prepio-metrics");
    let path = dir.join("m.txt");
    write_file(&path, b"counted", 8);
    let after = prepio_core::global_metrics().snapshot();
    assert!(after.opens > before.opens);
    assert!(after.flushes > before.flushes);
    assert!(after.bytes_accepted >= before.bytes_accepted + 7);
    assert!(after.closes > before.closes);
    let _ = std::fs::remove_dir_all(&dir);
}
