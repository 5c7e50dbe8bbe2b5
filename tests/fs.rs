//! End-to-end scenarios over freshly formatted images.

use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use tinyufs::{FileType, FsError, TinyUfs, Whence, BSIZE, NDENTRY};

/// Blocks left for file content on a fresh image: 65,536 minus the 16
/// free-map blocks and the 34 metadata blocks laid down by format.
const FREE_AFTER_FORMAT: usize = 65536 - 16 - 34;

/// Bytes a single file can hold before the store runs dry: every free
/// block minus one indirect index, one outer index and 254 inner
/// index blocks, times the block size.
const FILL_CAPACITY: u64 = ((FREE_AFTER_FORMAT - 1 - 1 - 254) * BSIZE) as u64;

fn image(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

/// The fill pattern, derived from the absolute byte offset so any
/// span can be checked without holding the whole file in memory.
fn pat(off: u64) -> u8 {
    (off % 251) as u8
}

#[test]
fn format_then_mount_lists_empty_root() {
    let dir = TempDir::new().unwrap();
    let img = image(&dir, "a.img");
    let fs = TinyUfs::format(&img).unwrap();
    fs.unmount().unwrap();

    let mut fs = TinyUfs::mount(&img).unwrap();
    assert!(fs.get_dir("/").unwrap().is_empty());
    assert_eq!(fs.free_blocks(), FREE_AFTER_FORMAT);
    assert_eq!(fs.used_inodes(), 1);
    fs.unmount().unwrap();
}

#[test]
fn mount_rejects_a_wrong_sized_image() {
    let dir = TempDir::new().unwrap();
    let img = image(&dir, "short.img");
    std::fs::write(&img, b"not an image").unwrap();
    assert!(matches!(TinyUfs::mount(&img), Err(FsError::BadImage(_))));
}

#[test]
fn write_seek_read_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/a", FileType::Directory).unwrap();
    fs.create("/a/b", FileType::Regular).unwrap();

    let fd = fs.open("/a/b").unwrap();
    assert_eq!(fd, 0);
    assert_eq!(fs.write(fd, b"hello").unwrap(), 5);
    assert_eq!(fs.seek(fd, 0, Whence::Set).unwrap(), 0);
    let mut buf = [0u8; 5];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
}

#[test]
fn read_stops_at_eof_and_write_extends() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/f", FileType::Regular).unwrap();
    let fd = fs.open("/f").unwrap();
    fs.write(fd, b"0123456789").unwrap();

    let mut buf = [0u8; 32];
    fs.seek(fd, 4, Whence::Set).unwrap();
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"456789");
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);

    // Overwriting inside the file never shrinks it.
    fs.seek(fd, 0, Whence::Set).unwrap();
    fs.write(fd, b"ab").unwrap();
    assert_eq!(fs.seek(fd, 0, Whence::End).unwrap(), 10);
}

#[test]
fn seek_clamps_to_file_bounds() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/f", FileType::Regular).unwrap();
    let fd = fs.open("/f").unwrap();
    fs.write(fd, &[7u8; 100]).unwrap();

    assert_eq!(fs.seek(fd, -5, Whence::Set).unwrap(), 0);
    assert_eq!(fs.seek(fd, 1000, Whence::Set).unwrap(), 100);
    assert_eq!(fs.seek(fd, -30, Whence::Cur).unwrap(), 70);
    assert_eq!(fs.seek(fd, -230, Whence::Cur).unwrap(), 0);
    assert_eq!(fs.seek(fd, -1, Whence::End).unwrap(), 99);
    assert_eq!(fs.seek(fd, 1, Whence::End).unwrap(), 100);
}

#[test]
fn descriptors_are_independent_and_closable() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/f", FileType::Regular).unwrap();
    let a = fs.open("/f").unwrap();
    let b = fs.open("/f").unwrap();
    assert_ne!(a, b);
    fs.write(a, b"xyz").unwrap();

    // The second cursor still sits at BOF.
    let mut buf = [0u8; 3];
    assert_eq!(fs.read(b, &mut buf).unwrap(), 3);
    assert_eq!(&buf, b"xyz");

    fs.close(a).unwrap();
    assert!(matches!(fs.close(a), Err(FsError::BadDescriptor)));
    assert!(matches!(fs.read(a, &mut buf), Err(FsError::BadDescriptor)));
    assert!(matches!(fs.open("/a/b"), Err(FsError::DirNotFound)));
}

#[test]
fn directories_cannot_be_opened() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/d", FileType::Directory).unwrap();
    assert!(matches!(fs.open("/d"), Err(FsError::IsDirectory)));
}

#[test]
fn create_validations() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    assert!(matches!(
        fs.create("/", FileType::Regular),
        Err(FsError::InvalidArgument)
    ));
    assert!(matches!(
        fs.create("x", FileType::Regular),
        Err(FsError::NotAbsolute)
    ));
    assert!(matches!(
        fs.create("/x/", FileType::Regular),
        Err(FsError::TrailingSlash)
    ));
    let long = format!("/{}", "n".repeat(64));
    assert!(matches!(
        fs.create(&long, FileType::Regular),
        Err(FsError::NameTooLong)
    ));
    fs.create("/x", FileType::Regular).unwrap();
    assert!(matches!(
        fs.create("/x", FileType::Directory),
        Err(FsError::Exists)
    ));
    assert!(matches!(
        fs.create("/nodir/x", FileType::Regular),
        Err(FsError::DirNotFound)
    ));
}

#[test]
fn lookup_matches_on_the_probes_full_length() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/abc", FileType::Regular).unwrap();

    // A shorter probe is a prefix of the stored name, so it resolves
    // to the same entry.
    assert!(fs.open("/ab").is_ok());
    assert!(matches!(
        fs.create("/ab", FileType::Regular),
        Err(FsError::Exists)
    ));
    assert!(matches!(fs.open("/abcd"), Err(FsError::NotFound)));
}

#[test]
fn a_directory_holds_exactly_seven_entries() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/d", FileType::Directory).unwrap();
    for i in 0..NDENTRY {
        fs.create(&format!("/d/f{}", i), FileType::Regular).unwrap();
    }
    assert!(matches!(
        fs.create("/d/overflow", FileType::Regular),
        Err(FsError::DirectoryFull)
    ));
    assert_eq!(fs.get_dir("/d").unwrap().len(), NDENTRY);

    // Removing one frees exactly one slot.
    fs.remove("/d/f3").unwrap();
    fs.create("/d/again", FileType::Regular).unwrap();
    assert!(matches!(
        fs.create("/d/overflow", FileType::Regular),
        Err(FsError::DirectoryFull)
    ));
}

#[test]
fn move_renames_and_reparents_without_breaking_descriptors() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/a", FileType::Directory).unwrap();
    fs.create("/a/x", FileType::Regular).unwrap();
    let fd = fs.open("/a/x").unwrap();
    fs.write(fd, b"payload").unwrap();

    fs.mv("/a/x", "/y").unwrap();
    assert!(fs.get_dir("/a").unwrap().iter().all(|r| r.name != "x"));
    assert!(fs.get_dir("/").unwrap().iter().any(|r| r.name == "y"));
    assert!(matches!(fs.open("/a/x"), Err(FsError::NotFound)));

    // The open cursor still reaches the same inode.
    fs.seek(fd, 0, Whence::Set).unwrap();
    let mut buf = [0u8; 7];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 7);
    assert_eq!(&buf, b"payload");

    // Rename in place.
    fs.mv("/y", "/z").unwrap();
    assert!(fs.open("/z").is_ok());

    // A directory cannot move under itself, and the destination must
    // be free.
    fs.create("/d", FileType::Directory).unwrap();
    assert!(matches!(fs.mv("/d", "/d/sub"), Err(FsError::CyclicMove)));
    fs.create("/w", FileType::Regular).unwrap();
    assert!(matches!(fs.mv("/z", "/w"), Err(FsError::Exists)));
    assert!(matches!(fs.mv("/gone", "/q"), Err(FsError::NotFound)));
    assert!(matches!(fs.mv("/", "/q"), Err(FsError::RootForbidden)));
}

#[test]
fn link_shares_an_inode_until_the_last_name_drops() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/f", FileType::Regular).unwrap();
    let fd = fs.open("/f").unwrap();
    fs.write(fd, b"shared").unwrap();
    fs.close(fd).unwrap();

    fs.link("/f", "/g").unwrap();
    fs.remove("/f").unwrap();

    let fd = fs.open("/g").unwrap();
    let mut buf = [0u8; 6];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 6);
    assert_eq!(&buf, b"shared");
    fs.close(fd).unwrap();

    // link then remove of the new name is a no-op pair.
    let before = fs.free_blocks();
    fs.link("/g", "/h").unwrap();
    fs.remove("/h").unwrap();
    assert_eq!(fs.free_blocks(), before);
    assert!(fs.open("/g").is_ok());

    assert!(matches!(fs.link("/g", "/g"), Err(FsError::Exists)));
    assert!(matches!(fs.link("/g", "/"), Err(FsError::RootForbidden)));
}

#[test]
fn linked_directories_survive_removal_of_one_name() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/d", FileType::Directory).unwrap();
    fs.create("/d/f", FileType::Regular).unwrap();
    fs.link("/d", "/alias").unwrap();

    // The alias keeps the inode alive, so the non-empty directory may
    // lose one of its names.
    fs.remove("/d").unwrap();
    assert!(fs.get_dir("/alias").unwrap().iter().any(|r| r.name == "f"));
    fs.remove("/alias/f").unwrap();
    fs.remove("/alias").unwrap();
    assert!(matches!(fs.get_dir("/alias"), Err(FsError::NotFound)));
}

#[test]
fn remove_refuses_nonempty_directories_and_root() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    fs.create("/d", FileType::Directory).unwrap();
    fs.create("/d/e", FileType::Regular).unwrap();

    assert!(matches!(fs.remove("/"), Err(FsError::RootForbidden)));
    assert!(matches!(fs.remove("/d"), Err(FsError::NotEmpty)));
    fs.remove("/d/e").unwrap();
    fs.remove("/d").unwrap();
    assert!(matches!(fs.open("/d"), Err(FsError::NotFound)));
    assert!(matches!(fs.remove("/d"), Err(FsError::NotFound)));
}

#[test]
fn remove_closes_descriptors_and_returns_blocks() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    let free = fs.free_blocks();
    fs.create("/f", FileType::Regular).unwrap();
    let fd = fs.open("/f").unwrap();
    // Spill well into the indirect tier.
    fs.write(fd, &vec![9u8; 5 * BSIZE * NDENTRY]).unwrap();
    assert!(fs.free_blocks() < free);

    fs.remove("/f").unwrap();
    assert_eq!(fs.free_blocks(), free);
    assert_eq!(fs.used_inodes(), 1);
    assert!(matches!(fs.read(fd, &mut [0u8; 1]), Err(FsError::BadDescriptor)));
}

#[test]
fn random_chunks_round_trip_across_a_remount() {
    let dir = TempDir::new().unwrap();
    let img = image(&dir, "a.img");
    let mut rng = StdRng::seed_from_u64(17);
    let data: Vec<u8> = (0..200_000).map(|_| rng.gen()).collect();

    let mut fs = TinyUfs::format(&img).unwrap();
    fs.create("/blob", FileType::Regular).unwrap();
    let fd = fs.open("/blob").unwrap();
    let mut off = 0;
    while off < data.len() {
        let n = (data.len() - off).min(rng.gen_range(1..=4096));
        assert_eq!(fs.write(fd, &data[off..off + n]).unwrap(), n);
        off += n;
    }
    fs.unmount().unwrap();

    let mut fs = TinyUfs::mount(&img).unwrap();
    let fd = fs.open("/blob").unwrap();
    let mut back = vec![0u8; data.len()];
    let mut off = 0;
    while off < data.len() {
        let n = (data.len() - off).min(rng.gen_range(1..=4096));
        assert_eq!(fs.read(fd, &mut back[off..off + n]).unwrap(), n);
        off += n;
    }
    assert_eq!(back, data);
    assert_eq!(fs.seek(fd, 0, Whence::End).unwrap(), data.len() as u64);
    fs.unmount().unwrap();
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(FsError::InvalidArgument.code(), -1);
    assert_eq!(FsError::NameTooLong.code(), -4);
    assert_eq!(FsError::NotFound.code(), -6);
    assert_eq!(FsError::Exists.code(), -7);
    assert_eq!(FsError::DirectoryFull.code(), -9);
    assert_eq!(FsError::BadDescriptor.code(), -12);
    assert_eq!(FsError::OutOfBlocks.code(), -17);
}

/// Fill one file until the store runs dry, then read the pattern back
/// at the block-map tier boundaries.
#[test]
fn fill_to_exhaustion_and_read_tier_boundaries() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "big.img")).unwrap();
    let free = fs.free_blocks();
    fs.create("/big", FileType::Regular).unwrap();
    let fd = fs.open("/big").unwrap();

    let mut total: u64 = 0;
    let mut chunk = vec![0u8; 1 << 20];
    loop {
        for (i, b) in chunk.iter_mut().enumerate() {
            *b = pat(total + i as u64);
        }
        let n = fs.write(fd, &chunk).unwrap();
        total += n as u64;
        if n < chunk.len() {
            break;
        }
    }

    assert_eq!(total, FILL_CAPACITY);
    assert_eq!(fs.free_blocks(), 0);
    assert_eq!(fs.write(fd, &[0u8; 1]).unwrap(), 0);
    assert_eq!(fs.seek(fd, 0, Whence::End).unwrap(), FILL_CAPACITY);

    // The direct/indirect/double boundaries.
    for &off in &[0u64, 3071, 3072, 134143, 134144] {
        assert_eq!(fs.seek(fd, off as i64, Whence::Set).unwrap(), off);
        let mut buf = [0u8; 8];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 8);
        for (i, &b) in buf.iter().enumerate() {
            assert_eq!(b, pat(off + i as u64), "offset {}", off + i as u64);
        }
    }

    // Removal hands every block back.
    fs.remove("/big").unwrap();
    assert_eq!(fs.free_blocks(), free);
    assert!(matches!(fs.read(fd, &mut [0u8; 1]), Err(FsError::BadDescriptor)));
}

#[test]
fn inode_table_exhausts_at_256() {
    let dir = TempDir::new().unwrap();
    let mut fs = TinyUfs::format(image(&dir, "a.img")).unwrap();
    // Root is inode 0; nest directories seven files at a time until
    // all 255 remaining slots are taken.
    let mut level = String::new();
    let mut made = 0;
    'outer: loop {
        for i in 0..NDENTRY - 1 {
            match fs.create(&format!("{}/f{}", level, i), FileType::Regular) {
                Ok(()) => made += 1,
                Err(FsError::InodeTableFull) => break 'outer,
                Err(e) => panic!("unexpected: {}", e),
            }
        }
        level.push_str("/sub");
        match fs.create(&level, FileType::Directory) {
            Ok(()) => made += 1,
            Err(FsError::InodeTableFull) => break,
            Err(e) => panic!("unexpected: {}", e),
        }
    }
    assert_eq!(made, 255);
    assert_eq!(fs.used_inodes(), 256);
}
