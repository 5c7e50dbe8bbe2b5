//! Inodes and directory records.
//!
//! An inode describes a single unnamed file: its type, size, link
//! count, and the tiered list of blocks holding its content. Inodes
//! are laid out sequentially on disk starting at `INODE_START`, eight
//! per block, addressed by inode number.
//!
//! A directory's content is a single block of seven fixed-size
//! entries; the `vacant` byte in the directory's inode is the
//! authoritative occupancy map for those entries (bits 0..=6, a set
//! bit meaning *used*; bit 7 is never assigned).

use std::convert::TryInto;
use std::mem;

use bitmaps::Bitmap;
use static_assertions::const_assert;
use zerocopy::{AsBytes, FromBytes};

use crate::block::BlockStore;
use crate::error::{FsError, Result};
use crate::param::{
    BSIZE, DIRSIZ, INODE_MAP_OFFSET, INODE_SIZE, INODE_START, IPB, NDENTRY, NDIRECT, NINDIRECT,
    NINODES, SUBMAP_BLOCK,
};

/// Kind of a namespace object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
}

impl FileType {
    pub(crate) fn to_disk(self) -> u8 {
        match self {
            FileType::Regular => b'r',
            FileType::Directory => b'd',
        }
    }

    pub(crate) fn from_disk(tag: u8) -> Option<Self> {
        match tag {
            b'r' => Some(FileType::Regular),
            b'd' => Some(FileType::Directory),
            _ => None,
        }
    }
}

/// On-disk inode structure.
///
/// Block-number fields use 0 for "unallocated"; that is unambiguous
/// because block 0 holds allocator metadata and can never be file
/// content.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct Dinode {
    /// Directory entry occupancy (directories only).
    pub vacant: u8,
    /// Reserved owner text, not interpreted.
    pub owner: [u8; 18],
    /// `b'r'` or `b'd'`.
    pub typ: u8,
    _pad: [u8; 4],
    /// Self index, 0..=255.
    pub inum: u64,
    /// Content size in bytes; fixed at `BSIZE` for directories.
    pub size: u64,
    /// Number of directory entries pointing at this inode.
    pub nlink: u64,
    /// First six data blocks.
    pub addr_direct: [u16; NDIRECT],
    /// Index block of the next 256 data blocks.
    pub addr_indirect: u16,
    /// Index block of 256 further index blocks.
    pub addr_double: u16,
}

const_assert!(mem::size_of::<Dinode>() == INODE_SIZE);
const_assert!(IPB * INODE_SIZE == BSIZE);

impl Dinode {
    pub fn is_dir(&self) -> bool {
        self.typ == b'd'
    }
}

/// One directory entry: a null-padded name and the inode it names.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct Dirent {
    pub name: [u8; DIRSIZ],
    pub inum: u8,
}

const_assert!(mem::size_of::<Dirent>() == DIRSIZ + 1);

impl Dirent {
    /// Fill in the name, zeroing the remainder of the field.
    pub fn set_name(&mut self, name: &str) {
        debug_assert!(name.len() < DIRSIZ);
        self.name = [0; DIRSIZ];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    /// The stored name up to its terminating zero.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Name comparison over the probe's full length, so a probe
    /// matches any stored name it is a prefix of.
    pub fn name_matches(&self, probe: &str) -> bool {
        probe.len() < DIRSIZ && &self.name[..probe.len()] == probe.as_bytes()
    }

    pub fn clear(&mut self) {
        self.name = [0; DIRSIZ];
        self.inum = 0;
    }
}

/// The single data block of a directory.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct DirBlock {
    pub entries: [Dirent; NDENTRY],
    _pad: [u8; BSIZE - NDENTRY * (DIRSIZ + 1)],
}

const_assert!(mem::size_of::<DirBlock>() == BSIZE);

/// A 256-entry table of block numbers, as stored in indirect and
/// double-indirect index blocks.
#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
pub struct IndexBlock {
    pub addrs: [u16; NINDIRECT],
}

const_assert!(mem::size_of::<IndexBlock>() == BSIZE);

impl IndexBlock {
    pub fn load(blocks: &mut BlockStore, bno: u16) -> Result<Self> {
        let mut buf = [0u8; BSIZE];
        blocks.read(bno, &mut buf)?;
        IndexBlock::read_from(&buf[..]).ok_or(FsError::BadImage("index block"))
    }

    pub fn store(&self, blocks: &mut BlockStore, bno: u16) -> Result<()> {
        blocks.write(bno, self.as_bytes())
    }
}

/// Sub-allocator carving the inode table out of the whole-block store.
///
/// The 256-bit allocation map is persisted in the second half of the
/// sub-allocator metadata block and written through on every change.
pub struct InodeStore {
    map: Bitmap<NINODES>,
}

impl InodeStore {
    /// Fresh store with every slot free.
    pub fn format() -> Self {
        Self { map: Bitmap::new() }
    }

    /// Read the allocation map back from the image.
    pub fn open(blocks: &mut BlockStore) -> Result<Self> {
        let mut raw = [0u8; NINODES / 8];
        blocks.n_read(SUBMAP_BLOCK, INODE_MAP_OFFSET, &mut raw)?;
        let lo = u128::from_le_bytes(raw[..16].try_into().expect("inode map half"));
        let hi = u128::from_le_bytes(raw[16..].try_into().expect("inode map half"));
        Ok(Self {
            map: Bitmap::from_value([lo, hi]),
        })
    }

    /// First-free inode index.
    pub fn sub_allocate(&mut self, blocks: &mut BlockStore) -> Result<u8> {
        let i = self.map.first_false_index().ok_or(FsError::InodeTableFull)?;
        self.map.set(i, true);
        self.flush(blocks)?;
        Ok(i as u8)
    }

    pub fn sub_release(&mut self, blocks: &mut BlockStore, i: u8) -> Result<()> {
        self.map.set(i as usize, false);
        self.flush(blocks)
    }

    pub fn sub_test(&self, i: u8) -> bool {
        self.map.get(i as usize)
    }

    /// Number of live inodes.
    pub fn used(&self) -> usize {
        self.map.into_iter().count()
    }

    /// Read the 64-byte inode record `i`.
    pub fn read(&self, blocks: &mut BlockStore, i: u8) -> Result<Dinode> {
        debug_assert!(self.sub_test(i), "reading a free inode slot");
        let mut buf = [0u8; INODE_SIZE];
        blocks.n_read(Self::iblock(i), Self::ioffset(i), &mut buf)?;
        Dinode::read_from(&buf[..]).ok_or(FsError::BadImage("inode record"))
    }

    /// Write the 64-byte inode record `i`.
    pub fn write(&self, blocks: &mut BlockStore, i: u8, ino: &Dinode) -> Result<()> {
        blocks.n_write(Self::iblock(i), Self::ioffset(i), ino.as_bytes())
    }

    /// Block containing inode `i`.
    fn iblock(i: u8) -> u16 {
        (INODE_START + i as usize / IPB) as u16
    }

    /// Byte offset of inode `i` within its block.
    fn ioffset(i: u8) -> usize {
        i as usize % IPB * INODE_SIZE
    }

    fn flush(&self, blocks: &mut BlockStore) -> Result<()> {
        let [lo, hi] = self.map.into_value();
        let mut raw = [0u8; NINODES / 8];
        raw[..16].copy_from_slice(&lo.to_le_bytes());
        raw[16..].copy_from_slice(&hi.to_le_bytes());
        blocks.n_write(SUBMAP_BLOCK, INODE_MAP_OFFSET, &raw)
    }
}
