//! Filesystem geometry.
//!
//! The image is a flat array of `NBLOCKS` blocks of `BSIZE` bytes. The
//! free-block map covers every block and lives in the top `FBM_BLOCKS`
//! blocks of the image; block 0 carries the inode allocation map, the
//! inode table follows, then the root directory's data block, then the
//! general data pool.

/// Block size.
pub const BSIZE: usize = 512;

/// Number of blocks in the image.
pub const NBLOCKS: usize = 65536;

/// Exact image size in bytes.
pub const IMAGE_BYTES: u64 = (NBLOCKS * BSIZE) as u64;

/// Blocks consumed by the free-block map (65,536 bits).
pub const FBM_BLOCKS: usize = FBM_BYTES / BSIZE;

/// Free-block map size in bytes.
pub const FBM_BYTES: usize = NBLOCKS / 8;

/// First block of the free-block map region.
pub const FBM_START: usize = NBLOCKS - FBM_BLOCKS;

/// Block holding the sub-allocator maps.
pub const SUBMAP_BLOCK: u16 = 0;

/// Byte offset of the inode allocation map inside `SUBMAP_BLOCK`.
pub const INODE_MAP_OFFSET: usize = BSIZE / 2;

/// First block of the inode table.
pub const INODE_START: usize = 1;

/// Blocks occupied by the inode table.
pub const INODE_NBLOCKS: usize = NINODES / IPB;

/// On-disk inode size.
pub const INODE_SIZE: usize = 64;

/// Inodes per block.
pub const IPB: usize = BSIZE / INODE_SIZE;

/// Number of inode slots.
pub const NINODES: usize = 256;

/// Inode number of the root directory.
pub const ROOT_INUM: u8 = 0;

/// Data block of the root directory.
pub const ROOT_BLOCK: u16 = (INODE_START + INODE_NBLOCKS) as u16;

/// Open descriptors per mount.
pub const NDESC: usize = 256;

/// Direct block pointers per inode.
pub const NDIRECT: usize = 6;

/// Block pointers per index block.
pub const NINDIRECT: usize = BSIZE / 2;

/// Blocks addressable through the double-indirect pointer.
pub const NDOUBLE: usize = NINDIRECT * NINDIRECT;

/// Addressing ceiling of a single file, in blocks.
pub const MAXFILE: usize = NDIRECT + NINDIRECT + NDOUBLE;

/// Maximum name length, including the terminating zero.
pub const DIRSIZ: usize = 64;

/// Directory entries per directory block.
pub const NDENTRY: usize = 7;

/// Capacity of a directory listing handed back to the caller.
pub const NLIST: usize = 15;

/// Highest representable link count.
pub const MAXLINK: u64 = 255;
