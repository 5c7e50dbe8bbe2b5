//! Whole-block store: allocator for raw 512-byte blocks, backed by the
//! image file.
//!
//! The free-block map covers all 65,536 blocks and is persisted in the
//! top 16 blocks of the image, whose own bits are pre-set. Every
//! allocate/release writes the dirty map block straight through, so
//! the on-disk map never lags the in-memory one by more than the
//! operation in flight.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use log::trace;

use crate::bitmap::Bitmap;
use crate::error::{FsError, Result};
use crate::param::{BSIZE, FBM_BYTES, FBM_START, NBLOCKS};

pub struct BlockStore {
    image: File,
    map: Bitmap,
}

impl BlockStore {
    /// Set up a fresh store on a zeroed image: only the map's own
    /// blocks are marked used.
    pub fn format(image: File) -> Result<Self> {
        let mut map = Bitmap::new(NBLOCKS);
        for b in FBM_START..NBLOCKS {
            map.set(b);
        }
        let mut store = Self { image, map };
        store.flush_map()?;
        Ok(store)
    }

    /// Attach to an existing image, reading the map back from its
    /// reserved region.
    pub fn open(mut image: File) -> Result<Self> {
        let mut bytes = vec![0u8; FBM_BYTES];
        image.seek(SeekFrom::Start((FBM_START * BSIZE) as u64))?;
        image.read_exact(&mut bytes)?;
        let map = Bitmap::from_bytes(NBLOCKS, bytes);
        if (FBM_START..NBLOCKS).any(|b| !map.test(b)) {
            return Err(FsError::BadImage("free-block map region not reserved"));
        }
        Ok(Self { image, map })
    }

    /// First-free block. The fresh block is zeroed before it is handed
    /// out.
    pub fn allocate(&mut self) -> Result<u16> {
        let b = self.map.ffz().ok_or(FsError::OutOfBlocks)?;
        self.map.set(b);
        self.flush_map_block(b)?;
        self.write(b as u16, &[0u8; BSIZE])?;
        trace!("block {} allocated", b);
        Ok(b as u16)
    }

    pub fn release(&mut self, bno: u16) -> Result<()> {
        self.map.reset(bno as usize);
        self.flush_map_block(bno as usize)?;
        trace!("block {} released", bno);
        Ok(())
    }

    pub fn test(&self, bno: u16) -> bool {
        self.map.test(bno as usize)
    }

    pub fn free_blocks(&self) -> usize {
        self.map.zeros()
    }

    pub fn used_blocks(&self) -> usize {
        self.map.ones()
    }

    /// Full-block read. `buf` must be exactly one block.
    pub fn read(&mut self, bno: u16, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), BSIZE);
        self.n_read(bno, 0, buf)
    }

    /// Full-block write. `buf` must be exactly one block.
    pub fn write(&mut self, bno: u16, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), BSIZE);
        self.n_write(bno, 0, buf)
    }

    /// Partial read of `buf.len()` bytes at `offset` within the block.
    pub fn n_read(&mut self, bno: u16, offset: usize, buf: &mut [u8]) -> Result<()> {
        debug_assert!(offset + buf.len() <= BSIZE);
        self.image
            .seek(SeekFrom::Start(bno as u64 * BSIZE as u64 + offset as u64))?;
        self.image.read_exact(buf)?;
        Ok(())
    }

    /// Partial write of `buf.len()` bytes at `offset` within the block.
    pub fn n_write(&mut self, bno: u16, offset: usize, buf: &[u8]) -> Result<()> {
        debug_assert!(offset + buf.len() <= BSIZE);
        self.image
            .seek(SeekFrom::Start(bno as u64 * BSIZE as u64 + offset as u64))?;
        self.image.write_all(buf)?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.image.sync_all()?;
        Ok(())
    }

    /// Write back the map block holding `bit`.
    fn flush_map_block(&mut self, bit: usize) -> Result<()> {
        let blk = bit / (BSIZE * 8);
        let bytes = &self.map.as_bytes()[blk * BSIZE..(blk + 1) * BSIZE];
        self.image
            .seek(SeekFrom::Start(((FBM_START + blk) * BSIZE) as u64))?;
        self.image.write_all(bytes)?;
        Ok(())
    }

    /// Write back the whole map region.
    fn flush_map(&mut self) -> Result<()> {
        self.image.seek(SeekFrom::Start((FBM_START * BSIZE) as u64))?;
        self.image.write_all(self.map.as_bytes())?;
        Ok(())
    }
}
