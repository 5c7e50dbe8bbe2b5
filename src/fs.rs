//! File system implementation. Five layers, leaves first:
//!   + Bitmaps: allocation maps for blocks, inodes, descriptors.
//!   + Blocks: allocator for raw 512-byte image blocks.
//!   + Inodes: fixed 256-slot table, reading, writing, metadata.
//!   + Directories: inodes with special contents (seven fixed entries).
//!   + Names: absolute paths resolved from the root inode.
//!
//! This file contains the namespace operations and the tiered
//! block-map allocator that backs the read/write cursor; the stores
//! they drive live in `block.rs` and `inode.rs`.

use std::fs::OpenOptions;
use std::path::Path as StdPath;

use arrayvec::ArrayVec;
use log::{debug, trace, warn};
use zerocopy::{AsBytes, FromBytes};

use crate::block::BlockStore;
use crate::error::{FsError, Result};
use crate::file::{DescTable, FileDesc, Tier};
use crate::inode::{DirBlock, Dinode, FileType, IndexBlock, InodeStore};
use crate::param::{
    BSIZE, IMAGE_BYTES, INODE_NBLOCKS, MAXLINK, NDENTRY, NINDIRECT, NINODES, NLIST, ROOT_BLOCK,
    ROOT_INUM, SUBMAP_BLOCK,
};
use crate::path;

/// One record of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub typ: FileType,
}

/// Where a seek offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// A mounted filesystem: the whole-block store, the inode sub-store
/// carved out of it, and the in-memory descriptor table.
///
/// The image is owned exclusively for the lifetime of this value;
/// every operation takes `&mut self` and the type is single-threaded
/// by construction.
pub struct TinyUfs {
    blocks: BlockStore,
    inodes: InodeStore,
    descs: DescTable,
}

impl TinyUfs {
    /// Create and mount a fresh image at `image`: reserve the
    /// allocation maps, lay out the inode table, and install the root
    /// directory as inode 0.
    pub fn format<P: AsRef<StdPath>>(image: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&image)?;
        file.set_len(IMAGE_BYTES)?;
        let mut blocks = BlockStore::format(file)?;

        let submap = blocks.allocate()?;
        debug_assert_eq!(submap, SUBMAP_BLOCK);
        for _ in 0..INODE_NBLOCKS {
            blocks.allocate()?;
        }
        let root_data = blocks.allocate()?;
        debug_assert_eq!(root_data, ROOT_BLOCK);

        let mut inodes = InodeStore::format();
        let root = inodes.sub_allocate(&mut blocks)?;
        debug_assert_eq!(root, ROOT_INUM);
        let mut ino = Dinode::new_zeroed();
        ino.typ = FileType::Directory.to_disk();
        ino.size = BSIZE as u64;
        ino.nlink = 1;
        ino.addr_direct[0] = root_data;
        inodes.write(&mut blocks, root, &ino)?;
        blocks.write(root_data, DirBlock::new_zeroed().as_bytes())?;

        debug!("format: image ready, {} blocks free", blocks.free_blocks());
        Ok(Self {
            blocks,
            inodes,
            descs: DescTable::new(),
        })
    }

    /// Mount an existing image. The descriptor table always starts
    /// empty; it is never persisted.
    pub fn mount<P: AsRef<StdPath>>(image: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&image)?;
        if file.metadata()?.len() != IMAGE_BYTES {
            return Err(FsError::BadImage("wrong image size"));
        }
        let mut blocks = BlockStore::open(file)?;
        let inodes = InodeStore::open(&mut blocks)?;
        let root = inodes.read(&mut blocks, ROOT_INUM)?;
        if !root.is_dir() {
            return Err(FsError::BadImage("root inode is not a directory"));
        }
        debug!("mount: {} blocks used", blocks.used_blocks());
        Ok(Self {
            blocks,
            inodes,
            descs: DescTable::new(),
        })
    }

    /// Flush the image and give it up. Open descriptors die with the
    /// mount.
    pub fn unmount(mut self) -> Result<()> {
        self.blocks.sync()?;
        debug!("unmount: image synced");
        Ok(())
    }

    /// Free blocks in the whole-block store.
    pub fn free_blocks(&self) -> usize {
        self.blocks.free_blocks()
    }

    /// Used blocks, the reserved allocation-map blocks included.
    pub fn used_blocks(&self) -> usize {
        self.blocks.used_blocks()
    }

    /// Live inodes.
    pub fn used_inodes(&self) -> usize {
        self.inodes.used()
    }

    /// Create a regular file or directory at `path`. Directories along
    /// the path must already exist.
    pub fn create(&mut self, path: &str, typ: FileType) -> Result<()> {
        if path.len() <= 1 {
            return Err(FsError::InvalidArgument);
        }
        if self.inodes.used() >= NINODES {
            return Err(FsError::InodeTableFull);
        }
        if !path.starts_with('/') {
            return Err(FsError::NotAbsolute);
        }
        if path.ends_with('/') {
            return Err(FsError::TrailingSlash);
        }
        let (dir, base) = path::split(path);
        path::check_name(base)?;
        let parent = self.resolve_dir(dir)?;
        if self.lookup_child(parent, base)? != 0 {
            return Err(FsError::Exists);
        }
        let mut pino = self.inodes.read(&mut self.blocks, parent)?;
        let mut pdb = self.read_dir_block(&pino)?;
        let slot = (0..NDENTRY)
            .find(|&k| pino.vacant & (1u8 << k) == 0)
            .ok_or(FsError::DirectoryFull)?;

        // A directory needs its data block up front; taking it before
        // the inode slot means a full store leaves the inode table
        // untouched.
        let data = match typ {
            FileType::Directory => Some(self.blocks.allocate()?),
            FileType::Regular => None,
        };
        let inum = match self.inodes.sub_allocate(&mut self.blocks) {
            Ok(i) => i,
            Err(e) => {
                if let Some(b) = data {
                    let _ = self.blocks.release(b);
                }
                return Err(e);
            }
        };

        let mut ino = Dinode::new_zeroed();
        ino.typ = typ.to_disk();
        ino.inum = inum as u64;
        ino.nlink = 1;
        if let Some(b) = data {
            ino.addr_direct[0] = b;
            ino.size = BSIZE as u64;
            self.blocks.write(b, DirBlock::new_zeroed().as_bytes())?;
        }
        self.inodes.write(&mut self.blocks, inum, &ino)?;

        pino.vacant |= 1u8 << slot;
        pdb.entries[slot].set_name(base);
        pdb.entries[slot].inum = inum;
        self.inodes.write(&mut self.blocks, parent, &pino)?;
        self.write_dir_block(&pino, &pdb)?;
        Ok(())
    }

    /// Open the regular file at `path` with the cursor at BOF and
    /// return its descriptor. Directories cannot be opened.
    pub fn open(&mut self, path: &str) -> Result<usize> {
        path::check(path)?;
        let (dir, base) = path::split(path);
        path::check_name(base)?;
        let parent = self.resolve_dir(dir)?;
        let inum = self.lookup_child(parent, base)?;
        if inum == 0 {
            return Err(FsError::NotFound);
        }
        let ino = self.inodes.read(&mut self.blocks, inum)?;
        if ino.is_dir() {
            return Err(FsError::IsDirectory);
        }
        self.descs.allocate(inum)
    }

    /// Close an open descriptor.
    pub fn close(&mut self, fd: usize) -> Result<()> {
        self.descs.release(fd)
    }

    /// Read up to `dst.len()` bytes at the cursor, clamped to EOF.
    /// Returns the byte count, which is short exactly when the read
    /// passes EOF.
    pub fn read(&mut self, fd: usize, dst: &mut [u8]) -> Result<usize> {
        let mut desc = self.descs.get(fd)?;
        if dst.is_empty() {
            return Ok(0);
        }
        let ino = self.inodes.read(&mut self.blocks, desc.inum)?;
        let left = ino.size.saturating_sub(desc.pos()) as usize;
        let want = dst.len().min(left);
        if want == 0 {
            return Ok(0);
        }
        let mut done = 0usize;
        while done < want {
            let bno = self.data_block_for(&desc)?;
            let n = (want - done).min(BSIZE - desc.offset as usize);
            self.blocks
                .n_read(bno, desc.offset as usize, &mut dst[done..done + n])?;
            done += n;
            if desc.offset as usize + n == BSIZE {
                desc.advance_block();
            } else {
                desc.offset += n as u16;
            }
        }
        self.descs.put(fd, desc);
        Ok(done)
    }

    /// Write `src` at the cursor, extending the file past EOF and
    /// allocating blocks on demand. Returns the byte count, which is
    /// short exactly when the block store runs dry mid-write.
    pub fn write(&mut self, fd: usize, src: &[u8]) -> Result<usize> {
        let mut desc = self.descs.get(fd)?;
        if src.is_empty() {
            return Ok(0);
        }
        let start = desc.pos();
        let mut written = 0usize;
        while written < src.len() {
            let bno = match self.data_block_for(&desc) {
                Ok(b) => b,
                Err(FsError::OutOfBlocks) => {
                    warn!("write: block store exhausted after {} bytes", written);
                    break;
                }
                Err(e) => {
                    self.finish_write(fd, desc, start, written)?;
                    return Err(e);
                }
            };
            let n = (src.len() - written).min(BSIZE - desc.offset as usize);
            if let Err(e) = self
                .blocks
                .n_write(bno, desc.offset as usize, &src[written..written + n])
            {
                self.finish_write(fd, desc, start, written)?;
                return Err(e);
            }
            written += n;
            if desc.offset as usize + n == BSIZE {
                desc.advance_block();
            } else {
                desc.offset += n as u16;
            }
        }
        self.finish_write(fd, desc, start, written)?;
        Ok(written)
    }

    /// Move the cursor. The target position is clamped into
    /// `[0, fileSize]` and the clamped position is returned.
    pub fn seek(&mut self, fd: usize, offset: i64, whence: Whence) -> Result<u64> {
        let mut desc = self.descs.get(fd)?;
        let ino = self.inodes.read(&mut self.blocks, desc.inum)?;
        let size = ino.size as i64;
        let target = match whence {
            Whence::Set => offset,
            Whence::Cur => (desc.pos() as i64).saturating_add(offset),
            Whence::End => size.saturating_add(offset),
        };
        let clamped = target.max(0).min(size) as u64;
        desc.set_pos(clamped);
        self.descs.put(fd, desc);
        Ok(clamped)
    }

    /// Remove the file or directory at `path`. Directories must be
    /// empty unless another link keeps the inode alive; removing the
    /// last link of a regular file frees its content and closes every
    /// descriptor open on it.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        if !path.starts_with('/') {
            return Err(FsError::NotAbsolute);
        }
        if path == "/" {
            return Err(FsError::RootForbidden);
        }
        if path.ends_with('/') {
            return Err(FsError::TrailingSlash);
        }
        let (dir, base) = path::split(path);
        let parent = self.resolve_dir(dir)?;
        let inum = self.lookup_child(parent, base)?;
        if inum == 0 {
            return Err(FsError::NotFound);
        }
        let mut ino = self.inodes.read(&mut self.blocks, inum)?;
        if ino.is_dir() {
            if ino.vacant != 0 && ino.nlink <= 1 {
                return Err(FsError::NotEmpty);
            }
            self.clear_entry(parent, base, inum)?;
            if ino.nlink <= 1 {
                self.blocks.release(ino.addr_direct[0])?;
                self.inodes.sub_release(&mut self.blocks, inum)?;
            } else {
                // Re-read: when the removed entry lives in the very
                // directory it names, clear_entry just rewrote this
                // inode's occupancy byte.
                let mut ino = self.inodes.read(&mut self.blocks, inum)?;
                ino.nlink -= 1;
                self.inodes.write(&mut self.blocks, inum, &ino)?;
            }
        } else {
            if ino.nlink > 1 {
                ino.nlink -= 1;
                self.inodes.write(&mut self.blocks, inum, &ino)?;
            } else {
                self.release_content(&ino)?;
                self.descs.close_all_for(inum);
                self.inodes.sub_release(&mut self.blocks, inum)?;
            }
            self.clear_entry(parent, base, inum)?;
        }
        Ok(())
    }

    /// Move `src` to `dst`. A move within one directory renames the
    /// entry in place; across directories the entry switches parent
    /// blocks. Open descriptors are unaffected either way, since they
    /// hold inode numbers.
    pub fn mv(&mut self, src: &str, dst: &str) -> Result<()> {
        if src == "/" || dst == "/" {
            return Err(FsError::RootForbidden);
        }
        path::check(src)?;
        path::check(dst)?;
        if src.len() < dst.len() && dst.starts_with(src) {
            return Err(FsError::CyclicMove);
        }
        let (sdir, sbase) = path::split(src);
        let (ddir, dbase) = path::split(dst);
        path::check_name(dbase)?;
        let sparent = self.resolve_dir(sdir)?;
        let dparent = self.resolve_dir(ddir)?;
        let sinum = self.lookup_child(sparent, sbase)?;
        if sinum == 0 {
            return Err(FsError::NotFound);
        }
        if self.lookup_child(dparent, dbase)? != 0 {
            return Err(FsError::Exists);
        }

        if sparent == dparent {
            let pino = self.inodes.read(&mut self.blocks, sparent)?;
            let mut pdb = self.read_dir_block(&pino)?;
            for k in 0..NDENTRY {
                if pino.vacant & (1u8 << k) != 0
                    && pdb.entries[k].inum == sinum
                    && pdb.entries[k].name_matches(sbase)
                {
                    pdb.entries[k].set_name(dbase);
                    return self.write_dir_block(&pino, &pdb);
                }
            }
            return Err(FsError::NotFound);
        }

        let mut dino = self.inodes.read(&mut self.blocks, dparent)?;
        let mut ddb = self.read_dir_block(&dino)?;
        let slot = (0..NDENTRY)
            .find(|&k| dino.vacant & (1u8 << k) == 0)
            .ok_or(FsError::DirectoryFull)?;
        let mut sino = self.inodes.read(&mut self.blocks, sparent)?;
        let mut sdb = self.read_dir_block(&sino)?;
        let old = (0..NDENTRY)
            .find(|&k| {
                sino.vacant & (1u8 << k) != 0
                    && sdb.entries[k].inum == sinum
                    && sdb.entries[k].name_matches(sbase)
            })
            .ok_or(FsError::NotFound)?;

        dino.vacant |= 1u8 << slot;
        ddb.entries[slot].set_name(dbase);
        ddb.entries[slot].inum = sinum;
        sino.vacant &= !(1u8 << old);
        sdb.entries[old].clear();

        self.write_dir_block(&dino, &ddb)?;
        self.write_dir_block(&sino, &sdb)?;
        self.inodes.write(&mut self.blocks, dparent, &dino)?;
        self.inodes.write(&mut self.blocks, sparent, &sino)?;
        Ok(())
    }

    /// Hard-link `dst` to the object at `src`: one more directory
    /// entry pointing at the same inode.
    pub fn link(&mut self, src: &str, dst: &str) -> Result<()> {
        if dst == "/" {
            return Err(FsError::RootForbidden);
        }
        path::check(src)?;
        path::check(dst)?;
        let (sdir, sbase) = path::split(src);
        let (ddir, dbase) = path::split(dst);
        path::check_name(dbase)?;
        let sparent = self.resolve_dir(sdir)?;
        let dparent = self.resolve_dir(ddir)?;
        let sinum = self.lookup_child(sparent, sbase)?;
        if sinum == 0 {
            return Err(FsError::NotFound);
        }
        if self.lookup_child(dparent, dbase)? != 0 {
            return Err(FsError::Exists);
        }

        let mut sino = self.inodes.read(&mut self.blocks, sinum)?;
        if sino.nlink >= MAXLINK {
            return Err(FsError::TooManyLinks);
        }

        if sinum == dparent {
            // Linking a directory to a name inside itself: one inode
            // carries both the new occupancy bit and the bumped link
            // count, so a single record write covers both roles.
            let slot = (0..NDENTRY)
                .find(|&k| sino.vacant & (1u8 << k) == 0)
                .ok_or(FsError::DirectoryFull)?;
            let mut db = self.read_dir_block(&sino)?;
            sino.nlink += 1;
            sino.vacant |= 1u8 << slot;
            db.entries[slot].set_name(dbase);
            db.entries[slot].inum = sinum;
            self.inodes.write(&mut self.blocks, sinum, &sino)?;
            self.write_dir_block(&sino, &db)?;
            return Ok(());
        }

        let mut dino = self.inodes.read(&mut self.blocks, dparent)?;
        let slot = (0..NDENTRY)
            .find(|&k| dino.vacant & (1u8 << k) == 0)
            .ok_or(FsError::DirectoryFull)?;
        let mut db = self.read_dir_block(&dino)?;
        sino.nlink += 1;
        dino.vacant |= 1u8 << slot;
        db.entries[slot].set_name(dbase);
        db.entries[slot].inum = sinum;
        self.inodes.write(&mut self.blocks, sinum, &sino)?;
        self.inodes.write(&mut self.blocks, dparent, &dino)?;
        self.write_dir_block(&dino, &db)?;
        Ok(())
    }

    /// List the directory at `dirpath`: up to seven records of name
    /// and type, in slot order.
    pub fn get_dir(&mut self, dirpath: &str) -> Result<ArrayVec<FileInfo, NLIST>> {
        if dirpath.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        if !dirpath.starts_with('/') {
            return Err(FsError::NotAbsolute);
        }
        let inum = if dirpath == "/" {
            ROOT_INUM
        } else {
            if dirpath.ends_with('/') {
                return Err(FsError::TrailingSlash);
            }
            let (dir, base) = path::split(dirpath);
            let parent = self.resolve_dir(dir)?;
            let inum = self.lookup_child(parent, base)?;
            if inum == 0 {
                return Err(FsError::NotFound);
            }
            inum
        };
        let ino = self.inodes.read(&mut self.blocks, inum)?;
        if !ino.is_dir() {
            return Err(FsError::DirNotFound);
        }
        let db = self.read_dir_block(&ino)?;
        let mut list = ArrayVec::new();
        for k in 0..NDENTRY {
            if ino.vacant & (1u8 << k) == 0 {
                continue;
            }
            let de = &db.entries[k];
            let child = self.inodes.read(&mut self.blocks, de.inum)?;
            let typ = FileType::from_disk(child.typ).ok_or(FsError::BadImage("file type tag"))?;
            list.push(FileInfo {
                name: de.name_str().to_string(),
                typ,
            });
        }
        Ok(list)
    }

    /// Walk an absolute directory path from the root inode. Every
    /// segment must name a directory reachable through an occupied
    /// entry of the previous one.
    fn resolve_dir(&mut self, dir: &str) -> Result<u8> {
        let mut inum = ROOT_INUM;
        for seg in path::segments(dir) {
            let ino = self.inodes.read(&mut self.blocks, inum)?;
            if !ino.is_dir() {
                return Err(FsError::DirNotFound);
            }
            let db = self.read_dir_block(&ino)?;
            let mut next = None;
            for k in 0..NDENTRY {
                if ino.vacant & (1u8 << k) == 0 || !db.entries[k].name_matches(seg) {
                    continue;
                }
                let child = self.inodes.read(&mut self.blocks, db.entries[k].inum)?;
                if child.is_dir() {
                    next = Some(db.entries[k].inum);
                    break;
                }
            }
            inum = next.ok_or(FsError::DirNotFound)?;
        }
        Ok(inum)
    }

    /// First occupied entry of `parent` matching `name`, or 0 when
    /// absent (inode 0 is the root and can never be a child).
    fn lookup_child(&mut self, parent: u8, name: &str) -> Result<u8> {
        let ino = self.inodes.read(&mut self.blocks, parent)?;
        let db = self.read_dir_block(&ino)?;
        for k in 0..NDENTRY {
            if ino.vacant & (1u8 << k) != 0 && db.entries[k].name_matches(name) {
                return Ok(db.entries[k].inum);
            }
        }
        Ok(0)
    }

    /// The block number backing the cursor's current logical block,
    /// allocating the data block and any index blocks on the way.
    /// Multi-block allocations check the free count up front so a dry
    /// store never leaves a half-built index chain.
    fn data_block_for(&mut self, desc: &FileDesc) -> Result<u16> {
        let mut ino = self.inodes.read(&mut self.blocks, desc.inum)?;
        let order = desc.order as usize;
        match desc.tier {
            Tier::Direct => {
                let addr = ino.addr_direct[order];
                if addr == 0 {
                    if self.blocks.free_blocks() < 1 {
                        return Err(FsError::OutOfBlocks);
                    }
                    let b = self.blocks.allocate()?;
                    ino.addr_direct[order] = b;
                    self.inodes.write(&mut self.blocks, desc.inum, &ino)?;
                    Ok(b)
                } else if self.blocks.test(addr) {
                    Ok(addr)
                } else {
                    Err(FsError::BadImage("direct pointer to a free block"))
                }
            }
            Tier::Indirect => {
                if ino.addr_indirect == 0 {
                    if self.blocks.free_blocks() < 2 {
                        return Err(FsError::OutOfBlocks);
                    }
                    let index = self.blocks.allocate()?;
                    let data = self.blocks.allocate()?;
                    let mut table = IndexBlock::new_zeroed();
                    table.addrs[order] = data;
                    table.store(&mut self.blocks, index)?;
                    ino.addr_indirect = index;
                    self.inodes.write(&mut self.blocks, desc.inum, &ino)?;
                    trace!("indirect index at block {}", index);
                    Ok(data)
                } else {
                    let mut table = IndexBlock::load(&mut self.blocks, ino.addr_indirect)?;
                    let addr = table.addrs[order];
                    if addr == 0 {
                        if self.blocks.free_blocks() < 1 {
                            return Err(FsError::OutOfBlocks);
                        }
                        let data = self.blocks.allocate()?;
                        table.addrs[order] = data;
                        table.store(&mut self.blocks, ino.addr_indirect)?;
                        Ok(data)
                    } else if self.blocks.test(addr) {
                        Ok(addr)
                    } else {
                        Err(FsError::BadImage("indirect entry to a free block"))
                    }
                }
            }
            Tier::Double => {
                let (hi, lo) = (order / NINDIRECT, order % NINDIRECT);
                if ino.addr_double == 0 {
                    if self.blocks.free_blocks() < 3 {
                        return Err(FsError::OutOfBlocks);
                    }
                    let outer_no = self.blocks.allocate()?;
                    let inner_no = self.blocks.allocate()?;
                    let data = self.blocks.allocate()?;
                    let mut inner = IndexBlock::new_zeroed();
                    inner.addrs[lo] = data;
                    inner.store(&mut self.blocks, inner_no)?;
                    let mut outer = IndexBlock::new_zeroed();
                    outer.addrs[hi] = inner_no;
                    outer.store(&mut self.blocks, outer_no)?;
                    ino.addr_double = outer_no;
                    self.inodes.write(&mut self.blocks, desc.inum, &ino)?;
                    trace!("double-indirect index at block {}", outer_no);
                    Ok(data)
                } else {
                    let mut outer = IndexBlock::load(&mut self.blocks, ino.addr_double)?;
                    if outer.addrs[hi] == 0 {
                        if self.blocks.free_blocks() < 2 {
                            return Err(FsError::OutOfBlocks);
                        }
                        let inner_no = self.blocks.allocate()?;
                        let data = self.blocks.allocate()?;
                        let mut inner = IndexBlock::new_zeroed();
                        inner.addrs[lo] = data;
                        inner.store(&mut self.blocks, inner_no)?;
                        outer.addrs[hi] = inner_no;
                        outer.store(&mut self.blocks, ino.addr_double)?;
                        Ok(data)
                    } else {
                        let inner_no = outer.addrs[hi];
                        let mut inner = IndexBlock::load(&mut self.blocks, inner_no)?;
                        let addr = inner.addrs[lo];
                        if addr == 0 {
                            if self.blocks.free_blocks() < 1 {
                                return Err(FsError::OutOfBlocks);
                            }
                            let data = self.blocks.allocate()?;
                            inner.addrs[lo] = data;
                            inner.store(&mut self.blocks, inner_no)?;
                            Ok(data)
                        } else if self.blocks.test(addr) {
                            Ok(addr)
                        } else {
                            Err(FsError::BadImage("double-indirect entry to a free block"))
                        }
                    }
                }
            }
        }
    }

    /// Persist the cursor and extend the file size over what the write
    /// loop completed. The inode goes back even when the size did not
    /// change, matching the pointer updates the allocator may have
    /// made on its behalf.
    fn finish_write(&mut self, fd: usize, desc: FileDesc, start: u64, written: usize) -> Result<()> {
        let mut ino = self.inodes.read(&mut self.blocks, desc.inum)?;
        if ino.size < start + written as u64 {
            ino.size = start + written as u64;
        }
        self.inodes.write(&mut self.blocks, desc.inum, &ino)?;
        self.descs.put(fd, desc);
        Ok(())
    }

    /// Clear `parent`'s entry for (`name`, `inum`): zero the record
    /// and reset its occupancy bit.
    fn clear_entry(&mut self, parent: u8, name: &str, inum: u8) -> Result<()> {
        let mut pino = self.inodes.read(&mut self.blocks, parent)?;
        let mut pdb = self.read_dir_block(&pino)?;
        for k in 0..NDENTRY {
            if pino.vacant & (1u8 << k) == 0 {
                continue;
            }
            if pdb.entries[k].inum == inum && pdb.entries[k].name_matches(name) {
                pdb.entries[k].clear();
                pino.vacant &= !(1u8 << k);
                break;
            }
        }
        self.inodes.write(&mut self.blocks, parent, &pino)?;
        self.write_dir_block(&pino, &pdb)?;
        Ok(())
    }

    /// Release every content block of a regular file: the direct
    /// pointers, the indirect index and its children, then the
    /// double-indirect tree leaf-first.
    fn release_content(&mut self, ino: &Dinode) -> Result<()> {
        for &addr in &ino.addr_direct {
            if addr != 0 && self.blocks.test(addr) {
                self.blocks.release(addr)?;
            }
        }
        if ino.addr_indirect != 0 && self.blocks.test(ino.addr_indirect) {
            let table = IndexBlock::load(&mut self.blocks, ino.addr_indirect)?;
            for &addr in table.addrs.iter() {
                if addr != 0 && self.blocks.test(addr) {
                    self.blocks.release(addr)?;
                }
            }
            self.blocks.release(ino.addr_indirect)?;
        }
        if ino.addr_double != 0 && self.blocks.test(ino.addr_double) {
            let outer = IndexBlock::load(&mut self.blocks, ino.addr_double)?;
            for &inner_no in outer.addrs.iter() {
                if inner_no == 0 || !self.blocks.test(inner_no) {
                    continue;
                }
                let inner = IndexBlock::load(&mut self.blocks, inner_no)?;
                for &addr in inner.addrs.iter() {
                    if addr != 0 && self.blocks.test(addr) {
                        self.blocks.release(addr)?;
                    }
                }
                self.blocks.release(inner_no)?;
            }
            self.blocks.release(ino.addr_double)?;
        }
        Ok(())
    }

    fn read_dir_block(&mut self, ino: &Dinode) -> Result<DirBlock> {
        let mut buf = [0u8; BSIZE];
        self.blocks.read(ino.addr_direct[0], &mut buf)?;
        DirBlock::read_from(&buf[..]).ok_or(FsError::BadImage("directory block"))
    }

    fn write_dir_block(&mut self, ino: &Dinode, db: &DirBlock) -> Result<()> {
        self.blocks.write(ino.addr_direct[0], db.as_bytes())
    }
}
