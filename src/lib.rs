//! tinyufs: a unix-style single-volume filesystem inside one 32 MiB
//! image file.
//!
//! The image is a flat array of 65,536 blocks of 512 bytes. A
//! free-block map governs the whole array; a 256-slot inode table and
//! a 256-slot in-memory descriptor table are carved out above it, and
//! the namespace operations sit on top:
//!
//! ```no_run
//! use tinyufs::{FileType, TinyUfs, Whence};
//!
//! # fn main() -> tinyufs::Result<()> {
//! let mut fs = TinyUfs::format("disk.img")?;
//! fs.create("/notes", FileType::Regular)?;
//! let fd = fs.open("/notes")?;
//! fs.write(fd, b"hello")?;
//! fs.seek(fd, 0, Whence::Set)?;
//! let mut buf = [0u8; 5];
//! fs.read(fd, &mut buf)?;
//! fs.unmount()?;
//! # Ok(())
//! # }
//! ```

#![deny(absolute_paths_not_starting_with_crate)]
#![deny(keyword_idents)]
#![deny(non_ascii_idents)]
#![deny(unused_extern_crates)]

mod bitmap;
mod block;
mod error;
mod file;
mod fs;
mod inode;
mod param;
mod path;

pub use crate::error::{FsError, Result};
pub use crate::fs::{FileInfo, TinyUfs, Whence};
pub use crate::inode::{Dinode, Dirent, FileType};
pub use crate::param::{BSIZE, MAXFILE, NBLOCKS, NDENTRY, NDESC, NINODES, NLIST};
