//! Error taxonomy.
//!
//! Every failure an operation can report is a distinct variant, and
//! each variant carries a stable negative code so callers that speak
//! the numeric contract can keep doing so. Nothing is retried here;
//! the caller decides.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("path is not absolute")]
    NotAbsolute,
    #[error("path has a trailing slash")]
    TrailingSlash,
    #[error("file name too long")]
    NameTooLong,
    #[error("no such directory")]
    DirNotFound,
    #[error("no such file or directory")]
    NotFound,
    #[error("file exists")]
    Exists,
    #[error("is a directory")]
    IsDirectory,
    #[error("directory is full")]
    DirectoryFull,
    #[error("inode table is full")]
    InodeTableFull,
    #[error("descriptor table is full")]
    DescriptorTableFull,
    #[error("bad file descriptor")]
    BadDescriptor,
    #[error("directory not empty")]
    NotEmpty,
    #[error("cannot operate on the root directory")]
    RootForbidden,
    #[error("destination is inside the source")]
    CyclicMove,
    #[error("too many links")]
    TooManyLinks,
    #[error("block store is exhausted")]
    OutOfBlocks,
    #[error("bad image: {0}")]
    BadImage(&'static str),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Stable negative code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            FsError::InvalidArgument => -1,
            FsError::NotAbsolute => -2,
            FsError::TrailingSlash => -3,
            FsError::NameTooLong => -4,
            FsError::DirNotFound => -5,
            FsError::NotFound => -6,
            FsError::Exists => -7,
            FsError::IsDirectory => -8,
            FsError::DirectoryFull => -9,
            FsError::InodeTableFull => -10,
            FsError::DescriptorTableFull => -11,
            FsError::BadDescriptor => -12,
            FsError::NotEmpty => -13,
            FsError::RootForbidden => -14,
            FsError::CyclicMove => -15,
            FsError::TooManyLinks => -16,
            FsError::OutOfBlocks => -17,
            FsError::BadImage(_) => -18,
            FsError::Io(_) => -19,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
