//! tar archives with embedded per-entry checksums
//!
//! entries are produced by [`collect`] (or built by hand), written by
//! [`TarWriter`] and decoded by [`TarReader`], which hands each one to a
//! handler such as [`DiskHandler`].

pub mod collect;
pub mod disk;
pub mod entry;
pub mod reader;
pub mod table;
pub mod tee;
pub mod verify;
pub mod writer;

use std::path::Path;

use crate::error::{Error, Result};

pub use collect::{collect, common_path_prefix, CollectOptions};
pub use disk::DiskHandler;
pub use entry::{
    BodyProvider, DiskBody, Entry, EntryKind, EntryMetadata, MemoryBody, SpecialFile, StreamBody,
};
pub use reader::TarReader;
pub use table::ChecksumTable;
pub use tee::TeeReader;
pub use verify::{Discrepancy, Verifier};
pub use writer::TarWriter;

/// archive container formats, picked by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Tar,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("tar") => Ok(Format::Tar),
            _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
        }
    }
}
