//! ldt - tar archives with embedded checksums
//!
//! writes plain tar archives that any tar tool can unpack, plus a checksum of
//! every file body stored in PAX global headers. reading an archive back
//! recomputes the checksums while the bodies stream by and reports every
//! entry that does not match.
//!
//! # Core concepts
//!
//! - **Entry**: one directory, file, symlink or hard link with lazy access to its body
//! - **SafeName**: BLAKE2b-256 of an entry name, the key of the checksum table
//! - **Checksum record**: PAX global header named `<vendor>.checksum.<algorithm>.<index>`
//!
//! # Example usage
//!
//! ```no_run
//! use ldt::{ops, Config};
//! use std::path::{Path, PathBuf};
//!
//! let config = Config::default();
//!
//! // archive a directory
//! ops::create_archive(Path::new("/tmp/home.tar"), &[PathBuf::from("/home/me")], &config).unwrap();
//!
//! // verify it without extracting
//! ops::check_archive(Path::new("/tmp/home.tar"), &config).unwrap();
//!
//! // restore it
//! ops::extract_archive(Path::new("/tmp/home.tar"), Path::new("/restore"), &config).unwrap();
//! ```

mod config;
mod error;
mod hash;

pub mod archive;
pub mod checksum;
pub mod fs;
pub mod ops;

pub use archive::{Entry, EntryKind, EntryMetadata, TarReader, TarWriter};
pub use checksum::{checksum, Algorithm, Checksummer};
pub use config::{Config, DEFAULT_RECORD_CAP, DEFAULT_VENDOR};
pub use error::{Error, IoResultExt, Result};
pub use hash::SafeName;
