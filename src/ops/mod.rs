//! high-level operations on archive files

mod archive;
mod checksum;
mod extract;
mod list;

pub use archive::{create_archive, ArchiveStats};
pub use checksum::checksum_file;
pub use extract::{check_archive, extract_archive};
pub use list::{list_archive, ListEntry};
