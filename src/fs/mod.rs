pub mod read;
pub mod write;

pub use read::{is_symlink, read_symlink_target, FileMetadata, FileType};
pub use write::{
    create_block_device, create_char_device, create_directory, create_fifo, create_file,
    create_hardlink, create_symlink, ensure_parent,
};
