use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{symlink, OpenOptionsExt};
use std::path::Path;

use nix::fcntl::OFlag;
use nix::sys::stat::{makedev, mknod, Mode, SFlag};

use crate::error::{Error, IoResultExt, Result};

use super::read::is_symlink;

/// create a directory and its parents, no-op if it already exists
pub fn create_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).with_path(path)
}

/// make sure the parent directory of `path` exists
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_directory(parent),
        _ => Ok(()),
    }
}

/// create (or truncate) a regular file with the given permission bits
///
/// a symlink at `path` is replaced, never written through.
pub fn create_file(path: &Path, mode: u32) -> Result<File> {
    if is_symlink(path)? {
        fs::remove_file(path).with_path(path)?;
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode & 0o7777)
        .custom_flags(OFlag::O_NOFOLLOW.bits())
        .open(path)
        .with_path(path)
}

/// create a symlink at `path` pointing to `target`, replacing what was there
pub fn create_symlink(path: &Path, target: &str) -> Result<()> {
    remove_existing(path)?;
    symlink(target, path).with_path(path)
}

/// create a hardlink at `link_path` to `target_path`, replacing what was there
pub fn create_hardlink(link_path: &Path, target_path: &Path) -> Result<()> {
    remove_existing(link_path)?;
    fs::hard_link(target_path, link_path).with_path(link_path)
}

/// create a fifo (named pipe)
pub fn create_fifo(path: &Path, mode: u32) -> Result<()> {
    remove_existing(path)?;

    nix::unistd::mkfifo(path, Mode::from_bits_truncate(mode)).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: io::Error::from(e),
    })
}

/// create a block device
pub fn create_block_device(path: &Path, major: u32, minor: u32, mode: u32) -> Result<()> {
    create_device_node(path, SFlag::S_IFBLK, major, minor, mode)
}

/// create a character device
pub fn create_char_device(path: &Path, major: u32, minor: u32, mode: u32) -> Result<()> {
    create_device_node(path, SFlag::S_IFCHR, major, minor, mode)
}

fn create_device_node(path: &Path, sflag: SFlag, major: u32, minor: u32, mode: u32) -> Result<()> {
    remove_existing(path)?;

    let dev = makedev(major as u64, minor as u64);

    mknod(path, sflag, Mode::from_bits_truncate(mode), dev).map_err(|e| {
        if e == nix::errno::Errno::EPERM {
            Error::DeviceNodePermission(path.to_path_buf())
        } else {
            Error::Io {
                path: path.to_path_buf(),
                source: io::Error::from(e),
            }
        }
    })
}

/// remove a non-directory object at `path`, including dangling symlinks
fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(_) => fs::remove_file(path).with_path(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
