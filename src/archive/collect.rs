use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use log::debug;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Error, IoResultExt, Result};
use crate::fs::{read_symlink_target, FileMetadata, FileType};

use super::entry::{DiskBody, Entry, EntryKind, EntryMetadata, SpecialFile};

/// options controlling how a root is collected
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    /// directory entry names are made relative to (defaults to the root's parent)
    pub name_prefix: Option<PathBuf>,
    /// absolute paths matching any of these are skipped, directories with their contents
    pub exclude: Vec<Regex>,
}

/// walk `root` depth-first and describe every object found as an entry
///
/// directories come before their contents and siblings are sorted by name.
/// symlinks are not followed and sockets are skipped. the first object that
/// cannot be read, or whose name is not utf-8, aborts the walk.
pub fn collect(root: &Path, options: &CollectOptions) -> Result<Vec<Entry<'static>>> {
    let root = absolutize(root)?;
    let base = match &options.name_prefix {
        Some(prefix) => absolutize(prefix)?,
        None => root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone()),
    };
    if !root.starts_with(&base) {
        return Err(Error::InvalidPrefix { prefix: base, root });
    }

    let exclude = options.exclude.as_slice();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .follow_root_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|item| !is_excluded(exclude, item.path()));

    let mut entries = Vec::new();
    let mut links = LinkTracker::default();

    for item in walker {
        let item = item.map_err(|e| walk_error(&root, e))?;
        let path = item.path();

        let Some(name) = entry_name(&base, path)?.filter(|name| !name.is_empty()) else {
            continue;
        };

        let meta = FileMetadata::from_path(path)?;
        if let Some(entry) = build_entry(path, name, &meta, &mut links)? {
            debug!("collected {} {}", entry.kind, entry.name);
            entries.push(entry);
        }
    }

    Ok(entries)
}

/// longest common prefix of two paths, compared component by component
pub fn common_path_prefix(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// make `path` absolute and drop `.`/`..` components without touching the disk
pub fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().with_path(path)?.join(path)
    };

    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}

fn is_excluded(exclude: &[Regex], path: &Path) -> bool {
    if exclude.is_empty() {
        return false;
    }
    let path = path.to_string_lossy();
    exclude.iter().any(|re| re.is_match(&path))
}

fn walk_error(root: &Path, err: walkdir::Error) -> Error {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    Error::Io {
        path,
        source: err.into(),
    }
}

/// slash-separated name of `path` relative to `base`
fn entry_name(base: &Path, path: &Path) -> Result<Option<String>> {
    let Ok(relative) = path.strip_prefix(base) else {
        return Ok(None);
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            let part = part
                .to_str()
                .ok_or_else(|| Error::NonUtf8Name(path.to_path_buf()))?;
            parts.push(part);
        }
    }
    Ok(Some(parts.join("/")))
}

fn build_entry(
    path: &Path,
    name: String,
    meta: &FileMetadata,
    links: &mut LinkTracker,
) -> Result<Option<Entry<'static>>> {
    let mut metadata = EntryMetadata {
        size: 0,
        mode: meta.permissions(),
        mtime: meta.mtime.max(0) as u64,
        uid: meta.uid as u64,
        gid: meta.gid as u64,
        special: None,
    };

    let entry = match meta.file_type {
        FileType::Socket => {
            debug!("skipping socket {}", path.display());
            return Ok(None);
        }
        FileType::Directory => Entry::new(EntryKind::Directory, name, None, metadata),
        FileType::Symlink => {
            let target = read_symlink_target(path)?;
            Entry::new(EntryKind::Symlink, name, Some(target), metadata)
        }
        FileType::Regular => match links.first_name(meta, &name) {
            Some(first) => Entry::new(EntryKind::HardLink, name, Some(first), metadata),
            None => {
                metadata.size = meta.size;
                Entry::new(EntryKind::File, name, None, metadata).with_body(DiskBody::new(path))
            }
        },
        FileType::Fifo => {
            metadata.special = Some(SpecialFile::Fifo);
            Entry::new(EntryKind::File, name, None, metadata)
        }
        FileType::CharDevice => {
            let (major, minor) = meta.rdev.unwrap_or((0, 0));
            metadata.special = Some(SpecialFile::CharDevice { major, minor });
            Entry::new(EntryKind::File, name, None, metadata)
        }
        FileType::BlockDevice => {
            let (major, minor) = meta.rdev.unwrap_or((0, 0));
            metadata.special = Some(SpecialFile::BlockDevice { major, minor });
            Entry::new(EntryKind::File, name, None, metadata)
        }
    };

    Ok(Some(entry))
}

/// first collected name of every multiply-linked inode
///
/// later names of the same (dev, ino) become hard links to it.
#[derive(Default)]
struct LinkTracker {
    seen: HashMap<(u64, u64), String>,
}

impl LinkTracker {
    fn first_name(&mut self, meta: &FileMetadata, name: &str) -> Option<String> {
        if !meta.could_be_hardlink() {
            return None;
        }
        match self.seen.get(&(meta.dev, meta.ino)) {
            Some(first) => Some(first.clone()),
            None => {
                self.seen.insert((meta.dev, meta.ino), name.to_string());
                None
            }
        }
    }
}
