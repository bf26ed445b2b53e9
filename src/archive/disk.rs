use std::io;
use std::path::{Component, Path, PathBuf};

use log::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::fs::{
    create_block_device, create_char_device, create_directory, create_fifo, create_file,
    create_hardlink, create_symlink, ensure_parent, is_symlink,
};

use super::entry::{Entry, EntryKind, SpecialFile};

/// recreates decoded entries below a destination directory
///
/// existing objects are replaced, last write wins.
pub struct DiskHandler {
    root: PathBuf,
}

impl DiskHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// materialize one entry
    pub fn handle(&mut self, kind: EntryKind, entry: &mut Entry<'_>) -> Result<()> {
        let path = self.destination(&entry.name)?;

        match kind {
            EntryKind::Directory => create_directory(&path)?,
            EntryKind::File => {
                ensure_parent(&path)?;
                match entry.metadata.special {
                    Some(special) => create_special(&path, special, entry.metadata.mode)?,
                    None => write_file(&path, entry)?,
                }
            }
            EntryKind::Symlink => {
                let target = link_target(entry)?;
                ensure_parent(&path)?;
                create_symlink(&path, target)?;
            }
            EntryKind::HardLink => {
                let target = self.destination(link_target(entry)?)?;
                ensure_parent(&path)?;
                create_hardlink(&path, &target)?;
            }
        }

        debug!("extracted {} {}", kind, path.display());
        Ok(())
    }

    /// join an archive name onto the root, refusing anything that escapes it
    ///
    /// parents below the root must not be symlinks: an earlier entry could
    /// have pointed one anywhere.
    fn destination(&self, name: &str) -> Result<PathBuf> {
        let unsafe_path = || Error::UnsafePath(name.to_string());
        let mut path = self.root.clone();
        let mut components = Path::new(name).components().peekable();

        while let Some(component) = components.next() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => continue,
                _ => return Err(unsafe_path()),
            }
            if components.peek().is_some() && is_symlink(&path)? {
                return Err(unsafe_path());
            }
        }
        Ok(path)
    }
}

fn link_target<'e>(entry: &'e Entry<'_>) -> Result<&'e str> {
    entry
        .link_target
        .as_deref()
        .ok_or_else(|| Error::MissingLinkTarget(entry.name.clone()))
}

fn write_file(path: &Path, entry: &mut Entry<'_>) -> Result<()> {
    let expected = entry.size();
    let mut file = create_file(path, entry.metadata.mode)?;

    let written = io::copy(&mut entry.open()?, &mut file).with_path(path)?;
    if written != expected {
        return Err(Error::SizeMismatch {
            name: entry.name.clone(),
            expected,
            actual: written,
        });
    }

    file.sync_all().with_path(path)
}

fn create_special(path: &Path, special: SpecialFile, mode: u32) -> Result<()> {
    match special {
        SpecialFile::Fifo => create_fifo(path, mode),
        SpecialFile::CharDevice { major, minor } => create_char_device(path, major, minor, mode),
        SpecialFile::BlockDevice { major, minor } => create_block_device(path, major, minor, mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::collect::{collect, CollectOptions};
    use crate::archive::entry::{EntryMetadata, MemoryBody};
    use crate::archive::reader::TarReader;
    use crate::archive::writer::TarWriter;
    use crate::config::Config;
    use std::fs;
    use std::os::unix::fs::{symlink, FileTypeExt, MetadataExt, PermissionsExt};
    use tempfile::tempdir;

    fn file(name: &str, content: &[u8]) -> Entry<'static> {
        let metadata = EntryMetadata {
            size: content.len() as u64,
            mode: 0o640,
            ..Default::default()
        };
        Entry::new(EntryKind::File, name, None, metadata).with_body(MemoryBody::new(content))
    }

    #[test]
    fn test_disk_round_trip() {
        let src = tempdir().unwrap();
        let root = src.path().join("dotfiles");
        fs::create_dir_all(root.join("nvim/lua")).unwrap();
        fs::write(root.join("nvim/init.lua"), "require('plugins')\n").unwrap();
        fs::write(root.join("nvim/lua/plugins.lua"), "return {}\n").unwrap();
        fs::write(root.join("über.txt"), "grüße").unwrap();
        fs::set_permissions(root.join("über.txt"), fs::Permissions::from_mode(0o600)).unwrap();
        symlink("nvim/init.lua", root.join("init")).unwrap();
        symlink("/does/not/exist", root.join("dangling")).unwrap();
        fs::hard_link(root.join("nvim/init.lua"), root.join("init.hard")).unwrap();
        crate::fs::create_fifo(&root.join("pipe"), 0o600).unwrap();

        let config = Config::default();
        let mut writer = TarWriter::new(Vec::new(), &config);
        writer
            .archives(collect(&root, &CollectOptions::default()).unwrap())
            .unwrap();
        let data = writer.close().unwrap();

        let dest = tempdir().unwrap();
        let mut handler = DiskHandler::new(dest.path());
        let mut reader = TarReader::new(data.as_slice(), &config);
        reader
            .extract(|kind, entry| handler.handle(kind, entry))
            .unwrap();
        reader.check().unwrap();

        let out = dest.path().join("dotfiles");
        assert_eq!(
            fs::read_to_string(out.join("nvim/init.lua")).unwrap(),
            "require('plugins')\n"
        );
        assert_eq!(
            fs::read_to_string(out.join("nvim/lua/plugins.lua")).unwrap(),
            "return {}\n"
        );
        assert_eq!(fs::read_to_string(out.join("über.txt")).unwrap(), "grüße");
        assert_eq!(
            fs::metadata(out.join("über.txt")).unwrap().mode() & 0o777,
            0o600
        );

        assert_eq!(
            fs::read_link(out.join("init")).unwrap(),
            PathBuf::from("nvim/init.lua")
        );
        assert_eq!(
            fs::read_link(out.join("dangling")).unwrap(),
            PathBuf::from("/does/not/exist")
        );

        let original = fs::metadata(out.join("nvim/init.lua")).unwrap();
        let linked = fs::metadata(out.join("init.hard")).unwrap();
        assert_eq!(original.ino(), linked.ino());

        assert!(fs::symlink_metadata(out.join("pipe"))
            .unwrap()
            .file_type()
            .is_fifo());
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dest = tempdir().unwrap();
        let mut handler = DiskHandler::new(dest.path());

        let mut up = file("../outside", b"x");
        assert!(matches!(
            handler.handle(EntryKind::File, &mut up),
            Err(Error::UnsafePath(name)) if name == "../outside"
        ));

        let mut absolute = file("/etc/passwd", b"x");
        assert!(matches!(
            handler.handle(EntryKind::File, &mut absolute),
            Err(Error::UnsafePath(_))
        ));

        let mut link = Entry::new(
            EntryKind::HardLink,
            "inside",
            Some("../../etc/shadow".to_string()),
            EntryMetadata::default(),
        );
        assert!(matches!(
            handler.handle(EntryKind::HardLink, &mut link),
            Err(Error::UnsafePath(_))
        ));

        assert!(!dest.path().join("inside").exists());
    }

    #[test]
    fn test_file_is_truncated() {
        let dest = tempdir().unwrap();
        fs::write(dest.path().join("f"), "a much longer previous content").unwrap();

        let mut handler = DiskHandler::new(dest.path());
        handler
            .handle(EntryKind::File, &mut file("f", b"short"))
            .unwrap();

        assert_eq!(fs::read_to_string(dest.path().join("f")).unwrap(), "short");
    }

    #[test]
    fn test_symlink_replaces_existing() {
        let dest = tempdir().unwrap();
        fs::write(dest.path().join("link"), "old file").unwrap();

        let mut handler = DiskHandler::new(dest.path());
        let mut entry = Entry::new(
            EntryKind::Symlink,
            "link",
            Some("target".to_string()),
            EntryMetadata::default(),
        );
        handler.handle(EntryKind::Symlink, &mut entry).unwrap();

        assert_eq!(
            fs::read_link(dest.path().join("link")).unwrap(),
            PathBuf::from("target")
        );
    }

    #[test]
    fn test_creates_missing_parents() {
        let dest = tempdir().unwrap();
        let mut handler = DiskHandler::new(dest.path());
        handler
            .handle(EntryKind::File, &mut file("a/b/c.txt", b"deep"))
            .unwrap();

        assert_eq!(
            fs::read_to_string(dest.path().join("a/b/c.txt")).unwrap(),
            "deep"
        );
    }

    #[test]
    fn test_short_body_is_size_mismatch() {
        let dest = tempdir().unwrap();
        let metadata = EntryMetadata {
            size: 8,
            mode: 0o644,
            ..Default::default()
        };
        let mut entry =
            Entry::new(EntryKind::File, "short", None, metadata).with_body(MemoryBody::new("abc"));

        let mut handler = DiskHandler::new(dest.path());
        assert!(matches!(
            handler.handle(EntryKind::File, &mut entry),
            Err(Error::SizeMismatch {
                expected: 8,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_directory_is_idempotent() {
        let dest = tempdir().unwrap();
        let mut handler = DiskHandler::new(dest.path());
        let mut dir = Entry::new(EntryKind::Directory, "d", None, EntryMetadata::default());

        handler.handle(EntryKind::Directory, &mut dir).unwrap();
        handler.handle(EntryKind::Directory, &mut dir).unwrap();

        assert!(dest.path().join("d").is_dir());
    }

    #[test]
    fn test_refuses_writing_through_symlinked_parent() {
        let outside = tempdir().unwrap();
        let config = Config::default();
        let target = outside.path().to_string_lossy().into_owned();
        let data = {
            let mut writer = TarWriter::new(Vec::new(), &config);
            writer
                .archives(vec![
                    Entry::new(
                        EntryKind::Symlink,
                        "evil",
                        Some(target),
                        EntryMetadata::default(),
                    ),
                    file("evil/pwned", b"gotcha"),
                ])
                .unwrap();
            writer.close().unwrap()
        };

        let dest = tempdir().unwrap();
        let mut handler = DiskHandler::new(dest.path());
        let mut reader = TarReader::new(data.as_slice(), &config);
        let err = reader
            .extract(|kind, entry| handler.handle(kind, entry))
            .unwrap_err();

        assert!(matches!(err, Error::UnsafePath(name) if name == "evil/pwned"));
        assert!(!outside.path().join("pwned").exists());
    }

    #[test]
    fn test_refuses_hardlink_through_symlinked_parent() {
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret"), "secret").unwrap();

        let dest = tempdir().unwrap();
        symlink(outside.path(), dest.path().join("evil")).unwrap();

        let mut handler = DiskHandler::new(dest.path());
        let mut link = Entry::new(
            EntryKind::HardLink,
            "grab",
            Some("evil/secret".to_string()),
            EntryMetadata::default(),
        );
        assert!(matches!(
            handler.handle(EntryKind::HardLink, &mut link),
            Err(Error::UnsafePath(name)) if name == "evil/secret"
        ));
        assert!(fs::symlink_metadata(dest.path().join("grab")).is_err());
    }

    #[test]
    fn test_file_replaces_symlink_instead_of_following_it() {
        let outside = tempdir().unwrap();
        let secret = outside.path().join("secret");
        fs::write(&secret, "keep").unwrap();

        let dest = tempdir().unwrap();
        symlink(&secret, dest.path().join("f")).unwrap();

        let mut handler = DiskHandler::new(dest.path());
        handler
            .handle(EntryKind::File, &mut file("f", b"new"))
            .unwrap();

        assert_eq!(fs::read_to_string(&secret).unwrap(), "keep");
        assert!(fs::symlink_metadata(dest.path().join("f"))
            .unwrap()
            .file_type()
            .is_file());
        assert_eq!(fs::read_to_string(dest.path().join("f")).unwrap(), "new");
    }
}
