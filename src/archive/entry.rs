use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::checksum::Checksummer;
use crate::error::{Error, IoResultExt, Result};
use crate::hash::SafeName;

use super::tee::TeeReader;

/// the four kinds of archived objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    HardLink,
}

impl EntryKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EntryKind::Directory => "directory",
            EntryKind::File => "file",
            EntryKind::Symlink => "symlink",
            EntryKind::HardLink => "link",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.type_name())
    }
}

/// non-regular objects archived as File entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialFile {
    Fifo,
    CharDevice { major: u32, minor: u32 },
    BlockDevice { major: u32, minor: u32 },
}

/// pass-through metadata of an entry, not interpreted by the codec
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub size: u64,
    pub mode: u32,
    /// seconds since the epoch
    pub mtime: u64,
    pub uid: u64,
    pub gid: u64,
    pub special: Option<SpecialFile>,
}

/// lazy access to the body of an entry
pub trait BodyProvider {
    /// open a fresh readable stream over the body
    fn open(&mut self) -> Result<Box<dyn Read + '_>>;
}

/// body backed by a file on disk, opened on demand
pub struct DiskBody {
    path: PathBuf,
}

impl DiskBody {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BodyProvider for DiskBody {
    fn open(&mut self) -> Result<Box<dyn Read + '_>> {
        let file = File::open(&self.path).with_path(&self.path)?;
        Ok(Box::new(file))
    }
}

/// body held in memory
pub struct MemoryBody(Vec<u8>);

impl MemoryBody {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self(data.into())
    }
}

impl BodyProvider for MemoryBody {
    fn open(&mut self) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.0.as_slice()))
    }
}

/// body backed by the current record of an archive stream
///
/// every byte read through it is also fed to the checksummer.
pub struct StreamBody<'a, R: ?Sized> {
    inner: &'a mut R,
    sink: &'a mut Checksummer,
}

impl<'a, R: Read + ?Sized> StreamBody<'a, R> {
    pub fn new(inner: &'a mut R, sink: &'a mut Checksummer) -> Self {
        Self { inner, sink }
    }
}

impl<R: Read + ?Sized> BodyProvider for StreamBody<'_, R> {
    fn open(&mut self) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(TeeReader::new(&mut *self.inner, &mut *self.sink)))
    }
}

/// one archived filesystem object
pub struct Entry<'a> {
    pub kind: EntryKind,
    /// archive-relative, slash separated, no leading slash
    pub name: String,
    pub link_target: Option<String>,
    pub metadata: EntryMetadata,
    body: Option<Box<dyn BodyProvider + 'a>>,
    opened: bool,
}

impl<'a> Entry<'a> {
    pub fn new(
        kind: EntryKind,
        name: impl Into<String>,
        link_target: Option<String>,
        metadata: EntryMetadata,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            link_target,
            metadata,
            body: None,
            opened: false,
        }
    }

    pub fn with_body(mut self, body: impl BodyProvider + 'a) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    /// checksum table key of this entry
    pub fn safe_name(&self) -> SafeName {
        SafeName::of(&self.name)
    }

    /// declared body size
    pub fn size(&self) -> u64 {
        self.metadata.size
    }

    /// open the body; allowed once per entry
    ///
    /// entries without a body yield an empty stream.
    pub fn open(&mut self) -> Result<Box<dyn Read + '_>> {
        if self.opened {
            return Err(Error::BodyAlreadyOpened(self.name.clone()));
        }
        self.opened = true;

        match self.body.as_mut() {
            Some(body) => body.open(),
            None => Ok(Box::new(io::empty())),
        }
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("link_target", &self.link_target)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
