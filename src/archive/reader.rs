use std::ffi::OsStr;
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

use log::{debug, info, warn};
use tar::{Archive, EntryType, Header};

use crate::checksum::{Algorithm, Checksummer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::hash::SafeName;

use super::entry::{Entry, EntryKind, EntryMetadata, SpecialFile, StreamBody};
use super::table::{parse_record_name, ChecksumTable};
use super::verify::Verifier;

/// streaming tar decoder that verifies embedded checksums
///
/// bodies are checksummed while the handler reads them; `check` compares the
/// result with the embedded table once the whole archive has been read.
pub struct TarReader<R: Read> {
    archive: Archive<R>,
    vendor: String,
    algorithm: Algorithm,
    verifier: Verifier,
}

impl<R: Read> TarReader<R> {
    pub fn new(reader: R, config: &Config) -> Self {
        Self {
            archive: Archive::new(reader),
            vendor: config.vendor.clone(),
            algorithm: config.algorithm,
            verifier: Verifier::new(),
        }
    }

    /// read every record, handing each entry to `handler`
    ///
    /// checksum records are ingested instead of being handed out. the digest
    /// of a file entry is recorded once the handler returns, so a handler that
    /// never opens the body records the digest of an empty stream.
    pub fn extract<F>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(EntryKind, &mut Entry<'_>) -> Result<()>,
    {
        let mut count = 0usize;

        for raw in self.archive.entries().map_err(corrupt)? {
            let mut raw = raw.map_err(corrupt)?;
            let entry_type = raw.header().entry_type();

            if entry_type.is_pax_global_extensions() {
                // foreign record names need not be utf-8, they are only logged
                let record = String::from_utf8_lossy(&raw.path_bytes())
                    .trim_start_matches("./")
                    .to_string();
                match parse_record_name(&record, &self.vendor) {
                    Some((tag, index)) if tag == self.algorithm.as_str() => {
                        let rows = read_checksum_record(&mut raw, &record)?;
                        debug!("ingested {} checksums from record {}", rows.len(), index);
                        self.verifier.ingest(rows);
                    }
                    _ => warn!("ignoring global header {}", record),
                }
                continue;
            }

            let name = normalize_name(&raw.path_bytes())?;

            let Some(kind) = classify(entry_type) else {
                warn!("skipping {:?} record {}", entry_type, name);
                continue;
            };

            let link_target = match kind {
                EntryKind::Symlink => raw
                    .link_name_bytes()
                    .map(|target| decode_name(&target))
                    .transpose()?,
                EntryKind::HardLink => raw
                    .link_name_bytes()
                    .map(|target| normalize_name(&target))
                    .transpose()?,
                _ => None,
            };
            let metadata = read_metadata(raw.header(), entry_type, &name)?;

            let mut sum = Checksummer::new(self.algorithm);
            {
                let mut entry = Entry::new(kind, name.clone(), link_target, metadata)
                    .with_body(StreamBody::new(&mut raw, &mut sum));
                handler(kind, &mut entry)?;
            }

            if kind == EntryKind::File && !self.verifier.record(&name, sum.finalize_hex()) {
                warn!("duplicate entry {}", name);
            }
            count += 1;
        }

        info!(
            "read {} entries, {} embedded checksums",
            count,
            self.verifier.ingested().len()
        );
        Ok(())
    }

    /// compare computed digests with the embedded ones
    ///
    /// archives without embedded checksums always pass.
    pub fn check(&self) -> Result<()> {
        let found = self.verifier.discrepancies();
        if found.is_empty() {
            return Ok(());
        }
        Err(Error::ChecksumMismatch(found))
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }
}

fn corrupt(err: io::Error) -> Error {
    Error::CorruptContainer(err.to_string())
}

fn classify(entry_type: EntryType) -> Option<EntryKind> {
    match entry_type {
        EntryType::Regular
        | EntryType::Continuous
        | EntryType::GNUSparse
        | EntryType::Fifo
        | EntryType::Char
        | EntryType::Block => Some(EntryKind::File),
        EntryType::Directory => Some(EntryKind::Directory),
        EntryType::Symlink => Some(EntryKind::Symlink),
        EntryType::Link => Some(EntryKind::HardLink),
        _ => None,
    }
}

fn decode_name(raw: &[u8]) -> Result<String> {
    String::from_utf8(raw.to_vec())
        .map_err(|_| Error::NonUtf8Name(PathBuf::from(OsStr::from_bytes(raw))))
}

/// archive names are kept relative and without trailing slashes
fn normalize_name(raw: &[u8]) -> Result<String> {
    let name = decode_name(raw)?;
    Ok(name.trim_start_matches("./").trim_matches('/').to_string())
}

/// value of a pass-through numeric field, 0 when the field is empty or garbled
fn lenient<T: Default>(name: &str, field: &str, value: io::Result<T>) -> T {
    value.unwrap_or_else(|e| {
        debug!("{}: unreadable {} field, using 0: {}", name, field, e);
        T::default()
    })
}

fn read_metadata(header: &Header, entry_type: EntryType, name: &str) -> Result<EntryMetadata> {
    let device = |field: &str, number: io::Result<Option<u32>>| -> u32 {
        lenient(name, field, number).unwrap_or(0)
    };

    let special = match entry_type {
        EntryType::Fifo => Some(SpecialFile::Fifo),
        EntryType::Char => Some(SpecialFile::CharDevice {
            major: device("devmajor", header.device_major()),
            minor: device("devminor", header.device_minor()),
        }),
        EntryType::Block => Some(SpecialFile::BlockDevice {
            major: device("devmajor", header.device_major()),
            minor: device("devminor", header.device_minor()),
        }),
        _ => None,
    };

    // size frames the stream and has to be exact
    Ok(EntryMetadata {
        size: header.size().map_err(corrupt)?,
        mode: lenient(name, "mode", header.mode()),
        mtime: lenient(name, "mtime", header.mtime()),
        uid: lenient(name, "uid", header.uid()),
        gid: lenient(name, "gid", header.gid()),
        special,
    })
}

fn read_checksum_record<T: Read>(raw: &mut tar::Entry<'_, T>, record: &str) -> Result<ChecksumTable> {
    let mut rows = ChecksumTable::new();
    let Some(extensions) = raw.pax_extensions().map_err(corrupt)? else {
        return Ok(rows);
    };

    for extension in extensions {
        let extension = extension.map_err(corrupt)?;
        let (Ok(key), Ok(value)) = (extension.key(), extension.value()) else {
            return Err(Error::CorruptContainer(format!(
                "{}: checksum row is not utf-8",
                record
            )));
        };
        let safe_name = SafeName::from_hex(key).map_err(|_| {
            Error::CorruptContainer(format!("{}: invalid checksum key {:?}", record, key))
        })?;
        rows.insert(safe_name, value);
    }

    Ok(rows)
}
