use std::io::{self, Read, Write};

use log::{debug, info};
use tar::{Builder, EntryType, Header};

use crate::checksum::{Algorithm, Checksummer};
use crate::config::Config;
use crate::error::{Error, Result, StreamResultExt};

use super::entry::{Entry, EntryKind, EntryMetadata, SpecialFile};
use super::table::{encode_records, record_name, ChecksumTable};
use super::tee::TeeReader;

const LINK_NAME_LEN: usize = 100;
const GNU_LONG_LINK: &[u8] = b"././@LongLink";

/// streaming tar encoder that embeds a checksum of every file body
///
/// entries go out as they are archived; the checksum table follows them as
/// PAX global headers when the writer is closed.
pub struct TarWriter<W: Write> {
    builder: Builder<W>,
    checksums: ChecksumTable,
    vendor: String,
    algorithm: Algorithm,
    record_cap: usize,
}

impl<W: Write> TarWriter<W> {
    pub fn new(writer: W, config: &Config) -> Self {
        Self {
            builder: Builder::new(writer),
            checksums: ChecksumTable::new(),
            vendor: config.vendor.clone(),
            algorithm: config.algorithm,
            record_cap: config.record_cap,
        }
    }

    /// digests recorded so far
    pub fn checksums(&self) -> &ChecksumTable {
        &self.checksums
    }

    /// write one entry, streaming its body if it has one
    pub fn archive(&mut self, entry: &mut Entry<'_>) -> Result<()> {
        let name = entry.name.clone();
        let mut header = Header::new_gnu();
        set_metadata(&mut header, &entry.metadata);

        match entry.kind {
            EntryKind::Directory => {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
                self.builder
                    .append_data(&mut header, &name, io::empty())
                    .context(|| format!("writing directory {}", name))?;
            }
            EntryKind::Symlink | EntryKind::HardLink => {
                let target = entry
                    .link_target
                    .as_deref()
                    .ok_or_else(|| Error::MissingLinkTarget(name.clone()))?;
                let entry_type = match entry.kind {
                    EntryKind::Symlink => EntryType::Symlink,
                    _ => EntryType::Link,
                };
                header.set_entry_type(entry_type);
                header.set_size(0);
                self.append_link_verbatim(&mut header, &name, target)
                    .context(|| format!("writing {} {}", entry.kind, name))?;
            }
            EntryKind::File => self.archive_file(entry, header)?,
        }

        debug!("archived {} {}", entry.kind, name);
        Ok(())
    }

    /// archive every entry in order, stopping at the first failure
    pub fn archives<'e, I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = Entry<'e>>,
    {
        for mut entry in entries {
            self.archive(&mut entry)?;
        }
        Ok(())
    }

    /// write a link header keeping the target byte for byte
    ///
    /// targets longer than the header field go out in a GNU long link record
    /// first, the same way long names do.
    fn append_link_verbatim(
        &mut self,
        header: &mut Header,
        name: &str,
        target: &str,
    ) -> io::Result<()> {
        let target = target.as_bytes();
        if target.len() > LINK_NAME_LEN {
            let mut long = Header::new_gnu();
            long.as_old_mut().name[..GNU_LONG_LINK.len()].copy_from_slice(GNU_LONG_LINK);
            long.set_mode(0o644);
            long.set_entry_type(EntryType::GNULongLink);
            long.set_size(target.len() as u64 + 1);
            long.set_cksum();
            self.builder.append(&long, target.chain(&[0u8][..]))?;
        }
        header.set_link_name_literal(&target[..target.len().min(LINK_NAME_LEN)])?;
        self.builder.append_data(header, name, io::empty())
    }

    fn archive_file(&mut self, entry: &mut Entry<'_>, mut header: Header) -> Result<()> {
        let name = entry.name.clone();
        let mut sum = Checksummer::new(self.algorithm);

        match entry.metadata.special {
            Some(special) => {
                set_special(&mut header, special)
                    .context(|| format!("writing device numbers of {}", name))?;
                header.set_size(0);
                self.builder
                    .append_data(&mut header, &name, io::empty())
                    .context(|| format!("writing {}", name))?;
            }
            None => {
                let size = entry.size();
                header.set_entry_type(EntryType::Regular);
                header.set_size(size);

                let written = {
                    let body = entry.open()?;
                    let mut tee = TeeReader::new(body.take(size), &mut sum);
                    self.builder
                        .append_data(&mut header, &name, &mut tee)
                        .context(|| format!("writing file {}", name))?;
                    tee.count()
                };

                if written != size {
                    return Err(Error::SizeMismatch {
                        name,
                        expected: size,
                        actual: written,
                    });
                }
            }
        }

        self.checksums.insert(entry.safe_name(), sum.finalize_hex());
        Ok(())
    }

    /// write the checksum records, finish the archive and hand back the sink
    pub fn close(mut self) -> Result<W> {
        let records = self.checksums.split(self.record_cap);

        for (index, rows) in records.iter().enumerate() {
            let name = record_name(&self.vendor, self.algorithm, index);
            let payload = encode_records(rows);

            let mut header = Header::new_ustar();
            header.set_entry_type(EntryType::XGlobalHeader);
            header.set_mode(0o644);
            header.set_size(payload.len() as u64);
            self.builder
                .append_data(&mut header, &name, payload.as_slice())
                .context(|| format!("writing checksum record {}", name))?;
        }

        info!(
            "archived {} checksums in {} records",
            self.checksums.len(),
            records.len()
        );

        let mut inner = self
            .builder
            .into_inner()
            .context(|| "finishing archive".to_string())?;
        inner.flush().context(|| "flushing archive".to_string())?;
        Ok(inner)
    }
}

fn set_metadata(header: &mut Header, metadata: &EntryMetadata) {
    header.set_mode(metadata.mode);
    header.set_mtime(metadata.mtime);
    header.set_uid(metadata.uid);
    header.set_gid(metadata.gid);
}

fn set_special(header: &mut Header, special: SpecialFile) -> io::Result<()> {
    let (entry_type, major, minor) = match special {
        SpecialFile::Fifo => (EntryType::Fifo, 0, 0),
        SpecialFile::CharDevice { major, minor } => (EntryType::Char, major, minor),
        SpecialFile::BlockDevice { major, minor } => (EntryType::Block, major, minor),
    };
    header.set_entry_type(entry_type);
    header.set_device_major(major)?;
    header.set_device_minor(minor)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::entry::MemoryBody;

    fn file(name: &str, content: &[u8]) -> Entry<'static> {
        let metadata = EntryMetadata {
            size: content.len() as u64,
            mode: 0o644,
            ..Default::default()
        };
        Entry::new(EntryKind::File, name, None, metadata).with_body(MemoryBody::new(content))
    }

    fn raw_entries(data: &[u8]) -> Vec<(EntryType, String)> {
        let mut archive = tar::Archive::new(data);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                let name = String::from_utf8_lossy(&e.path_bytes()).into_owned();
                (e.header().entry_type(), name)
            })
            .collect()
    }

    #[test]
    fn test_empty_archive() {
        let writer = TarWriter::new(Vec::new(), &Config::default());
        let data = writer.close().unwrap();

        assert_eq!(data.len(), 1024);
        assert!(data.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_writes_all_kinds_then_checksums() {
        let mut writer = TarWriter::new(Vec::new(), &Config::default());
        let metadata = EntryMetadata {
            mode: 0o755,
            ..Default::default()
        };

        writer
            .archives(vec![
                Entry::new(EntryKind::Directory, "etc", None, metadata.clone()),
                file("etc/hosts", b"127.0.0.1 localhost\n"),
                Entry::new(
                    EntryKind::Symlink,
                    "etc/localtime",
                    Some("/usr/share/zoneinfo/UTC".to_string()),
                    metadata.clone(),
                ),
                Entry::new(
                    EntryKind::HardLink,
                    "etc/hosts.bak",
                    Some("etc/hosts".to_string()),
                    metadata,
                ),
            ])
            .unwrap();
        assert_eq!(writer.checksums().len(), 1);

        let data = writer.close().unwrap();
        let entries = raw_entries(&data);

        assert_eq!(
            entries,
            vec![
                (EntryType::Directory, "etc".to_string()),
                (EntryType::Regular, "etc/hosts".to_string()),
                (EntryType::Symlink, "etc/localtime".to_string()),
                (EntryType::Link, "etc/hosts.bak".to_string()),
                (EntryType::XGlobalHeader, "LDT.checksum.xxh3.0".to_string()),
            ]
        );
    }

    #[test]
    fn test_checksum_matches_engine() {
        let mut writer = TarWriter::new(Vec::new(), &Config::default());
        writer.archive(&mut file("a", b"some content")).unwrap();

        let mut expected = Checksummer::new(Algorithm::Xxh3);
        expected.update(b"some content");
        assert_eq!(
            writer.checksums().get(&crate::hash::SafeName::of("a")),
            Some(expected.finalize_hex().as_str())
        );
    }

    #[test]
    fn test_long_names() {
        let name = format!("{}/file.txt", "deep".repeat(40));
        let mut writer = TarWriter::new(Vec::new(), &Config::default());
        writer.archive(&mut file(&name, b"x")).unwrap();
        let data = writer.close().unwrap();

        assert_eq!(raw_entries(&data)[0].1, name);
    }

    #[test]
    fn test_link_targets_stored_verbatim() {
        let long_target = format!("{}//end/", "../far".repeat(30));
        let mut writer = TarWriter::new(Vec::new(), &Config::default());
        writer
            .archives(vec![
                Entry::new(
                    EntryKind::Symlink,
                    "slashes",
                    Some("dir//sub/".to_string()),
                    EntryMetadata::default(),
                ),
                Entry::new(
                    EntryKind::Symlink,
                    "long",
                    Some(long_target.clone()),
                    EntryMetadata::default(),
                ),
            ])
            .unwrap();
        let data = writer.close().unwrap();

        let mut archive = tar::Archive::new(data.as_slice());
        let targets: Vec<(String, Vec<u8>)> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.header().entry_type() == EntryType::Symlink)
            .map(|e| {
                let name = String::from_utf8_lossy(&e.path_bytes()).into_owned();
                (name, e.link_name_bytes().unwrap().into_owned())
            })
            .collect();

        assert_eq!(
            targets,
            vec![
                ("slashes".to_string(), b"dir//sub/".to_vec()),
                ("long".to_string(), long_target.into_bytes()),
            ]
        );
    }

    #[test]
    fn test_short_body_is_size_mismatch() {
        let metadata = EntryMetadata {
            size: 10,
            ..Default::default()
        };
        let mut entry =
            Entry::new(EntryKind::File, "short", None, metadata).with_body(MemoryBody::new("abc"));

        let mut writer = TarWriter::new(Vec::new(), &Config::default());
        let err = writer.archive(&mut entry).unwrap_err();

        assert!(matches!(
            err,
            Error::SizeMismatch { name, expected: 10, actual: 3 } if name == "short"
        ));
    }

    #[test]
    fn test_link_without_target() {
        let mut entry = Entry::new(EntryKind::Symlink, "l", None, EntryMetadata::default());
        let mut writer = TarWriter::new(Vec::new(), &Config::default());

        assert!(matches!(
            writer.archive(&mut entry),
            Err(Error::MissingLinkTarget(name)) if name == "l"
        ));
    }

    #[test]
    fn test_special_file_records_empty_digest() {
        let metadata = EntryMetadata {
            special: Some(SpecialFile::CharDevice { major: 1, minor: 3 }),
            ..Default::default()
        };
        let mut entry = Entry::new(EntryKind::File, "dev/null", None, metadata);

        let mut writer = TarWriter::new(Vec::new(), &Config::default());
        writer.archive(&mut entry).unwrap();

        let empty = Checksummer::new(Algorithm::Xxh3).finalize_hex();
        assert_eq!(
            writer.checksums().get(&entry.safe_name()),
            Some(empty.as_str())
        );

        let data = writer.close().unwrap();
        let mut archive = tar::Archive::new(data.as_slice());
        let first = archive.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(first.header().entry_type(), EntryType::Char);
        assert_eq!(first.header().device_major().unwrap(), Some(1));
        assert_eq!(first.header().device_minor().unwrap(), Some(3));
    }

    #[test]
    fn test_record_cap_splits_records() {
        let config = Config {
            algorithm: Algorithm::Sha256,
            record_cap: 300,
            ..Config::default()
        };
        let mut writer = TarWriter::new(Vec::new(), &config);
        for i in 0..5 {
            writer
                .archive(&mut file(&format!("f{}", i), format!("{}", i).as_bytes()))
                .unwrap();
        }
        let data = writer.close().unwrap();

        // 64 hex key + 64 hex digest per row: the third row closes a record
        let records: Vec<String> = raw_entries(&data)
            .into_iter()
            .filter(|(t, _)| *t == EntryType::XGlobalHeader)
            .map(|(_, n)| n)
            .collect();
        assert_eq!(
            records,
            vec![
                "LDT.checksum.sha256.0",
                "LDT.checksum.sha256.1",
            ]
        );
    }
}
