use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use log::info;

use crate::archive::{DiskHandler, EntryKind, Format, TarReader};
use crate::config::Config;
use crate::error::{Error, IoResultExt, Result, StreamResultExt};
use crate::fs::create_directory;

use super::archive::ArchiveStats;

fn open_archive(archive: &Path, config: &Config) -> Result<TarReader<BufReader<File>>> {
    Format::from_path(archive)?;
    let file = File::open(archive).with_path(archive)?;
    Ok(TarReader::new(BufReader::new(file), config))
}

/// extract `archive` below `destination`, then verify its checksums
pub fn extract_archive(archive: &Path, destination: &Path, config: &Config) -> Result<ArchiveStats> {
    let mut reader = open_archive(archive, config)?;
    create_directory(destination)?;

    let mut handler = DiskHandler::new(destination);
    let mut stats = ArchiveStats::default();
    reader.extract(|kind, entry| {
        handler.handle(kind, entry)?;
        stats.entries += 1;
        if kind == EntryKind::File {
            stats.files += 1;
            stats.bytes += entry.size();
        }
        Ok(())
    })?;
    reader.check()?;

    info!(
        "extracted {} entries from {} into {}",
        stats.entries,
        archive.display(),
        destination.display()
    );
    Ok(stats)
}

/// read every body of `archive` without writing anything, then verify its checksums
pub fn check_archive(archive: &Path, config: &Config) -> Result<ArchiveStats> {
    let mut reader = open_archive(archive, config)?;

    let mut stats = ArchiveStats::default();
    reader.extract(|kind, entry| {
        stats.entries += 1;
        if kind != EntryKind::File {
            return Ok(());
        }

        let name = entry.name.clone();
        let expected = entry.size();
        let actual = io::copy(&mut entry.open()?, &mut io::sink())
            .context(|| format!("reading {}", name))?;
        if actual != expected {
            return Err(Error::SizeMismatch {
                name,
                expected,
                actual,
            });
        }

        stats.files += 1;
        stats.bytes += actual;
        Ok(())
    })?;
    reader.check()?;

    info!(
        "{}: {} entries, {} verified checksums",
        archive.display(),
        stats.entries,
        reader.verifier().ingested().len()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::create_archive;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn fixture(dir: &Path) -> PathBuf {
        let root = dir.join("etc");
        fs::create_dir_all(root.join("ssh")).unwrap();
        fs::write(root.join("hostname"), "box\n").unwrap();
        fs::write(root.join("ssh/sshd_config"), "PermitRootLogin no\n").unwrap();
        std::os::unix::fs::symlink("hostname", root.join("name")).unwrap();

        let output = dir.join("etc.tar");
        create_archive(&output, &[root], &Config::default()).unwrap();
        output
    }

    fn flip_byte(path: &Path, needle: &[u8]) {
        let mut data = fs::read(path).unwrap();
        let pos = data
            .windows(needle.len())
            .position(|w| w == needle)
            .unwrap();
        data[pos] ^= 0x20;
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_extract_archive() {
        let src = tempdir().unwrap();
        let archive = fixture(src.path());

        let dest = tempdir().unwrap();
        let out = dest.path().join("restore");
        let stats = extract_archive(&archive, &out, &Config::default()).unwrap();

        assert_eq!(stats.entries, 5);
        assert_eq!(stats.files, 2);
        assert_eq!(
            fs::read_to_string(out.join("etc/ssh/sshd_config")).unwrap(),
            "PermitRootLogin no\n"
        );
        assert_eq!(
            fs::read_link(out.join("etc/name")).unwrap(),
            PathBuf::from("hostname")
        );
    }

    #[test]
    fn test_extract_reports_corruption() {
        let src = tempdir().unwrap();
        let archive = fixture(src.path());
        flip_byte(&archive, b"PermitRootLogin");

        let dest = tempdir().unwrap();
        match extract_archive(&archive, dest.path(), &Config::default()) {
            Err(Error::ChecksumMismatch(found)) => {
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].name(), "etc/ssh/sshd_config");
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_check_archive() {
        let src = tempdir().unwrap();
        let archive = fixture(src.path());

        let stats = check_archive(&archive, &Config::default()).unwrap();
        assert_eq!(stats.entries, 5);
        assert_eq!(stats.bytes, 4 + 19);

        flip_byte(&archive, b"box");
        let err = check_archive(&archive, &Config::default()).unwrap_err();
        assert!(err.to_string().contains("etc/hostname"));
    }

    #[test]
    fn test_check_truncated_archive() {
        let src = tempdir().unwrap();
        let archive = fixture(src.path());

        // cut into the body of the first file
        let data = fs::read(&archive).unwrap();
        fs::write(&archive, &data[..512 * 2 + 2]).unwrap();

        assert!(check_archive(&archive, &Config::default()).is_err());
    }

    #[test]
    fn test_check_missing_archive() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.tar");

        assert!(matches!(
            check_archive(&missing, &Config::default()),
            Err(Error::Io { .. })
        ));
        assert!(matches!(
            check_archive(&dir.path().join("nope.rar"), &Config::default()),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
