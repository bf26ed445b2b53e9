use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, IntoInnerError};
use std::path::{Path, PathBuf};

use log::{debug, info};
use nix::errno::Errno;
use regex::Regex;

use crate::archive::collect::absolutize;
use crate::archive::{collect, common_path_prefix, CollectOptions, EntryKind, Format, TarWriter};
use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};

/// what went into (or came out of) an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub entries: usize,
    pub files: usize,
    /// total body bytes of file entries
    pub bytes: u64,
}

/// archive one or more roots into `output`
///
/// names start with each root's base name, relative to the deepest directory
/// containing every root. the output file itself is never archived.
pub fn create_archive(output: &Path, roots: &[PathBuf], config: &Config) -> Result<ArchiveStats> {
    Format::from_path(output)?;
    let output = absolutize(output)?;

    let mut absolute_roots = Vec::with_capacity(roots.len());
    let mut prefix: Option<PathBuf> = None;
    for root in roots {
        let root = absolutize(root)?;
        fs::symlink_metadata(&root).with_path(&root)?;

        let parent = root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());
        prefix = Some(match prefix {
            Some(prefix) => common_path_prefix(&prefix, &parent),
            None => parent,
        });
        absolute_roots.push(root);
    }

    let mut exclude = vec![own_pattern(&output)?];
    exclude.extend(config.exclude_pattern()?);
    let options = CollectOptions {
        name_prefix: prefix,
        exclude,
    };

    let file = File::create(&output).with_path(&output)?;
    let mut writer = TarWriter::new(BufWriter::new(file), config);
    let mut stats = ArchiveStats::default();
    let mut seen = HashSet::new();

    for root in &absolute_roots {
        for mut entry in collect(root, &options)? {
            // overlapping roots yield the same names twice
            if !seen.insert(entry.name.clone()) {
                debug!("skipping already archived {}", entry.name);
                continue;
            }

            writer.archive(&mut entry)?;
            stats.entries += 1;
            if entry.kind == EntryKind::File {
                stats.files += 1;
                stats.bytes += entry.size();
            }
        }
    }

    let file = writer
        .close()?
        .into_inner()
        .map_err(|e: IntoInnerError<BufWriter<File>>| Error::Io {
            path: output.clone(),
            source: e.into_error(),
        })?;
    sync_output(&file, &output)?;

    info!(
        "archived {} entries ({} files, {} bytes) into {}",
        stats.entries,
        stats.files,
        stats.bytes,
        output.display()
    );
    Ok(stats)
}

/// matches the archive being written, which may sit inside a root
fn own_pattern(output: &Path) -> Result<Regex> {
    let own = format!("^{}$", regex::escape(&output.to_string_lossy()));
    Ok(Regex::new(&own)?)
}

/// fsync, tolerating filesystems that cannot
fn sync_output(file: &File, path: &Path) -> Result<()> {
    match file.sync_all() {
        Err(e)
            if e.raw_os_error() == Some(Errno::EOPNOTSUPP as i32)
                || e.raw_os_error() == Some(Errno::ENOTSUP as i32) =>
        {
            debug!("{} does not support fsync", path.display());
            Ok(())
        }
        result => result.with_path(path),
    }
}
