use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::archive::{EntryKind, Format, TarReader};
use crate::config::Config;
use crate::error::{IoResultExt, Result};

/// one archived entry as shown by `list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub kind: EntryKind,
    pub name: String,
    pub link_target: Option<String>,
    pub size: u64,
    pub mode: u32,
}

impl fmt::Display for ListEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:06o} {:<9} {:>10}    {}",
            self.mode, self.kind, self.size, self.name
        )?;
        if let Some(target) = &self.link_target {
            write!(f, " -> {}", target)?;
        }
        Ok(())
    }
}

/// list the entries of `archive` without reading their bodies
pub fn list_archive(archive: &Path, config: &Config) -> Result<Vec<ListEntry>> {
    Format::from_path(archive)?;
    let file = File::open(archive).with_path(archive)?;
    let mut reader = TarReader::new(BufReader::new(file), config);

    let mut entries = Vec::new();
    reader.extract(|kind, entry| {
        entries.push(ListEntry {
            kind,
            name: entry.name.clone(),
            link_target: entry.link_target.clone(),
            size: entry.size(),
            mode: entry.metadata.mode,
        });
        Ok(())
    })?;

    Ok(entries)
}
