use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::hash::SafeName;

use super::table::ChecksumTable;

/// one problem found while comparing checksum tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// digest computed while reading differs from the embedded one
    Mismatch {
        name: String,
        expected: String,
        actual: String,
    },
    /// embedded checksum for an entry that never showed up
    Missing { name: String, expected: String },
    /// file entry without an embedded checksum
    Unexpected { name: String, actual: String },
    /// the same name appeared more than once in the archive
    Duplicate { name: String },
}

impl Discrepancy {
    /// entry name (or safe name when the entry was never seen)
    pub fn name(&self) -> &str {
        match self {
            Discrepancy::Mismatch { name, .. }
            | Discrepancy::Missing { name, .. }
            | Discrepancy::Unexpected { name, .. }
            | Discrepancy::Duplicate { name } => name,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::Mismatch {
                name,
                expected,
                actual,
            } => write!(f, "corrupted ({}->{}): {}", expected, actual, name),
            Discrepancy::Missing { name, expected } => {
                write!(f, "missing ({}): {}", expected, name)
            }
            Discrepancy::Unexpected { name, actual } => {
                write!(f, "no embedded checksum ({}): {}", actual, name)
            }
            Discrepancy::Duplicate { name } => write!(f, "duplicate entry: {}", name),
        }
    }
}

/// embedded and computed checksums gathered during one read pass
#[derive(Debug, Default)]
pub struct Verifier {
    ingested: ChecksumTable,
    computed: ChecksumTable,
    names: HashMap<SafeName, String>,
    duplicates: BTreeSet<String>,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// merge rows read from a checksum record
    pub fn ingest(&mut self, rows: ChecksumTable) {
        self.ingested.merge(rows);
    }

    /// record the digest computed for an entry body
    ///
    /// returns false if the name was already recorded in this pass.
    pub fn record(&mut self, name: &str, digest: String) -> bool {
        let safe_name = SafeName::of(name);
        self.names.insert(safe_name, name.to_string());
        if self.computed.insert(safe_name, digest).is_some() {
            self.duplicates.insert(name.to_string());
            return false;
        }
        true
    }

    pub fn ingested(&self) -> &ChecksumTable {
        &self.ingested
    }

    pub fn computed(&self) -> &ChecksumTable {
        &self.computed
    }

    /// compare both tables and list every discrepancy
    ///
    /// an archive without embedded checksums has nothing to verify.
    pub fn discrepancies(&self) -> Vec<Discrepancy> {
        let mut found = Vec::new();
        if self.ingested.is_empty() {
            return found;
        }

        for (safe_name, expected) in self.ingested.iter() {
            let name = self.display_name(safe_name);
            match self.computed.get(safe_name) {
                Some(actual) if actual == expected.as_str() => {}
                Some(actual) => found.push(Discrepancy::Mismatch {
                    name,
                    expected: expected.clone(),
                    actual: actual.to_string(),
                }),
                None => found.push(Discrepancy::Missing {
                    name,
                    expected: expected.clone(),
                }),
            }
        }

        for (safe_name, actual) in self.computed.iter() {
            if !self.ingested.contains(safe_name) {
                found.push(Discrepancy::Unexpected {
                    name: self.display_name(safe_name),
                    actual: actual.clone(),
                });
            }
        }

        found.extend(
            self.duplicates
                .iter()
                .map(|name| Discrepancy::Duplicate { name: name.clone() }),
        );

        found
    }

    fn display_name(&self, safe_name: &SafeName) -> String {
        self.names
            .get(safe_name)
            .cloned()
            .unwrap_or_else(|| safe_name.to_hex())
    }
}
