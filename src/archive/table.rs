//! checksum tables and their on-archive encoding
//!
//! a table travels as one or more PAX global extended headers named
//! `<vendor>.checksum.<algorithm>.<index>`, each holding `safe name = digest`
//! records.

use std::collections::btree_map::{self, BTreeMap};

use crate::checksum::Algorithm;
use crate::hash::SafeName;

/// safe name -> hex digest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumTable {
    rows: BTreeMap<SafeName, String>,
}

impl ChecksumTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// insert a row, returning the digest it replaced
    pub fn insert(&mut self, name: SafeName, digest: impl Into<String>) -> Option<String> {
        self.rows.insert(name, digest.into())
    }

    pub fn get(&self, name: &SafeName) -> Option<&str> {
        self.rows.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &SafeName) -> bool {
        self.rows.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, SafeName, String> {
        self.rows.iter()
    }

    /// merge every row of `other` into this table
    pub fn merge(&mut self, other: ChecksumTable) {
        self.rows.extend(other.rows);
    }

    /// group rows into records whose key+value bytes stay around `cap`
    ///
    /// a record is closed as soon as it reaches the cap; the remainder always
    /// forms a last record. an empty table yields no record.
    pub fn split(&self, cap: usize) -> Vec<Vec<(&SafeName, &str)>> {
        let mut records = Vec::new();
        let mut pending = Vec::new();
        let mut bytes = 0;

        for (name, digest) in &self.rows {
            pending.push((name, digest.as_str()));
            bytes += 2 * name.as_bytes().len() + digest.len();

            if bytes >= cap {
                records.push(std::mem::take(&mut pending));
                bytes = 0;
            }
        }

        if !pending.is_empty() {
            records.push(pending);
        }

        records
    }
}

impl FromIterator<(SafeName, String)> for ChecksumTable {
    fn from_iter<I: IntoIterator<Item = (SafeName, String)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// name of the `index`-th checksum record
pub fn record_name(vendor: &str, algorithm: Algorithm, index: usize) -> String {
    format!("{}.checksum.{}.{}", vendor, algorithm, index)
}

/// parse a checksum record name into (algorithm tag, index)
pub fn parse_record_name<'a>(name: &'a str, vendor: &str) -> Option<(&'a str, usize)> {
    let rest = name.strip_prefix(vendor)?.strip_prefix(".checksum.")?;
    let (algorithm, index) = rest.rsplit_once('.')?;
    Some((algorithm, index.parse().ok()?))
}

/// encode rows as a PAX extended header payload
pub fn encode_records(rows: &[(&SafeName, &str)]) -> Vec<u8> {
    let mut payload = Vec::new();
    for (name, digest) in rows {
        payload.extend_from_slice(pax_record(&name.to_hex(), digest).as_bytes());
    }
    payload
}

/// one `"<len> <key>=<value>\n"` record, where len counts the whole record
fn pax_record(key: &str, value: &str) -> String {
    let base = key.len() + value.len() + 3;
    let mut digits = 1;
    loop {
        let total = base + digits;
        if total.to_string().len() == digits {
            return format!("{} {}={}\n", total, key, value);
        }
        digits += 1;
    }
}
