use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::checksum::{checksum, Algorithm};
use crate::error::{Error, IoResultExt, Result};

/// hex digests of a file for each requested algorithm
pub fn checksum_file(path: &Path, algorithms: &[Algorithm]) -> Result<BTreeMap<Algorithm, String>> {
    let file = File::open(path).with_path(path)?;
    let digests = checksum(&mut BufReader::new(file), algorithms).map_err(|e| match e {
        Error::Stream { source, .. } => Error::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;

    Ok(digests
        .into_iter()
        .map(|(algorithm, digest)| (algorithm, hex::encode(digest)))
        .collect())
}
