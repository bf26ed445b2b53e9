use std::path::PathBuf;

use crate::archive::Discrepancy;

/// error type for ldt operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("unsupported checksum algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {source}")]
    Stream {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt archive: {0}")]
    CorruptContainer(String),

    #[error("{name}: bad size (expected {expected} bytes, got {actual})")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("{}", describe_discrepancies(.0))]
    ChecksumMismatch(Vec<Discrepancy>),

    #[error("body of {0} was already opened")]
    BodyAlreadyOpened(String),

    #[error("{0} has no link target")]
    MissingLinkTarget(String),

    #[error("invalid safe name hex: {0}")]
    InvalidSafeName(String),

    #[error("refusing to write outside of the destination: {0}")]
    UnsafePath(String),

    #[error("name is not valid utf-8: {}", .0.display())]
    NonUtf8Name(PathBuf),

    #[error("name prefix {prefix} is not an ancestor of {root}")]
    InvalidPrefix { prefix: PathBuf, root: PathBuf },

    #[error("cannot create device node without privileges: {0}")]
    DeviceNodePermission(PathBuf),

    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn describe_discrepancies(discrepancies: &[Discrepancy]) -> String {
    let details: Vec<String> = discrepancies.iter().map(|d| d.to_string()).collect();
    format!(
        "checksum verification failed for {} entries: {}",
        discrepancies.len(),
        details.join("; ")
    )
}

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

/// helper to wrap io errors on the archive stream with the operation that failed
pub trait StreamResultExt<T> {
    fn context(self, f: impl FnOnce() -> String) -> Result<T>;
}

impl<T> StreamResultExt<T> for std::io::Result<T> {
    fn context(self, f: impl FnOnce() -> String) -> Result<T> {
        self.map_err(|source| Error::Stream {
            context: f(),
            source,
        })
    }
}
