//! checksum engine
//!
//! computes one or more digests over a byte stream in a single pass by
//! fanning every chunk out to one hasher per requested algorithm.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::Hasher as _;
use std::io::{self, Read, Write};
use std::str::FromStr;

use blake2::digest::consts::{U32, U64};
use blake2::Blake2b;
use fnv::FnvHasher;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use xxhash_rust::xxh3::Xxh3;

use crate::error::{Error, Result};

/// a supported hash function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Crc32,
    Fnv1a64,
    /// xxHash3, 64-bit
    Xxh3,
    Md5,
    Sha1,
    Sha256,
    Sha512,
    /// BLAKE2b with a 256-bit output
    Blake2b,
    Blake2b512,
}

impl Algorithm {
    pub const ALL: [Algorithm; 9] = [
        Algorithm::Crc32,
        Algorithm::Fnv1a64,
        Algorithm::Xxh3,
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha512,
        Algorithm::Blake2b,
        Algorithm::Blake2b512,
    ];

    /// name used on the command line and in checksum record names
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Crc32 => "crc32",
            Algorithm::Fnv1a64 => "fnv1a64",
            Algorithm::Xxh3 => "xxh3",
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
            Algorithm::Blake2b => "blake2b",
            Algorithm::Blake2b512 => "blake2b512",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| Error::UnsupportedAlgorithm(s.to_string()))
    }
}

/// streaming hasher for one algorithm
///
/// implements `Write` so it can sit at the end of a tee or fan-out.
pub enum Checksummer {
    Crc32(crc32fast::Hasher),
    Fnv1a64(FnvHasher),
    Xxh3(Box<Xxh3>),
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake2b(Blake2b<U32>),
    Blake2b512(Blake2b<U64>),
}

impl Checksummer {
    pub fn new(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Crc32 => Checksummer::Crc32(crc32fast::Hasher::new()),
            Algorithm::Fnv1a64 => Checksummer::Fnv1a64(FnvHasher::default()),
            Algorithm::Xxh3 => Checksummer::Xxh3(Box::new(Xxh3::new())),
            Algorithm::Md5 => Checksummer::Md5(Md5::new()),
            Algorithm::Sha1 => Checksummer::Sha1(Sha1::new()),
            Algorithm::Sha256 => Checksummer::Sha256(Sha256::new()),
            Algorithm::Sha512 => Checksummer::Sha512(Sha512::new()),
            Algorithm::Blake2b => Checksummer::Blake2b(Blake2b::<U32>::new()),
            Algorithm::Blake2b512 => Checksummer::Blake2b512(Blake2b::<U64>::new()),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            Checksummer::Crc32(_) => Algorithm::Crc32,
            Checksummer::Fnv1a64(_) => Algorithm::Fnv1a64,
            Checksummer::Xxh3(_) => Algorithm::Xxh3,
            Checksummer::Md5(_) => Algorithm::Md5,
            Checksummer::Sha1(_) => Algorithm::Sha1,
            Checksummer::Sha256(_) => Algorithm::Sha256,
            Checksummer::Sha512(_) => Algorithm::Sha512,
            Checksummer::Blake2b(_) => Algorithm::Blake2b,
            Checksummer::Blake2b512(_) => Algorithm::Blake2b512,
        }
    }

    /// feed content bytes
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Checksummer::Crc32(h) => h.update(data),
            Checksummer::Fnv1a64(h) => h.write(data),
            Checksummer::Xxh3(h) => h.update(data),
            Checksummer::Md5(h) => Digest::update(h, data),
            Checksummer::Sha1(h) => Digest::update(h, data),
            Checksummer::Sha256(h) => Digest::update(h, data),
            Checksummer::Sha512(h) => Digest::update(h, data),
            Checksummer::Blake2b(h) => Digest::update(h, data),
            Checksummer::Blake2b512(h) => Digest::update(h, data),
        }
    }

    /// finalize and return the raw digest
    ///
    /// integer digests are big-endian so the hex form reads like the printed value
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Checksummer::Crc32(h) => h.finalize().to_be_bytes().to_vec(),
            Checksummer::Fnv1a64(h) => h.finish().to_be_bytes().to_vec(),
            Checksummer::Xxh3(h) => h.digest().to_be_bytes().to_vec(),
            Checksummer::Md5(h) => h.finalize().to_vec(),
            Checksummer::Sha1(h) => h.finalize().to_vec(),
            Checksummer::Sha256(h) => h.finalize().to_vec(),
            Checksummer::Sha512(h) => h.finalize().to_vec(),
            Checksummer::Blake2b(h) => h.finalize().to_vec(),
            Checksummer::Blake2b512(h) => h.finalize().to_vec(),
        }
    }

    /// finalize and return the hex-encoded digest
    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize())
    }
}

impl Write for Checksummer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// fan-out writer feeding every chunk to each hasher
struct FanOut(Vec<Checksummer>);

impl Write for FanOut {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for hasher in &mut self.0 {
            hasher.update(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// compute digests of `reader` for every requested algorithm in one pass
///
/// the reader is fully consumed. on a read failure no digest is returned.
pub fn checksum<R: Read + ?Sized>(
    reader: &mut R,
    algorithms: &[Algorithm],
) -> Result<BTreeMap<Algorithm, Vec<u8>>> {
    let unique: BTreeSet<Algorithm> = algorithms.iter().copied().collect();
    let mut fan_out = FanOut(unique.into_iter().map(Checksummer::new).collect());

    io::copy(reader, &mut fan_out).map_err(|source| Error::Stream {
        context: "checksum".to_string(),
        source,
    })?;

    Ok(fan_out
        .0
        .into_iter()
        .map(|hasher| (hasher.algorithm(), hasher.finalize()))
        .collect())
}
