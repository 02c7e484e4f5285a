//! # Fingerprint Engine
//!
//! Hashes a directory of add-on artifacts into per-file checksums and
//! reduces them to a single aggregate digest.
//!
//! ## Pipeline
//!
//! ```text
//! mods_client/            per-file                       aggregate
//! ├── A.jar  ──────►  A.jar|crc|sha256|md5  ─┐
//! ├── B.jar  ──────►  B.jar|crc|sha256|md5  ─┼──► SHA-256(lines, "\n"-terminated)
//! └── notes.txt (filtered out)               ┘
//! ```
//!
//! Files are sorted by name before serialization so the digest never
//! depends on filesystem iteration order. Only SHA-256 feeds the trust
//! decision; CRC32 and MD5 are diagnostic fields for operators.

use crate::error::{CoreError, CoreResult};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default artifact extension (without the dot).
pub const DEFAULT_EXTENSION: &str = "jar";

/// Read buffer size for hashing.
const READ_BUFFER_SIZE: usize = 8192;

/// Field separator in the text form of a [`FileChecksum`].
const FIELD_SEPARATOR: char = '|';

/// Checksums of one artifact file.
///
/// Identity is `file_name`; computed once per fingerprint pass.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileChecksum {
    /// File name (no directory component).
    pub file_name: String,
    /// CRC32 of the file contents.
    pub crc32: u32,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
    /// Lowercase hex MD5 of the file contents.
    pub md5: String,
}

impl FileChecksum {
    /// Hashes a single file.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a readable regular file.
    pub fn compute(path: &Path) -> CoreResult<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CoreError::InvalidEncoding(format!("unusable file name: {}", path.display()))
            })?
            .to_string();

        if !path.is_file() {
            return Err(CoreError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a regular file"),
            ));
        }

        let mut file = File::open(path).map_err(|e| CoreError::io(path, e))?;
        let mut crc = crc32fast::Hasher::new();
        let mut sha = Sha256::new();
        let mut md5 = Md5::new();
        let mut buffer = [0u8; READ_BUFFER_SIZE];

        loop {
            let read = file.read(&mut buffer).map_err(|e| CoreError::io(path, e))?;
            if read == 0 {
                break;
            }
            crc.update(&buffer[..read]);
            sha.update(&buffer[..read]);
            md5.update(&buffer[..read]);
        }

        Ok(Self {
            file_name,
            crc32: crc.finalize(),
            sha256: hex::encode(sha.finalize()),
            md5: hex::encode(md5.finalize()),
        })
    }
}

impl fmt::Display for FileChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.file_name,
            self.crc32,
            self.sha256,
            self.md5,
            sep = FIELD_SEPARATOR
        )
    }
}

impl FromStr for FileChecksum {
    type Err = CoreError;

    /// Parses `name|crc32|sha256|md5`.
    ///
    /// Splits from the right so a `|` inside the file name survives.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidEncoding(format!("invalid checksum line: {line}"));

        let mut parts = line.rsplitn(4, FIELD_SEPARATOR);
        let md5 = parts.next().ok_or_else(invalid)?;
        let sha256 = parts.next().ok_or_else(invalid)?;
        let crc32 = parts.next().ok_or_else(invalid)?;
        let file_name = parts.next().ok_or_else(invalid)?;

        if file_name.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            file_name: file_name.to_string(),
            crc32: crc32.parse().map_err(|_| invalid())?,
            sha256: sha256.to_string(),
            md5: md5.to_string(),
        })
    }
}

/// Selects which directory entries count as artifacts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactFilter {
    /// Lowercase suffix including the dot, e.g. `.jar`.
    suffix: String,
}

impl ArtifactFilter {
    /// Creates a filter for `extension` (with or without a leading dot).
    #[must_use]
    pub fn new(extension: &str) -> Self {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        Self {
            suffix: format!(".{ext}"),
        }
    }

    /// Returns true if `file_name` has the artifact extension (case-insensitive).
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.to_ascii_lowercase().ends_with(&self.suffix)
    }
}

impl Default for ArtifactFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

/// Hashes every matching file in `dir`, sorted by file name.
///
/// Unreadable files are logged and skipped; they never fail the batch.
///
/// # Errors
///
/// Returns [`CoreError::DirectoryNotFound`] if `dir` is missing or not a
/// directory, or an I/O error if it cannot be listed.
pub fn compute_directory_fingerprint(
    dir: &Path,
    filter: &ArtifactFilter,
) -> CoreResult<Vec<FileChecksum>> {
    if !dir.is_dir() {
        return Err(CoreError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut candidates: Vec<(String, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CoreError::io(dir, e))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(dir = %dir.display(), "skipping non UTF-8 file name");
            continue;
        };
        if filter.matches(&name) {
            candidates.push((name, entry.path()));
        }
    }

    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    let mut checksums = Vec::with_capacity(candidates.len());
    for (name, path) in candidates {
        match FileChecksum::compute(&path) {
            Ok(checksum) => checksums.push(checksum),
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "error calculating checksum, skipping file");
            }
        }
    }

    Ok(checksums)
}

/// SHA-256 digest summarizing a whole file set.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AggregateDigest(String);

impl AggregateDigest {
    /// Lowercase hex form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AggregateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduces per-file checksums to one digest.
///
/// Records are re-sorted by name, rendered one per line with a trailing
/// `\n`, and hashed with SHA-256.
///
/// # Errors
///
/// Returns [`CoreError::EmptyReferenceSet`] if `checksums` is empty.
pub fn aggregate(checksums: &[FileChecksum]) -> CoreResult<AggregateDigest> {
    if checksums.is_empty() {
        return Err(CoreError::EmptyReferenceSet);
    }

    let mut sorted: Vec<&FileChecksum> = checksums.iter().collect();
    sorted.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let mut hasher = Sha256::new();
    for checksum in sorted {
        hasher.update(checksum.to_string().as_bytes());
        hasher.update(b"\n");
    }

    Ok(AggregateDigest(hex::encode(hasher.finalize())))
}

/// Per-file checksums plus their aggregate, from one pass over a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryFingerprint {
    /// Per-file checksums, sorted by name.
    pub files: Vec<FileChecksum>,
    /// Aggregate over `files`.
    pub digest: AggregateDigest,
}

impl DirectoryFingerprint {
    /// Fingerprints `dir` and aggregates the result.
    ///
    /// # Errors
    ///
    /// Fails if the directory is missing or yields zero matching files.
    pub fn scan(dir: &Path, filter: &ArtifactFilter) -> CoreResult<Self> {
        let files = compute_directory_fingerprint(dir, filter)?;
        let digest = aggregate(&files)?;
        Ok(Self { files, digest })
    }
}
