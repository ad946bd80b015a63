//! Archive loader (spec.md §6): "given an identifier and an extension,
//! return a byte slice". The wire format of the archive itself is out of
//! scope for `gbam-core`; this crate supplies one concrete implementation
//! backed by a plain directory on disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("no entry named '{0}' with extension '{1}' in the archive")]
    NotFound(String, String),
    #[error("failed to read '{path}': {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },
}

/// Looks up a container's bytes by identifier and extension. `gbam-core`
/// depends only on this trait; it never knows how entries are stored.
pub trait Archive {
    fn load(&self, identifier: &str, extension: &str) -> Result<Vec<u8>, ArchiveError>;
}

/// Filters a directory by extension (case-insensitive), matching files
/// named `<identifier>.<extension>` (spec.md §6 "filters by extension
/// `.gbs` / `.gbm`, case-insensitive").
#[derive(Debug, Clone)]
pub struct DirectoryArchive {
    root: PathBuf,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Archive for DirectoryArchive {
    fn load(&self, identifier: &str, extension: &str) -> Result<Vec<u8>, ArchiveError> {
        let entries = fs::read_dir(&self.root).map_err(|source| ArchiveError::Io {
            path: self.root.clone(),
            source,
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path_matches(&path, identifier, extension) {
                log::debug!("archive: loading '{}'", path.display());
                return fs::read(&path).map_err(|source| ArchiveError::Io { path, source });
            }
        }

        Err(ArchiveError::NotFound(identifier.to_string(), extension.to_string()))
    }
}

fn path_matches(path: &Path, identifier: &str, extension: &str) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { return false };
    let Some(ext) = path.extension().and_then(|s| s.to_str()) else { return false };
    stem.eq_ignore_ascii_case(identifier) && ext.eq_ignore_ascii_case(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn loads_matching_entry_case_insensitively() {
        let dir = std::env::temp_dir().join(format!("gbam-archive-test-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file_path = dir.join("Movie.GBS");
        File::create(&file_path).unwrap().write_all(b"hello").unwrap();

        let archive = DirectoryArchive::new(&dir);
        let bytes = archive.load("movie", "gbs").unwrap();
        assert_eq!(bytes, b"hello");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_entry_returns_not_found() {
        let dir = std::env::temp_dir().join(format!("gbam-archive-test-missing-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let archive = DirectoryArchive::new(&dir);
        let result = archive.load("nope", "gbm");
        assert!(matches!(result, Err(ArchiveError::NotFound(_, _))));

        fs::remove_dir_all(&dir).unwrap();
    }
}
