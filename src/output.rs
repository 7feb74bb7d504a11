//! Output directory preparation

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

const WRITE_CHECK_FILE: &str = ".cca-supervisor-write-check";

/// Create the shared output directory (with parents) and verify it is writable.
///
/// Idempotent: an existing directory is accepted as long as it is writable.
/// Returns the canonical path so both children can be handed the same string.
pub fn ensure_output_directory(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(Error::filesystem(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "output directory path is empty"),
        ));
    }

    fs::create_dir_all(path).map_err(|e| Error::filesystem(path, e))?;

    let canonical = path.canonicalize().map_err(|e| Error::filesystem(path, e))?;
    if !canonical.is_dir() {
        return Err(Error::filesystem(
            &canonical,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
        ));
    }

    let marker = canonical.join(WRITE_CHECK_FILE);
    fs::write(&marker, b"").map_err(|e| Error::filesystem(&canonical, e))?;
    if let Err(e) = fs::remove_file(&marker) {
        tracing::debug!("Could not remove write check file {:?}: {}", marker, e);
    }

    tracing::debug!("Output directory ready at {:?}", canonical);
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_nested_directory() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("a/b/generated");

        let resolved = ensure_output_directory(&target).unwrap();
        assert!(resolved.is_dir());
        assert!(resolved.is_absolute());
        assert!(!resolved.join(WRITE_CHECK_FILE).exists());
    }

    #[test]
    fn test_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("generated");

        let first = ensure_output_directory(&target).unwrap();
        let second = ensure_output_directory(&target).unwrap();
        assert_eq!(first, second);
        assert!(target.is_dir());
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let err = ensure_output_directory(Path::new("")).unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }

    #[test]
    fn test_regular_file_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("generated");
        fs::write(&file, "not a dir").unwrap();

        let err = ensure_output_directory(&file).unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }
}
