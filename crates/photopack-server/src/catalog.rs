//! Archive lookup in the photo catalog.
//!
//! Every archive identifier names one directory directly below the catalog
//! root. [`Catalog::locate`] resolves an identifier, refuses anything that
//! would leave the root, and lists the top-level entries that go into the
//! archive.
//!
//! # Example
//!
//! ```rust,ignore
//! use photopack_server::Catalog;
//!
//! let catalog = Catalog::new("test_photos");
//! let target = catalog.locate("abc123").await?;
//! assert_eq!(target.identifier(), "abc123");
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ArchiveError, ArchiveResult};

/// A resolved archive: the directory to zip and its entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    identifier: String,
    path: PathBuf,
    entries: Vec<OsString>,
}

impl ArchiveTarget {
    /// Identifier taken from the request path.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Canonical path of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Top-level entries, sorted, relative to [`path`](Self::path).
    ///
    /// Names beginning with `-` are prefixed with `./`.
    #[must_use]
    pub fn entries(&self) -> &[OsString] {
        &self.entries
    }
}

/// The catalog root under which all archivable directories live.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
}

impl Catalog {
    /// Creates a catalog rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the configured catalog root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `identifier` to a directory inside the catalog.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::InvalidIdentifier`] if the identifier is not a single
    ///   plain path segment or resolves outside the root.
    /// - [`ArchiveError::NotFound`] if nothing exists under that name, or it is
    ///   not a directory.
    /// - [`ArchiveError::Catalog`] if the root or the directory can't be read.
    pub async fn locate(&self, identifier: &str) -> ArchiveResult<ArchiveTarget> {
        validate_identifier(identifier)?;

        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| ArchiveError::catalog(&self.root, e))?;

        let candidate = root.join(identifier);
        let path = match tokio::fs::canonicalize(&candidate).await {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ArchiveError::not_found(identifier));
            }
            Err(e) => return Err(ArchiveError::catalog(candidate, e)),
        };

        // Symlinks may point anywhere; only the resolved location counts.
        if path == root || !path.starts_with(&root) {
            tracing::warn!(
                archive = identifier,
                resolved = %path.display(),
                "Archive escapes the catalog root"
            );
            return Err(ArchiveError::invalid_identifier(identifier));
        }

        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| ArchiveError::catalog(&path, e))?;
        if !metadata.is_dir() {
            return Err(ArchiveError::not_found(identifier));
        }

        let entries = list_entries(&path).await?;

        Ok(ArchiveTarget {
            identifier: identifier.to_string(),
            path,
            entries,
        })
    }
}

fn validate_identifier(identifier: &str) -> ArchiveResult<()> {
    let malformed = identifier.is_empty()
        || identifier == "."
        || identifier == ".."
        || identifier.contains(['/', '\\', '\0']);

    if malformed {
        return Err(ArchiveError::invalid_identifier(identifier));
    }
    Ok(())
}

async fn list_entries(dir: &Path) -> ArchiveResult<Vec<OsString>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ArchiveError::catalog(dir, e))?;

    let mut names = Vec::new();
    while let Some(entry) = read_dir
        .next_entry()
        .await
        .map_err(|e| ArchiveError::catalog(dir, e))?
    {
        names.push(entry.file_name());
    }
    names.sort();

    Ok(names.into_iter().map(option_safe).collect())
}

/// Keeps names like `-rf` from being parsed as archiver options.
fn option_safe(name: OsString) -> OsString {
    if name.to_string_lossy().starts_with('-') {
        let mut prefixed = OsString::from("./");
        prefixed.push(&name);
        prefixed
    } else {
        name
    }
}
