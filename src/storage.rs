//! On-disk storage for uploaded book files and cover images.
//!
//! Writes are staged: bytes land in a hidden temporary file next to their
//! destination and are renamed into place only once the database row that
//! references them has been committed.

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};

/// Suffix appended to stored book file names.
pub const ENCRYPTED_SUFFIX: &str = ".enc";

/// Flat directories holding book files and covers.
#[derive(Debug, Clone)]
pub struct FileStore {
    files_dir: PathBuf,
    covers_dir: PathBuf,
}

/// A file written to a temporary name, awaiting [`StagedFile::commit`].
///
/// Dropping an uncommitted staged file removes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    dir: PathBuf,
    temp: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Atomically move the file to its final name.
    pub fn commit(self, name: &str) -> Result<()> {
        self.place(name).map(PlacedFile::keep)
    }

    /// Move the file to its final name, keeping a guard that removes it
    /// again unless [`PlacedFile::keep`] is called.
    pub fn place(mut self, name: &str) -> Result<PlacedFile> {
        if !is_plain_file_name(name) {
            return Err(AppError::Internal(format!("Refusing to store file '{}'", name)));
        }
        let path = self.dir.join(name);
        std::fs::rename(&self.temp, &path)?;
        self.committed = true;
        Ok(PlacedFile { path, kept: false })
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            remove_quietly(&self.temp);
        }
    }
}

/// A file moved to its final name whose database row is not committed yet.
#[derive(Debug)]
pub struct PlacedFile {
    path: PathBuf,
    kept: bool,
}

impl PlacedFile {
    /// Leave the file in place.
    pub fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for PlacedFile {
    fn drop(&mut self) {
        if !self.kept {
            remove_quietly(&self.path);
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged file");
    }
}

/// Stored name of a book's content file.
pub fn book_file_name(book_id: i64, ext: &str) -> String {
    format!("{}.{}{}", book_id, ext, ENCRYPTED_SUFFIX)
}

/// Stored name of a book's cover image.
pub fn cover_file_name(book_id: i64, ext: &str) -> String {
    format!("{}.{}", book_id, ext)
}

/// Whether a client-supplied name can only refer to a file directly inside a
/// storage directory.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
}

impl FileStore {
    /// Create a store over the configured directories.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            files_dir: config.files_dir.clone(),
            covers_dir: config.covers_dir.clone(),
        }
    }

    /// Create both directories if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.files_dir)?;
        std::fs::create_dir_all(&self.covers_dir)?;
        Ok(())
    }

    /// Directory holding encrypted book files.
    pub fn files_dir(&self) -> &Path {
        &self.files_dir
    }

    /// Directory holding cover images.
    pub fn covers_dir(&self) -> &Path {
        &self.covers_dir
    }

    /// Stage an (already encrypted) book file.
    pub async fn stage_book_file(&self, data: &[u8]) -> Result<StagedFile> {
        Self::stage(&self.files_dir, data).await
    }

    /// Stage a cover image.
    pub async fn stage_cover(&self, data: &[u8]) -> Result<StagedFile> {
        Self::stage(&self.covers_dir, data).await
    }

    async fn stage(dir: &Path, data: &[u8]) -> Result<StagedFile> {
        let staged = StagedFile {
            dir: dir.to_path_buf(),
            temp: dir.join(format!(".{}.tmp", uuid::Uuid::new_v4())),
            committed: false,
        };
        tokio::fs::write(&staged.temp, data).await?;
        Ok(staged)
    }

    /// Read a stored book file (still encrypted).
    pub async fn read_book_file(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Self::read(&self.files_dir, name).await
    }

    /// Read a stored cover image.
    pub async fn read_cover(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Self::read(&self.covers_dir, name).await
    }

    async fn read(dir: &Path, name: &str) -> Result<Option<Vec<u8>>> {
        if !is_plain_file_name(name) {
            return Ok(None);
        }
        match tokio::fs::read(dir.join(name)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a stored book file, ignoring files that are already gone.
    pub fn remove_book_file(&self, name: &str) {
        Self::remove(&self.files_dir, name);
    }

    /// Remove a stored cover image, ignoring files that are already gone.
    pub fn remove_cover(&self, name: &str) {
        Self::remove(&self.covers_dir, name);
    }

    fn remove(dir: &Path, name: &str) {
        if !is_plain_file_name(name) {
            return;
        }
        let path = dir.join(name);
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed stored file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove stored file"),
        }
    }
}
