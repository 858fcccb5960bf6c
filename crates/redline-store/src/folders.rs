//! Filesystem folder storage backend.
//!
//! Folders map to directories under a base path; files map to regular files
//! inside them. Writes are atomic (temp file + rename) so a crashed upload
//! never leaves a half-written document visible.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use redline_core::file_safety::validate_storage_name;
use redline_core::{Error, FolderStore, Result};

/// Filesystem implementation of [`FolderStore`].
///
/// Layout: `{base_path}/{folder}/{filename}`. Dot-prefixed entries inside a
/// folder are reserved for store sidecars and never listed as documents.
pub struct FsFolderStore {
    base_path: PathBuf,
}

impl FsFolderStore {
    /// Create a backend rooted at the given base directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    fn folder_path(&self, folder: &str) -> PathBuf {
        self.base_path.join(folder)
    }

    fn file_path(&self, folder: &str, filename: &str) -> PathBuf {
        self.base_path.join(folder).join(filename)
    }

    /// Validate that the backend can write, read, and delete files.
    ///
    /// Performs a full round-trip test at startup to catch filesystem issues
    /// (overlayfs quirks, permission errors, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("test.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await; // Best-effort cleanup

        Ok(())
    }

    async fn require_folder(&self, folder: &str) -> Result<PathBuf> {
        validate_storage_name("folder", folder)?;
        let path = self.folder_path(folder);
        if !fs::try_exists(&path).await? {
            return Err(Error::FolderNotFound(folder.to_string()));
        }
        Ok(path)
    }
}

/// Compute BLAKE3 hash of data with "blake3:" prefix.
///
/// Returns a string in the format: `blake3:{64-char-hex}`
pub fn compute_content_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!("blake3:{}", hash.to_hex())
}

#[async_trait]
impl FolderStore for FsFolderStore {
    async fn create_folder(&self, name: &str) -> Result<()> {
        validate_storage_name("folder", name)?;
        let path = self.folder_path(name);
        debug!(folder = %name, path = %path.display(), "folders: create");
        fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn list_folders(&self) -> Result<Vec<String>> {
        if !fs::try_exists(&self.base_path).await? {
            return Ok(Vec::new());
        }

        let mut folders = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    folders.push(name.to_string());
                }
            }
        }
        folders.sort();
        Ok(folders)
    }

    async fn delete_folder(&self, name: &str) -> Result<()> {
        let path = self.require_folder(name).await?;
        debug!(folder = %name, "folders: delete");
        fs::remove_dir_all(&path).await?;
        Ok(())
    }

    async fn folder_exists(&self, name: &str) -> Result<bool> {
        validate_storage_name("folder", name)?;
        Ok(fs::try_exists(self.folder_path(name)).await?)
    }

    async fn list_files(&self, folder: &str) -> Result<Vec<String>> {
        let path = self.require_folder(folder).await?;

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn put_file(&self, folder: &str, filename: &str, data: &[u8]) -> Result<()> {
        validate_storage_name("file", filename)?;
        self.require_folder(folder).await?;

        let full_path = self.file_path(folder, filename);
        debug!(folder = %folder, file = %filename, size = data.len(), "folders: put_file");

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "folders: File::create failed");
            e
        })?;
        file.write_all(data).await.map_err(|e| {
            warn!(error = %e, "folders: write_all failed");
            e
        })?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "folders: rename failed");
            e
        })?;

        // Set permissions to 0644 (rw-r--r--, no execute)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn get_file(&self, folder: &str, filename: &str) -> Result<Vec<u8>> {
        validate_storage_name("file", filename)?;
        self.require_folder(folder).await?;

        let path = self.file_path(folder, filename);
        if !fs::try_exists(&path).await? {
            return Err(Error::DocumentNotFound(format!("{}/{}", folder, filename)));
        }
        Ok(fs::read(path).await?)
    }

    async fn delete_file(&self, folder: &str, filename: &str) -> Result<()> {
        validate_storage_name("file", filename)?;
        self.require_folder(folder).await?;

        let path = self.file_path(folder, filename);
        if !fs::try_exists(&path).await? {
            return Err(Error::DocumentNotFound(format!("{}/{}", folder, filename)));
        }
        fs::remove_file(path).await?;
        Ok(())
    }
}
