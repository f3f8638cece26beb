//! File storage for show payloads and uploads
//!
//! Files live under the media root and are addressed by a relative storage
//! name such as `viewer/script-ohio.viewer` or `backgrounds/script-ohio/1.png`.
//! `save` claims a fresh name with an exclusive create; nothing refers to that
//! name until the caller commits it. `replace` writes a temporary file and
//! renames it into place, so a reader sees either the old content or the
//! complete new content.

use calchart_common::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// Top-level storage namespaces
pub const VIEWER_DIR: &str = "viewer";
pub const BEATS_DIR: &str = "beats";
pub const AUDIO_DIR: &str = "audio";
pub const BACKGROUNDS_DIR: &str = "backgrounds";

/// A file received in a form upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as sent by the client, unsanitized
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    base_url: String,
}

impl FileStorage {
    /// `base_url` is the URL prefix the media root is served under and must
    /// end in '/'
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a storage name
    ///
    /// Rejects absolute names and any name that would escape the media root.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let valid = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(Error::InvalidInput(format!("Invalid storage name: {:?}", name)));
        }
        Ok(self.root.join(relative))
    }

    /// Public URL of a stored file
    pub fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }

    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Stored file {}", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store content under `name`, or under a free variant of it
    ///
    /// Returns the storage name actually used. An existing file is never
    /// overwritten; a random suffix is added before the extension instead.
    /// The name is claimed with an exclusive create, so concurrent callers
    /// always receive distinct names.
    pub async fn save(&self, name: &str, content: &[u8]) -> Result<String> {
        let mut candidate = name.to_string();
        loop {
            let path = self.path(&candidate)?;
            match write_new(&path, content).await {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    candidate = alternative_name(name);
                }
                Err(e) => return Err(e.into()),
            }
        }

        debug!("Stored {} ({} bytes)", candidate, content.len());
        Ok(candidate)
    }

    /// Store content under exactly `name`, atomically replacing any existing file
    pub async fn replace(&self, name: &str, content: &[u8]) -> Result<String> {
        let path = self.path(name)?;
        write_into_place(&path, content).await?;
        debug!("Replaced {} ({} bytes)", name, content.len());
        Ok(name.to_string())
    }

    /// Delete a stored file; deleting a missing file is not an error
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Create `path` exclusively and write the content
///
/// Fails with `AlreadyExists` when the file is present. A partial file is
/// removed again on a write error.
async fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    let written = async {
        file.write_all(content).await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        drop(file);
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(())
}

/// Write to a temporary sibling, then rename over `path`
async fn write_into_place(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::Internal(format!("Storage path has no parent: {}", path.display())))?;
    tokio::fs::create_dir_all(parent).await?;

    let tmp = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));
    if let Err(e) = write_synced(&tmp, content).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn write_synced(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}

/// `dir/name.ext` → `dir/name_<8 hex>.ext`
fn alternative_name(name: &str) -> String {
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (Some(dir), file),
        None => (None, name),
    };
    let renamed = match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, suffix, ext),
        _ => format!("{}_{}", file, suffix),
    };
    match dir {
        Some(dir) => format!("{}/{}", dir, renamed),
        None => renamed,
    }
}

/// Reduce a client-supplied file name to a safe final path component
///
/// Returns None when nothing usable remains.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." || cleaned.starts_with('.') {
        None
    } else {
        Some(cleaned)
    }
}
