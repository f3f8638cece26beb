//! Show persistence
//!
//! A [`ShowHandle`] wraps a loaded show record together with a read-through
//! cache of its file-backed payloads. The cache lives exactly as long as the
//! handle: the first read of a payload goes to storage, later reads return the
//! cached bytes, and a write replaces both the stored file and the cache.
//!
//! Payload writes never leave a window where the show has no readable file:
//! 1. Write the new content under a fresh storage name
//! 2. Commit the show record to point at the new name
//! 3. Delete the file the commit displaced
//!
//! A failure before step 2 leaves the old payload in place; a failure in step 3
//! only leaves an orphaned file behind.

use calchart_common::db::Show;
use calchart_common::{slugify, Error, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::shows::{self, NewShow};
use crate::storage::{sanitize_filename, FileStorage, UploadedFile, AUDIO_DIR, BEATS_DIR, VIEWER_DIR};

/// Longest accepted show name
pub const MAX_NAME_LEN: usize = 255;

/// File-backed payloads of a show that can be read and replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Viewer JSON: every movement of the show
    Viewer,
    /// Beats JSON: milliseconds per beat
    Beats,
}

impl PayloadKind {
    /// Column in the shows table holding the storage name
    pub fn column(self) -> &'static str {
        match self {
            PayloadKind::Viewer => "viewer_file",
            PayloadKind::Beats => "beats_file",
        }
    }

    pub fn namespace(self) -> &'static str {
        match self {
            PayloadKind::Viewer => VIEWER_DIR,
            PayloadKind::Beats => BEATS_DIR,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            PayloadKind::Viewer => "viewer",
            PayloadKind::Beats => "beats",
        }
    }

    fn stored_name(self, show: &Show) -> Option<&str> {
        match self {
            PayloadKind::Viewer => show.viewer_file.as_deref(),
            PayloadKind::Beats => show.beats_file.as_deref(),
        }
    }

    fn stored_name_mut(self, show: &mut Show) -> &mut Option<String> {
        match self {
            PayloadKind::Viewer => &mut show.viewer_file,
            PayloadKind::Beats => &mut show.beats_file,
        }
    }
}

/// Cached payload state: `None` = not read yet, `Some(None)` = show has no payload
#[derive(Debug, Default)]
struct PayloadCache {
    viewer: Option<Option<Vec<u8>>>,
    beats: Option<Option<Vec<u8>>>,
}

impl PayloadCache {
    fn slot(&self, kind: PayloadKind) -> &Option<Option<Vec<u8>>> {
        match kind {
            PayloadKind::Viewer => &self.viewer,
            PayloadKind::Beats => &self.beats,
        }
    }

    fn slot_mut(&mut self, kind: PayloadKind) -> &mut Option<Option<Vec<u8>>> {
        match kind {
            PayloadKind::Viewer => &mut self.viewer,
            PayloadKind::Beats => &mut self.beats,
        }
    }
}

/// A loaded show plus its payload cache
#[derive(Debug)]
pub struct ShowHandle {
    show: Show,
    cache: PayloadCache,
}

impl ShowHandle {
    pub fn new(show: Show) -> Self {
        Self {
            show,
            cache: PayloadCache::default(),
        }
    }

    /// Load a show by slug; `Error::NotFound` if absent
    pub async fn load(pool: &SqlitePool, slug: &str) -> Result<Self> {
        Ok(Self::new(shows::get_show_by_slug(pool, slug).await?))
    }

    pub fn show(&self) -> &Show {
        &self.show
    }

    pub async fn viewer(&mut self, storage: &FileStorage) -> Result<Option<&[u8]>> {
        self.payload(storage, PayloadKind::Viewer).await
    }

    pub async fn beats(&mut self, storage: &FileStorage) -> Result<Option<&[u8]>> {
        self.payload(storage, PayloadKind::Beats).await
    }

    pub async fn set_viewer(
        &mut self,
        pool: &SqlitePool,
        storage: &FileStorage,
        content: Vec<u8>,
    ) -> Result<()> {
        self.set_payload(pool, storage, PayloadKind::Viewer, content).await
    }

    pub async fn set_beats(
        &mut self,
        pool: &SqlitePool,
        storage: &FileStorage,
        content: Vec<u8>,
    ) -> Result<()> {
        self.set_payload(pool, storage, PayloadKind::Beats, content).await
    }

    /// Read a payload, from storage on first access and from cache afterwards
    pub async fn payload(
        &mut self,
        storage: &FileStorage,
        kind: PayloadKind,
    ) -> Result<Option<&[u8]>> {
        if self.cache.slot(kind).is_none() {
            let loaded = match kind.stored_name(&self.show) {
                Some(name) => Some(storage.read(name).await?),
                None => None,
            };
            *self.cache.slot_mut(kind) = Some(loaded);
        }

        Ok(self.cache.slot(kind).as_ref().and_then(|p| p.as_deref()))
    }

    /// Replace a payload's stored file and cached bytes
    pub async fn set_payload(
        &mut self,
        pool: &SqlitePool,
        storage: &FileStorage,
        kind: PayloadKind,
        content: Vec<u8>,
    ) -> Result<()> {
        let preferred = format!("{}/{}.{}", kind.namespace(), self.show.slug, kind.extension());
        let new_name = storage.save(&preferred, &content).await?;

        let previous = match shows::swap_payload_file(pool, self.show.id, kind, &new_name).await {
            Ok(previous) => previous,
            Err(e) => {
                if let Err(cleanup) = storage.delete(&new_name).await {
                    warn!("Failed to remove uncommitted {}: {}", new_name, cleanup);
                }
                return Err(e);
            }
        };

        // Another writer may have committed since this handle was loaded; the
        // file to remove is the one the update displaced, not the cached name
        *kind.stored_name_mut(&mut self.show) = Some(new_name.clone());
        if let Some(previous) = previous.filter(|p| *p != new_name) {
            if let Err(e) = storage.delete(&previous).await {
                warn!("Failed to remove replaced {}: {}", previous, e);
            }
        }

        *self.cache.slot_mut(kind) = Some(Some(content));
        Ok(())
    }
}

/// Input for creating a show
#[derive(Debug)]
pub struct CreateShow<'a> {
    pub name: &'a str,
    pub owner: &'a str,
    pub is_band: bool,
    pub audio: Option<UploadedFile>,
}

/// Create a show, storing its audio file if one was uploaded
///
/// Fails with `Error::Conflict` if the name (or the slug derived from it) is
/// taken. The stored audio file is removed again when the insert fails.
pub async fn create_show(
    pool: &SqlitePool,
    storage: &FileStorage,
    input: CreateShow<'_>,
) -> Result<Show> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("Show name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "Show name longer than {} characters",
            MAX_NAME_LEN
        )));
    }

    let slug = slugify(name);
    if slug.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Show name {:?} has no characters usable in a URL",
            name
        )));
    }

    let audio_file = match input.audio.filter(|a| !a.bytes.is_empty()) {
        Some(audio) => {
            let file_name = sanitize_filename(&audio.file_name).unwrap_or_else(|| slug.clone());
            Some(
                storage
                    .save(&format!("{}/{}", AUDIO_DIR, file_name), &audio.bytes)
                    .await?,
            )
        }
        None => None,
    };

    let new_show = NewShow {
        name,
        slug: &slug,
        owner: input.owner,
        is_band: input.is_band,
        audio_file: audio_file.as_deref(),
        date_added: Utc::now(),
    };

    match shows::insert_show(pool, &new_show).await {
        Ok(show) => {
            info!("Created show {:?} ({}) for {}", show.name, show.slug, show.owner);
            Ok(show)
        }
        Err(e) => {
            if let Some(audio_file) = &audio_file {
                if let Err(cleanup) = storage.delete(audio_file).await {
                    warn!("Failed to remove audio for rejected show: {}", cleanup);
                }
            }
            Err(e)
        }
    }
}
