//! Image Store (IS): UUID-keyed blob store with format/size validation,
//! lazy disk recovery, and an hourly eviction sweep. Grounded on
//! `original_source/utils/image_manager.py`'s `ImageManager`.

use crate::error::{BotError, BotResult};
use crate::models::ImageRecord;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const DEFAULT_LIFETIME_HOURS: i64 = 24;
const EVICTION_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
        }
    }
}

/// Magic-byte sniffing, replacing Python's `imghdr.what`.
pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(ImageFormat::Png)
    } else if data.starts_with(b"\xFF\xD8\xFF") {
        Some(ImageFormat::Jpeg)
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else {
        None
    }
}

pub struct ImageStore {
    base_dir: PathBuf,
    info: RwLock<HashMap<String, ImageRecord>>,
}

impl ImageStore {
    pub fn new(base_dir: impl AsRef<Path>) -> BotResult<std::sync::Arc<Self>> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)
            .map_err(|e| BotError::Internal(format!("failed to create image dir: {e}")))?;
        set_permissions(&base_dir, 0o755);
        Ok(std::sync::Arc::new(Self { base_dir, info: RwLock::new(HashMap::new()) }))
    }

    pub fn spawn_eviction_loop(self: &std::sync::Arc<Self>, cancel: CancellationToken) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => store.evict_expired(),
                }
            }
        });
    }

    pub fn save(&self, data: &[u8], lifetime_hours: Option<i64>) -> BotResult<String> {
        if data.len() as u64 > MAX_FILE_SIZE {
            return Err(BotError::Validation("image exceeds 10 MB limit".into()));
        }
        let format = detect_format(data).ok_or_else(|| BotError::Validation("unrecognized image format".into()))?;

        let id = uuid::Uuid::new_v4().to_string();
        let file_path = self.base_dir.join(format!("{id}.{}", format.extension()));

        std::fs::write(&file_path, data).map_err(|e| BotError::Internal(format!("failed to write image: {e}")))?;
        set_permissions(&file_path, 0o644);

        let now = Utc::now();
        let expires_at = now + ChronoDuration::hours(lifetime_hours.unwrap_or(DEFAULT_LIFETIME_HOURS));
        let record = ImageRecord { id: id.clone(), path: file_path.display().to_string(), created_at: now, expires_at, size: data.len() as u64 };
        self.info.write().unwrap().insert(id.clone(), record);
        Ok(id)
    }

    /// Cache-first; if the id isn't cached but a valid file exists on disk,
    /// recovers the path without re-populating the expiry metadata.
    pub fn get_path(&self, id: &str) -> Option<PathBuf> {
        {
            let info = self.info.read().unwrap();
            if let Some(record) = info.get(id) {
                if Utc::now() > record.expires_at {
                    drop(info);
                    self.delete(id);
                    return None;
                }
                return Some(PathBuf::from(&record.path));
            }
        }

        for ext in ["png", "jpeg", "gif"] {
            let candidate = self.base_dir.join(format!("{id}.{ext}"));
            if candidate.exists() {
                if let Ok(bytes) = std::fs::read(&candidate) {
                    if detect_format(&bytes).is_some() {
                        return Some(candidate);
                    }
                    let _ = std::fs::remove_file(&candidate);
                }
            }
        }
        None
    }

    fn delete(&self, id: &str) {
        if let Some(record) = self.info.write().unwrap().remove(id) {
            let _ = std::fs::remove_file(&record.path);
        }
    }

    pub fn evict_expired(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .info
            .read()
            .unwrap()
            .iter()
            .filter(|(_, record)| now > record.expires_at)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.delete(id);
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "evicted expired images");
        }
    }
}

/// Serves a previously-saved image by id. Mirrors the teacher's
/// `routes::download_file` (sniff + serve bytes with a content type),
/// minus the room-membership check this store has no concept of.
#[rocket::get("/images/<id>")]
pub fn serve_image(id: &str, store: &rocket::State<std::sync::Arc<ImageStore>>) -> Result<(rocket::http::ContentType, Vec<u8>), rocket::http::Status> {
    let path = store.get_path(id).ok_or(rocket::http::Status::NotFound)?;
    let bytes = std::fs::read(&path).map_err(|_| rocket::http::Status::NotFound)?;
    let content_type = detect_format(&bytes)
        .map(|f| match f {
            ImageFormat::Png => rocket::http::ContentType::PNG,
            ImageFormat::Jpeg => rocket::http::ContentType::JPEG,
            ImageFormat::Gif => rocket::http::ContentType::GIF,
        })
        .unwrap_or(rocket::http::ContentType::Binary);
    Ok((content_type, bytes))
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: u32) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mut perms = metadata.permissions();
        perms.set_mode(mode);
        let _ = std::fs::set_permissions(path, perms);
    }
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: u32) {}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dsome-fake-body";

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("image-store-test-{:x}", uuid::Uuid::new_v4().as_u128()))
    }

    #[test]
    fn detects_known_formats() {
        assert_eq!(detect_format(PNG_MAGIC), Some(ImageFormat::Png));
        assert_eq!(detect_format(b"\xFF\xD8\xFFrest"), Some(ImageFormat::Jpeg));
        assert_eq!(detect_format(b"GIF89arest"), Some(ImageFormat::Gif));
        assert_eq!(detect_format(b"not an image"), None);
    }

    #[test]
    fn rejects_oversized_and_unrecognized_payloads() {
        let store = ImageStore::new(temp_dir()).unwrap();
        let huge = vec![0u8; (MAX_FILE_SIZE + 1) as usize];
        assert!(matches!(store.save(&huge, None), Err(BotError::Validation(_))));
        assert!(matches!(store.save(b"plain text", None), Err(BotError::Validation(_))));
    }

    #[test]
    fn save_then_get_path_round_trips() {
        let dir = temp_dir();
        let store = ImageStore::new(&dir).unwrap();
        let id = store.save(PNG_MAGIC, Some(1)).unwrap();
        let path = store.get_path(&id).unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn expired_entries_are_evicted() {
        let dir = temp_dir();
        let store = ImageStore::new(&dir).unwrap();
        let id = store.save(PNG_MAGIC, Some(-1)).unwrap();
        assert!(store.get_path(&id).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
