//! Replacement for the source's pickle-style hot-tier dumps (SPEC_FULL §9):
//! small JSON documents written atomically via temp-file + rename, read back
//! as plain `serde_json`, no length-prefix framing needed for on-disk files
//! (framing is reserved for the handful of values mirrored through KVS's
//! binary namespace — see `kvs::frame`/`kvs::unframe`).

use serde::{Serialize, de::DeserializeOwned};
use std::io;
use std::path::Path;

pub fn load_json<T: DeserializeOwned + Default>(path: impl AsRef<Path>) -> T {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read persisted json, using default");
            T::default()
        }
    }
}

/// Writes `value` to `path` atomically: serialize to a sibling `.tmp` file,
/// then rename over the destination. Creates the parent directory if
/// missing.
pub fn save_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(&tmp_path, bytes)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// 4-byte big-endian length prefix + `serde_json` payload, for values that
/// round-trip through KVS's binary namespace.
pub fn frame<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let body = serde_json::to_vec(value)?;
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn unframe<T: DeserializeOwned>(bytes: &[u8]) -> Option<T> {
    if bytes.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes(bytes[0..4].try_into().ok()?) as usize;
    let body = bytes.get(4..4 + len)?;
    serde_json::from_slice(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, Default, PartialEq)]
    struct Doc {
        count: u32,
    }

    #[test]
    fn round_trips_atomically() {
        let dir = std::env::temp_dir().join(format!("persist-test-{:x}", uuid::Uuid::new_v4().as_u128()));
        let path = dir.join("doc.json");
        let doc = Doc { count: 7 };
        save_json(&path, &doc).unwrap();
        let loaded: Doc = load_json(&path);
        assert_eq!(loaded, doc);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_yields_default() {
        let loaded: Doc = load_json("/nonexistent/path/doc.json");
        assert_eq!(loaded, Doc::default());
    }

    #[test]
    fn frame_round_trip() {
        let doc = Doc { count: 42 };
        let framed = frame(&doc).unwrap();
        let back: Doc = unframe(&framed).unwrap();
        assert_eq!(back, doc);
    }
}
