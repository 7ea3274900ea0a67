use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{MirrorError, Result};

/// Version stamped into every record written by this crate.
pub const RECORD_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Envelope<T> {
    version: u32,
    data: T,
}

/// File layout of the data directory.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_cache(&self) -> PathBuf {
        self.root.join("base_cache.json")
    }

    pub fn language_cache(&self, lang: &str) -> PathBuf {
        self.root.join(format!("list_cache_{lang}.json"))
    }

    pub fn settings(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn favorites(&self) -> PathBuf {
        self.root.join("favorites.json")
    }

    pub fn offline_dir(&self) -> PathBuf {
        self.root.join("offline_articles")
    }

    /// URLs are hashed so that any link maps to a safe, fixed-length file name.
    pub fn offline_article(&self, url: &str, lang: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        self.offline_dir()
            .join(lang)
            .join(format!("{}.json", hex::encode(digest)))
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}

fn decode<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    let envelope: Envelope<T> =
        serde_json::from_slice(bytes).map_err(|source| MirrorError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
    if envelope.version != RECORD_VERSION {
        return Err(MirrorError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: envelope.version,
        });
    }
    Ok(envelope.data)
}

/// Reads a record. A missing file is `Ok(None)`. When the main file does not
/// parse, a complete temp file left by an interrupted rename is used instead.
pub async fn read_record<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MirrorError::persistence(path, e)),
    };
    match decode(path, &bytes) {
        Ok(value) => Ok(Some(value)),
        Err(err @ MirrorError::Corrupt { .. }) => {
            let tmp = tmp_path(path);
            warn!(error = %err, path = %path.display(), "failed to parse record, trying tmp fallback");
            match tokio::fs::read(&tmp).await {
                Ok(tmp_bytes) => decode(&tmp, &tmp_bytes).map(Some).map_err(|_| err),
                Err(_) => Err(err),
            }
        }
        Err(err) => Err(err),
    }
}

/// Writes a record next to its destination and renames it into place, so
/// readers only ever see the previous or the new complete file.
pub async fn write_record<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(&EnvelopeRef {
        version: RECORD_VERSION,
        data: value,
    })
    .map_err(|e| MirrorError::persistence(path, std::io::Error::other(e)))?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| MirrorError::persistence(parent, e))?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| MirrorError::persistence(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(MirrorError::persistence(path, e));
    }
    debug!(path = %path.display(), bytes = bytes.len(), "record written");
    Ok(())
}

/// Removes a record; returns whether a file was there.
pub async fn remove_record(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(MirrorError::persistence(path, e)),
    }
}

pub async fn record_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        name: String,
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let got: Option<Sample> = read_record(&dir.path().join("nope.json")).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn write_replaces_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");
        write_record(&path, &Sample { name: "a".into() }).await.unwrap();
        write_record(&path, &Sample { name: "b".into() }).await.unwrap();

        let got: Sample = read_record(&path).await.unwrap().unwrap();
        assert_eq!(got.name, "b");
        assert!(!tmp_path(&path).exists());
    }

    #[tokio::test]
    async fn unknown_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        tokio::fs::write(&path, br#"{"version":1,"data":{"name":"a","extra":true}}"#)
            .await
            .unwrap();
        let err = read_record::<Sample>(&path).await.unwrap_err();
        assert!(matches!(err, MirrorError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn future_versions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        tokio::fs::write(&path, br#"{"version":9,"data":{"name":"a"}}"#)
            .await
            .unwrap();
        let err = read_record::<Sample>(&path).await.unwrap_err();
        assert!(matches!(err, MirrorError::UnsupportedVersion { found: 9, .. }));
    }

    #[tokio::test]
    async fn corrupt_main_file_falls_back_to_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.json");
        tokio::fs::write(&path, b"{ this is not json ").await.unwrap();
        tokio::fs::write(tmp_path(&path), br#"{"version":1,"data":{"name":"tmp"}}"#)
            .await
            .unwrap();

        let got: Sample = read_record(&path).await.unwrap().unwrap();
        assert_eq!(got.name, "tmp");
    }

    #[test]
    fn offline_paths_are_per_language_and_stable() {
        let paths = StoragePaths::new("/data");
        let fr = paths.offline_article("https://e/a?x=1", "fr");
        let de = paths.offline_article("https://e/a?x=1", "de");
        assert_ne!(fr, de);
        assert_eq!(fr, paths.offline_article("https://e/a?x=1", "fr"));
        assert!(fr.starts_with("/data/offline_articles/fr"));
    }
}
