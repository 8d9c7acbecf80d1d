//! On-disk cache storage.
//!
//! Layout under the storage root:
//!
//! ```text
//! <sha256(cache name)>/cache.json          manifest: cache name + creation time
//! <sha256(cache name)>/<sha256(key)>.entry  one stored response
//! ```
//!
//! An entry file is a single JSON header line followed by the raw body, so a
//! put is one file written to a temporary name and renamed into place.
//! Caches are created and deleted the same way, through dot-prefixed scratch
//! directories that `keys()` skips and sweeps.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::models::{Request, Response};

use super::storage::ensure_cacheable;
use super::{CacheStorage, CachedData, EntrySummary, StoreError, StoreFuture, StoreResult};

/// Manifest file name inside each cache directory
const MANIFEST_FILE: &str = "cache.json";

/// Extension of stored response files
const ENTRY_EXT: &str = "entry";

/// Hex characters of the SHA-256 digest used for file names
const HASH_LEN: usize = 32;

/// Suffix of a cache directory being removed
const TOMBSTONE_SUFFIX: &str = "deleted";

/// Suffix of a cache directory being created
const OPENING_SUFFIX: &str = "opening";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheManifest {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredHead {
    key: String,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    url: Option<String>,
}

pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: PathBuf) -> StoreResult<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn hash(value: &str) -> String {
        let digest = hex::encode(Sha256::digest(value.as_bytes()));
        digest[..HASH_LEN].to_string()
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(Self::hash(name))
    }

    fn entry_path(&self, name: &str, key: &str) -> PathBuf {
        self.cache_dir(name)
            .join(format!("{}.{}", Self::hash(key), ENTRY_EXT))
    }

    /// Write `contents` next to `path` under a unique name, then rename over it.
    fn write_atomic(path: &Path, contents: &[u8]) -> StoreResult<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(
            ".{}.{}.{}.tmp",
            file_name,
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, contents)?;
        if let Err(e) = std::fs::rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn read_manifest(dir: &Path) -> StoreResult<Option<CachedData<CacheManifest>>> {
        let path = dir.join(MANIFEST_FILE);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path,
                reason: e.to_string(),
            })
    }

    fn encode_entry(head: &CachedData<StoredHead>, body: &[u8]) -> StoreResult<Vec<u8>> {
        // Compact JSON never contains a raw newline, so it terminates the header.
        let mut contents = serde_json::to_vec(head).map_err(|e| StoreError::Corrupt {
            path: PathBuf::new(),
            reason: e.to_string(),
        })?;
        contents.push(b'\n');
        contents.extend_from_slice(body);
        Ok(contents)
    }

    fn decode_entry(path: &Path, contents: &[u8]) -> StoreResult<(CachedData<StoredHead>, Vec<u8>)> {
        let corrupt = |reason: String| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason,
        };
        let split = contents
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| corrupt("missing header terminator".to_string()))?;
        let head: CachedData<StoredHead> =
            serde_json::from_slice(&contents[..split]).map_err(|e| corrupt(e.to_string()))?;
        Ok((head, contents[split + 1..].to_vec()))
    }

    fn read_entry(path: &Path) -> StoreResult<Option<(CachedData<StoredHead>, Vec<u8>)>> {
        match std::fs::read(path) {
            Ok(contents) => Self::decode_entry(path, &contents).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// A dot-prefixed sibling of the cache directory for `name`, unique to
    /// this call. `keys()` never lists dot-prefixed directories.
    fn scratch_dir(&self, name: &str, suffix: &str) -> PathBuf {
        self.root.join(format!(
            ".{}.{}.{}.{}",
            Self::hash(name),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed),
            suffix
        ))
    }

    fn remove_leftover(path: &Path) {
        match std::fs::remove_dir_all(path) {
            Ok(()) => debug!(dir = %path.display(), "Removed leftover cache directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %path.display(), error = %e, "Failed to remove leftover cache directory"),
        }
    }

    fn open_sync(&self, name: &str) -> StoreResult<()> {
        let dir = self.cache_dir(name);
        if Self::read_manifest(&dir)?.is_some() {
            return Ok(());
        }

        // Build the cache under a scratch name and rename it into place, so a
        // cache directory never exists without its manifest.
        let staging = self.scratch_dir(name, OPENING_SUFFIX);
        std::fs::create_dir(&staging)?;
        let manifest = CachedData::new(CacheManifest {
            name: name.to_string(),
        });
        let created = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| StoreError::Corrupt {
                path: dir.join(MANIFEST_FILE),
                reason: e.to_string(),
            })
            .and_then(|contents| Self::write_atomic(&staging.join(MANIFEST_FILE), &contents))
            .and_then(|()| self.move_into_place(&staging, &dir));
        if created.is_err() {
            Self::remove_leftover(&staging);
        }
        created?;
        debug!(cache = name, dir = %dir.display(), "Created cache");
        Ok(())
    }

    fn move_into_place(&self, staging: &Path, dir: &Path) -> StoreResult<()> {
        let Err(e) = std::fs::rename(staging, dir) else {
            return Ok(());
        };
        // Another open of the same name got there first.
        if Self::read_manifest(dir)?.is_some() {
            Self::remove_leftover(staging);
            return Ok(());
        }
        if !dir.is_dir() {
            return Err(e.into());
        }
        // A manifest-less directory left by an interrupted write: retire it.
        let orphan = staging.with_extension(TOMBSTONE_SUFFIX);
        std::fs::rename(dir, &orphan)?;
        Self::remove_leftover(&orphan);
        std::fs::rename(staging, dir)?;
        Ok(())
    }

    fn put_sync(&self, name: &str, request: &Request, response: Response) -> StoreResult<()> {
        ensure_cacheable(request)?;
        let dir = self.cache_dir(name);
        if Self::read_manifest(&dir)?.is_none() {
            return Err(StoreError::UnknownCache(name.to_string()));
        }

        let key = request.cache_key();
        let head = CachedData::new(StoredHead {
            key: key.clone(),
            status: response.status,
            status_text: response.status_text,
            headers: response.headers,
            url: response.url.map(|u| u.to_string()),
        });
        let contents = Self::encode_entry(&head, &response.body)?;
        Self::write_atomic(&self.entry_path(name, &key), &contents)
    }

    fn match_sync(&self, name: &str, request: &Request) -> StoreResult<Option<Response>> {
        let path = self.entry_path(name, &request.cache_key());
        let Some((head, body)) = Self::read_entry(&path)? else {
            return Ok(None);
        };
        let head = head.data;
        Ok(Some(Response {
            status: head.status,
            status_text: head.status_text,
            headers: head.headers,
            body,
            url: head.url.as_deref().and_then(|u| Url::parse(u).ok()),
        }))
    }

    /// Names of every cache, oldest first.
    ///
    /// Also sweeps what failed deletes and interrupted opens leave behind:
    /// tombstones and directories without a manifest. Staging directories
    /// of opens in progress are left alone.
    fn keys_sync(&self) -> StoreResult<Vec<String>> {
        let mut caches: Vec<(DateTime<Utc>, String)> = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let path = dir_entry.path();
            let file_name = dir_entry.file_name().to_string_lossy().into_owned();
            if file_name.starts_with('.') {
                if file_name.ends_with(TOMBSTONE_SUFFIX) {
                    Self::remove_leftover(&path);
                }
                continue;
            }
            match Self::read_manifest(&path)? {
                Some(manifest) => caches.push((manifest.cached_at, manifest.data.name)),
                None => Self::remove_leftover(&path),
            }
        }
        caches.sort();
        Ok(caches.into_iter().map(|(_, name)| name).collect())
    }

    fn delete_sync(&self, name: &str) -> StoreResult<bool> {
        let dir = self.cache_dir(name);
        // Move out of the way first so lookups never see a half-deleted cache.
        let tombstone = self.scratch_dir(name, TOMBSTONE_SUFFIX);
        match std::fs::rename(&dir, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        // Left for the next keys() sweep if this fails.
        if let Err(e) = std::fs::remove_dir_all(&tombstone) {
            warn!(cache = name, error = %e, "Failed to remove deleted cache directory");
        }
        Ok(true)
    }

    fn entries_sync(&self, name: &str) -> StoreResult<Vec<CachedData<EntrySummary>>> {
        let dir = self.cache_dir(name);
        if Self::read_manifest(&dir)?.is_none() {
            return Err(StoreError::UnknownCache(name.to_string()));
        }

        let mut entries = Vec::new();
        for dir_entry in std::fs::read_dir(&dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            if let Some((head, body)) = Self::read_entry(&path)? {
                entries.push(head.map(|h| EntrySummary {
                    key: h.key,
                    status: h.status,
                    size: body.len(),
                }));
            }
        }
        entries.sort_by(|a, b| a.data.key.cmp(&b.data.key));
        Ok(entries)
    }
}

impl CacheStorage for DiskStorage {
    fn open<'a>(&'a self, name: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.open_sync(name) })
    }

    fn put<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
        response: Response,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.put_sync(name, request, response) })
    }

    fn match_request<'a>(
        &'a self,
        name: &'a str,
        request: &'a Request,
    ) -> StoreFuture<'a, Option<Response>> {
        Box::pin(async move { self.match_sync(name, request) })
    }

    fn keys(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { self.keys_sync() })
    }

    fn delete<'a>(&'a self, name: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { self.delete_sync(name) })
    }

    fn entries<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Vec<CachedData<EntrySummary>>> {
        Box::pin(async move { self.entries_sync(name) })
    }
}
