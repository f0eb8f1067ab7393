//! File Backend
//!
//! One file per id under a cache directory.
//!
//! # Layout
//!
//! ```text
//! <dir>/[<ns>/<sub-ns>/]<sha256(name)|name><extension>
//! ```
//!
//! Namespace segments become sub-directories when `sub_dirs` is enabled.
//!
//! # Payload
//!
//! A one-byte tag followed by a JSON envelope `{ "value", "expires_at" }`:
//!
//! - `J` - plain JSON
//! - `L` - LZ4 block (size-prefixed) of the JSON
//!
//! Reads accept both tags whatever the current `compress` setting is.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::Backend;
use crate::cache::DEFAULT_SEPARATOR;
use crate::error::{Error, Result};

const TAG_JSON: u8 = b'J';
const TAG_LZ4: u8 = b'L';

/// Resolved paths kept before the memo is cleared
const MAX_MEMOIZED_FILENAMES: usize = 4096;

/// File backend options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOptions {
    /// Directory where files are stored
    pub dir: PathBuf,
    /// Map namespace segments to sub-directories
    pub sub_dirs: bool,
    /// Use the id itself as the filename instead of its hash
    pub id_as_filename: bool,
    /// Extension appended to every filename, leading dot included
    pub file_extension: String,
    /// LZ4-compress payloads
    pub compress: bool,
    /// Namespace separator used to split ids into sub-directories
    pub separator: String,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            sub_dirs: false,
            id_as_filename: false,
            file_extension: String::new(),
            compress: false,
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl FileOptions {
    /// Options rooted at `dir`, other settings default
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Envelope {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| deadline < Utc::now())
    }
}

/// Filesystem backend
#[derive(Debug)]
pub struct FileBackend {
    options: FileOptions,
    /// id -> resolved path, cleared once it holds `MAX_MEMOIZED_FILENAMES`
    filenames: DashMap<String, PathBuf>,
}

impl FileBackend {
    /// Create a backend, creating the cache directory if needed
    pub fn new(options: FileOptions) -> Result<Self> {
        fs::create_dir_all(&options.dir)?;
        Ok(Self {
            options,
            filenames: DashMap::new(),
        })
    }

    /// Backend rooted at `dir` with default options
    pub fn in_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(FileOptions::in_dir(dir))
    }

    /// Options in use
    pub fn options(&self) -> &FileOptions {
        &self.options
    }

    /// Path of the file holding `id`
    pub fn filename(&self, id: &str) -> PathBuf {
        if let Some(path) = self.filenames.get(id) {
            return path.clone();
        }

        let mut dir = self.options.dir.clone();
        let mut name = id.to_string();

        if self.options.sub_dirs && !self.options.separator.is_empty() {
            let mut parts: Vec<&str> = id.split(self.options.separator.as_str()).collect();
            name = parts.pop().unwrap_or_default().to_string();
            dir.extend(
                parts
                    .into_iter()
                    .filter(|part| !part.is_empty())
                    .map(path_segment),
            );
        }

        name = if self.options.id_as_filename {
            path_segment(&name)
        } else {
            hash(&name)
        };
        name.push_str(&self.options.file_extension);

        let path = dir.join(name);
        if self.filenames.len() >= MAX_MEMOIZED_FILENAMES {
            self.filenames.clear();
        }
        self.filenames.insert(id.to_string(), path.clone());
        path
    }

    fn encode(&self, value: Value, ttl: Option<Duration>) -> Result<Vec<u8>> {
        // A deadline past what chrono represents never expires
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        let json = serde_json::to_vec(&Envelope { value, expires_at })?;

        if !self.options.compress {
            let mut payload = Vec::with_capacity(json.len() + 1);
            payload.push(TAG_JSON);
            payload.extend_from_slice(&json);
            return Ok(payload);
        }

        let compressed = lz4::block::compress(&json, None, true).map_err(|e| {
            Error::CompressionFailed {
                algorithm: "LZ4".into(),
                reason: e.to_string(),
            }
        })?;
        let mut payload = Vec::with_capacity(compressed.len() + 1);
        payload.push(TAG_LZ4);
        payload.extend_from_slice(&compressed);
        Ok(payload)
    }

    fn decode(payload: &[u8]) -> Result<Envelope> {
        match payload.split_first() {
            Some((&TAG_JSON, json)) => Ok(serde_json::from_slice(json)?),
            Some((&TAG_LZ4, compressed)) => {
                let json = lz4::block::decompress(compressed, None).map_err(|e| {
                    Error::DecompressionFailed {
                        algorithm: "LZ4".into(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(serde_json::from_slice(&json)?)
            }
            _ => Err(Error::Backend("unrecognized cache file payload".to_string())),
        }
    }

    /// Read the live envelope, deleting the file when it has expired
    fn read(&self, path: &Path) -> Result<Option<Envelope>> {
        let payload = match fs::read(path) {
            Ok(payload) => payload,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let envelope = Self::decode(&payload)?;
        if envelope.is_expired() {
            remove_file(path)?;
            return Ok(None);
        }
        Ok(Some(envelope))
    }

    fn write(&self, path: &Path, payload: &[u8], create_new: bool) -> Result<bool> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut open = fs::OpenOptions::new();
        open.write(true);
        if create_new {
            open.create_new(true);
        } else {
            open.create(true).truncate(true);
        }

        let mut file = match open.open(path) {
            Ok(file) => file,
            Err(e) if create_new && e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(payload)?;
        Ok(true)
    }
}

fn hash(part: &str) -> String {
    hex::encode(Sha256::digest(part.as_bytes()))
}

/// `part` when it is a single plain path component, its hash otherwise
fn path_segment(part: &str) -> String {
    let mut components = Path::new(part).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if plain && !part.contains(['/', '\\']) {
        part.to_string()
    } else {
        hash(part)
    }
}

fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove every regular, non-hidden file below `dir`
fn remove_files(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            remove_files(&entry.path())?;
        } else if file_type.is_file() {
            remove_file(&entry.path())?;
        }
    }
    Ok(())
}

impl Backend for FileBackend {
    fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.read(&self.filename(id))?.map(|envelope| envelope.value))
    }

    fn add(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let path = self.filename(id);
        // Reading purges an expired file so create_new can succeed
        if self.read(&path)?.is_some() {
            return Ok(false);
        }
        let payload = self.encode(value, ttl)?;
        self.write(&path, &payload, true)
    }

    fn set(&self, id: &str, value: Value, ttl: Option<Duration>) -> Result<bool> {
        let payload = self.encode(value, ttl)?;
        self.write(&self.filename(id), &payload, false)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        remove_file(&self.filename(id))
    }

    fn flush_all(&self) -> Result<bool> {
        remove_files(&self.options.dir)?;
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================
