//! Project container archive
//!
//! An in-memory archive of named byte entries: the unit of project import
//! and export. Serialized containers are a JSON archive image (entry data
//! base64-encoded) compressed with brotli.
//! - Reading: Auto-detects format by checking for a plain JSON start
//! - Writing: Always uses brotli compression

pub mod worker;

use std::collections::BTreeMap;
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Validation limits to prevent resource exhaustion from malicious files
pub mod limits {
    /// Maximum number of entries in a container
    pub const MAX_ENTRIES: usize = 4096;
    /// Maximum length of an entry name
    pub const MAX_NAME_LEN: usize = 512;
    /// Maximum decoded size of a single entry
    pub const MAX_ENTRY_BYTES: usize = 64 * 1024 * 1024;
}

/// Error type for container encode/decode
#[derive(Debug)]
pub enum ContainerError {
    Decompress(String),
    Compress(String),
    Json(serde_json::Error),
    Validation(String),
}

impl std::fmt::Display for ContainerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerError::Decompress(msg) => write!(f, "decompression failed: {}", msg),
            ContainerError::Compress(msg) => write!(f, "compression failed: {}", msg),
            ContainerError::Json(e) => write!(f, "JSON error: {}", e),
            ContainerError::Validation(msg) => write!(f, "validation error: {}", msg),
        }
    }
}

impl std::error::Error for ContainerError {}

impl From<serde_json::Error> for ContainerError {
    fn from(e: serde_json::Error) -> Self {
        ContainerError::Json(e)
    }
}

/// Compression parameters for [`Container::generate`]
///
/// Quality follows brotli's 0..=11 scale. The window size is fixed at 22,
/// a good balance of speed and ratio for project-sized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionOptions {
    pub quality: u32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self { quality: 6 }
    }
}

impl CompressionOptions {
    pub fn with_quality(quality: u32) -> Self {
        Self {
            quality: quality.min(11),
        }
    }
}

/// One record returned by [`Container::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub is_directory: bool,
    /// Seconds since the Unix epoch, captured when the entry was written
    pub modified: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    modified: u64,
}

/// Serialized form of a container: a list of named base64 payloads
#[derive(Serialize, Deserialize)]
struct ArchiveImage {
    entries: Vec<ImageEntry>,
}

#[derive(Serialize, Deserialize)]
struct ImageEntry {
    name: String,
    #[serde(default)]
    modified: u64,
    data: String,
}

/// Mutable archive of named byte entries
///
/// Containers are created on load or on export, mutated while assets are
/// copied in or out, serialized on demand, then discarded. No long-lived
/// handle is required between operations.
#[derive(Debug, Clone, Default)]
pub struct Container {
    entries: BTreeMap<String, Entry>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a serialized container (plain JSON or brotli-compressed)
    pub fn parse(bytes: &[u8]) -> Result<Self, ContainerError> {
        // Detect format: a plain image starts with '{' or whitespace, brotli is binary
        let is_plain_json = bytes
            .first()
            .map(|&b| b == b'{' || b == b' ' || b == b'\n' || b == b'\r' || b == b'\t')
            .unwrap_or(false);

        let image: ArchiveImage = if is_plain_json {
            serde_json::from_slice(bytes)?
        } else {
            let mut decompressed = Vec::new();
            brotli::BrotliDecompress(&mut Cursor::new(bytes), &mut decompressed)
                .map_err(|e| ContainerError::Decompress(e.to_string()))?;
            serde_json::from_slice(&decompressed)?
        };

        Self::from_image(image)
    }

    fn from_image(image: ArchiveImage) -> Result<Self, ContainerError> {
        if image.entries.len() > limits::MAX_ENTRIES {
            return Err(ContainerError::Validation(format!(
                "too many entries ({} > {})",
                image.entries.len(),
                limits::MAX_ENTRIES
            )));
        }

        let mut entries = BTreeMap::new();
        for entry in image.entries {
            if entry.name.is_empty() || entry.name.len() > limits::MAX_NAME_LEN {
                return Err(ContainerError::Validation(format!(
                    "bad entry name length ({})",
                    entry.name.len()
                )));
            }
            let data = BASE64
                .decode(entry.data.as_bytes())
                .map_err(|e| ContainerError::Validation(format!("entry '{}': {}", entry.name, e)))?;
            if data.len() > limits::MAX_ENTRY_BYTES {
                return Err(ContainerError::Validation(format!(
                    "entry '{}' too large ({} bytes)",
                    entry.name,
                    data.len()
                )));
            }
            if entries
                .insert(
                    entry.name.clone(),
                    Entry {
                        data,
                        modified: entry.modified,
                    },
                )
                .is_some()
            {
                return Err(ContainerError::Validation(format!(
                    "duplicate entry '{}'",
                    entry.name
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Serialize to compressed bytes
    pub fn generate(&self, options: &CompressionOptions) -> Result<Vec<u8>, ContainerError> {
        let image = ArchiveImage {
            entries: self
                .entries
                .iter()
                .map(|(name, entry)| ImageEntry {
                    name: name.clone(),
                    modified: entry.modified,
                    data: BASE64.encode(&entry.data),
                })
                .collect(),
        };
        let json = serde_json::to_vec(&image)?;

        let mut compressed = Vec::new();
        brotli::BrotliCompress(
            &mut Cursor::new(&json),
            &mut compressed,
            &brotli::enc::BrotliEncoderParams {
                quality: options.quality.min(11) as i32,
                lgwin: 22,
                ..Default::default()
            },
        )
        .map_err(|e| ContainerError::Compress(e.to_string()))?;

        Ok(compressed)
    }

    /// List entries: files plus directory records synthesized from path prefixes
    pub fn list(&self) -> Vec<EntryInfo> {
        let mut dirs: BTreeMap<String, u64> = BTreeMap::new();
        for (name, entry) in &self.entries {
            let mut prefix = String::new();
            for component in name.split('/').take(name.split('/').count().saturating_sub(1)) {
                if !prefix.is_empty() {
                    prefix.push('/');
                }
                prefix.push_str(component);
                let stamp = dirs.entry(prefix.clone()).or_insert(0);
                *stamp = (*stamp).max(entry.modified);
            }
        }

        let mut out: Vec<EntryInfo> = dirs
            .into_iter()
            .map(|(name, modified)| EntryInfo {
                name,
                is_directory: true,
                modified,
            })
            .collect();
        out.extend(self.entries.iter().map(|(name, entry)| EntryInfo {
            name: name.clone(),
            is_directory: false,
            modified: entry.modified,
        }));
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn read(&self, path: &str) -> Option<&[u8]> {
        self.entries.get(path).map(|e| e.data.as_slice())
    }

    /// Read an entry as UTF-8 text; non-text entries return None
    pub fn read_text(&self, path: &str) -> Option<String> {
        self.entries
            .get(path)
            .and_then(|e| String::from_utf8(e.data.clone()).ok())
    }

    pub fn write(&mut self, path: impl Into<String>, data: Vec<u8>) {
        let modified = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.entries.insert(path.into(), Entry { data, modified });
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.entries.remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entry names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }
}
