use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Storage locators
// ---------------------------------------------------------------------------

/// A single object inside a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocator {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

/// Renders as `/<bucket>/<key>`, the form clip paths take before signing.
impl fmt::Display for ObjectLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.bucket, self.key)
    }
}

// ---------------------------------------------------------------------------
// Manifest model
// ---------------------------------------------------------------------------

/// Where a clip's media comes from.
///
/// Only `Storage` clips are eligible for URL signing. Everything else
/// (caller-injected resources, already-signed URLs, decoded paths) is carried
/// verbatim as `Opaque`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipSource {
    Storage(ObjectLocator),
    Opaque(String),
}

impl ClipSource {
    pub fn path(&self) -> String {
        match self {
            ClipSource::Storage(locator) => locator.to_string(),
            ClipSource::Opaque(path) => path.clone(),
        }
    }
}

/// Clip type tag. Only `source` clips exist today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipType {
    #[default]
    Source,
}

/// Leaf unit of a manifest. Serialized as `{"type": "source", "path": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireClip", from = "WireClip")]
pub struct Clip {
    pub clip_type: ClipType,
    pub source: ClipSource,
}

impl Clip {
    pub fn storage(locator: ObjectLocator) -> Self {
        Self {
            clip_type: ClipType::Source,
            source: ClipSource::Storage(locator),
        }
    }

    pub fn opaque(path: impl Into<String>) -> Self {
        Self {
            clip_type: ClipType::Source,
            source: ClipSource::Opaque(path.into()),
        }
    }

    pub fn path(&self) -> String {
        self.source.path()
    }
}

#[derive(Serialize, Deserialize)]
struct WireClip {
    #[serde(rename = "type")]
    clip_type: ClipType,
    path: String,
}

impl From<Clip> for WireClip {
    fn from(clip: Clip) -> Self {
        Self {
            clip_type: clip.clip_type,
            path: clip.source.path(),
        }
    }
}

// Decoded paths are never re-interpreted as storage locators.
impl From<WireClip> for Clip {
    fn from(wire: WireClip) -> Self {
        Self {
            clip_type: wire.clip_type,
            source: ClipSource::Opaque(wire.path),
        }
    }
}

/// One contiguous source group: a matched object or an injected resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub clips: Vec<Clip>,
}

impl Sequence {
    pub fn single(clip: Clip) -> Self {
        Self { clips: vec![clip] }
    }
}

/// The full playlist returned for one map request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub sequences: Vec<Sequence>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sequences(sequences: Vec<Sequence>) -> Self {
        Self { sequences }
    }

    pub fn push(&mut self, sequence: Sequence) {
        self.sequences.push(sequence);
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// All clip paths in manifest order.
    pub fn paths(&self) -> Vec<String> {
        self.sequences
            .iter()
            .flat_map(|s| s.clips.iter().map(Clip::path))
            .collect()
    }
}
