//! The run manifest: entity id → local image reference paths.
//!
//! Serialized as a single pretty-printed JSON object whose keys keep
//! resolution order. Written once per run through a temp file and a rename,
//! so readers never observe a half-written manifest.
//!
//! The rich form ([`RichManifest`]) keeps each entity's display name and
//! scraped price next to its paths. [`Manifest::load`] reads either form.

use crate::error::{ProbeError, ProbeResult};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Ordered mapping from entity id to reference paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<(String, Vec<String>)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `paths` for `id`, replacing any earlier record in place.
    pub fn insert(&mut self, id: impl Into<String>, paths: Vec<String>) {
        let id = id.into();
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some((_, existing)) => *existing = paths,
            None => self.entries.push((id, paths)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of entities with at least one image.
    pub fn resolved_count(&self) -> usize {
        self.entries.iter().filter(|(_, v)| !v.is_empty()).count()
    }

    /// Pretty JSON with two-space indent and a trailing newline.
    pub fn to_json_pretty(&self) -> ProbeResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Write the manifest to `path`, replacing any previous file atomically.
    pub fn write_atomic(&self, path: &Path) -> ProbeResult<()> {
        write_json_atomic(path, &self.to_json_pretty()?)
    }

    /// Read a manifest written by [`Manifest::write_atomic`] or
    /// [`RichManifest::write_atomic`]. Rich entries keep only their paths.
    pub fn load(path: &Path) -> ProbeResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Display name, price and paths of one entity in the rich form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub images: Vec<String>,
}

/// Ordered mapping from entity id to [`RichEntry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichManifest {
    entries: Vec<(String, RichEntry)>,
}

impl RichManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: RichEntry) {
        let id = id.into();
        match self.entries.iter_mut().find(|(k, _)| *k == id) {
            Some((_, existing)) => *existing = entry,
            None => self.entries.push((id, entry)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&RichEntry> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json_pretty(&self) -> ProbeResult<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    pub fn write_atomic(&self, path: &Path) -> ProbeResult<()> {
        write_json_atomic(path, &self.to_json_pretty()?)
    }
}

fn write_json_atomic(path: &Path, json: &str) -> ProbeResult<()> {
    let wrap = |source: std::io::Error| ProbeError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(wrap)?;
    }

    let tmp = tmp_path(path);
    let mut file = std::fs::File::create(&tmp).map_err(wrap)?;
    file.write_all(json.as_bytes()).map_err(wrap)?;
    file.sync_all().map_err(wrap)?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        wrap(e)
    })
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

/// Reference recorded in the manifest for a downloaded file.
///
/// With a prefix the reference is `{prefix}/{file_name}` (a site-relative
/// URL); without one it is the local path as given.
pub fn reference_path(prefix: Option<&str>, dest: &Path) -> String {
    match (prefix, dest.file_name()) {
        (Some(prefix), Some(name)) => format!(
            "{}/{}",
            prefix.trim_end_matches('/'),
            name.to_string_lossy()
        ),
        _ => dest.display().to_string(),
    }
}

/// Inverse of [`reference_path`]: where a reference lives on disk.
pub fn resolve_reference(prefix: Option<&str>, output_dir: &Path, reference: &str) -> PathBuf {
    if let Some(prefix) = prefix {
        let prefix = prefix.trim_end_matches('/');
        if let Some(name) = reference
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            return output_dir.join(name);
        }
    }
    PathBuf::from(reference)
}

impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, paths) in &self.entries {
            map.serialize_entry(id, paths)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ManifestVisitor;

        impl<'de> Visitor<'de> for ManifestVisitor {
            type Value = Manifest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of entity id to image path list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Manifest, A::Error> {
                let mut manifest = Manifest::new();
                while let Some((id, value)) = access.next_entry::<String, EntryValue>()? {
                    let paths = match value {
                        EntryValue::Paths(paths) => paths,
                        EntryValue::Rich(entry) => entry.images,
                    };
                    manifest.insert(id, paths);
                }
                Ok(manifest)
            }
        }

        deserializer.deserialize_map(ManifestVisitor)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EntryValue {
    Paths(Vec<String>),
    Rich(RichEntry),
}

impl Serialize for RichManifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, entry) in &self.entries {
            map.serialize_entry(id, entry)?;
        }
        map.end()
    }
}
