//! Entity descriptors and the canonical vehicle catalog.

use crate::error::{ProbeError, ProbeResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

/// A catalog item for which an image is sought.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Stable identifier; used in candidate URLs and local file names.
    pub id: String,
    /// Human-readable name, e.g. "MG 3".
    pub display_name: String,
    /// Free-form attributes (color, year, price).
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EntityDescriptor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter. Empty values are not stored.
    pub fn with_attr(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.attributes.insert(key.to_string(), value);
        }
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Label used in progress output: "MG 3 Blue 2024".
    pub fn label(&self) -> String {
        let mut parts = vec![self.display_name.as_str()];
        if let Some(color) = self.attr("color") {
            parts.push(color);
        }
        if let Some(year) = self.attr("year") {
            parts.push(year);
        }
        parts.join(" ")
    }
}

/// The rental fleet the website lists.
pub fn default_catalog() -> Vec<EntityDescriptor> {
    const FLEET: &[(&str, &str, &str, &str)] = &[
        ("mg3-blue", "MG 3", "Blue", "2024"),
        ("mg3-black", "MG 3", "Black", "2024"),
        ("mg3-grey", "MG 3", "Grey", "2024"),
        ("mg5-silver", "MG 5", "Silver", "2023"),
        ("mg5-white", "MG 5", "White", "2024"),
        ("mg-gt-blue", "MG GT", "Blue", "2024"),
        ("mg-gt-red", "MG GT", "Red", "2024"),
        ("mg-gt-white", "MG GT", "White", "2024"),
        ("mg-gt-black", "MG GT", "Black", "2024"),
        ("mg-zs-silver", "MG ZS", "Silver", "2024"),
        ("mg-zs-white", "MG ZS", "White", "2024"),
        ("mg-rx5", "MG RX5", "", "2024"),
        ("jetour-t2", "JETOUR T2", "Sand", "2026"),
    ];

    FLEET
        .iter()
        .map(|(id, name, color, year)| {
            EntityDescriptor::new(*id, *name)
                .with_attr("color", *color)
                .with_attr("year", *year)
        })
        .collect()
}

/// Reject catalogs with repeated ids; the manifest holds one entry per id.
///
/// Also rejects an id of the form `{other}-{n}` when `other` is in the
/// catalog, since it would share file names with `other`'s later candidates.
pub fn ensure_unique(entities: &[EntityDescriptor]) -> ProbeResult<()> {
    let mut seen = HashSet::new();
    for e in entities {
        if !seen.insert(e.id.as_str()) {
            return Err(ProbeError::DuplicateEntity(e.id.clone()));
        }
    }
    for e in entities {
        if let Some((stem, suffix)) = e.id.rsplit_once('-') {
            if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) && seen.contains(stem)
            {
                return Err(ProbeError::Config(format!(
                    "entity id {:?} collides with file names of {stem:?}",
                    e.id
                )));
            }
        }
    }
    Ok(())
}

/// Derive an id from a display name: lower-case, whitespace runs to `-`,
/// anything outside `[a-z0-9-]` dropped.
pub fn slugify(name: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let ws = WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"));
    let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("static regex"));

    let lower = name.to_lowercase();
    let dashed = ws.replace_all(&lower, "-");
    invalid.replace_all(&dashed, "").into_owned()
}
