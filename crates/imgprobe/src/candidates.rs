//! Candidate URL generation and local file naming.
//!
//! Candidates are produced by substituting entity fields into path
//! templates. Supported placeholders:
//!
//! - `{base}` — the configured base URL, trailing `/` trimmed
//! - `{id}` — the entity id
//! - `{attr:NAME}` — the entity attribute `NAME`
//!
//! Unknown placeholders are left untouched; the resulting URL will simply
//! fail to fetch.

use crate::catalog::EntityDescriptor;
use std::collections::HashSet;

/// Extension used when a URL path carries none.
pub const DEFAULT_EXTENSION: &str = ".jpg";

/// Expands templates against entities. Pure; never fails.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    base_url: String,
    templates: Vec<String>,
}

impl CandidateGenerator {
    pub fn new(base_url: &str, templates: Vec<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            templates,
        }
    }

    /// Ordered candidate URLs for one entity, duplicates removed.
    pub fn generate(&self, entity: &EntityDescriptor) -> Vec<String> {
        dedup_preserving_order(
            self.templates
                .iter()
                .map(|t| self.expand(t, entity))
                .collect(),
        )
    }

    fn expand(&self, template: &str, entity: &EntityDescriptor) -> String {
        let mut out = template
            .replace("{base}", &self.base_url)
            .replace("{id}", &entity.id);
        for (key, value) in &entity.attributes {
            out = out.replace(&format!("{{attr:{key}}}"), value);
        }
        out
    }
}

/// Remove repeated URLs, keeping the first occurrence.
pub fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// Lower-cased extension (with dot) of a URL's path, or [`DEFAULT_EXTENSION`].
///
/// Query strings and fragments are ignored. Unparseable URLs fall back to
/// the default.
pub fn extension_for(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => return DEFAULT_EXTENSION.to_string(),
    };
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

/// Local file name for the `index`-th candidate of `entity_id`.
///
/// Index 0 is `{id}{ext}`; later indices are `{id}-{index}{ext}`.
pub fn file_name(entity_id: &str, index: usize, url: &str) -> String {
    let ext = extension_for(url);
    if index == 0 {
        format!("{entity_id}{ext}")
    } else {
        format!("{entity_id}-{index}{ext}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_templates;

    #[test]
    fn test_default_templates_expand_in_order() {
        let gen = CandidateGenerator::new("https://brauncar.com/", default_templates());
        let urls = gen.generate(&EntityDescriptor::new("mg3-blue", "MG 3"));
        assert_eq!(
            urls,
            vec![
                "https://brauncar.com/images/cars/mg3-blue.jpg",
                "https://brauncar.com/images/cars/mg3-blue.png",
                "https://brauncar.com/images/mg3-blue.jpg",
                "https://brauncar.com/images/mg3-blue.png",
                "https://brauncar.com/uploads/cars/mg3-blue.jpg",
                "https://brauncar.com/uploads/mg3-blue.jpg",
            ]
        );
    }

    #[test]
    fn test_attribute_placeholders() {
        let gen = CandidateGenerator::new(
            "http://h",
            vec![
                "{base}/{attr:year}/{id}-{attr:color}.webp".into(),
                "{base}/{attr:missing}/{id}.jpg".into(),
            ],
        );
        let entity = EntityDescriptor::new("mg5", "MG 5")
            .with_attr("year", "2023")
            .with_attr("color", "silver");
        let urls = gen.generate(&entity);
        assert_eq!(urls[0], "http://h/2023/mg5-silver.webp");
        assert_eq!(urls[1], "http://h/{attr:missing}/mg5.jpg");
    }

    #[test]
    fn test_duplicates_collapse() {
        let gen = CandidateGenerator::new(
            "http://h",
            vec!["{base}/{id}.jpg".into(), "http://h/{id}.jpg".into()],
        );
        assert_eq!(gen.generate(&EntityDescriptor::new("x", "X")).len(), 1);
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("https://h/a/b.JPG"), ".jpg");
        assert_eq!(extension_for("https://h/a/b.png?w=300#top"), ".png");
        assert_eq!(extension_for("https://h/a/b"), ".jpg");
        assert_eq!(extension_for("https://h/a.d/b"), ".jpg");
        assert_eq!(extension_for("https://h/.hidden"), ".jpg");
        assert_eq!(extension_for("not a url"), ".jpg");
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("mg3-blue", 0, "http://h/x.png"), "mg3-blue.png");
        assert_eq!(file_name("mg3-blue", 3, "http://h/x"), "mg3-blue-3.jpg");
    }
}
