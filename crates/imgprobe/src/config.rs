//! Pipeline configuration: embedded defaults, optional JSON file, env overrides.
//!
//! Resolution order (later wins): built-in defaults, the JSON file named by
//! `--config` or `IMGPROBE_CONFIG`, the `IMGPROBE_*` environment variables,
//! and finally explicit CLI flags (applied by the caller).

use crate::catalog::{default_catalog, ensure_unique, EntityDescriptor};
use crate::error::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default host probed by the candidate templates.
pub const DEFAULT_BASE_URL: &str = "https://brauncar.com";

/// Default listing page rendered by the `scrape` variant.
pub const DEFAULT_PAGE_URL: &str = "https://brauncar.com/";

/// Default manifest file name, written inside the output directory.
pub const DEFAULT_MANIFEST_NAME: &str = "images.json";

/// Desktop Chrome user agent sent by both the fetcher and the browser.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/131.0.0.0 Safari/537.36";

/// Which candidates are attempted once one succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    /// Stop probing an entity after its first successful download.
    FirstSuccess,
    /// Probe every candidate and keep every successful download.
    CollectAll,
}

impl std::fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FirstSuccess => write!(f, "first-success"),
            Self::CollectAll => write!(f, "collect-all"),
        }
    }
}

/// Settings for the rendered-page entity source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    /// Page to render and scrape.
    pub url: String,
    /// Overall navigation timeout.
    pub load_timeout_ms: u64,
    /// Fixed wait after navigation before the DOM is read.
    pub settle_ms: u64,
    /// Delay between downloads in the page variant.
    pub request_delay_ms: u64,
    /// Substrings that mark an image as non-product (logos, icons).
    pub exclude_patterns: Vec<String>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PAGE_URL.to_string(),
            load_timeout_ms: 30_000,
            settle_ms: 3_000,
            request_delay_ms: 500,
            exclude_patterns: vec!["logo".to_string(), "icon".to_string()],
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory receiving image files and the manifest.
    pub output_dir: PathBuf,
    /// Manifest file name inside `output_dir`.
    pub manifest_name: String,
    /// Prefix for manifest reference paths. `None` records absolute paths.
    pub public_prefix: Option<String>,
    /// Record `{ name, price, images }` per entity instead of a bare path list.
    pub rich_manifest: bool,
    /// Substituted for `{base}` in templates.
    pub base_url: String,
    /// Candidate URL templates in priority order.
    pub templates: Vec<String>,
    /// Policy for the static catalog.
    pub policy: ResolutionPolicy,
    /// Unconditional pause after each fetch attempt.
    pub request_delay_ms: u64,
    /// Redirect hops followed before giving up.
    pub max_redirects: u32,
    /// Per-request timeout; `None` leaves the transport default.
    pub request_timeout_ms: Option<u64>,
    /// Entities for the static source.
    pub catalog: Vec<EntityDescriptor>,
    /// Rendered-page source settings.
    pub page: PageConfig,
    /// Explicit Chromium binary; otherwise discovered.
    pub chromium_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("public/cars"),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            public_prefix: Some("/cars".to_string()),
            rich_manifest: false,
            base_url: DEFAULT_BASE_URL.to_string(),
            templates: default_templates(),
            policy: ResolutionPolicy::FirstSuccess,
            request_delay_ms: 1_000,
            max_redirects: 5,
            request_timeout_ms: None,
            catalog: default_catalog(),
            page: PageConfig::default(),
            chromium_path: None,
        }
    }
}

/// Known image locations on the source site, most likely first.
pub fn default_templates() -> Vec<String> {
    [
        "{base}/images/cars/{id}.jpg",
        "{base}/images/cars/{id}.png",
        "{base}/images/{id}.jpg",
        "{base}/images/{id}.png",
        "{base}/uploads/cars/{id}.jpg",
        "{base}/uploads/{id}.jpg",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl PipelineConfig {
    /// Load configuration: defaults, then file (explicit or `IMGPROBE_CONFIG`),
    /// then environment overrides. The result is validated.
    pub fn load(explicit: Option<&Path>) -> ProbeResult<Self> {
        let file = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("IMGPROBE_CONFIG").map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> ProbeResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> ProbeResult<Self> {
        serde_json::from_str(raw).map_err(|e| ProbeError::Config(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("IMGPROBE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(base) = std::env::var("IMGPROBE_BASE_URL") {
            self.base_url = base;
        }
        if let Ok(path) = std::env::var("IMGPROBE_CHROMIUM_PATH") {
            self.chromium_path = Some(PathBuf::from(path));
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> ProbeResult<()> {
        if self.templates.is_empty() {
            return Err(ProbeError::Config("no URL templates configured".into()));
        }
        if self.max_redirects == 0 {
            return Err(ProbeError::Config("max_redirects must be at least 1".into()));
        }
        if self.manifest_name.is_empty() || self.manifest_name.contains('/') {
            return Err(ProbeError::Config(format!(
                "manifest_name must be a plain file name, got {:?}",
                self.manifest_name
            )));
        }
        ensure_unique(&self.catalog)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir.join(&self.manifest_name)
    }
}
