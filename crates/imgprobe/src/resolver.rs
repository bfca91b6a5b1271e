//! Entity resolver: probes each entity's candidates and builds the manifest.
//!
//! Strictly one pass and strictly sequential. Entities are handled in
//! source order, candidates in priority order, and every attempt is
//! followed by the configured pause whether it succeeded or not. No
//! per-candidate or per-entity failure aborts the run.

use crate::candidates::{dedup_preserving_order, file_name};
use crate::config::{PipelineConfig, ResolutionPolicy};
use crate::error::ProbeResult;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::manifest::{reference_path, Manifest, RichEntry, RichManifest};
use crate::progress::{self, ProgressEventKind, ProgressSender};
use crate::source::{EntitySource, SourcedEntity};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One fetch attempt and where it would have landed.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub index: usize,
    pub url: String,
    pub destination: PathBuf,
    pub outcome: FetchOutcome,
}

/// Everything that happened for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    /// Id as recorded in the manifest (possibly disambiguated).
    pub id: String,
    pub label: String,
    pub attempts: Vec<AttemptRecord>,
    /// Manifest references for successful attempts.
    pub images: Vec<String>,
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub policy: ResolutionPolicy,
    pub manifest_path: PathBuf,
    pub manifest: Manifest,
    pub entities: Vec<EntityReport>,
}

impl RunReport {
    pub fn attempts(&self) -> usize {
        self.entities.iter().map(|e| e.attempts.len()).sum()
    }

    pub fn downloads(&self) -> usize {
        self.entities.iter().map(|e| e.images.len()).sum()
    }
}

/// Sequential, rate-limited candidate prober.
pub struct Resolver {
    fetcher: Fetcher,
    output_dir: PathBuf,
    manifest_path: PathBuf,
    public_prefix: Option<String>,
    delay: Duration,
    rich_manifest: bool,
    progress: Option<ProgressSender>,
}

impl Resolver {
    pub fn new(
        fetcher: Fetcher,
        output_dir: PathBuf,
        manifest_path: PathBuf,
        public_prefix: Option<String>,
        delay: Duration,
    ) -> Self {
        Self {
            fetcher,
            output_dir,
            manifest_path,
            public_prefix,
            delay,
            rich_manifest: false,
            progress: None,
        }
    }

    /// Build from configuration. `delay` is passed separately because the
    /// static and page variants use different defaults.
    pub fn from_config(config: &PipelineConfig, delay: Duration) -> ProbeResult<Self> {
        let fetcher = Fetcher::new(config.max_redirects, config.request_timeout_ms)?;
        Ok(Self::new(
            fetcher,
            config.output_dir.clone(),
            config.manifest_path(),
            config.public_prefix.clone(),
            delay,
        )
        .with_rich_manifest(config.rich_manifest))
    }

    /// Write name and price next to each entity's paths.
    pub fn with_rich_manifest(mut self, rich: bool) -> Self {
        self.rich_manifest = rich;
        self
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Resolve every entity from `source`, then write the manifest.
    ///
    /// `policy` overrides the source's default. Only a failing source or a
    /// failing manifest write is an error.
    pub async fn run(
        &self,
        source: &dyn EntitySource,
        policy: Option<ResolutionPolicy>,
    ) -> ProbeResult<RunReport> {
        let policy = policy.unwrap_or_else(|| source.default_policy());
        let mut seq = 0u64;

        let entities = source.entities().await?;
        info!(
            source = source.name(),
            %policy,
            entities = entities.len(),
            "starting run"
        );
        progress::emit(
            &self.progress,
            &mut seq,
            ProgressEventKind::SourceReady {
                source: source.name().to_string(),
                entities: entities.len(),
            },
        );

        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut manifest = Manifest::new();
        let mut rich = RichManifest::new();
        let mut reports = Vec::with_capacity(entities.len());
        let mut claimed = HashSet::new();

        for sourced in &entities {
            let slots = dedup_preserving_order(sourced.candidates.clone()).len();
            let id = claim_id(&mut claimed, &sourced.entity.id, slots);
            if id != sourced.entity.id {
                warn!(original = %sourced.entity.id, renamed = %id, "entity id already taken");
                progress::emit(
                    &self.progress,
                    &mut seq,
                    ProgressEventKind::Warning {
                        message: format!(
                            "id {:?} clashes with an earlier entity, recorded as {id:?}",
                            sourced.entity.id
                        ),
                    },
                );
            }

            let report = self.resolve_entity(&id, sourced, policy, &mut seq).await;
            manifest.insert(report.id.clone(), report.images.clone());
            if self.rich_manifest {
                rich.insert(
                    report.id.clone(),
                    RichEntry {
                        name: sourced.entity.display_name.clone(),
                        price: sourced.entity.attr("price").map(str::to_string),
                        images: report.images.clone(),
                    },
                );
            }
            reports.push(report);
        }

        if self.rich_manifest {
            rich.write_atomic(&self.manifest_path)?;
        } else {
            manifest.write_atomic(&self.manifest_path)?;
        }
        info!(
            path = %self.manifest_path.display(),
            entries = manifest.len(),
            resolved = manifest.resolved_count(),
            "manifest written"
        );
        progress::emit(
            &self.progress,
            &mut seq,
            ProgressEventKind::ManifestWritten {
                path: self.manifest_path.display().to_string(),
                entries: manifest.len(),
            },
        );

        Ok(RunReport {
            source: source.name().to_string(),
            policy,
            manifest_path: self.manifest_path.clone(),
            manifest,
            entities: reports,
        })
    }

    /// Probe the candidates of one entity under `policy`.
    pub async fn resolve_entity(
        &self,
        id: &str,
        sourced: &SourcedEntity,
        policy: ResolutionPolicy,
        seq: &mut u64,
    ) -> EntityReport {
        let candidates = dedup_preserving_order(sourced.candidates.clone());
        let label = sourced.entity.label();
        info!(entity = id, candidates = candidates.len(), "processing {label}");
        progress::emit(
            &self.progress,
            seq,
            ProgressEventKind::EntityStarted {
                entity_id: id.to_string(),
                label: label.clone(),
                candidates: candidates.len(),
            },
        );

        let mut attempts = Vec::new();
        let mut images = Vec::new();

        for (index, url) in candidates.iter().enumerate() {
            let destination = self.output_dir.join(file_name(id, index, url));
            let outcome = self.fetcher.fetch(url, &destination).await;
            debug!(entity = id, index, url = %url, "{}", outcome.summary());

            progress::emit(
                &self.progress,
                seq,
                ProgressEventKind::AttemptFinished {
                    entity_id: id.to_string(),
                    index,
                    url: url.clone(),
                    success: outcome.is_success(),
                    detail: outcome.summary(),
                },
            );

            let succeeded = outcome.is_success();
            if succeeded {
                images.push(reference_path(self.public_prefix.as_deref(), &destination));
            }
            attempts.push(AttemptRecord {
                index,
                url: url.clone(),
                destination,
                outcome,
            });

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if succeeded && policy == ResolutionPolicy::FirstSuccess {
                break;
            }
        }

        if images.is_empty() {
            warn!(entity = id, "no images found");
        } else {
            info!(entity = id, count = images.len(), "images resolved");
        }
        progress::emit(
            &self.progress,
            seq,
            ProgressEventKind::EntityResolved {
                entity_id: id.to_string(),
                images: images.len(),
            },
        );

        EntityReport {
            id: id.to_string(),
            label,
            attempts,
            images,
        }
    }
}

/// File stems an entity with `slots` candidates may write: `id`, then
/// `id-1` … `id-{slots-1}`, matching [`file_name`].
fn file_stems(id: &str, slots: usize) -> Vec<String> {
    std::iter::once(id.to_string())
        .chain((1..slots).map(|n| format!("{id}-{n}")))
        .collect()
}

/// First id whose file stems are all unclaimed: `id` itself, then `id_2`,
/// `id_3`, … The chosen id's stems are claimed for the rest of the run, so
/// no two entities ever share a destination file.
fn claim_id(claimed: &mut HashSet<String>, id: &str, slots: usize) -> String {
    let base = if id.is_empty() { "entity" } else { id };
    let mut n = 1u32;
    loop {
        let candidate = if n == 1 {
            base.to_string()
        } else {
            format!("{base}_{n}")
        };
        let stems = file_stems(&candidate, slots);
        if stems.iter().all(|s| !claimed.contains(s)) {
            claimed.extend(stems);
            return candidate;
        }
        n += 1;
    }
}
