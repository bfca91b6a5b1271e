//! Entity sources: where the resolver gets entities and their candidates.
//!
//! The resolver only sees [`SourcedEntity`] values, so it does not care
//! whether they came from the static catalog (candidates from URL
//! templates) or from a rendered page (candidates from scraped `img` tags).

use crate::candidates::CandidateGenerator;
use crate::catalog::EntityDescriptor;
use crate::config::{PageConfig, PipelineConfig, ResolutionPolicy};
use crate::error::{ProbeError, ProbeResult};
use crate::extract::CardExtractor;
use crate::renderer::Renderer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// An entity paired with its candidate URLs in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedEntity {
    pub entity: EntityDescriptor,
    pub candidates: Vec<String>,
}

/// A provider of entities for one run.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Policy used when the caller does not override it.
    fn default_policy(&self) -> ResolutionPolicy;

    /// Produce all entities, in processing order.
    async fn entities(&self) -> ProbeResult<Vec<SourcedEntity>>;
}

/// Entities from a fixed catalog; candidates from URL templates.
pub struct StaticCatalogSource {
    catalog: Vec<EntityDescriptor>,
    generator: CandidateGenerator,
    policy: ResolutionPolicy,
}

impl StaticCatalogSource {
    pub fn new(
        catalog: Vec<EntityDescriptor>,
        generator: CandidateGenerator,
        policy: ResolutionPolicy,
    ) -> Self {
        Self {
            catalog,
            generator,
            policy,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.catalog.clone(),
            CandidateGenerator::new(&config.base_url, config.templates.clone()),
            config.policy,
        )
    }

    /// Candidates for every entity without touching the network.
    pub fn plan(&self) -> Vec<SourcedEntity> {
        self.catalog
            .iter()
            .map(|entity| SourcedEntity {
                candidates: self.generator.generate(entity),
                entity: entity.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl EntitySource for StaticCatalogSource {
    fn name(&self) -> &'static str {
        "static-catalog"
    }

    fn default_policy(&self) -> ResolutionPolicy {
        self.policy
    }

    async fn entities(&self) -> ProbeResult<Vec<SourcedEntity>> {
        Ok(self.plan())
    }
}

/// Entities scraped from a page rendered in a headless browser.
pub struct RenderedPageSource {
    renderer: Arc<dyn Renderer>,
    page: PageConfig,
}

impl RenderedPageSource {
    pub fn new(renderer: Arc<dyn Renderer>, page: PageConfig) -> Self {
        Self { renderer, page }
    }

    async fn render(&self) -> ProbeResult<(String, String)> {
        let mut ctx = self
            .renderer
            .new_context()
            .await
            .map_err(|e| ProbeError::BrowserUnavailable(format!("{e:#}")))?;

        let nav = match ctx.navigate(&self.page.url, self.page.load_timeout_ms).await {
            Ok(nav) => nav,
            Err(e) => {
                let _ = ctx.close().await;
                return Err(ProbeError::Navigation(format!("{}: {e:#}", self.page.url)));
            }
        };
        info!(
            url = %nav.final_url,
            load_ms = nav.load_time_ms,
            "page loaded, settling for {}ms",
            self.page.settle_ms
        );
        tokio::time::sleep(Duration::from_millis(self.page.settle_ms)).await;

        let html = ctx.get_html().await;
        let _ = ctx.close().await;
        let html = html.map_err(|e| ProbeError::Navigation(format!("reading DOM: {e:#}")))?;
        Ok((html, nav.final_url))
    }
}

#[async_trait]
impl EntitySource for RenderedPageSource {
    fn name(&self) -> &'static str {
        "rendered-page"
    }

    fn default_policy(&self) -> ResolutionPolicy {
        ResolutionPolicy::CollectAll
    }

    async fn entities(&self) -> ProbeResult<Vec<SourcedEntity>> {
        let extractor = CardExtractor::new(&self.page.exclude_patterns)
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        let (html, final_url) = self.render().await?;
        debug!(bytes = html.len(), "rendered DOM captured");

        let cards = extractor.extract(&html, &final_url);
        info!(count = cards.len(), "extracted entities from page");

        Ok(cards
            .into_iter()
            .map(|card| SourcedEntity {
                entity: card.entity,
                candidates: card.images,
            })
            .collect())
    }
}
