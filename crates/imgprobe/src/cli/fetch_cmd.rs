//! `imgprobe fetch` — probe URL templates for every catalog entity.

use crate::cli::report;
use crate::config::{PipelineConfig, ResolutionPolicy};
use crate::resolver::Resolver;
use crate::source::StaticCatalogSource;
use anyhow::Result;

/// Run the static-catalog pipeline.
pub async fn run(config: &PipelineConfig, policy: Option<ResolutionPolicy>) -> Result<()> {
    let source = StaticCatalogSource::from_config(config);
    let resolver = Resolver::from_config(config, config.request_delay())?;
    report::execute(resolver, &source, policy).await?;
    Ok(())
}
