//! `imgprobe scrape` — render the listing page and download what it shows.

use crate::cli::{output, report};
use crate::config::PipelineConfig;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::resolver::Resolver;
use crate::source::RenderedPageSource;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Run the rendered-page pipeline. Fails immediately if no browser starts.
pub async fn run(config: &PipelineConfig) -> Result<()> {
    let renderer = Arc::new(ChromiumRenderer::launch(config.chromium_path.as_deref()).await?);
    info!("Chromium renderer initialized");

    if !output::is_quiet() && !output::is_json() {
        println!("Loading {}...", config.page.url);
    }

    let source = RenderedPageSource::new(
        Arc::clone(&renderer) as Arc<dyn Renderer>,
        config.page.clone(),
    );
    let resolver = Resolver::from_config(
        config,
        Duration::from_millis(config.page.request_delay_ms),
    )?;

    let result = report::execute(resolver, &source, None).await;
    renderer.shutdown().await?;
    result.map(|_| ())
}
