//! `imgprobe catalog` — show entities and their candidate URLs offline.

use crate::cli::output;
use crate::config::PipelineConfig;
use crate::source::StaticCatalogSource;
use anyhow::Result;
use serde_json::json;

pub fn run(config: &PipelineConfig) -> Result<()> {
    let plan = StaticCatalogSource::from_config(config).plan();

    if output::is_json() {
        let entries: Vec<_> = plan
            .iter()
            .map(|s| {
                json!({
                    "id": s.entity.id,
                    "name": s.entity.display_name,
                    "attributes": s.entity.attributes,
                    "candidates": s.candidates,
                })
            })
            .collect();
        output::print_json(&entries);
        return Ok(());
    }

    println!(
        "{} entities, {} template(s), policy {}",
        plan.len(),
        config.templates.len(),
        config.policy
    );
    for s in &plan {
        println!();
        println!("{} ({})", s.entity.id, s.entity.label());
        for (i, url) in s.candidates.iter().enumerate() {
            println!("  {i}. {url}");
        }
    }
    Ok(())
}
