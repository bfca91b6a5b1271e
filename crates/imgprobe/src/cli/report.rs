//! Drive a resolver run with live progress and print the outcome.

use crate::cli::output;
use crate::config::ResolutionPolicy;
use crate::progress;
use crate::resolver::{Resolver, RunReport};
use crate::source::EntitySource;
use anyhow::{Context, Result};

/// Run `resolver` over `source`, streaming progress unless quiet or JSON.
pub async fn execute(
    resolver: Resolver,
    source: &dyn EntitySource,
    policy: Option<ResolutionPolicy>,
) -> Result<RunReport> {
    let live = !output::is_quiet() && !output::is_json();

    let (resolver, printer) = if live {
        let (tx, rx) = progress::channel();
        (resolver.with_progress(tx), Some(output::spawn_printer(rx)))
    } else {
        (resolver, None)
    };

    let result = resolver.run(source, policy).await;
    // Dropping the resolver closes the channel so the printer drains and exits.
    drop(resolver);
    if let Some(handle) = printer {
        let _ = handle.await;
    }

    let report = result.with_context(|| format!("{} run failed", source.name()))?;
    print_summary(&report);
    Ok(report)
}

fn print_summary(report: &RunReport) {
    if output::is_json() {
        output::print_json(report);
        return;
    }
    if output::is_quiet() {
        return;
    }

    let total = report.manifest.len();
    let resolved = report.manifest.resolved_count();
    println!();
    println!(
        "{resolved}/{total} entities resolved, {} file(s) from {} attempt(s) [{}]",
        report.downloads(),
        report.attempts(),
        report.policy
    );
    if resolved < total {
        println!("Unresolved:");
        for (id, paths) in report.manifest.iter() {
            if paths.is_empty() {
                println!("  - {id}");
            }
        }
        println!();
        println!("If images were not found you may need to inspect the source site for");
        println!("the real image locations and add them as templates in a config file.");
    }
}
