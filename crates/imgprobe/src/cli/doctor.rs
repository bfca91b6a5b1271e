//! Environment readiness check.

use crate::cli::output;
use crate::config::PipelineConfig;
use crate::manifest::{resolve_reference, Manifest};
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use serde_json::json;
use std::path::Path;

/// Check browser availability, the output directory, and any existing manifest.
pub async fn run(config: &PipelineConfig) -> Result<()> {
    let chromium = find_chromium(config.chromium_path.as_deref());
    let writable = check_writable(&config.output_dir);
    let manifest = check_manifest(config);

    if output::is_json() {
        output::print_json(&json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium.as_ref().map(|p| p.display().to_string()),
            "output_dir": config.output_dir.display().to_string(),
            "output_writable": writable.is_ok(),
            "manifest": manifest.as_ref().ok().map(|(entries, missing)| json!({
                "entries": entries,
                "missing_files": missing,
            })),
        }));
        return Ok(());
    }

    println!("imgprobe Doctor");
    println!("===============");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. `imgprobe scrape` needs it; set IMGPROBE_CHROMIUM_PATH."
        ),
    }

    match &writable {
        Ok(()) => println!(
            "[OK] Output directory writable: {}",
            config.output_dir.display()
        ),
        Err(e) => println!(
            "[!!] Output directory {} not writable: {e}",
            config.output_dir.display()
        ),
    }

    match &manifest {
        Ok((entries, missing)) if missing.is_empty() => {
            println!("[OK] Manifest has {entries} entries, all files present")
        }
        Ok((entries, missing)) => {
            println!(
                "[!!] Manifest has {entries} entries, {} referenced file(s) missing:",
                missing.len()
            );
            for m in missing {
                println!("       {m}");
            }
        }
        Err(e) => println!("[??] No usable manifest at {}: {e}", config.manifest_path().display()),
    }

    println!();
    if writable.is_ok() {
        println!("Status: READY (fetch)");
    } else {
        println!("Status: NOT READY");
    }
    if chromium.is_none() {
        println!("  Page scraping unavailable until Chromium is installed.");
    }

    Ok(())
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".imgprobe-write-test");
    std::fs::write(&probe, b"ok")?;
    std::fs::remove_file(&probe)
}

/// Entry count and references whose file is missing or empty.
fn check_manifest(config: &PipelineConfig) -> Result<(usize, Vec<String>)> {
    let manifest = Manifest::load(&config.manifest_path())?;
    let prefix = config.public_prefix.as_deref();
    let missing = manifest
        .iter()
        .flat_map(|(_, refs)| refs.iter())
        .filter(|r| {
            let path = resolve_reference(prefix, &config.output_dir, r);
            !std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
        })
        .cloned()
        .collect();
    Ok((manifest.len(), missing))
}
