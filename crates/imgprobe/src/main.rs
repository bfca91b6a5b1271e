// Copyright 2026 imgprobe contributors
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use imgprobe::cli;
use imgprobe::config::{PipelineConfig, ResolutionPolicy};

#[derive(Parser)]
#[command(
    name = "imgprobe",
    about = "imgprobe — find and download vehicle photos for the website catalog",
    version,
    after_help = "Run 'imgprobe <command> --help' for details on each command.\nRun 'imgprobe' with no command to fetch images for the built-in catalog."
)]
struct Cli {
    /// JSON config file (also IMGPROBE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe URL templates for every catalog entity (default)
    Fetch {
        /// Stop at the first hit, or keep every hit
        #[arg(long, value_enum)]
        policy: Option<ResolutionPolicy>,
        /// Directory for images and the manifest
        #[arg(long)]
        output: Option<PathBuf>,
        /// Base URL substituted for {base} in templates
        #[arg(long)]
        base_url: Option<String>,
        /// Pause after every fetch attempt, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Redirect hops to follow before giving up
        #[arg(long)]
        max_redirects: Option<u32>,
    },
    /// Render the listing page in headless Chromium and download its images
    Scrape {
        /// Page to render
        #[arg(long)]
        url: Option<String>,
        /// Directory for images and the manifest
        #[arg(long)]
        output: Option<PathBuf>,
        /// Pause after every download attempt, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Wait after page load before reading the DOM, in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,
        /// Page load timeout, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Record name and price with each car's images
        #[arg(long)]
        rich_manifest: bool,
    },
    /// List catalog entities and their candidate URLs without fetching
    Catalog,
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("IMGPROBE_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("IMGPROBE_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("IMGPROBE_VERBOSE", "1");
    }

    let level = if cli.verbose {
        "imgprobe=debug"
    } else if cli.quiet || cli.json {
        "warn"
    } else {
        "imgprobe=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = dispatch(cli).await;

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "imgprobe", &mut std::io::stdout());
        return Ok(());
    }

    let mut config =
        PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        None => cli::fetch_cmd::run(&config, None).await,
        Some(Commands::Fetch {
            policy,
            output,
            base_url,
            delay_ms,
            max_redirects,
        }) => {
            if let Some(dir) = output {
                config.output_dir = dir;
            }
            if let Some(base) = base_url {
                config.base_url = base;
            }
            if let Some(ms) = delay_ms {
                config.request_delay_ms = ms;
            }
            if let Some(n) = max_redirects {
                config.max_redirects = n;
            }
            config.validate()?;
            cli::fetch_cmd::run(&config, policy).await
        }
        Some(Commands::Scrape {
            url,
            output,
            delay_ms,
            settle_ms,
            timeout_ms,
            rich_manifest,
        }) => {
            if let Some(url) = url {
                config.page.url = url;
            }
            if let Some(dir) = output {
                config.output_dir = dir;
            }
            if let Some(ms) = delay_ms {
                config.page.request_delay_ms = ms;
            }
            if let Some(ms) = settle_ms {
                config.page.settle_ms = ms;
            }
            if let Some(ms) = timeout_ms {
                config.page.load_timeout_ms = ms;
            }
            if rich_manifest {
                config.rich_manifest = true;
            }
            cli::scrape_cmd::run(&config).await
        }
        Some(Commands::Catalog) => cli::catalog_cmd::run(&config),
        Some(Commands::Doctor) => cli::doctor::run(&config).await,
        Some(Commands::Completions { .. }) => Ok(()),
    }
}
