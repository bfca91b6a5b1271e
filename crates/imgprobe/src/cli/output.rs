//! Terminal output helpers shared by the subcommands.
//!
//! Global flags are exported as `IMGPROBE_*` environment variables by
//! `main` so that every module can check them without threading state.

use crate::progress::{ProgressEventKind, ProgressReceiver};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

pub fn is_json() -> bool {
    std::env::var_os("IMGPROBE_JSON").is_some()
}

pub fn is_quiet() -> bool {
    std::env::var_os("IMGPROBE_QUIET").is_some()
}

pub fn is_verbose() -> bool {
    std::env::var_os("IMGPROBE_VERBOSE").is_some()
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to encode JSON output: {e}"),
    }
}

/// Render progress events as human-readable lines until the channel closes.
pub fn spawn_printer(mut rx: ProgressReceiver) -> JoinHandle<()> {
    let verbose = is_verbose();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => print_event(&ev.event, verbose),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &ProgressEventKind, verbose: bool) {
    match event {
        ProgressEventKind::SourceReady { source, entities } => {
            println!("Found {entities} entities ({source})\n");
        }
        ProgressEventKind::EntityStarted { label, .. } => {
            println!("Processing {label}...");
        }
        ProgressEventKind::AttemptFinished {
            url,
            success,
            detail,
            ..
        } => {
            if *success {
                println!("  ✓ Downloaded: {url}");
            } else if verbose {
                println!("  · {detail}: {url}");
            }
        }
        ProgressEventKind::EntityResolved { entity_id, images } => {
            if *images == 0 {
                println!("⚠ No images found for {entity_id}\n");
            } else {
                println!("✓ Found {images} image(s) for {entity_id}\n");
            }
        }
        ProgressEventKind::ManifestWritten { path, entries } => {
            println!("✓ Results saved to {path} ({entries} entries)");
        }
        ProgressEventKind::Warning { message } => {
            println!("⚠ {message}");
        }
    }
}
