// Copyright 2026 imgprobe contributors
// SPDX-License-Identifier: MIT

//! imgprobe library — best-effort vehicle image acquisition.
//!
//! Probes prioritized candidate URLs for each catalog entity, downloads the
//! hits into a local directory and records them in a JSON manifest. Entities
//! come either from a static catalog or from a page rendered in headless
//! Chromium.

pub mod candidates;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod manifest;
pub mod progress;
pub mod renderer;
pub mod resolver;
pub mod source;

pub use config::{PipelineConfig, ResolutionPolicy};
pub use error::{ProbeError, ProbeResult};
pub use fetch::{FetchOutcome, Fetcher};
pub use manifest::Manifest;
pub use resolver::{Resolver, RunReport};
pub use source::{EntitySource, RenderedPageSource, StaticCatalogSource};
