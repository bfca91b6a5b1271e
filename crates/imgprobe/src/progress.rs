// Copyright 2026 imgprobe contributors
// SPDX-License-Identifier: MIT

//! Progress event types and broadcast channel for run telemetry.
//!
//! The resolver emits `ProgressEvent`s as it works through entities. They
//! flow through a `tokio::sync::broadcast` channel to any subscriber (the
//! CLI printer). When no subscriber exists, events are silently dropped.

use serde::{Deserialize, Serialize};

/// A progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// The source produced its entity list.
    SourceReady { source: String, entities: usize },
    /// Work on one entity started.
    EntityStarted {
        entity_id: String,
        label: String,
        candidates: usize,
    },
    /// A single candidate was attempted.
    AttemptFinished {
        entity_id: String,
        index: usize,
        url: String,
        success: bool,
        detail: String,
    },
    /// An entity is done; `images` may be zero.
    EntityResolved { entity_id: String, images: usize },
    /// The manifest has been persisted.
    ManifestWritten { path: String, entries: usize },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit a progress event, ignoring send errors (no receivers listening).
pub fn emit(tx: &Option<ProgressSender>, seq: &mut u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        *seq += 1;
        let _ = sender.send(ProgressEvent { seq: *seq, event });
    }
}
