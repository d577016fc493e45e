//! Debug hooks for protocol anomalies.
//!
//! Anomalies are not turn state: a reinvoked tool or a too-deep tree is
//! still applied normally. They go to an injected [`DiagnosticSink`] so a
//! host can log, count or assert on them.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use turnstream_protocol::{SeqNo, TransportError, TreeKind, UnknownCode};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "diagnostic", rename_all = "snake_case")]
pub enum Diagnostic {
    DroppedPayload {
        sequence: SeqNo,
        error: String,
        bytes: usize,
    },
    UnknownEvent {
        sequence: SeqNo,
        event_type: Option<String>,
        code: UnknownCode,
        detail: Option<String>,
    },
    /// A `tool` arrived while the same name was still executing.
    ToolReinvoked { sequence: SeqNo, name: String },
    /// A `tool_result` arrived with no executing entry to finish.
    OrphanToolResult { sequence: SeqNo, name: String },
    PartialCart {
        sequence: SeqNo,
        accepted: usize,
        rejected: usize,
    },
    TreeTooDeep {
        sequence: SeqNo,
        kind: TreeKind,
        levels: usize,
        limit: usize,
    },
    RejectedAfterClose { event_type: &'static str },
    TransportFailed { sequence: SeqNo, error: TransportError },
}

pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: Diagnostic);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn record(&self, _diagnostic: Diagnostic) {}
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, diagnostic: Diagnostic) {
        match &diagnostic {
            Diagnostic::DroppedPayload {
                sequence,
                error,
                bytes,
            } => warn!(sequence, %error, bytes, "payload dropped"),
            Diagnostic::UnknownEvent {
                sequence,
                event_type,
                code,
                ..
            } => warn!(sequence, event_type = ?event_type, code = code.as_str(), "unknown event"),
            Diagnostic::ToolReinvoked { sequence, name } => {
                debug!(sequence, tool = %name, "tool reinvoked while executing")
            }
            Diagnostic::OrphanToolResult { sequence, name } => {
                debug!(sequence, tool = %name, "tool result without invocation")
            }
            Diagnostic::PartialCart {
                sequence,
                accepted,
                rejected,
            } => warn!(sequence, accepted, rejected, "partial cart"),
            Diagnostic::TreeTooDeep {
                sequence,
                kind,
                levels,
                limit,
            } => debug!(sequence, kind = kind.as_str(), levels, limit, "tree deeper than contract"),
            Diagnostic::RejectedAfterClose { event_type } => {
                debug!(event_type, "event rejected after close")
            }
            Diagnostic::TransportFailed { sequence, error } => {
                warn!(sequence, %error, "transport failed")
            }
        }
    }
}

/// Keeps every diagnostic in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn record(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }
}
