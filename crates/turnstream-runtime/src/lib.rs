//! # turnstream-runtime: turn reconciliation
//!
//! Owns one [`Turn`] per [`TurnMachine`], applies decoded events to it in
//! arrival order and publishes a [`TurnUpdate`] after each change.
//! [`drive_turn`] connects a [`turnstream_protocol::ChunkSource`] to a
//! machine and closes the turn when the transport ends.

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod machine;
pub mod turn;

pub use config::TurnConfig;
pub use diagnostics::{Diagnostic, DiagnosticSink, NoopSink, RecordingSink, TracingSink};
pub use driver::{drive_turn, drive_turn_until, replay_file};
pub use machine::{TurnChange, TurnMachine, TurnUpdate};
pub use turn::{Annotation, AnnotationKind, AnswerSummary, CloseReason, Turn, TurnStatus};
