//! Drives a chunk source through the decoder into a [`TurnMachine`].

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tracing::{info, instrument, warn};

use turnstream_events::{Decoded, ReaderSource, event_stream};
use turnstream_protocol::ChunkSource;

use crate::machine::TurnMachine;
use crate::turn::CloseReason;

/// Run the turn until the source ends or fails, then close it.
///
/// Never errors: a transport failure becomes the turn's terminal annotation.
/// State is applied as each event arrives, so dropping this future midway
/// leaves a valid (open) turn behind.
#[instrument(skip(source, machine), fields(turn_id = %machine.turn_id()))]
pub async fn drive_turn<S>(source: S, machine: &mut TurnMachine) -> CloseReason
where
    S: ChunkSource,
{
    let events = event_stream(source);
    tokio::pin!(events);

    while let Some(item) = events.next().await {
        match item {
            Ok(Decoded::Event(event)) => {
                if let Err(error) = machine.apply(event) {
                    warn!(%error, "turn closed while stream still open");
                    break;
                }
            }
            Ok(Decoded::Dropped { payload, error }) => machine.record_dropped(&payload, &error),
            Err(error) => {
                machine.fail(error);
                break;
            }
        }
    }

    machine.close(CloseReason::EndOfStream);
    machine
        .turn()
        .close_reason()
        .cloned()
        .unwrap_or(CloseReason::EndOfStream)
}

/// Like [`drive_turn`], but stops early and closes as `cancelled` once
/// `cancel` resolves.
pub async fn drive_turn_until<S, C>(source: S, machine: &mut TurnMachine, cancel: C) -> CloseReason
where
    S: ChunkSource,
    C: Future<Output = ()>,
{
    let finished = tokio::select! {
        reason = drive_turn(source, &mut *machine) => Some(reason),
        () = cancel => None,
    };

    match finished {
        Some(reason) => reason,
        None => {
            info!(turn_id = %machine.turn_id(), "turn cancelled");
            machine.close(CloseReason::Cancelled);
            machine
                .turn()
                .close_reason()
                .cloned()
                .unwrap_or(CloseReason::Cancelled)
        }
    }
}

/// Replay a captured event stream from disk into `machine`.
pub async fn replay_file(path: impl AsRef<Path>, machine: &mut TurnMachine) -> Result<CloseReason> {
    let path = path.as_ref();
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed opening captured stream {path:?}"))?;
    Ok(drive_turn(ReaderSource::new(file), machine).await)
}
