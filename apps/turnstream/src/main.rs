use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use turnstream_events::{DEFAULT_CHUNK_SIZE, ReaderSource};
use turnstream_protocol::{CONTRACT_DEPTH, ChunkSource, ConversationId};
use turnstream_runtime::{
    TracingSink, Turn, TurnConfig, TurnMachine, TurnStatus, TurnUpdate, drive_turn_until,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "turnstream")]
#[command(about = "Replay a captured assistant event stream and print the reconciled turn")]
struct Cli {
    /// Captured `data: ` stream; stdin when omitted.
    input: Option<PathBuf>,
    /// User message that opened the turn.
    #[arg(long, default_value = "")]
    prompt: String,
    #[arg(long)]
    conversation: Option<String>,
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    #[arg(long)]
    no_thinking: bool,
    #[arg(long, default_value_t = CONTRACT_DEPTH)]
    depth_limit: usize,
    #[arg(long, value_enum, default_value = "summary")]
    format: OutputFormat,
    #[arg(long, value_enum, default_value = "compact")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = TurnConfig::new()
        .tree_depth_limit(cli.depth_limit)
        .record_thinking(!cli.no_thinking);
    let mut machine = TurnMachine::with_config(cli.prompt.clone(), config)
        .with_sink(Arc::new(TracingSink));
    if let Some(conversation) = &cli.conversation {
        machine = machine.in_conversation(ConversationId::from_string(conversation.as_str()));
    }
    info!(turn_id = %machine.turn_id(), input = ?cli.input, "replaying stream");

    let update_task = tokio::spawn(log_updates(machine.subscribe()));

    let source: Box<dyn ChunkSource> = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed opening captured stream {path:?}"))?;
            Box::new(ReaderSource::with_chunk_size(file, cli.chunk_size))
        }
        None => Box::new(ReaderSource::with_chunk_size(tokio::io::stdin(), cli.chunk_size)),
    };

    let interrupted = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "failed listening for interrupt");
            std::future::pending::<()>().await;
        }
    };
    let reason = drive_turn_until(source, &mut machine, interrupted).await;
    info!(reason = reason.as_str(), "replay finished");

    let turn = machine.into_turn();
    match update_task.await {
        Ok(logged) => debug!(logged, "update task drained"),
        Err(error) => warn!(%error, "update task stopped"),
    }

    let rendered = match cli.format {
        OutputFormat::Summary => render_summary(&turn)?,
        OutputFormat::Json => {
            serde_json::to_string_pretty(&turn).context("failed serializing turn")?
        }
    };
    println!("{rendered}");
    Ok(())
}

/// Logs every update until the machine is dropped. Falling behind skips
/// the missed updates instead of ending the task.
async fn log_updates(mut updates: broadcast::Receiver<TurnUpdate>) -> usize {
    let mut logged = 0;
    loop {
        match updates.recv().await {
            Ok(update) => {
                let rendered = serde_json::to_string(&update).unwrap_or_else(|_| "{}".to_owned());
                debug!(update = %rendered, "turn.update");
                logged += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "update logger lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn render_summary(turn: &Turn) -> Result<String> {
    let mut out = String::new();
    let state = match &turn.status {
        TurnStatus::Open => "open",
        TurnStatus::Closed { reason } => reason.as_str(),
    };
    let completeness = if turn.is_complete() { "complete" } else { "partial" };
    writeln!(out, "turn {} [{state}, {completeness}]", turn.id)?;
    if !turn.prompt.is_empty() {
        writeln!(out, "prompt: {}", turn.prompt)?;
    }
    writeln!(out, "text: {}", turn.display_text())?;
    if !turn.thinking.is_empty() {
        writeln!(out, "thinking: {} chars", turn.thinking.chars().count())?;
    }

    for call in turn.tools.values() {
        write!(out, "tool {} [{}]", call.name, call.status.as_str())?;
        if let Some(reason) = &call.reason {
            write!(out, " {reason}")?;
        }
        writeln!(out)?;
    }

    for tree in turn.trees.iter() {
        let selected: Vec<String> = tree
            .selected_paths()
            .iter()
            .map(|path| path.join(" > "))
            .collect();
        writeln!(
            out,
            "{}: {} top-level nodes, selected: [{}]",
            tree.kind.event_type(),
            tree.top_level().len(),
            selected.join(", ")
        )?;
    }

    if let Some(form) = &turn.form {
        for (label, content) in form.form_data() {
            writeln!(out, "form {label}: {content}")?;
        }
    }

    if let Some(cart) = &turn.cart {
        writeln!(
            out,
            "cart: {} items, total {:.2}",
            cart.items.len(),
            cart.total()
        )?;
        for item in &cart.items {
            writeln!(
                out,
                "  {} x{} @ {:.2} ({})",
                item.main.name,
                item.main.quantity(),
                item.main.price,
                item.main.retailer
            )?;
        }
    }

    if let Some(items) = &turn.items {
        let names: Vec<&str> = items.entries.iter().map(|entry| entry.item.as_str()).collect();
        writeln!(out, "shopping list: {}", names.join(", "))?;
    }

    if let Some(offers) = &turn.offers {
        for offer in &offers.offers {
            writeln!(
                out,
                "offer {}: {}",
                offer.retailer,
                offer.status.as_deref().unwrap_or("pending")
            )?;
        }
    }

    for annotation in &turn.annotations {
        write!(out, "! {:?} #{}: {}", annotation.kind, annotation.sequence, annotation.message)?;
        if let Some(code) = &annotation.code {
            write!(out, " ({code})")?;
        }
        writeln!(out)?;
    }
    if turn.dropped_payloads > 0 {
        writeln!(out, "dropped payloads: {}", turn.dropped_payloads)?;
    }

    Ok(out.trim_end().to_owned())
}
