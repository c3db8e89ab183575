//! Replays a captured SSE transcript through the streaming pipeline.
//!
//! The transcript is cut into fixed-size chunks to mimic a transport that
//! splits the body at arbitrary points. Domain events are printed as JSON
//! lines while they happen; the final segments follow as one JSON array.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sluice_core::config::SluiceConfig;
use sluice_core::types::Segment;
use sluice_stream::StreamPipeline;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sluice-replay", version, about = "Replay an SSE transcript through sluice")]
struct Args {
    /// Transcript file; reads stdin when omitted.
    input: Option<PathBuf>,

    /// Config file (default: $SLUICE_CONFIG, then ~/.sluice/sluice.toml).
    #[arg(long)]
    config: Option<String>,

    /// Characters per simulated chunk.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Pause between chunks, in milliseconds.
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Print only the final segments.
    #[arg(long)]
    segments_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice_replay=info,sluice_stream=warn".into()),
        )
        .init();

    let args = Args::parse();

    // load config: --config > SLUICE_CONFIG env > ~/.sluice/sluice.toml
    let config_path = args.config.clone().or_else(|| std::env::var("SLUICE_CONFIG").ok());
    let config = SluiceConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        SluiceConfig::default()
    });

    let chunk_size = args.chunk_size.unwrap_or(config.replay.chunk_size).max(1);
    let delay = Duration::from_millis(args.delay_ms.unwrap_or(config.replay.delay_ms));
    let print_events = config.replay.print_events && !args.segments_only;

    let transcript = read_input(args.input.as_deref())
        .await
        .context("reading transcript")?;
    let chunks = chunk_str(&transcript, chunk_size);

    let mut pipeline = StreamPipeline::new(&config.stream);
    info!(
        stream_id = %pipeline.id(),
        bytes = transcript.len(),
        chunks = chunks.len(),
        "replaying transcript"
    );

    if print_events {
        pipeline.subscribe(|event| match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, event = event.name(), "event not serializable"),
        });
    }

    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        pipeline.process_chunk(chunk);
    }
    pipeline.finalize();

    info!(
        segments = pipeline.segments().len(),
        transport_done = pipeline.transport_done(),
        dropped = pipeline.dropped_payloads(),
        "replay finished"
    );

    write_segments(&mut std::io::stdout().lock(), pipeline.segments())
        .context("writing segments")?;
    Ok(())
}

async fn read_input(path: Option<&Path>) -> sluice_core::Result<String> {
    let text = match path {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    Ok(text)
}

fn write_segments(out: &mut impl Write, segments: &[Segment]) -> sluice_core::Result<()> {
    serde_json::to_writer_pretty(&mut *out, segments)?;
    writeln!(out)?;
    Ok(())
}

/// Split into pieces of at most `size` chars, never inside a char.
fn chunk_str(text: &str, size: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    for (n, (pos, _)) in text.char_indices().enumerate() {
        if n > 0 && n % size == 0 {
            chunks.push(&text[start..pos]);
            start = pos;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}
