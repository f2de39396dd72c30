//! Concurrent client load generator for the voice relay.
//!
//! Every client connects, waits for `ready`, sends one `audio` message and
//! waits for `turn_complete`.

use anyhow::{Context, Result, bail};
use clap::Parser;
use cubby_audio_utils::{UPSTREAM_INPUT_SAMPLE_RATE, encode_base64, load_pcm16, silence_pcm16};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::{task::JoinSet, time::Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "load_test", version, about = "Opens many concurrent relay clients")]
struct Args {
    /// Number of concurrent clients
    #[arg(long, default_value_t = 100)]
    clients: usize,

    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://localhost:8765")]
    url: String,

    /// WAV file to send; one second of silence is sent when it is missing
    #[arg(long, default_value = "test_audio.wav")]
    audio: PathBuf,

    /// Seconds each client waits for `turn_complete`
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[derive(Debug)]
enum Outcome {
    Completed { audio_chunks: usize },
    TimedOut,
    Ended(String),
}

fn load_audio(path: &PathBuf) -> Vec<u8> {
    match load_pcm16(path, UPSTREAM_INPUT_SAMPLE_RATE) {
        Ok(pcm) => {
            info!(path = %path.display(), bytes = pcm.len(), "Loaded test audio");
            pcm
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Falling back to one second of silence");
            silence_pcm16(UPSTREAM_INPUT_SAMPLE_RATE, 1000)
        }
    }
}

fn message_type(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    value.get("type")?.as_str().map(str::to_owned)
}

async fn run_client(
    id: usize,
    url: String,
    payload: Arc<String>,
    limit: Duration,
) -> Result<Outcome> {
    let (ws, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("client {} failed to connect", id))?;
    let (mut tx, mut rx) = ws.split();
    let deadline = Instant::now() + limit;
    let mut sent = false;
    let mut audio_chunks = 0;

    loop {
        let frame = match tokio::time::timeout_at(deadline, rx.next()).await {
            Err(_) => return Ok(Outcome::TimedOut),
            Ok(None) => return Ok(Outcome::Ended("connection closed".into())),
            Ok(Some(frame)) => frame?,
        };
        let Message::Text(text) = frame else {
            continue;
        };
        match message_type(&text).as_deref() {
            Some("ready") if !sent => {
                tx.send(Message::Text(String::clone(&payload).into())).await?;
                sent = true;
                debug!(client = id, "Audio sent");
            }
            Some("audio") => audio_chunks += 1,
            Some("turn_complete") => {
                // The relay tears the session down once the socket closes.
                let _ = tx.send(Message::Close(None)).await;
                return Ok(Outcome::Completed { audio_chunks });
            }
            Some("timeout") => return Ok(Outcome::Ended("server timeout".into())),
            Some(other) => debug!(client = id, kind = other, "Message received"),
            None => warn!(client = id, "Unparsable message from relay"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let args = Args::parse();
    if args.clients == 0 {
        bail!("--clients must be at least 1");
    }

    let pcm = load_audio(&args.audio);
    let payload = Arc::new(json!({"type": "audio", "data": encode_base64(&pcm)}).to_string());
    let limit = Duration::from_secs(args.timeout);

    info!(clients = args.clients, url = %args.url, "Starting load test");
    let started = Instant::now();
    let mut clients = JoinSet::new();
    for id in 0..args.clients {
        let url = args.url.clone();
        let payload = payload.clone();
        clients.spawn(async move {
            let client_started = Instant::now();
            let outcome = run_client(id, url, payload, limit).await;
            (id, outcome, client_started.elapsed())
        });
    }

    let mut completed = 0usize;
    let mut durations = Duration::ZERO;
    while let Some(joined) = clients.join_next().await {
        let (id, outcome, elapsed) = match joined {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Client task failed");
                continue;
            }
        };
        durations += elapsed;
        match outcome {
            Ok(Outcome::Completed { audio_chunks }) => {
                completed += 1;
                info!(client = id, ?elapsed, audio_chunks, "Turn completed");
            }
            Ok(Outcome::TimedOut) => {
                warn!(client = id, ?elapsed, "Timed out waiting for turn_complete")
            }
            Ok(Outcome::Ended(reason)) => {
                warn!(client = id, ?elapsed, %reason, "Session ended early")
            }
            Err(e) => error!(client = id, ?elapsed, error = %e, "Client failed"),
        }
    }

    let total = started.elapsed();
    let average = durations / args.clients as u32;
    info!(
        clients = args.clients,
        completed,
        ?total,
        ?average,
        "Load test finished"
    );
    Ok(())
}
