//! Converts a WAV file to the mono PCM16 format the relay forwards upstream.

use anyhow::{Context, Result};
use clap::Parser;
use cubby_audio_utils::{UPSTREAM_INPUT_SAMPLE_RATE, convert_to_mono_pcm16};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "convert_audio", version, about = "Convert a WAV file to mono PCM16")]
struct Args {
    /// Source WAV file
    input: PathBuf,

    /// Destination WAV file
    output: PathBuf,

    /// Target sample rate in Hz
    #[arg(long, default_value_t = UPSTREAM_INPUT_SAMPLE_RATE)]
    rate: u32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let args = Args::parse();
    let report = convert_to_mono_pcm16(&args.input, &args.output, args.rate)
        .with_context(|| format!("Failed to convert {}", args.input.display()))?;

    info!(
        input = %args.input.display(),
        sample_rate = report.input_sample_rate,
        channels = report.input_channels,
        bytes = report.input_bytes,
        "Read source audio"
    );
    info!(
        output = %args.output.display(),
        sample_rate = report.output_sample_rate,
        frames = report.output_frames,
        bytes = report.output_bytes,
        "Wrote mono PCM16 audio"
    );
    Ok(())
}
