//! PCM16 and WAV helpers shared by the operator tools.
//!
//! The relay itself never touches audio samples; frames pass through it as
//! opaque bytes. Everything here is for preparing test audio offline.

use anyhow::{Context, Result, bail};
use base64::Engine;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::path::Path;
use tracing::debug;

/// Rate the upstream expects for inbound audio.
pub const UPSTREAM_INPUT_SAMPLE_RATE: u32 = 16000;
/// Rate of the audio the upstream produces.
pub const UPSTREAM_OUTPUT_SAMPLE_RATE: u32 = 24000;

const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Decoded WAV content, samples normalised to `[-1.0, 1.0]` and interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct WavAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl WavAudio {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Sizes before and after a [`convert_to_mono_pcm16`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub input_sample_rate: u32,
    pub input_channels: u16,
    pub input_bytes: u64,
    pub output_sample_rate: u32,
    pub output_frames: usize,
    pub output_bytes: u64,
}

/// Creates a mono resampler between two rates.
pub fn create_resampler(
    in_sampling_rate: u32,
    out_sampling_rate: u32,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate as f64 / in_sampling_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Resamples a whole mono buffer. The output length is
/// `ceil(len * out / in)`.
pub fn resample(samples: &[f32], in_rate: u32, out_rate: u32) -> Result<Vec<f32>> {
    if in_rate == 0 || out_rate == 0 {
        bail!("sample rates must be positive ({} -> {})", in_rate, out_rate);
    }
    if in_rate == out_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = create_resampler(in_rate, out_rate, RESAMPLER_CHUNK_SIZE)?;
    let expected = (samples.len() as u64 * out_rate as u64).div_ceil(in_rate as u64) as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay);

    let mut chunks = samples.chunks_exact(resampler.input_frames_next());
    for chunk in &mut chunks {
        let processed = resampler.process(&[chunk], None)?;
        output.extend_from_slice(&processed[0]);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let processed = resampler.process_partial(Some(&[tail][..]), None)?;
        output.extend_from_slice(&processed[0]);
    }
    // Flush until the delayed samples have come out.
    while output.len() < expected + delay {
        let processed = resampler.process_partial(None::<&[&[f32]]>, None)?;
        if processed[0].is_empty() {
            break;
        }
        output.extend_from_slice(&processed[0]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    debug!(
        in_rate,
        out_rate,
        in_len = samples.len(),
        out_len = output.len(),
        "Resampled buffer"
    );
    Ok(output)
}

/// Averages interleaved frames down to one channel.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 | 1 => interleaved.to_vec(),
        n => interleaved
            .chunks_exact(n as usize)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect(),
    }
}

pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16.iter().map(|&s| s as f32 / 32768.0).collect()
}

pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Little-endian PCM16 bytes, the wire layout of every audio frame.
pub fn pcm16_to_bytes(pcm16: &[i16]) -> Vec<u8> {
    pcm16.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Inverse of [`pcm16_to_bytes`]; a trailing odd byte is ignored.
pub fn pcm16_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .context("invalid base64 audio payload")
}

/// PCM16 silence of the given length.
pub fn silence_pcm16(sample_rate: u32, millis: u32) -> Vec<u8> {
    let samples = (sample_rate as u64 * millis as u64 / 1000) as usize;
    vec![0u8; samples * 2]
}

pub fn read_wav(path: impl AsRef<Path>) -> Result<WavAudio> {
    let path = path.as_ref();
    let mut reader =
        WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read float samples")?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read integer samples")?
        }
    };

    Ok(WavAudio {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        samples,
    })
}

/// Writes mono PCM16 samples as a WAV file.
pub fn write_pcm16_wav(path: impl AsRef<Path>, samples: &[i16], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Reads `input`, mixes it to mono, resamples to `target_rate` and writes a
/// PCM16 WAV to `output`.
pub fn convert_to_mono_pcm16(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target_rate: u32,
) -> Result<ConversionReport> {
    let input = input.as_ref();
    let output = output.as_ref();

    let audio = read_wav(input)?;
    let mono = downmix_to_mono(&audio.samples, audio.channels);
    let resampled = resample(&mono, audio.sample_rate, target_rate)?;
    let pcm16 = convert_f32_to_i16(&resampled);
    write_pcm16_wav(output, &pcm16, target_rate)?;

    Ok(ConversionReport {
        input_sample_rate: audio.sample_rate,
        input_channels: audio.channels,
        input_bytes: std::fs::metadata(input)?.len(),
        output_sample_rate: target_rate,
        output_frames: pcm16.len(),
        output_bytes: std::fs::metadata(output)?.len(),
    })
}

/// Loads a WAV as raw mono PCM16 bytes at `target_rate`, ready to be sent as
/// an `audio` frame.
pub fn load_pcm16(path: impl AsRef<Path>, target_rate: u32) -> Result<Vec<u8>> {
    let audio = read_wav(path)?;
    let mono = downmix_to_mono(&audio.samples, audio.channels);
    let resampled = resample(&mono, audio.sample_rate, target_rate)?;
    Ok(pcm16_to_bytes(&convert_f32_to_i16(&resampled)))
}
