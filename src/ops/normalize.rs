use std::path::Path;

use crate::config::EngineConfig;
use crate::container::ContainerReader;
use crate::error::EngineError;
use crate::pcm::downmix_to_mono;
use crate::pump::{DecodePump, PcmDecoderDevice};
use crate::waveform::ProgressTicker;

/// Scan a time range for its maximum absolute sample value, normalized to
/// `[0, 1]`. Returns `0.0` for a silent or empty range.
pub fn find_max_peak_in_range(
    path: &Path,
    start_millis: u64,
    end_millis: u64,
    config: &EngineConfig,
    mut progress: impl FnMut(f32),
) -> Result<f32, EngineError> {
    if end_millis <= start_millis {
        progress(1.0);
        return Ok(0.0);
    }
    let mut reader = ContainerReader::open(path)?;
    reader.select_track();
    let declared_rate = reader.metadata().sample_rate;
    if start_millis > 0 {
        reader.seek(start_millis.saturating_mul(1000) as i64)?;
    }
    let params = reader.codec_params().clone();
    let device = PcmDecoderDevice::new(&params)?;
    let mut pump = DecodePump::new(&mut reader, device, config.poll_timeout());

    let range_millis = end_millis.saturating_sub(start_millis);
    let mut needed = range_millis.saturating_mul(declared_rate as u64) / 1000;
    let mut ticker = ProgressTicker::new(needed, config.progress_interval_samples);
    let mut consumed = 0u64;
    let mut peak = 0u16;
    while let Some(block) = pump.next_block()? {
        // The negotiated rate is authoritative for the range bound.
        needed = range_millis.saturating_mul(block.sample_rate as u64) / 1000;
        let mono = downmix_to_mono(&block.samples, block.channel_count);
        for &sample in &mono {
            peak = peak.max(sample.unsigned_abs());
        }
        consumed += mono.len() as u64;
        ticker.advance(mono.len() as u64, &mut progress);
        if consumed >= needed {
            break;
        }
    }
    ticker.finish(&mut progress);
    Ok(f32::from(peak) / 32_768.0)
}

/// Two-pass peak normalization of a time range.
///
/// Pass one streams the selected range to find its peak; pass two decodes
/// the whole file, applies `gain = target_peak / peak` to samples inside
/// the range (clamped to 16-bit), and re-encodes everything. A silent range
/// fails with [`EngineError::SilentRange`] since its gain is undefined.
/// Progress covers pass one in `[0, 0.5)`, the pass-two decode in
/// `[0.5, 0.75)`, and the re-encode in `[0.75, 1.0]`.
pub fn normalize(
    input: &Path,
    output: &Path,
    start_millis: u64,
    end_millis: u64,
    target_peak: f32,
    config: &EngineConfig,
    mut progress: impl FnMut(f32),
) -> Result<(), EngineError> {
    let peak = find_max_peak_in_range(input, start_millis, end_millis, config, |value| {
        progress(value * 0.5)
    })?;
    if peak <= 0.0 {
        return Err(EngineError::SilentRange);
    }
    let gain = target_peak / peak;
    tracing::info!(
        input = %input.display(),
        start_millis,
        end_millis,
        peak,
        gain,
        "normalize pass one complete"
    );

    let mut content = super::transcode::decode_with_progress(input, config, |value| {
        progress(0.5 + value * 0.25)
    })?;
    let rate = content.sample_rate as u64;
    let start_sample = (start_millis.saturating_mul(rate) / 1000) as usize;
    let end_sample = ((end_millis.saturating_mul(rate) / 1000) as usize).min(content.samples.len());
    if start_sample < end_sample {
        for sample in &mut content.samples[start_sample..end_sample] {
            let scaled = (f32::from(*sample) * gain).round();
            *sample = scaled.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
        }
    }
    super::encode_pcm_to_m4a(&content, output, config, |value| {
        progress(0.75 + value * 0.25)
    })
}
