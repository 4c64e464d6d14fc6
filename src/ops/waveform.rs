use std::path::Path;

use crate::config::EngineConfig;
use crate::container::ContainerReader;
use crate::error::EngineError;
use crate::pcm::downmix_to_mono;
use crate::pump::{DecodePump, PcmDecoderDevice};
use crate::waveform::{PeakReducer, ProgressTicker, RmsReducer};

/// Reduce a file to exactly `target_width` RMS points in `[0, 1]`.
///
/// Streams through the decode pump; memory use is bounded by the output
/// width, not the track length.
pub fn generate_waveform(
    path: &Path,
    target_width: usize,
    config: &EngineConfig,
    mut progress: impl FnMut(f32),
) -> Result<Vec<f32>, EngineError> {
    let mut reader = ContainerReader::open(path)?;
    reader.select_track();
    let total = reader.metadata().total_sample_estimate;
    let params = reader.codec_params().clone();
    let device = PcmDecoderDevice::new(&params)?;
    let mut pump = DecodePump::new(&mut reader, device, config.poll_timeout());

    let mut reducer = RmsReducer::new(total, target_width);
    let mut ticker = ProgressTicker::new(total, config.progress_interval_samples);
    while let Some(block) = pump.next_block()? {
        let mono = downmix_to_mono(&block.samples, block.channel_count);
        reducer.push_block(&mono);
        ticker.advance(mono.len() as u64, &mut progress);
    }
    ticker.finish(&mut progress);
    tracing::debug!(path = %path.display(), width = target_width, "generated waveform");
    Ok(reducer.finish())
}

/// Reduce a file to per-bucket peak magnitudes for an interactive preview.
///
/// Decoding stops early once the reducer hits its safety cap of 1.5x the
/// configured target point count.
pub fn generate_peak_preview(
    path: &Path,
    config: &EngineConfig,
    mut progress: impl FnMut(f32),
) -> Result<Vec<u16>, EngineError> {
    let mut reader = ContainerReader::open(path)?;
    reader.select_track();
    let total = reader.metadata().total_sample_estimate;
    let params = reader.codec_params().clone();
    let device = PcmDecoderDevice::new(&params)?;
    let mut pump = DecodePump::new(&mut reader, device, config.poll_timeout());

    let mut reducer = PeakReducer::new(total, config.preview_target_points);
    let mut ticker = ProgressTicker::new(total, config.progress_interval_samples);
    while let Some(block) = pump.next_block()? {
        let mono = downmix_to_mono(&block.samples, block.channel_count);
        reducer.push_block(&mono);
        ticker.advance(mono.len() as u64, &mut progress);
        if reducer.saturated() {
            tracing::warn!(path = %path.display(), "peak preview hit its point cap");
            break;
        }
    }
    ticker.finish(&mut progress);
    Ok(reducer.finish())
}
