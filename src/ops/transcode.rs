use std::path::Path;

use crate::config::EngineConfig;
use crate::container::{ContainerReader, ContainerWriter};
use crate::error::EngineError;
use crate::pcm::{downmix_to_mono, AudioContent};
use crate::pump::{AacEncoderDevice, DecodePump, EncodePump, PcmDecoderDevice};
use crate::waveform::ProgressTicker;

/// Decode a whole file into materialized mono PCM.
///
/// Multi-channel blocks are downmixed as they arrive. The sample rate is
/// the decoder's negotiated rate, which may differ from what the container
/// declared.
pub fn decode_to_content(path: &Path, config: &EngineConfig) -> Result<AudioContent, EngineError> {
    decode_with_progress(path, config, |_| {})
}

/// [`decode_to_content`] with throttled progress against the container's
/// sample estimate.
pub(crate) fn decode_with_progress(
    path: &Path,
    config: &EngineConfig,
    mut progress: impl FnMut(f32),
) -> Result<AudioContent, EngineError> {
    let mut reader = ContainerReader::open(path)?;
    reader.select_track();
    let params = reader.codec_params().clone();
    let device = PcmDecoderDevice::new(&params)?;
    let declared_rate = reader.metadata().sample_rate;
    let mut ticker = ProgressTicker::new(
        reader.metadata().total_sample_estimate,
        config.progress_interval_samples,
    );
    let mut pump = DecodePump::new(&mut reader, device, config.poll_timeout());

    let mut samples = Vec::new();
    let mut sample_rate = declared_rate;
    while let Some(block) = pump.next_block()? {
        sample_rate = block.sample_rate;
        let mono = downmix_to_mono(&block.samples, block.channel_count);
        ticker.advance(mono.len() as u64, &mut progress);
        samples.extend_from_slice(&mono);
    }
    ticker.finish(&mut progress);
    tracing::debug!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate,
        "decoded file to memory"
    );
    Ok(AudioContent {
        samples,
        sample_rate,
    })
}

/// Encode mono PCM into a single-track AAC-LC container file.
///
/// On failure the partially written output is removed; the target is never
/// left in a started-but-never-finalized state.
pub fn encode_pcm_to_m4a(
    content: &AudioContent,
    output: &Path,
    config: &EngineConfig,
    progress: impl FnMut(f32),
) -> Result<(), EngineError> {
    let result = encode_inner(content, output, config, progress);
    if result.is_err() {
        super::discard_output(output);
    }
    result
}

fn encode_inner(
    content: &AudioContent,
    output: &Path,
    config: &EngineConfig,
    progress: impl FnMut(f32),
) -> Result<(), EngineError> {
    let sink = super::create_output(output)?;
    let mut writer = ContainerWriter::create(sink)?;
    let device = AacEncoderDevice::new(content.sample_rate, config)?;
    let mut pump = EncodePump::new(device, config);
    pump.run(&content.samples, content.sample_rate, &mut writer, progress)?;
    writer.finalize()?;
    tracing::info!(
        output = %output.display(),
        samples = content.samples.len(),
        sample_rate = content.sample_rate,
        "encoded PCM to container"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::write_wav;
    use hound::{SampleFormat, WavSpec, WavWriter};

    #[test]
    fn wav_decode_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exact.wav");
        let content = AudioContent {
            samples: (0..4410).map(|i| (i % 1000) as i16 - 500).collect(),
            sample_rate: 44_100,
        };
        write_wav(&path, &content).unwrap();

        let decoded = decode_to_content(&path, &EngineConfig::default()).unwrap();
        assert_eq!(decoded, content);
    }

    #[test]
    fn stereo_decode_downmixes_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..1000 {
            writer.write_sample(400i16).unwrap();
            writer.write_sample(200i16).unwrap();
        }
        writer.finalize().unwrap();

        let decoded = decode_to_content(&path, &EngineConfig::default()).unwrap();
        assert_eq!(decoded.samples.len(), 1000);
        assert!(decoded.samples.iter().all(|&s| s == 300));
    }

    #[test]
    fn encode_produces_a_readable_container() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("tone.m4a");
        let content = AudioContent {
            samples: (0..44_100)
                .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
                .collect(),
            sample_rate: 44_100,
        };

        let mut final_progress = 0.0;
        encode_pcm_to_m4a(&content, &output, &EngineConfig::default(), |value| {
            final_progress = value;
        })
        .unwrap();
        assert_eq!(final_progress, 1.0);

        let metadata = crate::ops::fetch_metadata(&output).unwrap();
        assert_eq!(metadata.sample_rate, 44_100);
        assert_eq!(metadata.channel_count, 1);
        // Roughly one second; AAC framing may pad the tail.
        assert!((900..=1200).contains(&metadata.duration_millis));
    }

    #[test]
    fn failed_encode_leaves_no_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("bad.m4a");
        let content = AudioContent {
            samples: vec![0; 100],
            // No AAC sampling-frequency index exists for this rate, so the
            // track handshake fails mid-operation.
            sample_rate: 44_056,
        };

        assert!(encode_pcm_to_m4a(&content, &output, &EngineConfig::default(), |_| {}).is_err());
        assert!(!output.exists());
    }
}
