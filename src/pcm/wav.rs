//! Canonical 16-bit PCM WAV persistence.
//!
//! This is the lossless companion path next to the AAC container pipeline:
//! samples written here must read back exactly.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::EngineError;

use super::{downmix_to_mono, resample_linear, AudioContent};

fn read_error(path: &Path, err: hound::Error) -> EngineError {
    match err {
        hound::Error::IoError(source) => EngineError::io(path, source),
        other => EngineError::ContainerUnreadable {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    }
}

fn write_error(path: &Path, err: hound::Error) -> EngineError {
    match err {
        hound::Error::IoError(source) => EngineError::io(path, source),
        other => EngineError::encode(other.to_string()),
    }
}

/// Write mono samples as a canonical 16-bit PCM WAV file.
pub fn write_wav(path: &Path, content: &AudioContent) -> Result<(), EngineError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: content.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).map_err(|err| write_error(path, err))?;
    for &sample in &content.samples {
        writer
            .write_sample(sample)
            .map_err(|err| write_error(path, err))?;
    }
    writer.finalize().map_err(|err| write_error(path, err))
}

/// Read a 16-bit PCM WAV file, downmixing stereo to mono.
pub fn read_wav(path: &Path) -> Result<AudioContent, EngineError> {
    let mut reader = WavReader::open(path).map_err(|err| read_error(path, err))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(EngineError::ContainerUnreadable {
            path: path.to_path_buf(),
            message: format!(
                "expected 16-bit integer PCM, found {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            ),
        });
    }
    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<i16>, _>>()
        .map_err(|err| read_error(path, err))?;
    Ok(AudioContent {
        samples: downmix_to_mono(&samples, spec.channels),
        sample_rate: spec.sample_rate,
    })
}

/// Concatenate WAV files into one, in input order.
///
/// The first file's sample rate is the master rate; later files at other
/// rates are resampled to it.
pub fn merge_wav_files(inputs: &[&Path], output: &Path) -> Result<(), EngineError> {
    let mut merged: Option<AudioContent> = None;
    for path in inputs {
        let content = read_wav(path)?;
        match &mut merged {
            None => merged = Some(content),
            Some(accumulated) => {
                let samples =
                    resample_linear(&content.samples, content.sample_rate, accumulated.sample_rate);
                accumulated.samples.extend_from_slice(&samples);
            }
        }
    }
    let merged = merged.ok_or_else(|| EngineError::ContainerUnreadable {
        path: output.to_path_buf(),
        message: "no input files to merge".to_string(),
    })?;
    write_wav(output, &merged)
}
