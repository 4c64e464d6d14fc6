use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::pcm::{resample_linear, AudioContent};

/// Outcome of one input file within a merge.
///
/// Merge deliberately degrades a failed file to an empty contribution
/// instead of aborting the whole concatenation; this report is the
/// telemetry that keeps that policy from masking errors.
#[derive(Debug)]
pub enum MergeFileStatus {
    Merged {
        samples: usize,
        resampled_from: Option<u32>,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug)]
pub struct MergeReport {
    pub files: Vec<(PathBuf, MergeFileStatus)>,
    /// Sample rate the output was encoded at.
    pub master_rate: u32,
}

impl MergeReport {
    pub fn skipped_count(&self) -> usize {
        self.files
            .iter()
            .filter(|(_, status)| matches!(status, MergeFileStatus::Skipped { .. }))
            .count()
    }
}

/// Concatenate input files, in order, into one AAC-LC container.
///
/// The first successfully decoded file's sample rate becomes the master
/// rate; later files at other rates are resampled to it. Progress covers
/// decoding in `[0, 0.5)` and the final encode in `[0.5, 1.0]`.
pub fn merge_to_m4a(
    inputs: &[PathBuf],
    output: &Path,
    config: &EngineConfig,
    mut progress: impl FnMut(f32),
) -> Result<MergeReport, EngineError> {
    let mut merged: Vec<i16> = Vec::new();
    let mut master_rate: Option<u32> = None;
    let mut files = Vec::with_capacity(inputs.len());

    for (index, path) in inputs.iter().enumerate() {
        match super::decode_to_content(path, config) {
            Ok(AudioContent {
                samples,
                sample_rate,
            }) => {
                let master = *master_rate.get_or_insert(sample_rate);
                let resampled_from = (sample_rate != master).then_some(sample_rate);
                let samples = resample_linear(&samples, sample_rate, master);
                let count = samples.len();
                merged.extend_from_slice(&samples);
                files.push((
                    path.clone(),
                    MergeFileStatus::Merged {
                        samples: count,
                        resampled_from,
                    },
                ));
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "merge input failed to decode; contributing nothing"
                );
                files.push((
                    path.clone(),
                    MergeFileStatus::Skipped {
                        reason: err.to_string(),
                    },
                ));
            }
        }
        progress((index + 1) as f32 / inputs.len().max(1) as f32 * 0.5);
    }

    let master_rate = master_rate.unwrap_or(44_100);
    let content = AudioContent {
        samples: merged,
        sample_rate: master_rate,
    };
    super::encode_pcm_to_m4a(&content, output, config, |value| {
        progress(0.5 + value * 0.5)
    })?;
    tracing::info!(
        output = %output.display(),
        inputs = inputs.len(),
        master_rate,
        samples = content.samples.len(),
        "merged files"
    );
    Ok(MergeReport { files, master_rate })
}
