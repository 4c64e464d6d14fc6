//! Public engine operations.
//!
//! Each operation opens its own reader/writer and pump instances and
//! releases them on every exit path; nothing is shared between calls, so
//! operations may run in parallel on separate threads without coordination.
//! Progress callbacks fire on the calling thread.

mod merge;
mod metadata;
mod normalize;
mod transcode;
mod trim;
mod waveform;

pub use merge::{merge_to_m4a, MergeFileStatus, MergeReport};
pub use metadata::fetch_metadata;
pub use normalize::{find_max_peak_in_range, normalize};
pub use transcode::{decode_to_content, encode_pcm_to_m4a};
pub use trim::trim;
pub use waveform::{generate_peak_preview, generate_waveform};

use std::path::Path;

use crate::error::EngineError;

/// Open an output file for writing. The container writer re-reads the file
/// during finalization, so the handle must be readable as well.
pub(crate) fn create_output(path: &Path) -> Result<std::fs::File, EngineError> {
    std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|source| EngineError::io(path, source))
}

/// Remove a partially written output after a failed operation. A failed
/// operation must not leave a started-but-never-finalized container behind.
pub(crate) fn discard_output(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(err) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove partial output");
    }
}
