use std::path::Path;

use crate::container::{AudioMetadata, ContainerReader};
use crate::error::EngineError;

/// Read format metadata without decoding any audio.
pub fn fetch_metadata(path: &Path) -> Result<AudioMetadata, EngineError> {
    let reader = ContainerReader::open(path)?;
    let metadata = reader.metadata();
    tracing::debug!(
        path = %path.display(),
        sample_rate = metadata.sample_rate,
        channels = metadata.channel_count,
        duration_millis = metadata.duration_millis,
        "fetched metadata"
    );
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pcm::{write_wav, AudioContent};

    #[test]
    fn metadata_of_a_wav_fixture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_seconds.wav");
        write_wav(
            &path,
            &AudioContent {
                samples: vec![0; 88_200],
                sample_rate: 44_100,
            },
        )
        .unwrap();

        let metadata = fetch_metadata(&path).unwrap();
        assert_eq!(metadata.sample_rate, 44_100);
        assert_eq!(metadata.channel_count, 1);
        assert_eq!(metadata.duration_millis, 2000);
        assert_eq!(metadata.total_sample_estimate, 88_200);
    }

    #[test]
    fn unreadable_files_propagate_the_container_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.bin");
        std::fs::write(&path, [0u8; 64]).unwrap();
        assert!(matches!(
            fetch_metadata(&path).unwrap_err(),
            EngineError::ContainerUnreadable { .. }
        ));
    }
}
