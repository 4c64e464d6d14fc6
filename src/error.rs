use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by engine operations.
///
/// Structural failures abort the current operation only; they never affect
/// sibling operations running on other threads. Per-field metadata reads use
/// forgiving defaults instead of surfacing an error here (see
/// [`crate::container::AudioMetadata`]).
#[derive(Debug, Error)]
pub enum EngineError {
    /// The container parsed but no track carried decodable audio.
    #[error("No audio track in {path}")]
    NoAudioTrack { path: PathBuf },
    /// The file could not be parsed as a media container at all.
    #[error("Unreadable container {path}: {message}")]
    ContainerUnreadable { path: PathBuf, message: String },
    /// The decoder reported an unrecoverable error. Output already yielded
    /// to the consumer before the failure is preserved.
    #[error("Decode failed: {message}")]
    DecodeFailed { message: String },
    /// The encoder or muxer reported an unrecoverable error.
    #[error("Encode failed: {message}")]
    EncodeFailed { message: String },
    /// An access-unit was written before the writer was started.
    #[error("Container writer has not been started")]
    WriterNotStarted,
    /// A write method was called after `finalize`.
    #[error("Container writer is already finalized")]
    WriterClosed,
    /// The writer track-setup protocol was violated (double `add_track`,
    /// `start` before a track exists, and similar misuse).
    #[error("Container writer protocol violation: {message}")]
    WriterProtocol { message: String },
    /// Normalize was asked to scale a range whose peak is zero.
    #[error("Selected range is silent; normalize gain is undefined")]
    SilentRange,
    /// The source codec cannot be stream-copied into the output container.
    #[error("Codec {name:?} cannot be stream-copied to the output container")]
    UnsupportedCodec { name: String },
    /// Plain I/O failure with the path it happened on.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub(crate) fn encode(message: impl Into<String>) -> Self {
        Self::EncodeFailed {
            message: message.into(),
        }
    }
}
