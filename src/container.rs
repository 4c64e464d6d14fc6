//! Access-unit level container I/O.
//!
//! The reader pulls compressed access-units (with presentation timestamps)
//! out of any container symphonia can demux; the writer muxes exactly one
//! negotiated audio track into an ISO base media file.

mod reader;
mod writer;

pub use reader::{AudioMetadata, ContainerReader, ReadOutcome};
pub use writer::{AudioCodec, ContainerWriter, TrackFormat};

/// Flags attached to a compressed access-unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferFlags {
    /// The stream ends with this unit; the payload may be empty.
    pub end_of_stream: bool,
    /// Codec configuration data rather than media payload.
    pub codec_config: bool,
    /// Decodable without prior context (seek target).
    pub sync_point: bool,
}

impl BufferFlags {
    /// Flags for an end-of-stream marker unit.
    pub fn end_of_stream() -> Self {
        Self {
            end_of_stream: true,
            ..Self::default()
        }
    }

    /// Flags for a regular sync-point unit (every audio frame is one).
    pub fn sync_point() -> Self {
        Self {
            sync_point: true,
            ..Self::default()
        }
    }
}
