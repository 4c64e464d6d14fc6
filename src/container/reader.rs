use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::codecs::{CODEC_TYPE_AAC, CODEC_TYPE_NULL, CodecParameters};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use super::{AudioCodec, BufferFlags, TrackFormat};
use crate::error::EngineError;

/// Forgiving default when a container omits its sample rate.
const DEFAULT_SAMPLE_RATE: u32 = 44_100;
/// Forgiving default when a container omits its channel count.
const DEFAULT_CHANNEL_COUNT: u16 = 1;

/// Format metadata derived once per reader open.
///
/// Sample rate and channel count fall back to 44100 Hz / mono when the
/// container omits them; this keeps malformed-but-playable files usable and
/// is deliberate, not an error-masking bug. Duration is zero when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioMetadata {
    pub sample_rate: u32,
    pub channel_count: u16,
    pub duration_millis: u64,
    /// Derived as duration x sample rate; zero when the duration is unknown.
    pub total_sample_estimate: u64,
}

impl AudioMetadata {
    /// Duration in microseconds.
    pub fn duration_micros(&self) -> i64 {
        (self.duration_millis as i64).saturating_mul(1000)
    }
}

/// Result of pulling the next compressed access-unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A unit of `size` bytes was copied into the caller's buffer.
    Unit { size: usize },
    /// No more units; the caller should submit an end-of-stream marker.
    EndOfStream,
}

struct AccessUnit {
    payload: Box<[u8]>,
    pts_micros: i64,
    flags: BufferFlags,
}

/// Pull-based access-unit reader over one audio track of a container.
///
/// Holds one open file handle and one demuxer cursor; both are released on
/// drop, on every exit path.
pub struct ContainerReader {
    path: PathBuf,
    format: Box<dyn FormatReader>,
    track_id: u32,
    codec_params: CodecParameters,
    time_base: Option<TimeBase>,
    metadata: AudioMetadata,
    selected: bool,
    pending: Option<AccessUnit>,
    end_of_stream: bool,
}

impl ContainerReader {
    /// Open a container and locate its first audio track.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|source| EngineError::io(path, source))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|err| EngineError::ContainerUnreadable {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|track| track.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| EngineError::NoAudioTrack {
                path: path.to_path_buf(),
            })?;
        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let time_base = codec_params.time_base;
        let metadata = derive_metadata(&codec_params);

        Ok(Self {
            path: path.to_path_buf(),
            format,
            track_id,
            codec_params,
            time_base,
            metadata,
            selected: false,
            pending: None,
            end_of_stream: false,
        })
    }

    /// Metadata derived at open time from the container's own declaration.
    ///
    /// A decoder may negotiate a different output format; that negotiated
    /// format is authoritative once known (see the decode pump).
    pub fn metadata(&self) -> AudioMetadata {
        self.metadata
    }

    /// Mark the audio track as the read target. Must precede any
    /// [`Self::read_next_access_unit`] call.
    pub fn select_track(&mut self) {
        self.selected = true;
    }

    /// Seek to the nearest sync point at or before `target_micros`.
    ///
    /// Returns the actual position in microseconds, which callers must
    /// tolerate drifting below the target.
    pub fn seek(&mut self, target_micros: i64) -> Result<i64, EngineError> {
        let target = Time::from(target_micros.max(0) as f64 / 1_000_000.0);
        let seeked = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time: target,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|err| EngineError::ContainerUnreadable {
                path: self.path.clone(),
                message: format!("seek failed: {err}"),
            })?;
        self.pending = None;
        self.end_of_stream = false;
        Ok(self.ticks_to_micros(seeked.actual_ts))
    }

    /// Copy the next access-unit into `buf` and return its size, or signal
    /// end of stream. The unit stays current until [`Self::advance`].
    pub fn read_next_access_unit(&mut self, buf: &mut Vec<u8>) -> Result<ReadOutcome, EngineError> {
        if !self.selected {
            return Err(EngineError::decode("access-unit read before select_track"));
        }
        if self.pending.is_none() {
            if self.end_of_stream {
                return Ok(ReadOutcome::EndOfStream);
            }
            match self.next_unit_for_track()? {
                Some(unit) => self.pending = Some(unit),
                None => {
                    self.end_of_stream = true;
                    return Ok(ReadOutcome::EndOfStream);
                }
            }
        }
        let Some(unit) = self.pending.as_ref() else {
            return Ok(ReadOutcome::EndOfStream);
        };
        buf.clear();
        buf.extend_from_slice(&unit.payload);
        Ok(ReadOutcome::Unit {
            size: unit.payload.len(),
        })
    }

    /// Presentation timestamp of the current unit, in microseconds.
    pub fn current_timestamp_micros(&self) -> i64 {
        self.pending.as_ref().map(|unit| unit.pts_micros).unwrap_or(0)
    }

    /// Flags of the current unit.
    pub fn current_flags(&self) -> BufferFlags {
        self.pending
            .as_ref()
            .map(|unit| unit.flags)
            .unwrap_or_default()
    }

    /// Move past the current unit.
    pub fn advance(&mut self) {
        self.pending = None;
    }

    /// Track format for stream-copy remuxing, using the container's own
    /// declared parameters. Fails for codecs the writer cannot carry.
    pub fn track_format(&self, bit_rate: u32) -> Result<TrackFormat, EngineError> {
        if self.codec_params.codec != CODEC_TYPE_AAC {
            return Err(EngineError::UnsupportedCodec {
                name: format!("{:?}", self.codec_params.codec),
            });
        }
        Ok(TrackFormat {
            codec: AudioCodec::Aac,
            sample_rate: self.metadata.sample_rate,
            channel_count: self.metadata.channel_count,
            bit_rate,
        })
    }

    pub(crate) fn codec_params(&self) -> &CodecParameters {
        &self.codec_params
    }

    fn next_unit_for_track(&mut self) -> Result<Option<AccessUnit>, EngineError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                // Symphonia signals end of stream through an I/O error.
                Err(SymphoniaError::IoError(_)) => return Ok(None),
                Err(err) => {
                    return Err(EngineError::ContainerUnreadable {
                        path: self.path.clone(),
                        message: format!("packet read failed: {err}"),
                    });
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let pts_micros = self.ticks_to_micros(packet.ts());
            return Ok(Some(AccessUnit {
                payload: packet.buf().to_vec().into_boxed_slice(),
                pts_micros,
                flags: BufferFlags::sync_point(),
            }));
        }
    }

    fn ticks_to_micros(&self, ticks: u64) -> i64 {
        match self.time_base {
            Some(time_base) => {
                let time = time_base.calc_time(ticks);
                (time.seconds as i64).saturating_mul(1_000_000)
                    + (time.frac * 1_000_000.0) as i64
            }
            None => 0,
        }
    }
}

fn derive_metadata(codec_params: &CodecParameters) -> AudioMetadata {
    let sample_rate = codec_params.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE).max(1);
    let channel_count = codec_params
        .channels
        .map(|channels| channels.count() as u16)
        .unwrap_or(DEFAULT_CHANNEL_COUNT)
        .max(1);
    let duration_millis = codec_params
        .n_frames
        .map(|frames| frames.saturating_mul(1000) / sample_rate as u64)
        .unwrap_or(0);
    let total_sample_estimate = duration_millis.saturating_mul(sample_rate as u64) / 1000;
    AudioMetadata {
        sample_rate,
        channel_count,
        duration_millis,
        total_sample_estimate,
    }
}
