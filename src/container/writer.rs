use std::io::{Read, Seek, SeekFrom, Write};

use bytes::Bytes;
use mp4::{
    AacConfig, AudioObjectType, ChannelConfig, MediaConfig, Mp4Config, Mp4Sample, Mp4Writer,
    SampleFreqIndex, TrackConfig, TrackType,
};

use super::BufferFlags;
use crate::error::EngineError;

/// Samples per AAC-LC frame; used when a unit's duration cannot be inferred
/// from the following unit's timestamp.
const DEFAULT_FRAME_TICKS: u64 = 1024;

/// Codecs the writer can carry. AAC-LC is the one lossy persistence codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
}

/// Negotiated format of the single output track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFormat {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bit_rate: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Configuring,
    Configured,
    Started,
    Finalized,
}

struct PendingUnit {
    payload: Bytes,
    start_ticks: u64,
    is_sync: bool,
}

/// Single-track ISO-BMFF writer accepting access-units in non-decreasing
/// timestamp order.
///
/// Protocol: `add_track` exactly once, then `start` exactly once, then
/// writes, then `finalize`. Violations surface as
/// [`EngineError::WriterNotStarted`], [`EngineError::WriterClosed`] or
/// [`EngineError::WriterProtocol`].
///
/// The sink must also be readable: finalization rewrites the sample
/// description in place (see `repair_sample_description`).
pub struct ContainerWriter<W: Write + Read + Seek> {
    inner: Option<Mp4Writer<W>>,
    state: WriterState,
    track_id: u32,
    timescale: u32,
    pending: Option<PendingUnit>,
}

impl<W: Write + Read + Seek> ContainerWriter<W> {
    /// Open an output container over any seekable sink.
    pub fn create(sink: W) -> Result<Self, EngineError> {
        let config = Mp4Config {
            major_brand: str::parse("isom").unwrap(),
            minor_version: 512,
            compatible_brands: vec![
                str::parse("isom").unwrap(),
                str::parse("iso2").unwrap(),
                str::parse("mp41").unwrap(),
            ],
            timescale: 1000,
        };
        let inner = Mp4Writer::write_start(sink, &config)
            .map_err(|err| EngineError::encode(format!("container open failed: {err}")))?;
        Ok(Self {
            inner: Some(inner),
            state: WriterState::Configuring,
            track_id: 1,
            timescale: 0,
            pending: None,
        })
    }

    /// Configure the single audio track. May be called exactly once.
    pub fn add_track(&mut self, format: &TrackFormat) -> Result<(), EngineError> {
        match self.state {
            WriterState::Configuring => {}
            WriterState::Finalized => return Err(EngineError::WriterClosed),
            _ => {
                return Err(EngineError::WriterProtocol {
                    message: "add_track called twice".to_string(),
                });
            }
        }
        let AudioCodec::Aac = format.codec;
        let track = TrackConfig {
            track_type: TrackType::Audio,
            timescale: format.sample_rate,
            language: "und".to_string(),
            media_conf: MediaConfig::AacConfig(AacConfig {
                bitrate: format.bit_rate,
                profile: AudioObjectType::AacLowComplexity,
                freq_index: freq_index_for(format.sample_rate)?,
                chan_conf: channel_config_for(format.channel_count)?,
            }),
        };
        self.writer_mut()?
            .add_track(&track)
            .map_err(|err| EngineError::encode(format!("add_track failed: {err}")))?;
        self.timescale = format.sample_rate.max(1);
        self.state = WriterState::Configured;
        Ok(())
    }

    /// Start the container. Requires a configured track.
    pub fn start(&mut self) -> Result<(), EngineError> {
        match self.state {
            WriterState::Configured => {
                self.state = WriterState::Started;
                Ok(())
            }
            WriterState::Finalized => Err(EngineError::WriterClosed),
            WriterState::Started => Err(EngineError::WriterProtocol {
                message: "start called twice".to_string(),
            }),
            WriterState::Configuring => Err(EngineError::WriterProtocol {
                message: "start called before add_track".to_string(),
            }),
        }
    }

    /// Append one access-unit. Timestamps must be non-decreasing.
    pub fn write_access_unit(
        &mut self,
        payload: &[u8],
        pts_micros: i64,
        flags: BufferFlags,
    ) -> Result<(), EngineError> {
        match self.state {
            WriterState::Started => {}
            WriterState::Finalized => return Err(EngineError::WriterClosed),
            _ => return Err(EngineError::WriterNotStarted),
        }
        // Config-only units carry no media payload and are not muxed.
        if flags.codec_config || payload.is_empty() {
            return Ok(());
        }
        let start_ticks = self.micros_to_ticks(pts_micros);
        let next = PendingUnit {
            payload: Bytes::copy_from_slice(payload),
            start_ticks,
            is_sync: flags.sync_point,
        };
        if let Some(previous) = self.pending.take() {
            let duration = next
                .start_ticks
                .saturating_sub(previous.start_ticks)
                .max(1);
            self.write_pending(previous, duration)?;
        }
        self.pending = Some(next);
        Ok(())
    }

    /// Flush the trailer and repair the sample description. Any later write
    /// fails with `WriterClosed`.
    pub fn finalize(&mut self) -> Result<(), EngineError> {
        match self.state {
            WriterState::Started | WriterState::Configured => {}
            WriterState::Finalized => return Err(EngineError::WriterClosed),
            WriterState::Configuring => {
                return Err(EngineError::WriterProtocol {
                    message: "finalize called before add_track".to_string(),
                });
            }
        }
        if let Some(previous) = self.pending.take() {
            self.write_pending(previous, DEFAULT_FRAME_TICKS)?;
        }
        let mut inner = self.inner.take().ok_or(EngineError::WriterClosed)?;
        inner
            .write_end()
            .map_err(|err| EngineError::encode(format!("finalize failed: {err}")))?;
        let mut sink = inner.into_writer();
        repair_sample_description(&mut sink)?;
        self.state = WriterState::Finalized;
        Ok(())
    }

    fn writer_mut(&mut self) -> Result<&mut Mp4Writer<W>, EngineError> {
        self.inner.as_mut().ok_or(EngineError::WriterClosed)
    }

    fn write_pending(&mut self, unit: PendingUnit, duration: u64) -> Result<(), EngineError> {
        let sample = Mp4Sample {
            start_time: unit.start_ticks,
            duration: duration.min(u32::MAX as u64) as u32,
            rendering_offset: 0,
            is_sync: unit.is_sync,
            bytes: unit.payload,
        };
        let track_id = self.track_id;
        self.writer_mut()?
            .write_sample(track_id, &sample)
            .map_err(|err| EngineError::encode(format!("write_sample failed: {err}")))
    }

    fn micros_to_ticks(&self, pts_micros: i64) -> u64 {
        let micros = pts_micros.max(0) as u128;
        (micros * self.timescale.max(1) as u128 / 1_000_000) as u64
    }
}

/// Rewrite the SLConfigDescriptor inside the esds box to the MP4 predefined
/// layout (value 2). The muxer emits a custom SL config that strict demuxers
/// reject, so without this rewrite the finished file cannot be reopened.
fn repair_sample_description<W: Write + Read + Seek>(sink: &mut W) -> Result<(), EngineError> {
    let repair_failed = |err: std::io::Error| {
        EngineError::encode(format!("sample description repair failed: {err}"))
    };
    sink.seek(SeekFrom::Start(0)).map_err(repair_failed)?;
    let mut bytes = Vec::new();
    sink.read_to_end(&mut bytes).map_err(repair_failed)?;
    if patch_sl_config(&mut bytes) {
        sink.seek(SeekFrom::Start(0)).map_err(repair_failed)?;
        sink.write_all(&bytes).map_err(repair_failed)?;
    }
    sink.flush().map_err(repair_failed)?;
    Ok(())
}

fn patch_sl_config(bytes: &mut [u8]) -> bool {
    let mut patched = false;
    let mut i = 4usize;
    while i + 4 <= bytes.len() {
        if &bytes[i..i + 4] == b"esds" {
            let size =
                u32::from_be_bytes([bytes[i - 4], bytes[i - 3], bytes[i - 2], bytes[i - 1]])
                    as usize;
            let start = i + 4;
            let end = (i - 4).saturating_add(size).min(bytes.len());
            if start < end && patch_esds_payload(&mut bytes[start..end]) {
                patched = true;
            }
        }
        i += 1;
    }
    patched
}

// The esds payload is the full-box version/flags followed by the descriptor
// chain ES(0x03) { es_id, flags, DecoderConfig(0x04) { .. }, SLConfig(0x06) }.
fn patch_esds_payload(payload: &mut [u8]) -> bool {
    let Some((tag, _, pos)) = read_descriptor(payload, 4) else {
        return false;
    };
    if tag != 0x03 {
        return false;
    }
    let Some((tag, size, pos)) = read_descriptor(payload, pos + 3) else {
        return false;
    };
    if tag != 0x04 {
        return false;
    }
    let Some((tag, _, pos)) = read_descriptor(payload, pos + size) else {
        return false;
    };
    if tag != 0x06 || pos >= payload.len() {
        return false;
    }
    payload[pos] = 2;
    true
}

/// Read a descriptor header: tag byte, then a base-128 size of at most four
/// bytes. Returns (tag, size, payload offset).
fn read_descriptor(bytes: &[u8], mut pos: usize) -> Option<(u8, usize, usize)> {
    let tag = *bytes.get(pos)?;
    pos += 1;
    let mut size = 0usize;
    for _ in 0..4 {
        let byte = *bytes.get(pos)?;
        pos += 1;
        size = (size << 7) | (byte & 0x7F) as usize;
        if byte & 0x80 == 0 {
            return Some((tag, size, pos));
        }
    }
    None
}

fn freq_index_for(sample_rate: u32) -> Result<SampleFreqIndex, EngineError> {
    let index = match sample_rate {
        96_000 => SampleFreqIndex::Freq96000,
        88_200 => SampleFreqIndex::Freq88200,
        64_000 => SampleFreqIndex::Freq64000,
        48_000 => SampleFreqIndex::Freq48000,
        44_100 => SampleFreqIndex::Freq44100,
        32_000 => SampleFreqIndex::Freq32000,
        24_000 => SampleFreqIndex::Freq24000,
        22_050 => SampleFreqIndex::Freq22050,
        16_000 => SampleFreqIndex::Freq16000,
        12_000 => SampleFreqIndex::Freq12000,
        11_025 => SampleFreqIndex::Freq11025,
        8_000 => SampleFreqIndex::Freq8000,
        other => {
            return Err(EngineError::encode(format!(
                "sample rate {other} is not representable in an AAC track"
            )));
        }
    };
    Ok(index)
}

fn channel_config_for(channel_count: u16) -> Result<ChannelConfig, EngineError> {
    match channel_count {
        1 => Ok(ChannelConfig::Mono),
        2 => Ok(ChannelConfig::Stereo),
        other => Err(EngineError::encode(format!(
            "unsupported channel count {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerReader;
    use std::io::Cursor;

    fn mono_format() -> TrackFormat {
        TrackFormat {
            codec: AudioCodec::Aac,
            sample_rate: 44_100,
            channel_count: 1,
            bit_rate: 128_000,
        }
    }

    fn started_writer() -> ContainerWriter<Cursor<Vec<u8>>> {
        let mut writer = ContainerWriter::create(Cursor::new(Vec::new())).unwrap();
        writer.add_track(&mono_format()).unwrap();
        writer.start().unwrap();
        writer
    }

    #[test]
    fn write_before_start_fails() {
        let mut writer = ContainerWriter::create(Cursor::new(Vec::new())).unwrap();
        writer.add_track(&mono_format()).unwrap();
        let err = writer
            .write_access_unit(&[1, 2, 3], 0, BufferFlags::sync_point())
            .unwrap_err();
        assert!(matches!(err, EngineError::WriterNotStarted));
    }

    #[test]
    fn add_track_twice_is_a_protocol_violation() {
        let mut writer = ContainerWriter::create(Cursor::new(Vec::new())).unwrap();
        writer.add_track(&mono_format()).unwrap();
        let err = writer.add_track(&mono_format()).unwrap_err();
        assert!(matches!(err, EngineError::WriterProtocol { .. }));
    }

    #[test]
    fn write_after_finalize_fails_closed() {
        let mut writer = started_writer();
        writer
            .write_access_unit(&[1, 2, 3], 0, BufferFlags::sync_point())
            .unwrap();
        writer.finalize().unwrap();
        let err = writer
            .write_access_unit(&[4, 5, 6], 23_000, BufferFlags::sync_point())
            .unwrap_err();
        assert!(matches!(err, EngineError::WriterClosed));
    }

    #[test]
    fn config_only_units_are_suppressed() {
        let mut writer = started_writer();
        let config_flags = BufferFlags {
            codec_config: true,
            ..BufferFlags::default()
        };
        writer.write_access_unit(&[], 0, config_flags).unwrap();
        writer
            .write_access_unit(&[9, 9], 0, BufferFlags::sync_point())
            .unwrap();
        writer.finalize().unwrap();
    }

    #[test]
    fn unsupported_sample_rate_is_rejected() {
        let mut writer = ContainerWriter::create(Cursor::new(Vec::new())).unwrap();
        let format = TrackFormat {
            sample_rate: 44_056,
            ..mono_format()
        };
        assert!(writer.add_track(&format).is_err());
    }

    #[test]
    fn finalized_container_reopens_with_its_track_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("written.m4a");
        let sink = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .unwrap();
        let mut writer = ContainerWriter::create(sink).unwrap();
        writer.add_track(&mono_format()).unwrap();
        writer.start().unwrap();
        writer
            .write_access_unit(&[1, 2, 3], 0, BufferFlags::sync_point())
            .unwrap();
        writer
            .write_access_unit(&[4, 5, 6], 23_219, BufferFlags::sync_point())
            .unwrap();
        writer.finalize().unwrap();

        let reader = ContainerReader::open(&path).unwrap();
        let metadata = reader.metadata();
        assert_eq!(metadata.sample_rate, 44_100);
        assert_eq!(metadata.channel_count, 1);
    }

    fn esds_box(sl_descriptor: &[u8]) -> Vec<u8> {
        // ES content: es_id(2) + flags(1) + DecoderConfig + SLConfig
        let decoder_config = [0x04u8, 0x02, 0x40, 0x15];
        let es_content_len = 3 + decoder_config.len() + sl_descriptor.len();
        let payload_len = 4 + 2 + es_content_len;
        let box_len = 8 + payload_len;
        let mut bytes = Vec::with_capacity(box_len);
        bytes.extend_from_slice(&(box_len as u32).to_be_bytes());
        bytes.extend_from_slice(b"esds");
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&[0x03, es_content_len as u8]);
        bytes.extend_from_slice(&[0, 1, 0]);
        bytes.extend_from_slice(&decoder_config);
        bytes.extend_from_slice(sl_descriptor);
        bytes
    }

    #[test]
    fn sl_config_patch_rewrites_the_predefined_byte() {
        let mut bytes = esds_box(&[0x06, 0x01, 0x00]);
        assert!(patch_sl_config(&mut bytes));
        assert_eq!(bytes.last().copied(), Some(2));
    }

    #[test]
    fn sl_config_patch_handles_extended_descriptor_sizes() {
        let mut bytes = esds_box(&[0x06, 0x80, 0x80, 0x80, 0x01, 0x00]);
        assert!(patch_sl_config(&mut bytes));
        assert_eq!(bytes.last().copied(), Some(2));
    }

    #[test]
    fn sl_config_patch_ignores_unrelated_bytes() {
        let mut bytes = vec![0u8; 64];
        assert!(!patch_sl_config(&mut bytes));
    }
}
