use std::collections::VecDeque;
use std::time::Duration;

use fdk_aac::enc::{AudioObjectType, BitRate, ChannelMode, Encoder, EncoderParams, Transport};

use crate::config::EngineConfig;
use crate::container::BufferFlags;
use crate::error::EngineError;

use super::device::{CodecDevice, InputSlot, NegotiatedFormat, OutputPoll, OutputSlot};

/// Samples per AAC-LC frame for a mono stream.
const FRAME_LEN: usize = 1024;

/// Upper bound on one compressed AAC-LC frame.
const MAX_UNIT_BYTES: usize = 1536;

const OUTPUT_QUEUE_DEPTH: usize = 4;

#[derive(Debug)]
struct QueuedUnit {
    payload: Vec<u8>,
    pts_micros: i64,
    flags: BufferFlags,
}

/// Adapts the Fraunhofer AAC encoder to the slot protocol.
///
/// Input PCM is staged until a whole 1024-sample frame is available; the
/// final partial frame is zero-padded at end-of-stream. Output timestamps
/// are derived from the count of emitted frames, not from the submitted
/// input timestamps.
#[derive(Debug)]
pub struct AacEncoderDevice {
    encoder: Encoder,
    sample_rate: u32,
    staged: Vec<i16>,
    queue: VecDeque<QueuedUnit>,
    format_pending: bool,
    units_emitted: u64,
    eos_queued: bool,
}

impl AacEncoderDevice {
    /// Create a mono AAC-LC encoder producing raw access-units.
    pub fn new(sample_rate: u32, config: &EngineConfig) -> Result<Self, EngineError> {
        let encoder = Encoder::new(EncoderParams {
            bit_rate: BitRate::Cbr(config.bit_rate),
            sample_rate,
            transport: Transport::Raw,
            channels: ChannelMode::Mono,
            audio_object_type: AudioObjectType::Mpeg4LowComplexity,
        })
        .map_err(|err| EngineError::encode(format!("encoder init failed: {err:?}")))?;
        Ok(Self {
            encoder,
            sample_rate: sample_rate.max(1),
            staged: Vec::with_capacity(FRAME_LEN * 2),
            queue: VecDeque::new(),
            format_pending: true,
            units_emitted: 0,
            eos_queued: false,
        })
    }

    fn encode_staged_frame(&mut self) -> Result<(), EngineError> {
        let frame: Vec<i16> = self.staged.drain(..FRAME_LEN).collect();
        self.encode_frame(&frame)
    }

    fn encode_frame(&mut self, frame: &[i16]) -> Result<(), EngineError> {
        let mut out = [0u8; MAX_UNIT_BYTES];
        let mut consumed = 0usize;
        while consumed < frame.len() {
            let info = self
                .encoder
                .encode(&frame[consumed..], &mut out)
                .map_err(|err| EngineError::encode(format!("encode failed: {err:?}")))?;
            if info.input_consumed == 0 && info.output_size == 0 {
                break;
            }
            consumed += info.input_consumed;
            if info.output_size > 0 {
                let pts_micros = self.units_emitted as i64 * FRAME_LEN as i64 * 1_000_000
                    / self.sample_rate as i64;
                self.units_emitted += 1;
                self.queue.push_back(QueuedUnit {
                    payload: out[..info.output_size].to_vec(),
                    pts_micros,
                    flags: BufferFlags::sync_point(),
                });
            }
        }
        Ok(())
    }
}

impl CodecDevice for AacEncoderDevice {
    fn try_get_input_slot(&mut self) -> Result<Option<InputSlot>, EngineError> {
        if self.eos_queued || self.queue.len() >= OUTPUT_QUEUE_DEPTH {
            return Ok(None);
        }
        Ok(Some(InputSlot(0)))
    }

    fn submit(
        &mut self,
        _slot: InputSlot,
        payload: &[u8],
        _pts_micros: i64,
        flags: BufferFlags,
    ) -> Result<(), EngineError> {
        if flags.end_of_stream {
            if !self.staged.is_empty() {
                // Zero-pad the trailing partial frame to a full frame.
                let mut frame = std::mem::take(&mut self.staged);
                frame.resize(FRAME_LEN, 0);
                self.encode_frame(&frame)?;
            }
            self.queue.push_back(QueuedUnit {
                payload: Vec::new(),
                pts_micros: 0,
                flags: BufferFlags::end_of_stream(),
            });
            self.eos_queued = true;
            return Ok(());
        }
        self.staged.extend(
            payload
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
        );
        while self.staged.len() >= FRAME_LEN {
            self.encode_staged_frame()?;
        }
        Ok(())
    }

    fn try_get_output_slot(&mut self, _timeout: Duration) -> Result<OutputPoll, EngineError> {
        if self.format_pending {
            self.format_pending = false;
            return Ok(OutputPoll::FormatChanged(NegotiatedFormat {
                sample_rate: self.sample_rate,
                channel_count: 1,
            }));
        }
        match self.queue.pop_front() {
            None => Ok(OutputPoll::TryAgain),
            Some(unit) => Ok(OutputPoll::Ready(OutputSlot {
                index: 0,
                payload: unit.payload,
                pts_micros: unit.pts_micros,
                flags: unit.flags,
            })),
        }
    }

    fn release(&mut self, _index: usize) -> Result<(), EngineError> {
        Ok(())
    }
}
