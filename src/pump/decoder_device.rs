use std::collections::VecDeque;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use crate::container::BufferFlags;
use crate::error::EngineError;

use super::device::{CodecDevice, InputSlot, NegotiatedFormat, OutputPoll, OutputSlot};

/// Produced buffers held before the pump collects them. Input slots dry up
/// when the queue is full, which is what exercises the pump's interleaving.
const OUTPUT_QUEUE_DEPTH: usize = 4;

enum QueuedEvent {
    Format(NegotiatedFormat),
    Unit {
        payload: Vec<u8>,
        pts_micros: i64,
        flags: BufferFlags,
    },
}

/// Adapts a symphonia decoder to the slot protocol.
///
/// Decoding is synchronous, so a submitted unit's output is queued before
/// `submit` returns; the slot discipline still models the bounded queues of
/// an externally-clocked codec.
pub struct PcmDecoderDevice {
    decoder: Box<dyn Decoder>,
    queue: VecDeque<QueuedEvent>,
    reported: Option<NegotiatedFormat>,
    sample_buf: Option<SampleBuffer<i16>>,
    eos_queued: bool,
}

impl PcmDecoderDevice {
    /// Build a decoder for the codec a [`crate::container::ContainerReader`]
    /// track declares.
    pub fn new(params: &CodecParameters) -> Result<Self, EngineError> {
        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|err| EngineError::UnsupportedCodec {
                name: format!("{:?} ({err})", params.codec),
            })?;
        Ok(Self {
            decoder,
            queue: VecDeque::new(),
            reported: None,
            sample_buf: None,
            eos_queued: false,
        })
    }

    fn queue_decoded(&mut self, pts_micros: i64) -> Result<(), EngineError> {
        let decoded = match self.decoder.last_decoded() {
            buf if buf.frames() == 0 => return Ok(()),
            buf => buf,
        };
        let spec = *decoded.spec();
        let format = NegotiatedFormat {
            sample_rate: spec.rate,
            channel_count: spec.channels.count() as u16,
        };
        if self.reported != Some(format) {
            self.reported = Some(format);
            self.queue.push_back(QueuedEvent::Format(format));
        }
        let capacity = decoded.capacity() as u64;
        let sample_buf = self
            .sample_buf
            .get_or_insert_with(|| SampleBuffer::<i16>::new(capacity, spec));
        if sample_buf.capacity() < decoded.frames() * spec.channels.count() {
            *sample_buf = SampleBuffer::<i16>::new(capacity, spec);
        }
        sample_buf.copy_interleaved_ref(decoded);
        let mut payload = Vec::with_capacity(sample_buf.len() * 2);
        for sample in sample_buf.samples() {
            payload.extend_from_slice(&sample.to_le_bytes());
        }
        self.queue.push_back(QueuedEvent::Unit {
            payload,
            pts_micros,
            flags: BufferFlags::default(),
        });
        Ok(())
    }
}

impl CodecDevice for PcmDecoderDevice {
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
        pts_micros: i64,
        flags: BufferFlags,
    ) -> Result<(), EngineError> {
        if flags.end_of_stream {
            self.queue.push_back(QueuedEvent::Unit {
                payload: Vec::new(),
                pts_micros,
                flags: BufferFlags::end_of_stream(),
            });
            self.eos_queued = true;
            return Ok(());
        }
        let packet = Packet::new_from_slice(0, pts_micros.max(0) as u64, 0, payload);
        match self.decoder.decode(&packet) {
            Ok(_) => self.queue_decoded(pts_micros),
            // Recoverable bitstream damage: drop the unit, keep the stream.
            Err(SymphoniaError::DecodeError(err)) => {
                tracing::warn!(error = %err, "skipping undecodable access-unit");
                Ok(())
            }
            Err(err) => Err(EngineError::decode(err.to_string())),
        }
    }

    fn try_get_output_slot(&mut self, _timeout: Duration) -> Result<OutputPoll, EngineError> {
        match self.queue.pop_front() {
            None => Ok(OutputPoll::TryAgain),
            Some(QueuedEvent::Format(format)) => Ok(OutputPoll::FormatChanged(format)),
            Some(QueuedEvent::Unit {
                payload,
                pts_micros,
                flags,
            }) => Ok(OutputPoll::Ready(OutputSlot {
                index: 0,
                payload,
                pts_micros,
                flags,
            })),
        }
    }

    fn release(&mut self, _index: usize) -> Result<(), EngineError> {
        // Payload ownership already moved to the caller.
        Ok(())
    }
}
