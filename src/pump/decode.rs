use std::time::Duration;

use crate::container::{BufferFlags, ContainerReader, ReadOutcome};
use crate::error::EngineError;

use super::device::{CodecDevice, NegotiatedFormat, OutputPoll};

/// Consecutive polls with neither input nor output progress before the pump
/// declares the device stalled instead of spinning.
const MAX_IDLE_POLLS: u32 = 1024;

/// One block of interleaved 16-bit PCM yielded by the decode pump.
///
/// Ownership transfers to the consumer; the pump keeps no copy. Downmixing
/// multi-channel blocks is the consumer's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBlock {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channel_count: u16,
}

/// Pull source of compressed access-units for the decode pump.
///
/// [`ContainerReader`] is the production implementation; tests script their
/// own.
pub trait AccessUnitSource {
    fn read_next_access_unit(&mut self, buf: &mut Vec<u8>) -> Result<ReadOutcome, EngineError>;
    fn current_timestamp_micros(&self) -> i64;
    fn current_flags(&self) -> BufferFlags;
    fn advance(&mut self);
    /// Format the container advertises, used until the decoder negotiates
    /// its own.
    fn declared_format(&self) -> NegotiatedFormat;
}

impl AccessUnitSource for ContainerReader {
    fn read_next_access_unit(&mut self, buf: &mut Vec<u8>) -> Result<ReadOutcome, EngineError> {
        ContainerReader::read_next_access_unit(self, buf)
    }

    fn current_timestamp_micros(&self) -> i64 {
        ContainerReader::current_timestamp_micros(self)
    }

    fn current_flags(&self) -> BufferFlags {
        ContainerReader::current_flags(self)
    }

    fn advance(&mut self) {
        ContainerReader::advance(self)
    }

    fn declared_format(&self) -> NegotiatedFormat {
        let metadata = self.metadata();
        NegotiatedFormat {
            sample_rate: metadata.sample_rate,
            channel_count: metadata.channel_count,
        }
    }
}

/// Drives a decoder device against an access-unit source, yielding a lazy,
/// finite sequence of PCM blocks.
///
/// The loop interleaves input submission with bounded-timeout output polls
/// so neither queue can deadlock the other. Once a format-changed event is
/// seen, the negotiated format overrides the container's declaration for all
/// further blocks.
pub struct DecodePump<'s, S: AccessUnitSource, D: CodecDevice> {
    source: &'s mut S,
    device: D,
    poll_timeout: Duration,
    negotiated: Option<NegotiatedFormat>,
    input_exhausted: bool,
    finished: bool,
    idle_polls: u32,
    scratch: Vec<u8>,
}

impl<'s, S: AccessUnitSource, D: CodecDevice> DecodePump<'s, S, D> {
    pub fn new(source: &'s mut S, device: D, poll_timeout: Duration) -> Self {
        Self {
            source,
            device,
            poll_timeout,
            negotiated: None,
            input_exhausted: false,
            finished: false,
            idle_polls: 0,
            scratch: Vec::new(),
        }
    }

    /// Negotiated output format, known after the first format-changed event.
    pub fn negotiated_format(&self) -> Option<NegotiatedFormat> {
        self.negotiated
    }

    /// Pull the next PCM block, or `None` once the stream is drained.
    ///
    /// On failure, blocks already yielded remain valid; there is no
    /// rollback.
    pub fn next_block(&mut self) -> Result<Option<PcmBlock>, EngineError> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let mut progressed = false;

            if !self.input_exhausted
                && let Some(slot) = self.device.try_get_input_slot()?
            {
                match self.source.read_next_access_unit(&mut self.scratch)? {
                    ReadOutcome::Unit { size } => {
                        let pts = self.source.current_timestamp_micros();
                        let flags = self.source.current_flags();
                        self.device.submit(slot, &self.scratch[..size], pts, flags)?;
                        self.source.advance();
                    }
                    ReadOutcome::EndOfStream => {
                        self.device
                            .submit(slot, &[], 0, BufferFlags::end_of_stream())?;
                        self.input_exhausted = true;
                    }
                }
                progressed = true;
            }

            match self.device.try_get_output_slot(self.poll_timeout)? {
                OutputPoll::FormatChanged(format) => {
                    tracing::debug!(
                        sample_rate = format.sample_rate,
                        channels = format.channel_count,
                        "decoder negotiated output format"
                    );
                    self.negotiated = Some(format);
                    progressed = true;
                }
                OutputPoll::Ready(slot) => {
                    let end_of_stream = slot.flags.end_of_stream;
                    let samples = le_bytes_to_samples(&slot.payload);
                    self.device.release(slot.index)?;
                    if end_of_stream {
                        self.finished = true;
                    }
                    if !samples.is_empty() {
                        let format = self
                            .negotiated
                            .unwrap_or_else(|| self.source.declared_format());
                        return Ok(Some(PcmBlock {
                            samples,
                            sample_rate: format.sample_rate,
                            channel_count: format.channel_count,
                        }));
                    }
                    if end_of_stream {
                        return Ok(None);
                    }
                    progressed = true;
                }
                OutputPoll::TryAgain => {}
            }

            if progressed {
                self.idle_polls = 0;
            } else {
                // The output poll already waited its bounded timeout; cap
                // the number of fruitless rounds so a wedged device cannot
                // hang the operation.
                self.idle_polls += 1;
                if self.idle_polls >= MAX_IDLE_POLLS {
                    return Err(EngineError::decode("decoder made no progress"));
                }
            }
        }
    }
}

fn le_bytes_to_samples(payload: &[u8]) -> Vec<i16> {
    payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::device::mock::{ScriptedDevice, ScriptedPoll};
    use super::*;

    struct StubSource {
        units: Vec<Vec<u8>>,
        cursor: usize,
    }

    impl StubSource {
        fn new(units: Vec<Vec<u8>>) -> Self {
            Self { units, cursor: 0 }
        }
    }

    impl AccessUnitSource for StubSource {
        fn read_next_access_unit(
            &mut self,
            buf: &mut Vec<u8>,
        ) -> Result<ReadOutcome, EngineError> {
            match self.units.get(self.cursor) {
                Some(unit) => {
                    buf.clear();
                    buf.extend_from_slice(unit);
                    Ok(ReadOutcome::Unit { size: unit.len() })
                }
                None => Ok(ReadOutcome::EndOfStream),
            }
        }

        fn current_timestamp_micros(&self) -> i64 {
            (self.cursor as i64) * 10_000
        }

        fn current_flags(&self) -> BufferFlags {
            BufferFlags::sync_point()
        }

        fn advance(&mut self) {
            self.cursor += 1;
        }

        fn declared_format(&self) -> NegotiatedFormat {
            NegotiatedFormat {
                sample_rate: 44_100,
                channel_count: 1,
            }
        }
    }

    fn timeout() -> Duration {
        Duration::from_millis(1)
    }

    #[test]
    fn yields_blocks_with_negotiated_format() {
        let mut source = StubSource::new(vec![vec![1, 2], vec![3, 4]]);
        let device = ScriptedDevice::new(
            [],
            [
                ScriptedPoll::Format(NegotiatedFormat {
                    sample_rate: 48_000,
                    channel_count: 2,
                }),
                ScriptedPoll::Output {
                    payload: vec![0x10, 0x00, 0xF0, 0xFF],
                    pts_micros: 0,
                    flags: BufferFlags::default(),
                },
                ScriptedPoll::Output {
                    payload: Vec::new(),
                    pts_micros: 0,
                    flags: BufferFlags::end_of_stream(),
                },
            ],
        );
        let mut pump = DecodePump::new(&mut source, device, timeout());

        let block = pump.next_block().unwrap().unwrap();
        assert_eq!(block.samples, vec![16, -16]);
        assert_eq!(block.sample_rate, 48_000);
        assert_eq!(block.channel_count, 2);

        assert!(pump.next_block().unwrap().is_none());
        // Drained pumps stay drained.
        assert!(pump.next_block().unwrap().is_none());
    }

    #[test]
    fn container_format_is_used_until_negotiation() {
        let mut source = StubSource::new(vec![vec![1]]);
        let device = ScriptedDevice::new(
            [],
            [
                ScriptedPoll::Output {
                    payload: vec![0x01, 0x00],
                    pts_micros: 0,
                    flags: BufferFlags::default(),
                },
                ScriptedPoll::Output {
                    payload: Vec::new(),
                    pts_micros: 0,
                    flags: BufferFlags::end_of_stream(),
                },
            ],
        );
        let mut pump = DecodePump::new(&mut source, device, timeout());

        let block = pump.next_block().unwrap().unwrap();
        assert_eq!(block.sample_rate, 44_100);
        assert_eq!(block.channel_count, 1);
        assert!(pump.negotiated_format().is_none());
    }

    #[test]
    fn submits_end_of_stream_marker_after_last_unit() {
        let mut source = StubSource::new(vec![vec![9, 9]]);
        let device = ScriptedDevice::new(
            [],
            [
                ScriptedPoll::Idle,
                ScriptedPoll::Output {
                    payload: vec![0x02, 0x00],
                    pts_micros: 0,
                    flags: BufferFlags::default(),
                },
                ScriptedPoll::Output {
                    payload: Vec::new(),
                    pts_micros: 0,
                    flags: BufferFlags::end_of_stream(),
                },
            ],
        );
        let mut pump = DecodePump::new(&mut source, device, timeout());
        while pump.next_block().unwrap().is_some() {}

        // The scripted device records every submission; the final one must
        // be the empty EOS marker.
        let submitted = &pump.device.submitted;
        assert!(submitted.len() >= 2);
        let last = submitted.last().unwrap();
        assert!(last.payload.is_empty());
        assert!(last.flags.end_of_stream);
    }

    #[test]
    fn stalled_device_aborts_instead_of_spinning() {
        let mut source = StubSource::new(Vec::new());
        let device = ScriptedDevice::new([], []);
        let mut pump = DecodePump::new(&mut source, device, Duration::ZERO);

        let err = pump.next_block().unwrap_err();
        assert!(matches!(err, EngineError::DecodeFailed { .. }));
    }

    #[test]
    fn failure_preserves_previously_yielded_blocks() {
        let mut source = StubSource::new(vec![vec![1], vec![2]]);
        let device = ScriptedDevice::new(
            [],
            [
                ScriptedPoll::Output {
                    payload: vec![0x05, 0x00],
                    pts_micros: 0,
                    flags: BufferFlags::default(),
                },
                ScriptedPoll::Fail("codec died".to_string()),
            ],
        );
        let mut pump = DecodePump::new(&mut source, device, timeout());

        let block = pump.next_block().unwrap().unwrap();
        assert_eq!(block.samples, vec![5]);
        assert!(pump.next_block().is_err());
    }

    #[test]
    fn released_slots_match_consumed_outputs() {
        let mut source = StubSource::new(vec![vec![1]]);
        let device = ScriptedDevice::new(
            [],
            [
                ScriptedPoll::Output {
                    payload: vec![0x01, 0x00],
                    pts_micros: 0,
                    flags: BufferFlags::default(),
                },
                ScriptedPoll::Output {
                    payload: Vec::new(),
                    pts_micros: 0,
                    flags: BufferFlags::end_of_stream(),
                },
            ],
        );
        let mut pump = DecodePump::new(&mut source, device, timeout());
        while pump.next_block().unwrap().is_some() {}
        assert_eq!(pump.device.released, vec![0, 1]);
    }
}
