use std::time::Duration;

use crate::container::BufferFlags;
use crate::error::EngineError;

/// Token for a writable input slot obtained from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSlot(pub(crate) usize);

/// One produced output buffer. Ownership of the payload transfers to the
/// caller; the slot index must still be handed back via
/// [`CodecDevice::release`].
#[derive(Debug)]
pub struct OutputSlot {
    pub index: usize,
    pub payload: Vec<u8>,
    pub pts_micros: i64,
    pub flags: BufferFlags,
}

/// Output format negotiated by a codec, reported once via a format-changed
/// event. Overrides whatever the container advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    pub sample_rate: u32,
    pub channel_count: u16,
}

/// Result of one bounded output poll.
#[derive(Debug)]
pub enum OutputPoll {
    /// Nothing ready within the timeout.
    TryAgain,
    /// The negotiated output format is now known (or changed).
    FormatChanged(NegotiatedFormat),
    /// A produced buffer is ready.
    Ready(OutputSlot),
}

/// Polling interface over a stateful codec's buffer-exchange protocol.
///
/// The pump logic never talks to a codec directly; it only sees this trait,
/// which keeps the interleave/retry loop testable against scripted devices.
pub trait CodecDevice {
    /// Try to obtain a writable input slot without blocking.
    fn try_get_input_slot(&mut self) -> Result<Option<InputSlot>, EngineError>;

    /// Submit one access-unit (or an end-of-stream marker with an empty
    /// payload and the EOS flag) into a previously obtained slot.
    fn submit(
        &mut self,
        slot: InputSlot,
        payload: &[u8],
        pts_micros: i64,
        flags: BufferFlags,
    ) -> Result<(), EngineError>;

    /// Poll for output, waiting at most `timeout`.
    fn try_get_output_slot(&mut self, timeout: Duration) -> Result<OutputPoll, EngineError>;

    /// Return an output slot to the device after its payload was consumed.
    fn release(&mut self, index: usize) -> Result<(), EngineError>;
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted device for pump tests: input-slot availability and output
    //! events are played back exactly as queued.

    use std::collections::VecDeque;

    use super::*;

    pub(crate) struct SubmittedUnit {
        pub payload: Vec<u8>,
        pub pts_micros: i64,
        pub flags: BufferFlags,
    }

    pub(crate) enum ScriptedPoll {
        Idle,
        Format(NegotiatedFormat),
        Output {
            payload: Vec<u8>,
            pts_micros: i64,
            flags: BufferFlags,
        },
        Fail(String),
    }

    pub(crate) struct ScriptedDevice {
        pub input_available: VecDeque<bool>,
        pub polls: VecDeque<ScriptedPoll>,
        pub submitted: Vec<SubmittedUnit>,
        pub released: Vec<usize>,
        next_output_index: usize,
    }

    impl ScriptedDevice {
        pub fn new(
            input_available: impl IntoIterator<Item = bool>,
            polls: impl IntoIterator<Item = ScriptedPoll>,
        ) -> Self {
            Self {
                input_available: input_available.into_iter().collect(),
                polls: polls.into_iter().collect(),
                submitted: Vec::new(),
                released: Vec::new(),
                next_output_index: 0,
            }
        }
    }

    impl CodecDevice for ScriptedDevice {
        fn try_get_input_slot(&mut self) -> Result<Option<InputSlot>, EngineError> {
            // Once the script runs out, slots stay available.
            let available = self.input_available.pop_front().unwrap_or(true);
            Ok(available.then_some(InputSlot(0)))
        }

        fn submit(
            &mut self,
            _slot: InputSlot,
            payload: &[u8],
            pts_micros: i64,
            flags: BufferFlags,
        ) -> Result<(), EngineError> {
            self.submitted.push(SubmittedUnit {
                payload: payload.to_vec(),
                pts_micros,
                flags,
            });
            Ok(())
        }

        fn try_get_output_slot(&mut self, _timeout: Duration) -> Result<OutputPoll, EngineError> {
            match self.polls.pop_front() {
                None | Some(ScriptedPoll::Idle) => Ok(OutputPoll::TryAgain),
                Some(ScriptedPoll::Format(format)) => Ok(OutputPoll::FormatChanged(format)),
                Some(ScriptedPoll::Output {
                    payload,
                    pts_micros,
                    flags,
                }) => {
                    let index = self.next_output_index;
                    self.next_output_index += 1;
                    Ok(OutputPoll::Ready(OutputSlot {
                        index,
                        payload,
                        pts_micros,
                        flags,
                    }))
                }
                Some(ScriptedPoll::Fail(message)) => Err(EngineError::decode(message)),
            }
        }

        fn release(&mut self, index: usize) -> Result<(), EngineError> {
            self.released.push(index);
            Ok(())
        }
    }
}
