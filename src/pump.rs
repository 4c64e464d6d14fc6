//! Codec buffer-exchange devices and the pumps that drive them.
//!
//! A codec is modeled as an externally-clocked device with input and output
//! slots, polled with bounded timeouts. The pumps contain the interleaved
//! retry loop from the engine core; the devices adapt real codecs (or, in
//! tests, scripted mocks) to the slot protocol.

mod decode;
mod decoder_device;
mod device;
mod encode;
mod encoder_device;

pub use decode::{AccessUnitSource, DecodePump, PcmBlock};
pub use decoder_device::PcmDecoderDevice;
pub use device::{CodecDevice, InputSlot, NegotiatedFormat, OutputPoll, OutputSlot};
pub use encode::EncodePump;
pub use encoder_device::AacEncoderDevice;
