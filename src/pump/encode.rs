use std::io::{Read, Seek, Write};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::container::{AudioCodec, BufferFlags, ContainerWriter, TrackFormat};
use crate::error::EngineError;

use super::device::{CodecDevice, OutputPoll};

const MAX_IDLE_POLLS: u32 = 1024;

/// Drives an encoder device over a mono PCM buffer and muxes its output.
///
/// The writer handshake is event-driven: the track is added and the
/// container started only when the device reports its negotiated format,
/// which always precedes the first produced unit. Codec-config buffers are
/// consumed but never muxed.
pub struct EncodePump<D: CodecDevice> {
    device: D,
    chunk_bytes: usize,
    bit_rate: u32,
    poll_timeout: Duration,
    scratch: Vec<u8>,
}

impl<D: CodecDevice> EncodePump<D> {
    pub fn new(device: D, config: &EngineConfig) -> Self {
        Self {
            device,
            chunk_bytes: config.chunk_bytes.max(2),
            bit_rate: config.bit_rate,
            poll_timeout: config.poll_timeout(),
            scratch: Vec::new(),
        }
    }

    /// Encode `samples` (mono, interleaving-free) at `sample_rate` into the
    /// writer, then submit end-of-stream and drain the device.
    ///
    /// `progress` receives monotone values in `0.0..=1.0` tracking input
    /// consumption, with a final `1.0` guaranteed on success. The writer is
    /// left started but not finalized; the caller owns finalization.
    pub fn run<W: Write + Read + Seek>(
        &mut self,
        samples: &[i16],
        sample_rate: u32,
        writer: &mut ContainerWriter<W>,
        mut progress: impl FnMut(f32),
    ) -> Result<(), EngineError> {
        let chunk_samples = self.chunk_bytes / 2;
        let total = samples.len();
        let mut cursor = 0usize;
        let mut eos_submitted = false;
        let mut idle_polls = 0u32;

        loop {
            let mut progressed = false;

            if !eos_submitted
                && let Some(slot) = self.device.try_get_input_slot()?
            {
                if cursor < total {
                    let end = (cursor + chunk_samples).min(total);
                    self.scratch.clear();
                    for &sample in &samples[cursor..end] {
                        self.scratch.extend_from_slice(&sample.to_le_bytes());
                    }
                    // 2 bytes per mono sample, so pts = bytes * 1e6 / (rate * 2)
                    // collapses to samples * 1e6 / rate.
                    let pts = cursor as i64 * 1_000_000 / sample_rate.max(1) as i64;
                    self.device
                        .submit(slot, &self.scratch, pts, BufferFlags::default())?;
                    cursor = end;
                    if total > 0 {
                        progress((cursor as f32 / total as f32).min(1.0));
                    }
                } else {
                    self.device
                        .submit(slot, &[], 0, BufferFlags::end_of_stream())?;
                    eos_submitted = true;
                }
                progressed = true;
            }

            match self.device.try_get_output_slot(self.poll_timeout)? {
                OutputPoll::FormatChanged(format) => {
                    tracing::debug!(
                        sample_rate = format.sample_rate,
                        channels = format.channel_count,
                        "encoder negotiated output format"
                    );
                    writer.add_track(&TrackFormat {
                        codec: AudioCodec::Aac,
                        sample_rate: format.sample_rate,
                        channel_count: format.channel_count,
                        bit_rate: self.bit_rate,
                    })?;
                    writer.start()?;
                    progressed = true;
                }
                OutputPoll::Ready(slot) => {
                    let end_of_stream = slot.flags.end_of_stream;
                    if !slot.payload.is_empty() && !slot.flags.codec_config {
                        writer.write_access_unit(
                            &slot.payload,
                            slot.pts_micros,
                            BufferFlags::sync_point(),
                        )?;
                    }
                    self.device.release(slot.index)?;
                    if end_of_stream {
                        if !eos_submitted {
                            return Err(EngineError::encode(
                                "encoder ended before input was consumed",
                            ));
                        }
                        progress(1.0);
                        return Ok(());
                    }
                    progressed = true;
                }
                OutputPoll::TryAgain => {}
            }

            if progressed {
                idle_polls = 0;
            } else {
                idle_polls += 1;
                if idle_polls >= MAX_IDLE_POLLS {
                    return Err(EngineError::encode("encoder made no progress"));
                }
            }
        }
    }
}
