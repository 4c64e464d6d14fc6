//! In-memory PCM representations and stateless sample transforms.

mod downmix;
mod resample;
mod wav;

pub use downmix::downmix_to_mono;
pub use resample::resample_linear;
pub use wav::{merge_wav_files, read_wav, write_wav};

/// A fully materialized mono track.
///
/// Only operations that must hold a whole track in memory (merge, the
/// normalize gain pass) build one of these; waveform and trim stay on the
/// streaming block path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContent {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl AudioContent {
    pub fn duration_micros(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as i64 * 1_000_000 / self.sample_rate as i64
    }
}
