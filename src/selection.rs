//! Selection math over a reduced waveform preview.
//!
//! Lives apart from the decode path so the mapping stays pure and testable.
//! The back-projection from preview indices to sample or time positions is
//! a linear proportion and therefore only as precise as the preview's
//! bucket size; callers must not expect sample-exact edit boundaries.

/// A half-open index range over a waveform preview.
///
/// Construction normalizes the endpoints so `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    start: usize,
    end: usize,
}

impl SelectionRange {
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            start: a.min(b),
            end: a.max(b),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Project onto the sample axis of a track with `total_samples` samples,
    /// given the preview the selection was made over.
    pub fn to_sample_range(&self, preview_len: usize, total_samples: u64) -> (u64, u64) {
        (
            project(self.start, preview_len, total_samples),
            project(self.end, preview_len, total_samples),
        )
    }

    /// Project onto the time axis of a track lasting `duration_micros`.
    pub fn to_micros_range(&self, preview_len: usize, duration_micros: i64) -> (i64, i64) {
        let duration = duration_micros.max(0) as u64;
        let (start, end) = self.to_sample_range(preview_len, duration);
        (start as i64, end as i64)
    }
}

fn project(index: usize, preview_len: usize, total: u64) -> u64 {
    if preview_len == 0 {
        return 0;
    }
    let clamped = index.min(preview_len) as u128;
    (clamped * total as u128 / preview_len as u128) as u64
}
