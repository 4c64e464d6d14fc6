//! Streaming waveform reduction.
//!
//! Both reducers consume decoded mono blocks as they arrive and keep only
//! per-bucket accumulators, so memory stays bounded by the requested output
//! width regardless of track length.

/// Reduces a sample stream to exactly `target_width` RMS values in `[0, 1]`.
///
/// Bucket size is `total_expected / target_width` (integer division, minimum
/// 1). A trailing partial bucket is emitted; if the stream ends short of the
/// requested width the remainder is zero-filled, so callers always get the
/// width they asked for.
pub struct RmsReducer {
    target_width: usize,
    bucket_len: u64,
    sum_squares: f64,
    bucket_count: u64,
    points: Vec<f32>,
    // With no usable total the stream is staged whole and reduced at the end.
    staged: Option<Vec<i16>>,
}

impl RmsReducer {
    pub fn new(total_expected_samples: u64, target_width: usize) -> Self {
        let bucket_len = if target_width == 0 {
            1
        } else {
            (total_expected_samples / target_width as u64).max(1)
        };
        Self {
            target_width,
            bucket_len,
            sum_squares: 0.0,
            bucket_count: 0,
            points: Vec::with_capacity(target_width),
            staged: (total_expected_samples == 0).then(Vec::new),
        }
    }

    /// Samples per emitted point, for mapping preview positions back to
    /// sample positions.
    pub fn bucket_len(&self) -> u64 {
        self.bucket_len
    }

    pub fn push_block(&mut self, samples: &[i16]) {
        if let Some(staged) = &mut self.staged {
            staged.extend_from_slice(samples);
            return;
        }
        for &sample in samples {
            if self.points.len() >= self.target_width {
                return;
            }
            let normalized = f64::from(sample) / 32_768.0;
            self.sum_squares += normalized * normalized;
            self.bucket_count += 1;
            if self.bucket_count >= self.bucket_len {
                self.emit_bucket();
            }
        }
    }

    /// Flush the trailing partial bucket and zero-fill to the target width.
    pub fn finish(mut self) -> Vec<f32> {
        if let Some(staged) = self.staged.take() {
            let mut reducer = Self::new((staged.len() as u64).max(1), self.target_width);
            reducer.push_block(&staged);
            return reducer.finish();
        }
        if self.bucket_count > 0 && self.points.len() < self.target_width {
            self.emit_bucket();
        }
        self.points.resize(self.target_width, 0.0);
        self.points
    }

    fn emit_bucket(&mut self) {
        let mean = self.sum_squares / self.bucket_count as f64;
        self.points.push(mean.sqrt() as f32);
        self.sum_squares = 0.0;
        self.bucket_count = 0;
    }
}

/// Reduces a sample stream to per-bucket peak magnitudes.
///
/// Peaks are raw 16-bit magnitudes, not normalized floats. The reducer
/// saturates once it has emitted 1.5x the requested point count, bounding
/// memory when the caller's total-sample estimate is off; drivers should
/// stop decoding once [`PeakReducer::saturated`] reports true.
pub struct PeakReducer {
    target_points: usize,
    bucket_len: u64,
    max_points: usize,
    current_peak: u16,
    bucket_count: u64,
    points: Vec<u16>,
    staged: Option<Vec<i16>>,
}

impl PeakReducer {
    pub fn new(total_expected_samples: u64, target_points: usize) -> Self {
        let bucket_len = if target_points == 0 {
            1
        } else {
            (total_expected_samples / target_points as u64).max(1)
        };
        Self {
            target_points,
            bucket_len,
            max_points: target_points + target_points / 2,
            current_peak: 0,
            bucket_count: 0,
            points: Vec::with_capacity(target_points),
            staged: (total_expected_samples == 0).then(Vec::new),
        }
    }

    pub fn bucket_len(&self) -> u64 {
        self.bucket_len
    }

    pub fn saturated(&self) -> bool {
        self.points.len() >= self.max_points
    }

    pub fn push_block(&mut self, samples: &[i16]) {
        if let Some(staged) = &mut self.staged {
            staged.extend_from_slice(samples);
            return;
        }
        for &sample in samples {
            if self.saturated() {
                return;
            }
            self.current_peak = self.current_peak.max(sample.unsigned_abs());
            self.bucket_count += 1;
            if self.bucket_count >= self.bucket_len {
                self.points.push(self.current_peak);
                self.current_peak = 0;
                self.bucket_count = 0;
            }
        }
    }

    pub fn finish(mut self) -> Vec<u16> {
        if let Some(staged) = self.staged.take() {
            let mut reducer = Self::new((staged.len() as u64).max(1), self.target_points);
            reducer.push_block(&staged);
            return reducer.finish();
        }
        if self.bucket_count > 0 && !self.saturated() {
            self.points.push(self.current_peak);
        }
        self.points
    }
}

/// Throttled progress reporting over a known total.
///
/// Emits `processed / total` clamped to `[0, 1]` at most once per
/// `interval` processed samples; [`ProgressTicker::finish`] always emits a
/// final `1.0`.
pub struct ProgressTicker {
    total: u64,
    interval: u64,
    processed: u64,
    reported_at: u64,
}

impl ProgressTicker {
    pub fn new(total: u64, interval: u64) -> Self {
        Self {
            total,
            interval: interval.max(1),
            processed: 0,
            reported_at: 0,
        }
    }

    pub fn advance(&mut self, samples: u64, mut report: impl FnMut(f32)) {
        self.processed += samples;
        if self.processed - self.reported_at >= self.interval {
            self.reported_at = self.processed;
            let fraction = if self.total == 0 {
                0.0
            } else {
                (self.processed as f64 / self.total as f64).min(1.0) as f32
            };
            report(fraction);
        }
    }

    pub fn finish(self, mut report: impl FnMut(f32)) {
        report(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_returns_exactly_the_requested_width() {
        let mut reducer = RmsReducer::new(1000, 10);
        reducer.push_block(&vec![1000i16; 1000]);
        assert_eq!(reducer.finish().len(), 10);
    }

    #[test]
    fn rms_of_silence_is_all_zero() {
        let mut reducer = RmsReducer::new(800, 8);
        reducer.push_block(&vec![0i16; 800]);
        let points = reducer.finish();
        assert_eq!(points, vec![0.0; 8]);
    }

    #[test]
    fn rms_of_full_scale_square_wave_is_near_one() {
        let mut reducer = RmsReducer::new(400, 4);
        let block: Vec<i16> = (0..400)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN })
            .collect();
        reducer.push_block(&block);
        for point in reducer.finish() {
            assert!((0.999..=1.0).contains(&point), "point {point} out of range");
        }
    }

    #[test]
    fn rms_zero_fills_when_the_stream_ends_short() {
        let mut reducer = RmsReducer::new(1000, 10);
        // Only 3.5 buckets worth of data arrives.
        reducer.push_block(&vec![16_384i16; 350]);
        let points = reducer.finish();
        assert_eq!(points.len(), 10);
        assert!(points[3] > 0.0); // partial bucket still emitted
        assert_eq!(&points[4..], &[0.0; 6]);
    }

    #[test]
    fn rms_short_block_sequence_matches_single_block() {
        let samples: Vec<i16> = (0..600).map(|i| (i * 37 % 2000) as i16).collect();
        let mut whole = RmsReducer::new(600, 6);
        whole.push_block(&samples);
        let mut split = RmsReducer::new(600, 6);
        for chunk in samples.chunks(13) {
            split.push_block(chunk);
        }
        assert_eq!(whole.finish(), split.finish());
    }

    #[test]
    fn rms_with_unknown_total_reduces_the_whole_stream() {
        let mut reducer = RmsReducer::new(0, 4);
        reducer.push_block(&vec![10i16; 4]);
        reducer.push_block(&vec![30_000i16; 996]);
        let points = reducer.finish();
        assert_eq!(points.len(), 4);
        // A known-total reducer seeded with the first four samples would
        // report near-silence; staging covers the loud remainder too.
        assert!(points.iter().all(|&p| p > 0.5), "points were {points:?}");
    }

    #[test]
    fn peak_tracks_bucket_maxima() {
        let mut reducer = PeakReducer::new(6, 3);
        reducer.push_block(&[100, -200, 50, 60, -32_768, 5]);
        assert_eq!(reducer.finish(), vec![200, 60, 32_768]);
    }

    #[test]
    fn peak_saturates_at_one_and_a_half_times_the_target() {
        // Estimate claims 40 samples; 400 actually arrive.
        let mut reducer = PeakReducer::new(40, 4);
        reducer.push_block(&vec![7i16; 400]);
        assert!(reducer.saturated());
        assert_eq!(reducer.finish().len(), 6);
    }

    #[test]
    fn peak_with_unknown_total_reduces_the_whole_stream() {
        let mut reducer = PeakReducer::new(0, 4);
        reducer.push_block(&vec![100i16; 900]);
        reducer.push_block(&vec![20_000i16; 100]);
        let points = reducer.finish();
        assert_eq!(points.len(), 4);
        assert_eq!(points.last().copied(), Some(20_000));
    }

    #[test]
    fn progress_is_throttled_and_ends_at_one() {
        let mut ticker = ProgressTicker::new(1000, 100);
        let mut seen = Vec::new();
        for _ in 0..100 {
            ticker.advance(10, |value| seen.push(value));
        }
        ticker.finish(|value| seen.push(value));

        assert_eq!(seen.len(), 11);
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn progress_with_zero_total_still_finishes() {
        let mut ticker = ProgressTicker::new(0, 10);
        let mut seen = Vec::new();
        ticker.advance(50, |value| seen.push(value));
        ticker.finish(|value| seen.push(value));
        assert_eq!(seen, vec![0.0, 1.0]);
    }
}
