/// Average interleaved frames down to mono.
///
/// The per-frame average is an integer division truncating toward zero, so
/// `(100, -101)` downmixes to `0`. A trailing incomplete frame is dropped.
/// Mono input is returned unchanged.
pub fn downmix_to_mono(samples: &[i16], channel_count: u16) -> Vec<i16> {
    let channels = channel_count.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}
