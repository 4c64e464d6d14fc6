/// Linear-interpolation resampling between two integer sample rates.
///
/// Output length is `round(len * to_rate / from_rate)`. Equal rates return
/// the input unchanged so lossless paths stay byte-identical.
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    let out_len = ((samples.len() as u64 * to_rate as u64 + from_rate as u64 / 2)
        / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let position = i as f64 * step;
        let index = position as usize;
        if index + 1 >= samples.len() {
            out.push(samples[samples.len() - 1]);
            continue;
        }
        let frac = position - index as f64;
        let a = f64::from(samples[index]);
        let b = f64::from(samples[index + 1]);
        out.push((a + (b - a) * frac).round() as i16);
    }
    out
}
