/// Nearest-rank percentile of an ascending slice; `q` in `[0, 1]`.
pub(crate) fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let idx = ((sorted.len() as f64 - 1.0) * q.clamp(0.0, 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Replace `out` with the finite values of `values`, sorted ascending.
pub(crate) fn sort_into(values: impl IntoIterator<Item = f64>, out: &mut Vec<f64>) {
    out.clear();
    out.extend(values.into_iter().filter(|v| v.is_finite()));
    out.sort_by(f64::total_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_uses_nearest_rank() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 0.5), 3.0);
        assert_eq!(percentile(&v, 0.2), 2.0);
        assert_eq!(percentile(&v, 1.0), 5.0);
        assert_eq!(percentile(&v, 7.0), 5.0);
        assert!(percentile(&[], 0.5).is_nan());
    }

    #[test]
    fn sort_into_drops_non_finite_and_reuses_buffer() {
        let mut out = vec![42.0];
        sort_into([3.0, f64::NAN, 1.0, f64::INFINITY, 2.0], &mut out);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }
}
