//! Two-sample Kolmogorov-Smirnov statistic

/// Maximum vertical distance between the empirical CDFs of two samples.
/// Returns `None` when either sample is empty.
pub fn ks_statistic(sample_a: &[f64], sample_b: &[f64]) -> Option<f64> {
    if sample_a.is_empty() || sample_b.is_empty() {
        return None;
    }
    let mut a: Vec<f64> = sample_a.to_vec();
    let mut b: Vec<f64> = sample_b.to_vec();
    a.sort_by(|x, y| x.total_cmp(y));
    b.sort_by(|x, y| x.total_cmp(y));

    let (na, nb) = (a.len() as f64, b.len() as f64);
    let mut i = 0;
    let mut j = 0;
    let mut d_max = 0.0_f64;

    while i < a.len() && j < b.len() {
        let x = a[i].min(b[j]);
        while i < a.len() && a[i] <= x {
            i += 1;
        }
        while j < b.len() && b[j] <= x {
            j += 1;
        }
        let d = (i as f64 / na - j as f64 / nb).abs();
        if d > d_max {
            d_max = d;
        }
    }
    Some(d_max)
}
