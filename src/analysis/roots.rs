//! Numeric root search for functions that are only known pointwise.

const MAX_ITERATIONS: usize = 200;
const RESIDUAL: f64 = 1e-6;

/// Bisects `[low, high]`, whose endpoint values must differ in sign.
///
/// Gives up when the function is undefined at a midpoint.
pub fn bisect<F>(f: &F, mut low: f64, mut high: f64) -> Option<f64>
where
    F: Fn(f64) -> Option<f64>,
{
    let mut f_low = f(low)?;

    for _ in 0..MAX_ITERATIONS {
        let mid = 0.5 * (low + high);
        if mid <= low || mid >= high {
            return Some(mid);
        }
        let f_mid = f(mid)?;
        if f_mid == 0.0 {
            return Some(mid);
        }
        if f_mid.signum() == f_low.signum() {
            low = mid;
            f_low = f_mid;
        } else {
            high = mid;
        }
    }

    Some(0.5 * (low + high))
}

/// Scans `[low, high]` in `steps` uniform steps and refines every sign change.
///
/// Sign changes across a pole also bisect to the pole; those are discarded
/// because the function does not vanish there. Results are sorted.
pub fn bracketed_roots<F>(f: F, low: f64, high: f64, steps: usize) -> Vec<f64>
where
    F: Fn(f64) -> Option<f64>,
{
    if !(low < high) || !low.is_finite() || !high.is_finite() || steps == 0 {
        return Vec::new();
    }

    let f = |x: f64| f(x).filter(|value| value.is_finite());
    let step = (high - low) / steps as f64;
    let samples: Vec<(f64, Option<f64>)> = (0..=steps)
        .map(|i| {
            let x = if i == steps { high } else { low + i as f64 * step };
            (x, f(x))
        })
        .collect();

    let mut roots = Vec::new();
    for pair in samples.windows(2) {
        let (x_low, f_low) = pair[0];
        let (x_high, f_high) = pair[1];
        match (f_low, f_high) {
            (Some(a), _) if a == 0.0 => roots.push(x_low),
            (Some(a), Some(b)) if b != 0.0 && a.signum() != b.signum() => {
                let vanishes = bisect(&f, x_low, x_high)
                    .filter(|root| f(*root).is_some_and(|value| value.abs() <= RESIDUAL));
                roots.extend(vanishes);
            }
            _ => {}
        }
    }
    if let Some((x, Some(value))) = samples.last() {
        if *value == 0.0 {
            roots.push(*x);
        }
    }

    roots.sort_by(f64::total_cmp);
    roots.dedup_by(|a, b| (*a - *b).abs() <= step * 1e-6);
    roots
}
