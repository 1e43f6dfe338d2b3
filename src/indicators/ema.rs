// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average.
//
// Formula:
//   k     = 2 / (period + 1)
//   EMA_0 = value_0                      (seeded at the first value)
//   EMA_t = value_t * k + EMA_{t-1} * (1 - k)
//
// Seeding at the first value means the series has one output per input and
// converges to the SMA-seeded variant after a few periods.
// =============================================================================

/// Compute the full EMA series for `values` with look-back `period`.
///
/// Returns one output per input value; the first output equals the first
/// input.
///
/// # Edge cases
/// - `period == 0` => empty vec (division guard)
/// - `values` shorter than `period` => empty vec
/// - A non-finite intermediate truncates the series; downstream consumers
///   must not trust a broken tail.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let k = 2.0 / (period + 1) as f64;

    let mut result = Vec::with_capacity(values.len());
    let mut prev = values[0];
    if !prev.is_finite() {
        return Vec::new();
    }
    result.push(prev);

    for &v in &values[1..] {
        let ema = v * k + prev * (1.0 - k);
        if !ema.is_finite() {
            break;
        }
        result.push(ema);
        prev = ema;
    }

    result
}

/// Percentage separation between a fast and a slow EMA at the latest close.
///
/// Positive when the fast EMA sits above the slow one. Returns `None` when
/// either series is unavailable or the slow EMA is zero.
pub fn ema_separation_pct(closes: &[f64], fast: usize, slow: usize) -> Option<f64> {
    if closes.len() < slow {
        return None;
    }

    let fast_ema = *calculate_ema(closes, fast).last()?;
    let slow_ema = *calculate_ema(closes, slow).last()?;

    if slow_ema.abs() < f64::EPSILON {
        return None;
    }

    let sep = ((fast_ema - slow_ema) / slow_ema) * 100.0;
    sep.is_finite().then_some(sep)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn ascending(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn ema_seeds_at_first_value() {
        let values = vec![10.0, 11.0, 12.0];
        let ema = calculate_ema(&values, 2);
        assert_eq!(ema.len(), 3);
        assert!((ema[0] - 10.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // period 3 => k = 0.5
        let values = vec![2.0, 4.0, 6.0, 8.0];
        let ema = calculate_ema(&values, 3);
        assert_eq!(ema.len(), 4);

        let mut expected = vec![2.0];
        let k = 0.5;
        for &v in &values[1..] {
            let prev = *expected.last().unwrap();
            expected.push(v * k + prev * (1.0 - k));
        }
        for (a, b) in ema.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_truncates_on_nan() {
        let values = vec![1.0, 2.0, f64::NAN, 4.0];
        let ema = calculate_ema(&values, 2);
        // Seed plus the one finite step before the NaN poisons the recursion.
        assert_eq!(ema.len(), 2);
    }

    #[test]
    fn ema_flat_series_is_constant() {
        let ema = calculate_ema(&vec![100.0; 60], 20);
        assert!(ema.iter().all(|v| (v - 100.0).abs() < 1e-10));
    }

    // ---- ema_separation_pct ----------------------------------------------

    #[test]
    fn separation_positive_in_uptrend() {
        let closes = ascending(100);
        let sep = ema_separation_pct(&closes, 20, 50).unwrap();
        assert!(sep > 0.0, "sep = {sep}");
    }

    #[test]
    fn separation_negative_in_downtrend() {
        let closes: Vec<f64> = (1..=100).rev().map(|x| x as f64).collect();
        let sep = ema_separation_pct(&closes, 20, 50).unwrap();
        assert!(sep < 0.0, "sep = {sep}");
    }

    #[test]
    fn separation_none_on_short_input() {
        assert!(ema_separation_pct(&ascending(30), 20, 50).is_none());
    }
}
