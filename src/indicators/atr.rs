// =============================================================================
// Average True Range (ATR) and the ADX screening proxy
// =============================================================================
//
// True Range for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR here is the simple average of the last `period` TR values. The ADX
// value exposed alongside it is a light normalization proxy, NOT Wilder's
// ADX: it scales recent volatility against price,
//
//   adx_proxy = min(100, max(0, 2 * ATR / last_close * 100))
//
// which is enough to rank "is this moving" for screening purposes.
// =============================================================================

use crate::market_data::Candle;

/// Compute ATR as the SMA of the last `period` true ranges.
///
/// # Returns
/// `None` when:
/// - `period` is zero.
/// - There are fewer than `period + 1` candles (each TR needs a previous
///   close).
/// - Any intermediate value is non-finite.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut tr_values: Vec<f64> = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();

        tr_values.push(hl.max(hc).max(lc));
    }

    let tail = &tr_values[tr_values.len() - period..];
    let atr = tail.iter().sum::<f64>() / period as f64;

    atr.is_finite().then_some(atr)
}

/// Volatility-versus-price screening proxy in [0, 100].
///
/// This deliberately is not Wilder's ADX; see the module header.
pub fn adx_proxy(candles: &[Candle], period: usize) -> Option<f64> {
    let atr = calculate_atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close <= 0.0 {
        return None;
    }
    Some((2.0 * atr / last_close * 100.0).clamp(0.0, 100.0))
}
