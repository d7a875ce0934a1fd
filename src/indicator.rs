//! SMA / RSI.
//!
//! The `*_series` functions compute an indicator for every bar of a history
//! (used by the backtest). `sma` and `rsi` compute only the latest value from a
//! trailing price list (used by the live loop, which has no bar history).

fn window_mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Simple moving average; `None` until `period` closes are available.
pub fn sma_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }
    (0..closes.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                Some(window_mean(&closes[i + 1 - period..=i]))
            }
        })
        .collect()
}

/// RSI over rolling means of gains and losses.
///
/// The first bar has no previous close and counts as a zero change, so the
/// first value appears at index `period - 1`. A window with neither gains nor
/// losses has no defined RSI.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    for i in 0..closes.len() {
        let change = if i == 0 { 0.0 } else { closes[i] - closes[i - 1] };
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    (0..closes.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            let avg_gain = window_mean(&gains[i + 1 - period..=i]);
            let avg_loss = window_mean(&losses[i + 1 - period..=i]);
            rsi_from_averages(avg_gain, avg_loss)
        })
        .collect()
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return None;
        }
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Mean of the last `period` prices, or 0 when there are not enough.
pub fn sma(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period {
        return 0.0;
    }
    window_mean(&prices[prices.len() - period..])
}

/// RSI of the last `period` price changes. Neutral 50 until `period + 1`
/// prices exist; 100 when the window has no losses.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period + 1 {
        return 50.0;
    }

    let tail = &prices[prices.len() - period - 1..];
    let (gain_sum, loss_sum) = tail.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let change = w[1] - w[0];
        if change > 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });

    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_series_warmup() {
        let s = sma_series(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(s, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn sma_series_zero_period() {
        assert_eq!(sma_series(&[1.0, 2.0], 0), vec![None, None]);
    }

    #[test]
    fn rsi_series_first_value_at_period_minus_one() {
        let closes = [10.0, 11.0, 10.0, 12.0];
        let r = rsi_series(&closes, 3);
        assert!(r[0].is_none());
        assert!(r[1].is_none());
        // window deltas [0, +1, -1] -> gain 1/3, loss 1/3 -> 50
        assert!((r[2].unwrap() - 50.0).abs() < 1e-9);
        // window deltas [+1, -1, +2] -> gain 1, loss 1/3 -> rs 3 -> 75
        assert!((r[3].unwrap() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_series_all_gains_is_100() {
        let r = rsi_series(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(r[3], Some(100.0));
    }

    #[test]
    fn rsi_series_flat_is_undefined() {
        let r = rsi_series(&[5.0, 5.0, 5.0, 5.0], 3);
        assert!(r.iter().all(|v| v.is_none()));
    }

    #[test]
    fn sma_scalar() {
        assert_eq!(sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 2), 4.5);
        assert_eq!(sma(&[1.0], 2), 0.0);
    }

    #[test]
    fn rsi_scalar_neutral_when_short() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0], 14), 50.0);
    }

    #[test]
    fn rsi_scalar_uses_last_period_changes() {
        // changes: -5 (dropped), +1, -1, +2
        let prices = [15.0, 10.0, 11.0, 10.0, 12.0];
        assert!((rsi(&prices, 3) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_scalar_no_losses_is_100() {
        assert_eq!(rsi(&[1.0, 2.0, 3.0, 4.0], 3), 100.0);
    }
}
