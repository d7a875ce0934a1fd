//! Golden-cross entry rule with an RSI overbought filter.

use serde::{Deserialize, Serialize};

use crate::indicator;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub sma_short: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub rsi_threshold: f64,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            sma_short: 5,
            sma_long: 20,
            rsi_period: 14,
            rsi_threshold: 70.0,
        }
    }
}

/// Per-bar indicator values the backtest walks over.
#[derive(Debug, Clone)]
pub struct SignalFrame {
    pub sma_short: Vec<Option<f64>>,
    pub sma_long: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub buy: Vec<bool>,
}

pub fn signal_frame(closes: &[f64], params: &StrategyParams) -> SignalFrame {
    let sma_short = indicator::sma_series(closes, params.sma_short);
    let sma_long = indicator::sma_series(closes, params.sma_long);
    let rsi = indicator::rsi_series(closes, params.rsi_period);

    let buy = (0..closes.len())
        .map(|i| {
            if i == 0 {
                return false;
            }
            match (sma_short[i], sma_long[i], sma_short[i - 1], sma_long[i - 1], rsi[i]) {
                (Some(s), Some(l), Some(prev_s), Some(prev_l), Some(r)) => {
                    s > l && prev_s <= prev_l && r < params.rsi_threshold
                }
                _ => false,
            }
        })
        .collect();

    SignalFrame { sma_short, sma_long, rsi, buy }
}

pub fn buy_signals(closes: &[f64], params: &StrategyParams) -> Vec<bool> {
    signal_frame(closes, params).buy
}

/// Live entry decision on a trailing price history (oldest first).
pub fn should_buy(prices: &[f64], params: &StrategyParams) -> bool {
    if prices.len() < params.sma_long || prices.len() < 2 {
        return false;
    }

    let sma_short = indicator::sma(prices, params.sma_short);
    let sma_long = indicator::sma(prices, params.sma_long);

    let previous = &prices[..prices.len() - 1];
    let prev_short = indicator::sma(previous, params.sma_short);
    let prev_long = indicator::sma(previous, params.sma_long);

    let rsi = indicator::rsi(prices, params.rsi_period);

    sma_short > sma_long && prev_short <= prev_long && rsi < params.rsi_threshold
}
