use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backtest::report::{self, BacktestReport};
use crate::data::SymbolBars;
use crate::model::{self, Bar, ExitReason};
use crate::strategy::{self, StrategyParams};
use crate::util;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub qty: u64,
    pub pnl: f64,
    pub pnl_ratio: f64,
    pub days_held: i64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    entry_date: NaiveDate,
    entry_price: f64,
    qty: u64,
}

impl OpenPosition {
    fn close(&self, symbol: &str, bar: &Bar, exit_reason: ExitReason) -> TradeRecord {
        TradeRecord {
            symbol: symbol.to_string(),
            entry_date: self.entry_date,
            exit_date: bar.date,
            entry_price: self.entry_price,
            exit_price: bar.close,
            qty: self.qty,
            pnl: (bar.close - self.entry_price) * self.qty as f64,
            pnl_ratio: util::pnl_ratio(self.entry_price, bar.close),
            days_held: (bar.date - self.entry_date).num_days(),
            exit_reason,
        }
    }
}

#[derive(Debug)]
pub enum BacktestError {
    NoTrades,
}

impl fmt::Display for BacktestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BacktestError::NoTrades => write!(f, "no trades were generated"),
        }
    }
}

impl std::error::Error for BacktestError {}

/// Single-instrument long-only simulator.
///
/// Each symbol is simulated independently with at most one open position.
/// Position size is a fixed fraction of the initial capital; realised P&L is
/// never compounded back into sizing.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    pub initial_capital: f64,
    pub max_positions: usize,
    pub stop_loss_ratio: f64,
    pub take_profit_ratio: f64,
    pub risk_per_trade: f64,
    pub params: StrategyParams,
}

/// Engine variant with custom crossover parameters, used by the optimizer.
pub type OptimizedBacktestEngine = BacktestEngine;

impl BacktestEngine {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            max_positions: 10,
            stop_loss_ratio: 0.05,
            take_profit_ratio: 0.10,
            risk_per_trade: 0.02,
            params: StrategyParams::default(),
        }
    }

    pub fn with_params(initial_capital: f64, params: StrategyParams) -> Self {
        Self {
            params,
            ..Self::new(initial_capital)
        }
    }

    pub fn backtest_symbol(&self, symbol: &str, bars: &[Bar]) -> Vec<TradeRecord> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let frame = strategy::signal_frame(&closes, &self.params);

        let mut trades = Vec::new();
        let mut position: Option<OpenPosition> = None;

        for (i, bar) in bars.iter().enumerate() {
            if frame.sma_short[i].is_none() || frame.sma_long[i].is_none() {
                continue;
            }

            match position {
                None if frame.buy[i] => {
                    let qty = util::position_qty(self.initial_capital, self.risk_per_trade, bar.close);
                    if qty > 0 {
                        debug!("{} entry {} @ {} x {}", symbol, bar.date, bar.close, qty);
                        position = Some(OpenPosition {
                            entry_date: bar.date,
                            entry_price: bar.close,
                            qty,
                        });
                    }
                }
                Some(open) => {
                    if let Some(reason) = model::exit_reason(
                        open.entry_price,
                        bar.close,
                        self.stop_loss_ratio,
                        self.take_profit_ratio,
                    ) {
                        debug!("{} exit {} @ {} ({})", symbol, bar.date, bar.close, reason);
                        trades.push(open.close(symbol, bar, reason));
                        position = None;
                    }
                }
                None => {}
            }
        }

        // 未決済ポジションは最終日の終値で決済
        if let (Some(open), Some(last)) = (position, bars.last()) {
            trades.push(open.close(symbol, last, ExitReason::EndOfPeriod));
        }

        trades
    }

    pub fn run(&self, datasets: &[SymbolBars]) -> Result<BacktestReport, BacktestError> {
        let mut all_trades = Vec::new();

        for dataset in datasets {
            if dataset.bars.is_empty() {
                warn!("No data for {}, skipping", dataset.symbol);
                continue;
            }
            let trades = self.backtest_symbol(&dataset.symbol, &dataset.bars);
            info!("{}: {} trades", dataset.symbol, trades.len());
            all_trades.extend(trades);
        }

        if all_trades.is_empty() {
            return Err(BacktestError::NoTrades);
        }

        Ok(report::analyze(all_trades, self.initial_capital))
    }
}
