use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::backtest::engine::{BacktestError, OptimizedBacktestEngine};
use crate::backtest::report::BacktestReport;
use crate::data::SymbolBars;
use crate::strategy::StrategyParams;

#[derive(Debug, Clone)]
pub struct ParameterGrid {
    pub sma_short: Vec<usize>,
    pub sma_long: Vec<usize>,
    pub rsi_threshold: Vec<f64>,
    pub rsi_period: usize,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            sma_short: vec![3, 5, 7],
            sma_long: vec![15, 20, 25],
            rsi_threshold: vec![60.0, 70.0, 80.0],
            rsi_period: 14,
        }
    }
}

impl ParameterGrid {
    // 短期 >= 長期 の組み合わせは除外
    pub fn combinations(&self) -> Vec<StrategyParams> {
        let mut out = Vec::new();
        for &short in &self.sma_short {
            for &long in &self.sma_long {
                for &rsi_threshold in &self.rsi_threshold {
                    if short >= long {
                        continue;
                    }
                    out.push(StrategyParams {
                        sma_short: short,
                        sma_long: long,
                        rsi_period: self.rsi_period,
                        rsi_threshold,
                    });
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluated {
    pub params: StrategyParams,
    pub total_pnl: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub best_params: StrategyParams,
    pub best_report: BacktestReport,
    pub evaluated: Vec<Evaluated>,
}

/// Grid search maximising total P&L. Ties keep the earliest combination in
/// grid order; combinations that produce no trades are ignored.
pub fn optimize(datasets: &[SymbolBars], grid: &ParameterGrid, initial_capital: f64) -> Option<OptimizationResult> {
    let combinations = grid.combinations();
    info!("Optimizing over {} parameter combinations", combinations.len());

    let results: Vec<(StrategyParams, Result<BacktestReport, BacktestError>)> = combinations
        .par_iter()
        .map(|params| {
            let engine = OptimizedBacktestEngine::with_params(initial_capital, *params);
            (*params, engine.run(datasets))
        })
        .collect();

    let mut best: Option<(StrategyParams, BacktestReport)> = None;
    let mut evaluated = Vec::with_capacity(results.len());

    for (params, result) in results {
        match result {
            Ok(report) => {
                debug!(
                    "SMA({},{}) RSI<{}: total_pnl={}",
                    params.sma_short, params.sma_long, params.rsi_threshold, report.total_pnl
                );
                evaluated.push(Evaluated { params, total_pnl: Some(report.total_pnl) });
                let is_better = best
                    .as_ref()
                    .map_or(true, |(_, b)| report.total_pnl > b.total_pnl);
                if is_better {
                    best = Some((params, report));
                }
            }
            Err(e) => {
                debug!("SMA({},{}) RSI<{}: {}", params.sma_short, params.sma_long, params.rsi_threshold, e);
                evaluated.push(Evaluated { params, total_pnl: None });
            }
        }
    }

    best.map(|(best_params, best_report)| OptimizationResult {
        best_params,
        best_report,
        evaluated,
    })
}
