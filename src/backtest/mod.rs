//! 過去データによる移動平均クロス戦略の検証

pub mod engine;
pub mod optimize;
pub mod report;

pub use engine::{BacktestEngine, BacktestError, OptimizedBacktestEngine, TradeRecord};
pub use report::BacktestReport;
