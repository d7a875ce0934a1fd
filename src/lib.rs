//! kabu STATION 自動売買 / バックテスト ライブラリ
//!
//! 移動平均クロスと RSI による売買シグナル、日足バックテストとパラメータ最適化、
//! kabu STATION API を使った現物の自動売買ループを提供します。

pub mod api;
pub mod backtest;
pub mod data;
pub mod indicator;
pub mod logging;
pub mod model;
pub mod price_history;
pub mod strategy;
pub mod trader;
pub mod util;
