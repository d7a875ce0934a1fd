//! Summary statistics and reporting for backtest trades.
//!
//! Computes win rate, profit factor and drawdown over the trade log and
//! renders the text / JSON / CSV outputs of a backtest run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::backtest::engine::TradeRecord;

#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub initial_capital: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    /// `f64::INFINITY` when there are no losing trades (serialised as `null`).
    pub profit_factor: f64,
    pub avg_holding_days: f64,
    /// Largest peak-to-trough decline of cumulative P&L, in yen (`<= 0`).
    pub max_drawdown: f64,
    pub return_ratio: f64,
    pub evaluation: Evaluation,
    pub trades: Vec<TradeRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluation {
    Excellent,
    Acceptable,
    NeedsImprovement,
}

impl Evaluation {
    pub fn grade(win_rate: f64, profit_factor: f64) -> Self {
        if win_rate >= 0.6 && profit_factor >= 1.5 {
            Evaluation::Excellent
        } else if win_rate >= 0.5 && profit_factor >= 1.2 {
            Evaluation::Acceptable
        } else {
            Evaluation::NeedsImprovement
        }
    }

    pub fn comment(&self) -> &'static str {
        match self {
            Evaluation::Excellent => "優秀な戦略です。実運用を検討できます。",
            Evaluation::Acceptable => "まずまずの戦略です。パラメータ調整を検討してください。",
            Evaluation::NeedsImprovement => "改善が必要な戦略です。ロジックの見直しをお勧めします。",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub cumulative_pnl: f64,
    pub drawdown: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolBucket {
    pub symbol: String,
    pub trades: usize,
    pub pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPnl {
    pub month: String,
    pub pnl: f64,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Summary statistics over all trades.
///
/// Trades are re-ordered by exit date (stable, so same-day exits keep their
/// per-symbol order) before the cumulative P&L curve is built. `max_drawdown`
/// and `trades` in the report therefore follow exit-date order, not the
/// symbol-by-symbol order in which the engine produced them; on multi-symbol
/// runs the drawdown can differ from one computed over the raw trade list.
pub fn analyze(mut trades: Vec<TradeRecord>, initial_capital: f64) -> BacktestReport {
    // 銘柄ごとに生成された取引を決済日順に並べ直す (同日は生成順)
    trades.sort_by_key(|t| t.exit_date);

    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    let wins: Vec<f64> = pnls.iter().copied().filter(|p| *p > 0.0).collect();
    let losses: Vec<f64> = pnls.iter().copied().filter(|p| *p < 0.0).collect();

    let total_trades = trades.len();
    let win_rate = if total_trades > 0 {
        wins.len() as f64 / total_trades as f64
    } else {
        0.0
    };

    let gross_win: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().sum();
    let profit_factor = if losses.is_empty() {
        f64::INFINITY
    } else {
        (gross_win / gross_loss).abs()
    };

    let total_pnl: f64 = pnls.iter().sum();
    let holding: Vec<f64> = trades.iter().map(|t| t.days_held as f64).collect();

    BacktestReport {
        initial_capital,
        total_trades,
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        win_rate,
        total_pnl,
        avg_pnl: mean(&pnls),
        avg_win: mean(&wins),
        avg_loss: mean(&losses),
        profit_factor,
        avg_holding_days: mean(&holding),
        max_drawdown: max_drawdown(&pnls),
        return_ratio: if initial_capital > 0.0 { total_pnl / initial_capital } else { 0.0 },
        evaluation: Evaluation::grade(win_rate, profit_factor),
        trades,
    }
}

/// Minimum of `cumulative - running_max(cumulative)`; the running max starts
/// at the first cumulative value.
pub fn max_drawdown(pnls: &[f64]) -> f64 {
    drawdown_series(pnls)
        .into_iter()
        .map(|(_, dd)| dd)
        .fold(0.0, f64::min)
}

fn drawdown_series(pnls: &[f64]) -> Vec<(f64, f64)> {
    let mut cumulative = 0.0;
    let mut peak = f64::NEG_INFINITY;
    pnls.iter()
        .map(|pnl| {
            cumulative += pnl;
            peak = peak.max(cumulative);
            (cumulative, cumulative - peak)
        })
        .collect()
}

pub fn equity_curve(trades: &[TradeRecord]) -> Vec<EquityPoint> {
    let pnls: Vec<f64> = trades.iter().map(|t| t.pnl).collect();
    trades
        .iter()
        .zip(drawdown_series(&pnls))
        .map(|(t, (cumulative_pnl, drawdown))| EquityPoint {
            date: t.exit_date,
            cumulative_pnl,
            drawdown,
        })
        .collect()
}

// 損益の大きい順
pub fn symbol_breakdown(trades: &[TradeRecord]) -> Vec<SymbolBucket> {
    let mut map: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for t in trades {
        let entry = map.entry(t.symbol.as_str()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += t.pnl;
    }

    let mut buckets: Vec<SymbolBucket> = map
        .into_iter()
        .map(|(symbol, (trades, pnl))| SymbolBucket {
            symbol: symbol.to_string(),
            trades,
            pnl,
        })
        .collect();
    buckets.sort_by(|a, b| b.pnl.total_cmp(&a.pnl));
    buckets
}

pub fn monthly_pnl(trades: &[TradeRecord]) -> Vec<MonthlyPnl> {
    let mut map: BTreeMap<String, f64> = BTreeMap::new();
    for t in trades {
        *map.entry(t.exit_date.format("%Y-%m").to_string()).or_insert(0.0) += t.pnl;
    }
    map.into_iter().map(|(month, pnl)| MonthlyPnl { month, pnl }).collect()
}

// ¥1,234,567 形式
pub fn format_yen(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{}", rounded.abs() as i64);
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("{}¥{}", sign, grouped)
}

fn format_profit_factor(pf: f64) -> String {
    if pf.is_infinite() {
        "inf".to_string()
    } else {
        format!("{:.2}", pf)
    }
}

pub fn render_report(report: &BacktestReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== バックテスト結果レポート ===");
    let _ = writeln!(out, "生成日時: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);
    let _ = writeln!(out, "【基本統計】");
    let _ = writeln!(out, "総取引数: {}", report.total_trades);
    let _ = writeln!(out, "勝率: {:.1}%", report.win_rate * 100.0);
    let _ = writeln!(out, "勝ちトレード: {}", report.winning_trades);
    let _ = writeln!(out, "負けトレード: {}", report.losing_trades);
    let _ = writeln!(out);
    let _ = writeln!(out, "【損益】");
    let _ = writeln!(out, "総損益: {}", format_yen(report.total_pnl));
    let _ = writeln!(out, "平均損益: {}", format_yen(report.avg_pnl));
    let _ = writeln!(out, "平均利益: {}", format_yen(report.avg_win));
    let _ = writeln!(out, "平均損失: {}", format_yen(report.avg_loss));
    let _ = writeln!(out, "リターン: {:.1}%", report.return_ratio * 100.0);
    let _ = writeln!(out);
    let _ = writeln!(out, "【リスク指標】");
    let _ = writeln!(out, "プロフィットファクター: {}", format_profit_factor(report.profit_factor));
    let _ = writeln!(out, "平均保有日数: {:.1}日", report.avg_holding_days);
    let _ = writeln!(out, "最大ドローダウン: {}", format_yen(report.max_drawdown));
    let _ = writeln!(out);
    let _ = writeln!(out, "【評価】");
    let _ = write!(out, "{}", report.evaluation.comment());
    out
}

pub fn save_json(report: &BacktestReport, path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)
}

pub fn write_trades_csv(trades: &[TradeRecord], path: &Path) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    for t in trades {
        wtr.serialize(t)?;
    }
    wtr.flush()?;
    Ok(())
}
