//! 日足データでのバックテスト CLI
//!
//! ```bash
//! # Yahoo Finance から取得して実行 (初期資金 100万円)
//! backtest run -s 7203,9984 -f 2022-01-01 -t 2024-01-01
//!
//! # ローカル CSV (<dir>/<銘柄>.csv) を使ってパラメータ最適化
//! backtest optimize --data-dir data -f 2022-01-01 -t 2024-01-01
//! ```

use std::path::PathBuf;
use std::process;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Builder;
use tracing::{error, info};

use kabu_trader::backtest::optimize::{optimize, ParameterGrid};
use kabu_trader::backtest::report::{
    equity_curve, format_yen, monthly_pnl, render_report, save_json, symbol_breakdown, write_trades_csv, BacktestReport,
};
use kabu_trader::backtest::BacktestEngine;
use kabu_trader::data::{self, BarSource, CsvBarSource, SymbolBars, YahooBarSource};
use kabu_trader::strategy::StrategyParams;

const DEFAULT_SYMBOLS: &str = "7203,9984,6098,8035,4063,6954,4502,8031,8058,9432";

#[derive(Parser)]
#[command(name = "backtest")]
#[command(about = "SMA クロス + RSI 戦略のバックテスト", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 1つのパラメータでバックテスト
    Run {
        #[command(flatten)]
        common: CommonArgs,

        /// 短期SMA期間
        #[arg(long, default_value_t = 5)]
        sma_short: usize,

        /// 長期SMA期間
        #[arg(long, default_value_t = 20)]
        sma_long: usize,

        /// RSI期間
        #[arg(long, default_value_t = 14)]
        rsi_period: usize,

        /// RSI がこの値未満のときのみ買う
        #[arg(long, default_value_t = 70.0)]
        rsi_threshold: f64,

        /// 損切り比率
        #[arg(long, default_value_t = 0.05)]
        stop_loss: f64,

        /// 利確比率
        #[arg(long, default_value_t = 0.10)]
        take_profit: f64,
    },

    /// SMA期間と RSI閾値のグリッドサーチ
    Optimize {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// 銘柄コード (カンマ区切り)
    #[arg(short, long, value_delimiter = ',', default_value = DEFAULT_SYMBOLS)]
    symbols: Vec<String>,

    /// 開始日 (YYYY-MM-DD)
    #[arg(short = 'f', long, default_value = "2022-01-01")]
    from: String,

    /// 終了日 (YYYY-MM-DD, この日を含まない)
    #[arg(short, long, default_value = "2024-01-01")]
    to: String,

    /// CSV ディレクトリ (未指定なら Yahoo Finance から取得)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// 初期資金 (円)
    #[arg(long, default_value_t = 1_000_000.0)]
    capital: f64,

    /// 結果 JSON の出力先
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 取引履歴 CSV の出力先
    #[arg(long)]
    trades_csv: Option<PathBuf>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

fn bar_source(args: &CommonArgs) -> Result<BarSource, String> {
    match &args.data_dir {
        Some(dir) => Ok(BarSource::Csv(CsvBarSource::new(dir.clone()))),
        None => YahooBarSource::new()
            .map(BarSource::Yahoo)
            .map_err(|e| e.to_string()),
    }
}

async fn load_datasets(args: &CommonArgs) -> Result<Vec<SymbolBars>, String> {
    let from = parse_date(&args.from)?;
    let to = parse_date(&args.to)?;
    if from >= to {
        return Err(format!("--from {} must be before --to {}", from, to));
    }

    let source = bar_source(args)?;
    info!("期間: {} ～ {} / 銘柄: {:?}", from, to, args.symbols);
    let datasets = data::load_all(&source, &args.symbols, from, to).await;
    if datasets.is_empty() {
        return Err("no data loaded for any symbol".to_string());
    }
    Ok(datasets)
}

fn print_breakdowns(report: &BacktestReport) {
    println!();
    println!("【銘柄別損益】");
    for b in symbol_breakdown(&report.trades) {
        println!("{:>6}: {:>3}回 {:>14}", b.symbol, b.trades, format_yen(b.pnl));
    }

    println!();
    println!("【月別損益】");
    for m in monthly_pnl(&report.trades) {
        println!("{}: {:>14}", m.month, format_yen(m.pnl));
    }

    if let Some(last) = equity_curve(&report.trades).last() {
        println!();
        println!("累積損益 ({}): {}", last.date, format_yen(last.cumulative_pnl));
    }
}

fn write_outputs(report: &BacktestReport, args: &CommonArgs) {
    if let Some(path) = &args.output {
        match save_json(report, path) {
            Ok(()) => info!("結果を保存しました: {}", path.display()),
            Err(e) => error!("Failed to write {}: {}", path.display(), e),
        }
    }
    if let Some(path) = &args.trades_csv {
        match write_trades_csv(&report.trades, path) {
            Ok(()) => info!("取引履歴を保存しました: {}", path.display()),
            Err(e) => error!("Failed to write {}: {}", path.display(), e),
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Run { common, sma_short, sma_long, rsi_period, rsi_threshold, stop_loss, take_profit } => {
            if sma_short == 0 || sma_short >= sma_long || rsi_period == 0 {
                return Err("need 0 < sma_short < sma_long and rsi_period > 0".to_string());
            }
            let params = StrategyParams { sma_short, sma_long, rsi_period, rsi_threshold };
            let datasets = load_datasets(&common).await?;

            let mut engine = BacktestEngine::with_params(common.capital, params);
            engine.stop_loss_ratio = stop_loss;
            engine.take_profit_ratio = take_profit;

            let report = engine.run(&datasets).map_err(|e| e.to_string())?;
            println!("{}", render_report(&report));
            print_breakdowns(&report);
            write_outputs(&report, &common);
        }
        Commands::Optimize { common } => {
            let datasets = load_datasets(&common).await?;
            let grid = ParameterGrid::default();

            let result = optimize(&datasets, &grid, common.capital)
                .ok_or_else(|| "no parameter combination produced trades".to_string())?;

            for e in &result.evaluated {
                match e.total_pnl {
                    Some(pnl) => println!(
                        "SMA({:>2},{:>2}) RSI<{:>2}: {:>12.0}",
                        e.params.sma_short, e.params.sma_long, e.params.rsi_threshold, pnl
                    ),
                    None => println!(
                        "SMA({:>2},{:>2}) RSI<{:>2}: 取引なし",
                        e.params.sma_short, e.params.sma_long, e.params.rsi_threshold
                    ),
                }
            }

            let best = result.best_params;
            println!();
            println!(
                "最適パラメータ: 短期SMA={} 長期SMA={} RSI閾値={}",
                best.sma_short, best.sma_long, best.rsi_threshold
            );
            println!("{}", render_report(&result.best_report));
            write_outputs(&result.best_report, &common);
        }
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kabu_trader=info".parse().unwrap())
                .add_directive("backtest=info".parse().unwrap())
        )
        .init();

    let cli = Cli::parse();

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    if let Err(e) = runtime.block_on(run(cli)) {
        error!("{}", e);
        process::exit(1);
    }
}
