//! Daily bar loading for the backtest (local CSV files or Yahoo Finance).

pub mod csv_loader;
pub mod yahoo;

use std::fmt;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{error, info, warn};

use crate::model::Bar;

pub use csv_loader::CsvBarSource;
pub use yahoo::YahooBarSource;

const MAX_CONCURRENT_DOWNLOADS: usize = 4;

#[derive(Debug, Clone)]
pub struct SymbolBars {
    pub symbol: String,
    pub bars: Vec<Bar>,
}

#[derive(Debug)]
pub enum DataError {
    Io(std::io::Error),
    Csv(csv::Error),
    Reqwest(reqwest::Error),
    Deserialize(serde_json::Error),
    DateParse(String),
    Yahoo(String),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DataError::Io(e) => write!(f, "io: {}", e),
            DataError::Csv(e) => write!(f, "csv: {}", e),
            DataError::Reqwest(e) => write!(f, "http: {}", e),
            DataError::Deserialize(e) => write!(f, "json: {}", e),
            DataError::DateParse(s) => write!(f, "invalid date: {}", s),
            DataError::Yahoo(s) => write!(f, "yahoo: {}", s),
        }
    }
}

impl std::error::Error for DataError {}

impl From<std::io::Error> for DataError {
    fn from(e: std::io::Error) -> Self {
        DataError::Io(e)
    }
}

impl From<csv::Error> for DataError {
    fn from(e: csv::Error) -> Self {
        DataError::Csv(e)
    }
}

impl From<reqwest::Error> for DataError {
    fn from(e: reqwest::Error) -> Self {
        DataError::Reqwest(e)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(e: serde_json::Error) -> Self {
        DataError::Deserialize(e)
    }
}

pub enum BarSource {
    Csv(CsvBarSource),
    Yahoo(YahooBarSource),
}

impl BarSource {
    /// Bars with `from <= date < to`, oldest first.
    pub async fn load(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, DataError> {
        match self {
            BarSource::Csv(source) => source.load(symbol, from, to),
            BarSource::Yahoo(source) => source.load(symbol, from, to).await,
        }
    }
}

/// Loads every symbol, keeping input order. Failed or empty symbols are
/// logged and left out.
pub async fn load_all(source: &BarSource, symbols: &[String], from: NaiveDate, to: NaiveDate) -> Vec<SymbolBars> {
    let loaded: Vec<(String, Result<Vec<Bar>, DataError>)> = stream::iter(symbols.iter().cloned())
        .map(|symbol| async move {
            let result = source.load(&symbol, from, to).await;
            (symbol, result)
        })
        .buffered(MAX_CONCURRENT_DOWNLOADS)
        .collect()
        .await;

    loaded
        .into_iter()
        .filter_map(|(symbol, result)| match result {
            Ok(bars) if bars.is_empty() => {
                warn!("データ取得失敗: {} (no bars in range)", symbol);
                None
            }
            Ok(bars) => {
                info!("{}: {} bars loaded", symbol, bars.len());
                Some(SymbolBars { symbol, bars })
            }
            Err(e) => {
                error!("エラー {}: {}", symbol, e);
                None
            }
        })
        .collect()
}

pub fn parse_date(s: &str) -> Result<NaiveDate, DataError> {
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(|_| DataError::DateParse(s.to_string()))
}
