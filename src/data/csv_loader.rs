use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::data::{parse_date, DataError};
use crate::model::Bar;

// Yahoo Finance のCSVエクスポート形式 (Adj Close 列は無視)
// 休場日などは "null" や空欄になるので Option で受ける
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open", deserialize_with = "csv::invalid_option")]
    open: Option<f64>,
    #[serde(rename = "High", deserialize_with = "csv::invalid_option")]
    high: Option<f64>,
    #[serde(rename = "Low", deserialize_with = "csv::invalid_option")]
    low: Option<f64>,
    #[serde(rename = "Close", deserialize_with = "csv::invalid_option")]
    close: Option<f64>,
    #[serde(rename = "Volume", default, deserialize_with = "csv::invalid_option")]
    volume: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CsvBarSource {
    dir: PathBuf,
}

impl CsvBarSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol))
    }

    pub fn load(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, DataError> {
        let mut rdr = csv::Reader::from_path(self.path_for(symbol))?;
        read_bars(&mut rdr, from, to)
    }
}

pub fn read_bars<R: std::io::Read>(rdr: &mut csv::Reader<R>, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, DataError> {
    let mut bars = Vec::new();
    for row in rdr.deserialize::<CsvRow>() {
        let row = row?;
        let date = parse_date(&row.date)?;
        if date < from || date >= to {
            continue;
        }
        // 欠損のある行は捨てる
        let (Some(open), Some(high), Some(low), Some(close)) = (row.open, row.high, row.low, row.close) else {
            continue;
        };
        bars.push(Bar {
            date,
            open,
            high,
            low,
            close,
            volume: row.volume.unwrap_or(0.0),
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}
