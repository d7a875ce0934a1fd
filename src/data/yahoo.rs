use chrono::{NaiveDate, NaiveTime};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::data::DataError;
use crate::model::Bar;

pub const ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
    #[serde(rename = "adjclose")]
    adj_close: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize, Default)]
struct Quote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(rename = "adjclose")]
    adj_close: Option<Vec<Option<f64>>>,
}

// 東証銘柄は .T を付ける
pub fn yahoo_ticker(symbol: &str) -> String {
    if symbol.contains('.') {
        symbol.to_string()
    } else {
        format!("{}.T", symbol)
    }
}

#[derive(Debug, Clone)]
pub struct YahooBarSource {
    client: reqwest::Client,
    endpoint: String,
}

impl YahooBarSource {
    pub fn new() -> Result<Self, DataError> {
        Self::with_endpoint(ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self, DataError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub async fn load(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>, DataError> {
        let ticker = yahoo_ticker(symbol);
        let period1 = from.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = to.and_time(NaiveTime::MIN).and_utc().timestamp();

        let url = Url::parse_with_params(
            &format!("{}/{}", self.endpoint, ticker),
            &[
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
                ("interval", "1d".to_string()),
                ("events", "history".to_string()),
            ],
        )
        .map_err(|e| DataError::Yahoo(e.to_string()))?;

        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DataError::Yahoo(format!("{} {}: {}", ticker, status, body)));
        }

        let bars = parse_chart(&body)?;
        Ok(bars.into_iter().filter(|b| b.date >= from && b.date < to).collect())
    }
}

fn parse_chart(body: &str) -> Result<Vec<Bar>, DataError> {
    let response: ChartResponse = serde_json::from_str(body)?;

    if let Some(error) = response.chart.error {
        return Err(DataError::Yahoo(format!("{} - {}", error.code, error.description)));
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| DataError::Yahoo("no chart result".to_string()))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = result
        .indicators
        .adj_close
        .and_then(|ac| ac.into_iter().next())
        .and_then(|ac| ac.adj_close);

    let opens = quote.open.unwrap_or_default();
    let highs = quote.high.unwrap_or_default();
    let lows = quote.low.unwrap_or_default();
    let closes = quote.close.unwrap_or_default();
    let volumes = quote.volume.unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let raw_close = closes.get(i).copied().flatten();
        let adj_close = adj_closes.as_ref().and_then(|ac| ac.get(i).copied().flatten());
        let open = opens.get(i).copied().flatten();
        let high = highs.get(i).copied().flatten();
        let low = lows.get(i).copied().flatten();

        // 欠損のある足は捨てる
        let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, adj_close.or(raw_close)) else {
            continue;
        };
        // 調整後終値に合わせて始値・高値・安値も同じ比率で補正する
        let factor = match (adj_close, raw_close) {
            (Some(adj), Some(raw)) if raw > 0.0 => adj / raw,
            _ => 1.0,
        };
        // 東証の日付はJSTで判定する
        let Some(date) = chrono::DateTime::from_timestamp(*ts + 9 * 3600, 0).map(|dt| dt.date_naive()) else {
            continue;
        };

        bars.push(Bar {
            date,
            open: open * factor,
            high: high * factor,
            low: low * factor,
            close,
            volume: volumes.get(i).copied().flatten().unwrap_or(0.0),
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}
