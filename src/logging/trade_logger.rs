use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::model::OrderSide;

const CHANNEL_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub enum TradeEvent {
    OrderSent {
        timestamp: String,
        symbol: String,
        order_id: String,
        side: OrderSide,
        price: f64,
        qty: u64,
    },
    OrderFailed {
        timestamp: String,
        symbol: String,
        side: OrderSide,
        price: f64,
        qty: u64,
        error: String,
    },
    StopLoss {
        timestamp: String,
        symbol: String,
        entry_price: f64,
        price: f64,
        qty: u64,
        pnl_ratio: f64,
    },
    TakeProfit {
        timestamp: String,
        symbol: String,
        entry_price: f64,
        price: f64,
        qty: u64,
        pnl_ratio: f64,
    },
}

fn side_label(side: OrderSide) -> String {
    match side {
        OrderSide::Buy => "BUY".to_string(),
        OrderSide::Sell => "SELL".to_string(),
    }
}

impl TradeEvent {
    fn to_csv_row(&self) -> Vec<String> {
        match self {
            TradeEvent::OrderSent { timestamp, symbol, order_id, side, price, qty } => {
                vec![
                    timestamp.clone(),
                    "ORDER_SENT".to_string(),
                    symbol.clone(),
                    order_id.clone(),
                    side_label(*side),
                    price.to_string(),
                    qty.to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                ]
            }
            TradeEvent::OrderFailed { timestamp, symbol, side, price, qty, error } => {
                vec![
                    timestamp.clone(),
                    "ORDER_FAILED".to_string(),
                    symbol.clone(),
                    String::new(),
                    side_label(*side),
                    price.to_string(),
                    qty.to_string(),
                    String::new(),
                    String::new(),
                    error.clone(),
                ]
            }
            TradeEvent::StopLoss { timestamp, symbol, entry_price, price, qty, pnl_ratio } => {
                vec![
                    timestamp.clone(),
                    "STOP_LOSS".to_string(),
                    symbol.clone(),
                    String::new(),
                    side_label(OrderSide::Sell),
                    price.to_string(),
                    qty.to_string(),
                    entry_price.to_string(),
                    format!("{:.4}", pnl_ratio),
                    String::new(),
                ]
            }
            TradeEvent::TakeProfit { timestamp, symbol, entry_price, price, qty, pnl_ratio } => {
                vec![
                    timestamp.clone(),
                    "TAKE_PROFIT".to_string(),
                    symbol.clone(),
                    String::new(),
                    side_label(OrderSide::Sell),
                    price.to_string(),
                    qty.to_string(),
                    entry_price.to_string(),
                    format!("{:.4}", pnl_ratio),
                    String::new(),
                ]
            }
        }
    }
}

const CSV_HEADER: &[&str] = &[
    "timestamp", "event", "symbol", "order_id", "side", "price", "qty", "entry_price", "pnl_ratio", "error",
];

#[derive(Clone)]
pub struct TradeLogger {
    sender: mpsc::Sender<TradeEvent>,
}

impl TradeLogger {
    /// Must be called inside a tokio runtime.
    pub fn new(log_dir: &str) -> Self {
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let trades_dir = PathBuf::from(log_dir).join("trades");
        tokio::spawn(writer_task(trades_dir, receiver));
        Self { sender }
    }

    pub fn log(&self, event: TradeEvent) {
        if let Err(e) = self.sender.try_send(event) {
            warn!("Trade logger buffer full, dropping event: {}", e);
        }
    }
}

fn csv_file_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("trades-{}.csv", date.format("%Y-%m-%d")))
}

fn ensure_csv_with_header(path: &Path) -> io::Result<()> {
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => {
            let mut wtr = csv::Writer::from_writer(file);
            wtr.write_record(CSV_HEADER)?;
            wtr.flush()?;
        }
        Err(ref e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e),
    }
    Ok(())
}

// 日付は東証の営業日に合わせてローカル時刻で切る
fn write_csv_row(trades_dir: &Path, row: &[String]) {
    let today = Local::now().date_naive();
    let file_path = csv_file_path(trades_dir, today);

    if let Err(e) = ensure_csv_with_header(&file_path) {
        error!("Failed to create CSV header: {}", e);
        return;
    }

    let file = match fs::OpenOptions::new().append(true).open(&file_path) {
        Ok(f) => f,
        Err(e) => {
            error!("Failed to open trade log file: {}", e);
            return;
        }
    };

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);

    if let Err(e) = wtr.write_record(row) {
        error!("Failed to write trade event: {}", e);
    }
    if let Err(e) = wtr.flush() {
        error!("Failed to flush trade log: {}", e);
    }
}

async fn writer_task(trades_dir: PathBuf, mut receiver: mpsc::Receiver<TradeEvent>) {
    if let Err(e) = fs::create_dir_all(&trades_dir) {
        error!("Failed to create trades log directory: {}", e);
        return;
    }

    info!("TradeLogger started: {}", trades_dir.display());

    while let Some(event) = receiver.recv().await {
        let row = event.to_csv_row();
        let dir = trades_dir.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || {
            write_csv_row(&dir, &row);
        }).await {
            error!("Trade log write task panicked: {}", e);
        }
    }
}
