//! SQLite に取引活動・取得価格・発注結果を残す。
//!
//! 書き込みは専用スレッドで行い、売買ループは channel に投げるだけ。

use std::fmt;
use std::path::Path;

use rusqlite::{params, Connection};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const CHANNEL_BUFFER_SIZE: usize = 1000;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite: {e}"),
            StoreError::Io(e) => write!(f, "io: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

/// One row of `trade_activity`.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeActivity {
    pub execution_time: String,
    pub symbol: String,
    pub exchange: u32,
    pub current_price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub action: String,
    pub order_id: Option<String>,
    pub status: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub symbol: String,
    pub exchange: u32,
    pub price: f64,
    pub quantity: u64,
    pub account_type: u32,
    pub order_result: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActivityRecord {
    Activity(TradeActivity),
    Price { symbol: String, price: f64, timestamp: String },
    Order(OrderRecord),
}

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS trade_activity (
             id             INTEGER PRIMARY KEY AUTOINCREMENT,
             execution_time TEXT    NOT NULL,
             symbol         TEXT    NOT NULL,
             exchange       TEXT    NOT NULL,
             current_price  REAL,
             trigger_price  REAL,
             action         TEXT    NOT NULL,
             order_id       TEXT,
             status         TEXT    NOT NULL,
             details        TEXT
         );
         CREATE TABLE IF NOT EXISTS stock_prices (
             id        INTEGER PRIMARY KEY AUTOINCREMENT,
             symbol    TEXT NOT NULL,
             price     REAL NOT NULL,
             timestamp TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS orders (
             id           INTEGER PRIMARY KEY AUTOINCREMENT,
             symbol       TEXT,
             exchange     INTEGER,
             price        REAL,
             quantity     INTEGER,
             account_type INTEGER,
             order_result TEXT
         );",
    )?;
    Ok(())
}

pub fn insert_activity(conn: &Connection, a: &TradeActivity) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO trade_activity (
             execution_time, symbol, exchange, current_price, trigger_price,
             action, order_id, status, details
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            a.execution_time,
            a.symbol,
            a.exchange.to_string(),
            a.current_price,
            a.trigger_price,
            a.action,
            a.order_id,
            a.status,
            a.details,
        ],
    )?;
    Ok(())
}

pub fn insert_price(conn: &Connection, symbol: &str, price: f64, timestamp: &str) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO stock_prices (symbol, price, timestamp) VALUES (?1, ?2, ?3)",
        params![symbol, price, timestamp],
    )?;
    Ok(())
}

pub fn insert_order(conn: &Connection, o: &OrderRecord) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO orders (symbol, exchange, price, quantity, account_type, order_result)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![o.symbol, o.exchange, o.price, o.quantity as i64, o.account_type, o.order_result],
    )?;
    Ok(())
}

fn write_record(conn: &Connection, record: &ActivityRecord) -> Result<(), StoreError> {
    match record {
        ActivityRecord::Activity(a) => insert_activity(conn, a),
        ActivityRecord::Price { symbol, price, timestamp } => insert_price(conn, symbol, *price, timestamp),
        ActivityRecord::Order(o) => insert_order(conn, o),
    }
}

#[derive(Clone)]
pub struct ActivityLogger {
    sender: mpsc::Sender<ActivityRecord>,
}

impl ActivityLogger {
    /// Opens (or creates) the database and starts the writer thread.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        std::thread::Builder::new()
            .name("activity-store".to_string())
            .spawn(move || writer_loop(conn, receiver))?;
        Ok(Self { sender })
    }

    pub fn log(&self, record: ActivityRecord) {
        if let Err(e) = self.sender.try_send(record) {
            warn!("Activity store buffer full, dropping record: {}", e);
        }
    }
}

fn writer_loop(conn: Connection, mut receiver: mpsc::Receiver<ActivityRecord>) {
    info!("ActivityLogger started");
    while let Some(record) = receiver.blocking_recv() {
        if let Err(e) = write_record(&conn, &record) {
            error!("Failed to store activity: {}", e);
        }
    }
}
