use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::api::kabu::api::DEFAULT_ENDPOINT;
use crate::strategy::StrategyParams;

// 日足1本
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// kabu STATION の売買区分 ("1" = 売, "2" = 買)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderSide {
    Sell,
    Buy,
}

impl OrderSide {
    pub fn code(&self) -> &'static str {
        match self {
            OrderSide::Sell => "1",
            OrderSide::Buy => "2",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for OrderSide {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(OrderSide::Sell),
            "2" => Ok(OrderSide::Buy),
            _ => Err(()),
        }
    }
}

impl Serialize for OrderSide {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for OrderSide {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        OrderSide::from_str(&s).map_err(|_| serde::de::Error::custom(format!("invalid side: {}", s)))
    }
}

/// FrontOrderType: 10 = 成行, 20 = 指値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn code(&self) -> u32 {
        match self {
            OrderType::Market => 10,
            OrderType::Limit => 20,
        }
    }
}

impl Serialize for OrderType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfPeriod,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::EndOfPeriod => write!(f, "end_of_period"),
        }
    }
}

/// Stop-loss / take-profit decision shared by the backtest and the live loop.
pub fn exit_reason(entry_price: f64, current_price: f64, stop_loss_ratio: f64, take_profit_ratio: f64) -> Option<ExitReason> {
    if entry_price <= 0.0 {
        return None;
    }
    let pnl_ratio = (current_price - entry_price) / entry_price;
    if pnl_ratio <= -stop_loss_ratio {
        Some(ExitReason::StopLoss)
    } else if pnl_ratio >= take_profit_ratio {
        Some(ExitReason::TakeProfit)
    } else {
        None
    }
}

fn default_base_url() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_exchange() -> u32 {
    1
}

fn default_max_positions() -> usize {
    10
}

fn default_risk_per_trade() -> f64 {
    0.02
}

fn default_stop_loss_ratio() -> f64 {
    0.05
}

fn default_take_profit_ratio() -> f64 {
    0.10
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_price_history_len() -> usize {
    100
}

fn default_sma_short() -> usize {
    5
}

fn default_sma_long() -> usize {
    20
}

fn default_rsi_period() -> usize {
    14
}

fn default_rsi_threshold() -> f64 {
    70.0
}

fn default_order_cooldown_secs() -> u64 {
    60
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone)]
pub struct TradingConfig {
    #[serde(default)]
    pub api_password: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_exchange")]
    pub exchange: u32,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,
    #[serde(default = "default_stop_loss_ratio")]
    pub stop_loss_ratio: f64,
    #[serde(default = "default_take_profit_ratio")]
    pub take_profit_ratio: f64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_price_history_len")]
    pub price_history_len: usize,
    #[serde(default = "default_sma_short")]
    pub sma_short: usize,
    #[serde(default = "default_sma_long")]
    pub sma_long: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_rsi_threshold")]
    pub rsi_threshold: f64,
    #[serde(default = "default_order_cooldown_secs")]
    pub order_cooldown_secs: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_true")]
    pub trade_log_enabled: bool,
    #[serde(default)]
    pub activity_db_path: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "io: {}", e),
            ConfigError::Yaml(e) => write!(f, "yaml: {}", e),
            ConfigError::Invalid(reason) => write!(f, "invalid config: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e)
    }
}

impl TradingConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: TradingConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("symbols must not be empty"));
        }
        if self.sma_short == 0 || self.sma_short >= self.sma_long {
            return Err(ConfigError::Invalid("sma_short must be positive and below sma_long"));
        }
        if self.rsi_period == 0 {
            return Err(ConfigError::Invalid("rsi_period must be positive"));
        }
        if self.risk_per_trade <= 0.0 || self.stop_loss_ratio <= 0.0 || self.take_profit_ratio <= 0.0 {
            return Err(ConfigError::Invalid("risk and exit ratios must be positive"));
        }
        if self.price_history_len < self.sma_long + 1 {
            return Err(ConfigError::Invalid("price_history_len must exceed sma_long"));
        }
        Ok(())
    }

    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            sma_short: self.sma_short,
            sma_long: self.sma_long,
            rsi_period: self.rsi_period,
            rsi_threshold: self.rsi_threshold,
        }
    }
}

/// 設定ファイルが無い場合に書き出すテンプレート
pub fn default_config_yaml() -> &'static str {
    r#"# kabu STATION API パスワード (環境変数 KABU_API_PASSWORD でも指定可)
api_password: YOUR_API_PASSWORD
base_url: http://localhost:18080/kabusapi
exchange: 1
symbols:
  - "7203"
  - "9984"
  - "6098"
  - "8035"
  - "4063"
  - "6954"
  - "4502"
  - "8031"
  - "8058"
  - "9432"
max_positions: 10
risk_per_trade: 0.02
stop_loss_ratio: 0.05
take_profit_ratio: 0.10
poll_interval_secs: 10
price_history_len: 100
sma_short: 5
sma_long: 20
rsi_period: 14
rsi_threshold: 70
order_cooldown_secs: 60
log_dir: logs
trade_log_enabled: true
activity_db_path: trade_history.db
"#
}
