//! kabu STATION を定期ポーリングする自動売買ループ
//!
//! 1サイクル: 建玉更新 → 損切り/利確判定 → 新規エントリー判定

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use chrono::Local;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::api::kabu::api::{ApiResponseError, Session};
use crate::api::kabu::get_positions::{aggregate_holdings, Holding};
use crate::api::kabu::send_order::{SendOrderParameter, ACCOUNT_TYPE_SPECIFIC};
use crate::api::kabu::{auth, get_board, get_positions, get_wallet_cash, send_order};
use crate::logging::activity_store::{ActivityLogger, ActivityRecord, OrderRecord, TradeActivity};
use crate::logging::trade_logger::{TradeEvent, TradeLogger};
use crate::model::{exit_reason, ExitReason, OrderSide, OrderType, TradingConfig};
use crate::price_history::PriceHistory;
use crate::strategy::{should_buy, StrategyParams};
use crate::util;

pub struct AutoTrader {
    config: TradingConfig,
    api_password: String,
    params: StrategyParams,
    session: Session,
    histories: HashMap<String, PriceHistory>,
    holdings: BTreeMap<String, Holding>,
    // 発注した時刻 (重複発注防止)
    pending: HashMap<String, Instant>,
    needs_auth: bool,
    trade_logger: Option<TradeLogger>,
    activity: Option<ActivityLogger>,
}

impl AutoTrader {
    /// Must be called inside a tokio runtime when trade logging is enabled.
    pub fn new(config: TradingConfig) -> Result<Self, ApiResponseError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let session = Session::new(client, &config.base_url);

        let trade_logger = if config.trade_log_enabled {
            Some(TradeLogger::new(&config.log_dir))
        } else {
            None
        };

        let activity = match config.activity_db_path.as_deref() {
            Some(path) => match ActivityLogger::open(Path::new(path)) {
                Ok(logger) => Some(logger),
                Err(e) => {
                    warn!("Activity store disabled ({}): {}", path, e);
                    None
                }
            },
            None => None,
        };

        let histories = config
            .symbols
            .iter()
            .map(|s| (s.clone(), PriceHistory::new(config.price_history_len)))
            .collect();

        Ok(Self {
            api_password: auth::resolve_api_password(&config.api_password),
            params: config.strategy_params(),
            session,
            histories,
            holdings: BTreeMap::new(),
            pending: HashMap::new(),
            needs_auth: true,
            trade_logger,
            activity,
            config,
        })
    }

    pub fn holdings(&self) -> &BTreeMap<String, Holding> {
        &self.holdings
    }

    pub fn history(&self, symbol: &str) -> Option<&PriceHistory> {
        self.histories.get(symbol)
    }

    /// Authenticates, then polls until Ctrl-C.
    pub async fn start(&mut self) -> Result<(), ApiResponseError> {
        if let Err(e) = self.authenticate().await {
            error!("API認証に失敗しました: {}", e);
            return Err(e);
        }

        info!(
            "自動売買開始: {} 銘柄, 最大 {} ポジション, {}秒間隔",
            self.config.symbols.len(),
            self.config.max_positions,
            self.config.poll_interval_secs
        );

        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            self.trading_loop().await;

            tokio::select! {
                _ = &mut shutdown => {
                    info!("停止要求を受け付けました");
                    break;
                }
                _ = sleep(interval) => {}
            }
        }
        Ok(())
    }

    async fn authenticate(&mut self) -> Result<(), ApiResponseError> {
        auth::authenticate(&self.session, &self.api_password).await?;
        self.needs_auth = false;
        Ok(())
    }

    /// One polling cycle. Errors are logged per symbol and never abort the cycle.
    pub async fn trading_loop(&mut self) {
        if self.needs_auth {
            info!("トークン再発行");
            if let Err(e) = self.authenticate().await {
                error!("API認証に失敗しました: {}", e);
                return;
            }
        }

        let cooldown = self.cooldown();
        prune_pending(&mut self.pending, Instant::now(), cooldown);

        self.update_positions().await;
        self.check_exit_signals().await;
        self.check_entry_signals().await;
    }

    fn cooldown(&self) -> Duration {
        Duration::from_secs(self.config.order_cooldown_secs)
    }

    fn note_error(&mut self, context: &str, e: &ApiResponseError) {
        if e.is_unauthorized() {
            warn!("{}: token rejected, re-authenticating next cycle", context);
            self.needs_auth = true;
        } else {
            error!("{}: {}", context, e);
        }
    }

    /// Replaces the holdings snapshot; a failed fetch keeps the previous one.
    pub async fn update_positions(&mut self) {
        match get_positions::get_positions(&self.session).await {
            Ok(positions) => {
                self.holdings = aggregate_holdings(&positions);
                debug!("保有銘柄: {:?}", self.holdings.keys().collect::<Vec<_>>());
            }
            Err(e) => self.note_error("建玉取得エラー", &e),
        }
    }

    pub async fn check_exit_signals(&mut self) {
        let held: Vec<(String, Holding)> = self.holdings.iter().map(|(s, h)| (s.clone(), *h)).collect();

        for (symbol, holding) in held {
            if in_cooldown(&self.pending, &symbol, Instant::now(), self.cooldown()) {
                debug!("{}: 発注済みのためスキップ", symbol);
                continue;
            }

            let board = match get_board::get_board(&self.session, &symbol, self.config.exchange).await {
                Ok(board) => board,
                Err(e) => {
                    self.note_error(&format!("{} 板情報取得エラー", symbol), &e);
                    continue;
                }
            };
            let Some(price) = board.price() else {
                continue;
            };

            let Some(reason) = exit_reason(holding.price, price, self.config.stop_loss_ratio, self.config.take_profit_ratio) else {
                continue;
            };
            let pnl_ratio = util::pnl_ratio(holding.price, price);

            match reason {
                ExitReason::StopLoss => info!(
                    "損切り: {} {:.2}% (評価損益 {})",
                    symbol,
                    pnl_ratio * 100.0,
                    holding.profit_loss
                ),
                _ => info!(
                    "利確: {} {:.2}% (評価損益 {})",
                    symbol,
                    pnl_ratio * 100.0,
                    holding.profit_loss
                ),
            }
            self.log_trade(exit_event(reason, &symbol, &holding, price, pnl_ratio));

            self.place_order(&symbol, OrderSide::Sell, holding.qty, OrderType::Market, price, &reason.to_string())
                .await;
        }
    }

    pub async fn check_entry_signals(&mut self) {
        let now = Instant::now();
        let symbols = self.config.symbols.clone();

        for symbol in symbols {
            let slots = open_slots(&self.holdings, &self.pending, now, self.cooldown(), self.config.max_positions);
            if slots == 0 {
                debug!("最大ポジション数に到達");
                break;
            }
            if self.holdings.contains_key(&symbol) || in_cooldown(&self.pending, &symbol, now, self.cooldown()) {
                continue;
            }

            let board = match get_board::get_board(&self.session, &symbol, self.config.exchange).await {
                Ok(board) => board,
                Err(e) => {
                    self.note_error(&format!("{} 板情報取得エラー", symbol), &e);
                    continue;
                }
            };
            let Some(price) = board.price() else {
                debug!("{}: 現在値なし", symbol);
                continue;
            };

            self.log_activity(ActivityRecord::Price {
                symbol: symbol.clone(),
                price,
                timestamp: Local::now().to_rfc3339(),
            });

            let capacity = self.config.price_history_len;
            let prices = {
                let history = self
                    .histories
                    .entry(symbol.clone())
                    .or_insert_with(|| PriceHistory::new(capacity));
                history.push(price);
                history.to_vec()
            };
            debug!("{}: {} (履歴 {}件)", symbol, price, prices.len());

            if should_buy(&prices, &self.params) {
                info!("買いシグナル: {} @ {}", symbol, price);
                self.enter_position(&symbol, price).await;
            }
        }
    }

    /// Sizes a limit buy from the cash balance and sends it.
    pub async fn enter_position(&mut self, symbol: &str, price: f64) {
        let cash = match get_wallet_cash::get_wallet_cash(&self.session).await {
            Ok(wallet) => wallet.stock_account_wallet.unwrap_or(0.0),
            Err(e) => {
                self.note_error("余力取得エラー", &e);
                return;
            }
        };

        let qty = util::position_qty(cash, self.config.risk_per_trade, price);
        if qty == 0 {
            info!("{}: 余力不足 (cash={}, price={})", symbol, cash, price);
            return;
        }

        self.place_order(symbol, OrderSide::Buy, qty, OrderType::Limit, price, "entry").await;
    }

    async fn place_order(&mut self, symbol: &str, side: OrderSide, qty: u64, order_type: OrderType, price: f64, action: &str) {
        let parameter = SendOrderParameter::cash(
            &self.api_password,
            symbol,
            self.config.exchange,
            side,
            qty,
            order_type,
            Some(price),
        );
        let timestamp = Local::now().to_rfc3339();
        let result = send_order::send_order(&self.session, &parameter).await;

        let (order_id, status, details) = match &result {
            Ok(order_id) => {
                info!("注文成功: {} {:?} {}株 OrderId={}", symbol, side, qty, order_id);
                self.pending.insert(symbol.to_string(), Instant::now());
                self.log_trade(TradeEvent::OrderSent {
                    timestamp: timestamp.clone(),
                    symbol: symbol.to_string(),
                    order_id: order_id.clone(),
                    side,
                    price: parameter.price,
                    qty,
                });
                (Some(order_id.clone()), "SUCCESS", None)
            }
            Err(e) => {
                self.log_trade(TradeEvent::OrderFailed {
                    timestamp: timestamp.clone(),
                    symbol: symbol.to_string(),
                    side,
                    price: parameter.price,
                    qty,
                    error: e.to_string(),
                });
                (None, "FAILED", Some(e.to_string()))
            }
        };

        self.log_activity(ActivityRecord::Order(OrderRecord {
            symbol: symbol.to_string(),
            exchange: self.config.exchange,
            price: parameter.price,
            quantity: qty,
            account_type: ACCOUNT_TYPE_SPECIFIC,
            order_result: match &result {
                Ok(order_id) => order_id.clone(),
                Err(e) => e.to_string(),
            },
        }));
        self.log_activity(ActivityRecord::Activity(TradeActivity {
            execution_time: timestamp,
            symbol: symbol.to_string(),
            exchange: self.config.exchange,
            current_price: Some(price),
            trigger_price: None,
            action: action.to_string(),
            order_id,
            status: status.to_string(),
            details,
        }));

        if let Err(e) = result {
            self.note_error(&format!("{} 注文エラー", symbol), &e);
        }
    }

    fn log_trade(&self, event: TradeEvent) {
        if let Some(logger) = &self.trade_logger {
            logger.log(event);
        }
    }

    fn log_activity(&self, record: ActivityRecord) {
        if let Some(logger) = &self.activity {
            logger.log(record);
        }
    }
}

fn exit_event(reason: ExitReason, symbol: &str, holding: &Holding, price: f64, pnl_ratio: f64) -> TradeEvent {
    let timestamp = Local::now().to_rfc3339();
    match reason {
        ExitReason::StopLoss => TradeEvent::StopLoss {
            timestamp,
            symbol: symbol.to_string(),
            entry_price: holding.price,
            price,
            qty: holding.qty,
            pnl_ratio,
        },
        _ => TradeEvent::TakeProfit {
            timestamp,
            symbol: symbol.to_string(),
            entry_price: holding.price,
            price,
            qty: holding.qty,
            pnl_ratio,
        },
    }
}

pub fn in_cooldown(pending: &HashMap<String, Instant>, symbol: &str, now: Instant, cooldown: Duration) -> bool {
    pending
        .get(symbol)
        .map_or(false, |sent| now.saturating_duration_since(*sent) < cooldown)
}

pub fn prune_pending(pending: &mut HashMap<String, Instant>, now: Instant, cooldown: Duration) {
    pending.retain(|_, sent| now.saturating_duration_since(*sent) < cooldown);
}

// 約定待ちの新規注文も枠を消費する
pub fn open_slots(
    holdings: &BTreeMap<String, Holding>,
    pending: &HashMap<String, Instant>,
    now: Instant,
    cooldown: Duration,
    max_positions: usize,
) -> usize {
    let pending_entries = pending
        .keys()
        .filter(|s| !holdings.contains_key(*s) && in_cooldown(pending, s, now, cooldown))
        .count();
    max_positions.saturating_sub(holdings.len() + pending_entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(qty: u64, price: f64) -> Holding {
        Holding { qty, price, profit_loss: 0.0 }
    }

    #[test]
    fn cooldown_expires() {
        let start = Instant::now();
        let mut pending = HashMap::new();
        pending.insert("7203".to_string(), start);
        let cooldown = Duration::from_secs(60);

        assert!(in_cooldown(&pending, "7203", start + Duration::from_secs(10), cooldown));
        assert!(!in_cooldown(&pending, "7203", start + Duration::from_secs(60), cooldown));
        assert!(!in_cooldown(&pending, "9984", start, cooldown));

        prune_pending(&mut pending, start + Duration::from_secs(61), cooldown);
        assert!(pending.is_empty());
    }

    #[test]
    fn zero_cooldown_never_blocks() {
        let now = Instant::now();
        let mut pending = HashMap::new();
        pending.insert("7203".to_string(), now);
        assert!(!in_cooldown(&pending, "7203", now, Duration::ZERO));
    }

    #[test]
    fn pending_entries_consume_slots() {
        let now = Instant::now();
        let cooldown = Duration::from_secs(60);
        let mut holdings = BTreeMap::new();
        holdings.insert("7203".to_string(), holding(100, 2000.0));

        let mut pending = HashMap::new();
        // 保有銘柄の決済注文は枠を二重に数えない
        pending.insert("7203".to_string(), now);
        pending.insert("9984".to_string(), now);

        assert_eq!(open_slots(&holdings, &pending, now, cooldown, 3), 1);
        assert_eq!(open_slots(&holdings, &pending, now, cooldown, 2), 0);
        assert_eq!(open_slots(&holdings, &pending, now, cooldown, 1), 0);
    }

    #[test]
    fn exit_event_kind_follows_reason() {
        let h = holding(200, 2000.0);
        match exit_event(ExitReason::StopLoss, "7203", &h, 1900.0, -0.05) {
            TradeEvent::StopLoss { qty, entry_price, .. } => {
                assert_eq!(qty, 200);
                assert_eq!(entry_price, 2000.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            exit_event(ExitReason::TakeProfit, "7203", &h, 2200.0, 0.1),
            TradeEvent::TakeProfit { .. }
        ));
    }

    #[tokio::test]
    async fn new_trader_starts_unauthenticated() {
        let mut config = TradingConfig::from_yaml(crate::model::default_config_yaml()).unwrap();
        config.trade_log_enabled = false;
        config.activity_db_path = None;
        let trader = AutoTrader::new(config).unwrap();
        assert!(trader.needs_auth);
        assert!(trader.holdings().is_empty());
        assert_eq!(trader.history("7203").map(|h| h.is_empty()), Some(true));
        assert!(trader.history("0000").is_none());
    }
}
