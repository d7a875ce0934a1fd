//! kabu STATION API クライアントをモックサーバに対してテストする

use kabu_trader::api::kabu::api::{ApiResponseError, Session};
use kabu_trader::api::kabu::send_order::SendOrderParameter;
use kabu_trader::api::kabu::{auth, get_board, get_positions, get_wallet_cash, send_order};
use kabu_trader::model::{OrderSide, OrderType, TradingConfig};
use kabu_trader::trader::AutoTrader;
use mockito::{Matcher, Server};

fn session_for(server: &Server) -> Session {
    Session::new(reqwest::Client::new(), &format!("{}/kabusapi", server.url()))
}

#[tokio::test]
async fn test_authenticate_stores_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/kabusapi/token")
        .match_body(Matcher::JsonString(r#"{"APIPassword":"secret"}"#.to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ResultCode":0,"Token":"8d7f6b9e"}"#)
        .create_async()
        .await;

    let session = session_for(&server);
    auth::authenticate(&session, "secret").await.unwrap();

    mock.assert_async().await;
    assert_eq!(session.token().as_deref(), Some("8d7f6b9e"));
}

#[tokio::test]
async fn test_authenticate_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/kabusapi/token")
        .with_status(200)
        .with_body(r#"{"ResultCode":4001009,"Token":null}"#)
        .create_async()
        .await;

    let session = session_for(&server);
    session.set_token("stale".to_string());
    let err = auth::authenticate(&session, "wrong").await.unwrap_err();

    assert!(matches!(err, ApiResponseError::Rejected(4001009)));
    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn test_get_board_sends_api_key() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/kabusapi/board/7203@1")
        .match_header("x-api-key", "tok")
        .with_status(200)
        .with_body(r#"{"Symbol":"7203","SymbolName":"トヨタ自動車","Exchange":1,"CurrentPrice":2405.5}"#)
        .create_async()
        .await;

    let session = session_for(&server);
    session.set_token("tok".to_string());
    let board = get_board::get_board(&session, "7203", 1).await.unwrap();

    mock.assert_async().await;
    assert_eq!(board.price(), Some(2405.5));
    assert_eq!(board.symbol_name.as_deref(), Some("トヨタ自動車"));
}

#[tokio::test]
async fn test_request_without_token_is_not_sent() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/kabusapi/wallet/cash")
        .expect(0)
        .create_async()
        .await;

    let session = session_for(&server);
    let err = get_wallet_cash::get_wallet_cash(&session).await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, ApiResponseError::NotAuthenticated));
}

#[tokio::test]
async fn test_unauthorized_error_body() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/kabusapi/positions")
        .with_status(401)
        .with_body(r#"{"Code":4001017,"Message":"トークンが無効です"}"#)
        .create_async()
        .await;

    let session = session_for(&server);
    session.set_token("expired".to_string());
    let err = get_positions::get_positions(&session).await.unwrap_err();

    assert!(err.is_unauthorized());
    match err {
        ApiResponseError::ApiError(status, body) => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(body.code, 4001017);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_positions_and_wallet() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/kabusapi/positions")
        .with_status(200)
        .with_body(
            r#"[{"ExecutionID":"E1","Symbol":"9984","Side":"2","LeavesQty":100,"Price":6000,"CurrentPrice":6100,"ProfitLoss":10000},
                {"ExecutionID":"E2","Symbol":"9984","Side":"2","LeavesQty":0,"Price":5000}]"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/kabusapi/wallet/cash")
        .with_status(200)
        .with_body(r#"{"StockAccountWallet":1500000}"#)
        .create_async()
        .await;

    let session = session_for(&server);
    session.set_token("tok".to_string());

    let positions = get_positions::get_positions(&session).await.unwrap();
    assert_eq!(positions.len(), 2);
    let wallet = get_wallet_cash::get_wallet_cash(&session).await.unwrap();
    assert_eq!(wallet.stock_account_wallet, Some(1_500_000.0));
}

#[tokio::test]
async fn test_send_order_returns_order_id() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/kabusapi/sendorder")
        .match_header("x-api-key", "tok")
        .match_body(Matcher::PartialJsonString(
            r#"{"Symbol":"7203","Side":"2","FrontOrderType":20,"Qty":100,"Price":2400.0,"DelivType":2}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"Result":0,"OrderId":"20240115A02N04738438"}"#)
        .create_async()
        .await;

    let session = session_for(&server);
    session.set_token("tok".to_string());
    let param = SendOrderParameter::cash("pw", "7203", 1, OrderSide::Buy, 100, OrderType::Limit, Some(2400.0));
    let order_id = send_order::send_order(&session, &param).await.unwrap();

    mock.assert_async().await;
    assert_eq!(order_id, "20240115A02N04738438");
}

#[tokio::test]
async fn test_send_order_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/kabusapi/sendorder")
        .with_status(200)
        .with_body(r#"{"Result":4,"OrderId":null}"#)
        .create_async()
        .await;

    let session = session_for(&server);
    session.set_token("tok".to_string());
    let param = SendOrderParameter::cash("pw", "7203", 1, OrderSide::Sell, 100, OrderType::Market, None);
    let err = send_order::send_order(&session, &param).await.unwrap_err();
    assert!(matches!(err, ApiResponseError::Rejected(4)));
}

#[tokio::test]
async fn test_trading_loop_stop_loss_sells_holding() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/kabusapi/token")
        .with_status(200)
        .with_body(r#"{"ResultCode":0,"Token":"tok"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/kabusapi/positions")
        .with_status(200)
        .with_body(r#"[{"Symbol":"7203","Side":"2","LeavesQty":200,"Price":2000}]"#)
        .create_async()
        .await;
    server
        .mock("GET", "/kabusapi/board/7203@1")
        .with_status(200)
        .with_body(r#"{"Symbol":"7203","CurrentPrice":1890}"#)
        .create_async()
        .await;
    let sell = server
        .mock("POST", "/kabusapi/sendorder")
        .match_body(Matcher::PartialJsonString(
            r#"{"Symbol":"7203","Side":"1","FrontOrderType":10,"Qty":200,"Price":0.0,"DelivType":0}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"Result":0,"OrderId":"O1"}"#)
        .expect(1)
        .create_async()
        .await;

    let yaml = format!(
        "api_password: pw\nbase_url: {}/kabusapi\nsymbols: [\"7203\"]\nmax_positions: 1\ntrade_log_enabled: false\n",
        server.url()
    );
    let config = TradingConfig::from_yaml(&yaml).unwrap();
    let mut trader = AutoTrader::new(config).unwrap();

    trader.trading_loop().await;
    assert_eq!(trader.holdings()["7203"].qty, 200);

    // 2周目はクールダウン中なので再発注しない
    trader.trading_loop().await;
    sell.assert_async().await;
}

// ============================================================
// Trading Cycle Tests
// ============================================================

fn cycle_config(server: &Server, symbols: &str, max_positions: usize) -> TradingConfig {
    let yaml = format!(
        "api_password: pw\nbase_url: {}/kabusapi\nsymbols: {}\nmax_positions: {}\n\
         sma_short: 2\nsma_long: 4\nrsi_period: 3\nrsi_threshold: 70\nprice_history_len: 10\n\
         trade_log_enabled: false\n",
        server.url(),
        symbols,
        max_positions
    );
    TradingConfig::from_yaml(&yaml).unwrap()
}

async fn mock_token(server: &mut Server, hits: usize) -> mockito::Mock {
    server
        .mock("POST", "/kabusapi/token")
        .with_status(200)
        .with_body(r#"{"ResultCode":0,"Token":"tok"}"#)
        .expect(hits)
        .create_async()
        .await
}

async fn mock_no_positions(server: &mut Server) {
    server
        .mock("GET", "/kabusapi/positions")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
}

// 1周ごとに板情報の現在値を差し替えて回す
async fn run_cycles(server: &mut Server, trader: &mut AutoTrader, symbol: &str, prices: &[f64]) {
    for price in prices {
        let board = server
            .mock("GET", format!("/kabusapi/board/{}@1", symbol).as_str())
            .with_status(200)
            .with_body(format!(r#"{{"Symbol":"{}","CurrentPrice":{}}}"#, symbol, price))
            .create_async()
            .await;
        trader.trading_loop().await;
        board.remove_async().await;
    }
}

#[tokio::test]
async fn test_trading_loop_golden_cross_sends_limit_buy() {
    let mut server = Server::new_async().await;
    mock_token(&mut server, 1).await;
    mock_no_positions(&mut server).await;
    let wallet = server
        .mock("GET", "/kabusapi/wallet/cash")
        .with_status(200)
        .with_body(r#"{"StockAccountWallet":1000000}"#)
        .expect(1)
        .create_async()
        .await;
    // 1,000,000 * 2% / 10円 = 2000株
    let buy = server
        .mock("POST", "/kabusapi/sendorder")
        .match_body(Matcher::PartialJsonString(
            r#"{"Symbol":"7203","Side":"2","FrontOrderType":20,"Qty":2000,"Price":10.0,"DelivType":2}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"Result":0,"OrderId":"B1"}"#)
        .expect(1)
        .create_async()
        .await;

    let mut trader = AutoTrader::new(cycle_config(&server, r#"["7203"]"#, 10)).unwrap();

    // 5周目までは交差なし、6周目で短期線が長期線を上抜ける
    run_cycles(&mut server, &mut trader, "7203", &[10.0, 9.0, 8.0, 7.0, 6.0]).await;
    assert_eq!(trader.history("7203").map(|h| h.len()), Some(5));
    run_cycles(&mut server, &mut trader, "7203", &[10.0]).await;
    assert_eq!(trader.history("7203").map(|h| h.len()), Some(6));

    // 発注直後はクールダウン中なので板も取らない
    run_cycles(&mut server, &mut trader, "7203", &[10.0]).await;
    assert_eq!(trader.history("7203").map(|h| h.len()), Some(6));

    wallet.assert_async().await;
    buy.assert_async().await;
}

#[tokio::test]
async fn test_trading_loop_pending_entry_fills_last_slot() {
    let mut server = Server::new_async().await;
    mock_token(&mut server, 1).await;
    mock_no_positions(&mut server).await;
    server
        .mock("GET", "/kabusapi/wallet/cash")
        .with_status(200)
        .with_body(r#"{"StockAccountWallet":1000000}"#)
        .create_async()
        .await;
    let buy = server
        .mock("POST", "/kabusapi/sendorder")
        .match_body(Matcher::PartialJsonString(r#"{"Symbol":"7203","Side":"2"}"#.to_string()))
        .with_status(200)
        .with_body(r#"{"Result":0,"OrderId":"B1"}"#)
        .expect(1)
        .create_async()
        .await;
    // 7203 の約定待ちで枠が埋まった後は 9984 を見に行かない
    let other = server
        .mock("GET", "/kabusapi/board/9984@1")
        .with_status(200)
        .with_body(r#"{"Symbol":"9984","CurrentPrice":500}"#)
        .expect(5)
        .create_async()
        .await;

    let mut trader = AutoTrader::new(cycle_config(&server, r#"["7203", "9984"]"#, 1)).unwrap();

    run_cycles(&mut server, &mut trader, "7203", &[10.0, 9.0, 8.0, 7.0, 6.0, 10.0, 10.0]).await;

    assert!(trader.holdings().is_empty());
    assert_eq!(trader.history("9984").map(|h| h.len()), Some(5));
    buy.assert_async().await;
    other.assert_async().await;
}

#[tokio::test]
async fn test_trading_loop_take_profit_sells_holding() {
    let mut server = Server::new_async().await;
    mock_token(&mut server, 1).await;
    server
        .mock("GET", "/kabusapi/positions")
        .with_status(200)
        .with_body(r#"[{"Symbol":"7203","Side":"2","LeavesQty":100,"Price":2000,"ProfitLoss":25000}]"#)
        .create_async()
        .await;
    server
        .mock("GET", "/kabusapi/board/7203@1")
        .with_status(200)
        .with_body(r#"{"Symbol":"7203","CurrentPrice":2250}"#)
        .create_async()
        .await;
    let sell = server
        .mock("POST", "/kabusapi/sendorder")
        .match_body(Matcher::PartialJsonString(
            r#"{"Symbol":"7203","Side":"1","FrontOrderType":10,"Qty":100,"Price":0.0,"DelivType":0}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"Result":0,"OrderId":"S1"}"#)
        .expect(1)
        .create_async()
        .await;
    let wallet = server
        .mock("GET", "/kabusapi/wallet/cash")
        .with_status(200)
        .with_body(r#"{"StockAccountWallet":1000000}"#)
        .expect(0)
        .create_async()
        .await;

    let mut trader = AutoTrader::new(cycle_config(&server, r#"["7203"]"#, 10)).unwrap();
    trader.trading_loop().await;

    assert_eq!(trader.holdings()["7203"].qty, 100);
    // 保有中の銘柄は新規エントリーの対象外
    assert_eq!(trader.history("7203").map(|h| h.len()), Some(0));
    sell.assert_async().await;
    wallet.assert_async().await;
}

#[tokio::test]
async fn test_trading_loop_reauthenticates_after_401() {
    let mut server = Server::new_async().await;
    let token = mock_token(&mut server, 2).await;
    server
        .mock("GET", "/kabusapi/positions")
        .with_status(401)
        .with_body(r#"{"Code":4001017,"Message":"トークンが無効です"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/kabusapi/board/7203@1")
        .with_status(200)
        .with_body(r#"{"Symbol":"7203","CurrentPrice":2000}"#)
        .create_async()
        .await;

    let mut trader = AutoTrader::new(cycle_config(&server, r#"["7203"]"#, 10)).unwrap();

    // 1周目: 初回認証 → 建玉取得が 401 → 次周で再認証
    trader.trading_loop().await;
    trader.trading_loop().await;

    token.assert_async().await;
    assert!(trader.holdings().is_empty());
}
