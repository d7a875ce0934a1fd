use crate::api::kabu::api::{self, ApiResponseError, Session};
use serde::Deserialize;

// 時価情報・板情報
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "PascalCase")]
pub struct Board {
    pub symbol: Option<String>,
    pub symbol_name: Option<String>,
    pub exchange: Option<u32>,
    pub current_price: Option<f64>,
    pub current_price_time: Option<String>,
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub trading_volume: Option<f64>,
}

impl Board {
    // 約定が無い場合は null または 0 が返る
    pub fn price(&self) -> Option<f64> {
        self.current_price.filter(|p| *p > 0.0)
    }
}

pub fn path(symbol: &str, exchange: u32) -> String {
    format!("/board/{}@{}", symbol, exchange)
}

pub async fn get_board(session: &Session, symbol: &str, exchange: u32) -> Result<Board, ApiResponseError> {
    api::get::<Board>(session, &path(symbol, exchange), None).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_path() {
        assert_eq!(path("7203", 1), "/board/7203@1");
    }

    #[test]
    fn board_price_ignores_missing_and_zero() {
        let board: Board = serde_json::from_str(r#"{"Symbol":"7203","CurrentPrice":null}"#).unwrap();
        assert_eq!(board.price(), None);
        let board: Board = serde_json::from_str(r#"{"Symbol":"7203","CurrentPrice":0}"#).unwrap();
        assert_eq!(board.price(), None);
        let board: Board = serde_json::from_str(r#"{"Symbol":"7203","CurrentPrice":2405.5,"BidPrice":2405}"#).unwrap();
        assert_eq!(board.price(), Some(2405.5));
    }
}
