use crate::api::kabu::api::{self, ApiResponseError, Session};
use crate::model::OrderSide;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;

const PATH: &str = "/positions";

// 建玉 (約定単位)
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Position {
    #[serde(rename = "ExecutionID")]
    pub execution_id: Option<String>,
    #[serde(rename = "Symbol")]
    pub symbol: Option<String>,
    #[serde(rename = "SymbolName")]
    pub symbol_name: Option<String>,
    #[serde(rename = "Exchange")]
    pub exchange: Option<u32>,
    #[serde(rename = "Side")]
    pub side: Option<String>,
    #[serde(rename = "LeavesQty", default)]
    pub leaves_qty: f64,
    #[serde(rename = "HoldQty", default)]
    pub hold_qty: f64,
    #[serde(rename = "Price", default)]
    pub price: f64,
    #[serde(rename = "CurrentPrice")]
    pub current_price: Option<f64>,
    #[serde(rename = "ProfitLoss")]
    pub profit_loss: Option<f64>,
}

/// Long holding of one symbol, summed over all of its executions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Holding {
    pub qty: u64,
    pub price: f64,
    pub profit_loss: f64,
}

pub async fn get_positions(session: &Session) -> Result<Vec<Position>, ApiResponseError> {
    api::get::<Vec<Position>>(session, PATH, None).await
}

/// Buy-side holdings per symbol with a quantity-weighted average price.
/// Sell-side and fully closed executions are ignored.
pub fn aggregate_holdings(positions: &[Position]) -> BTreeMap<String, Holding> {
    let mut sums: BTreeMap<String, (f64, f64, f64)> = BTreeMap::new();

    for x in positions {
        let Some(symbol) = x.symbol.as_ref() else {
            continue;
        };
        let is_buy = x
            .side
            .as_deref()
            .and_then(|s| OrderSide::from_str(s).ok())
            .map_or(false, |side| side == OrderSide::Buy);
        if !is_buy || x.leaves_qty <= 0.0 {
            continue;
        }

        let entry = sums.entry(symbol.clone()).or_insert((0.0, 0.0, 0.0));
        entry.0 += x.leaves_qty;
        entry.1 += x.price * x.leaves_qty;
        entry.2 += x.profit_loss.unwrap_or(0.0);
    }

    sums.into_iter()
        .map(|(symbol, (qty, notional, profit_loss))| {
            let holding = Holding {
                qty: qty.round() as u64,
                price: notional / qty,
                profit_loss,
            };
            (symbol, holding)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(symbol: &str, side: &str, qty: f64, price: f64) -> Position {
        Position {
            symbol: Some(symbol.to_string()),
            side: Some(side.to_string()),
            leaves_qty: qty,
            price,
            ..Default::default()
        }
    }

    #[test]
    fn aggregates_with_weighted_price() {
        let positions = vec![
            position("7203", "2", 100.0, 2000.0),
            position("7203", "2", 300.0, 2100.0),
            position("9984", "2", 100.0, 6000.0),
        ];
        let holdings = aggregate_holdings(&positions);
        assert_eq!(holdings.len(), 2);
        let toyota = holdings["7203"];
        assert_eq!(toyota.qty, 400);
        assert!((toyota.price - 2075.0).abs() < 1e-9);
    }

    #[test]
    fn sums_profit_loss_per_symbol() {
        let mut a = position("7203", "2", 100.0, 2000.0);
        a.profit_loss = Some(5000.0);
        let mut b = position("7203", "2", 100.0, 2100.0);
        b.profit_loss = Some(-3000.0);
        let c = position("7203", "2", 100.0, 2050.0);

        let holdings = aggregate_holdings(&[a, b, c]);
        assert_eq!(holdings["7203"].profit_loss, 2000.0);
    }

    #[test]
    fn ignores_sell_side_and_closed() {
        let positions = vec![
            position("7203", "1", 100.0, 2000.0),
            position("9984", "2", 0.0, 6000.0),
        ];
        assert!(aggregate_holdings(&positions).is_empty());
    }

    #[test]
    fn parses_gateway_json() {
        let json = r#"[{"ExecutionID":"E20200924xxxxx","AccountType":4,"Symbol":"9433",
            "SymbolName":"ＫＤＤＩ","Exchange":1,"ExchangeName":"東証１部","Price":3350,
            "LeavesQty":200,"HoldQty":0,"Side":"2","CurrentPrice":3400,"ProfitLoss":10000}]"#;
        let positions: Vec<Position> = serde_json::from_str(json).unwrap();
        assert_eq!(positions[0].leaves_qty, 200.0);
        assert_eq!(positions[0].profit_loss, Some(10000.0));
    }
}
