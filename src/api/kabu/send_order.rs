use crate::api::kabu::api::{self, ApiResponseError, Session};
use crate::model::{OrderSide, OrderType};
use serde::{Deserialize, Serialize};

const PATH: &str = "/sendorder";

const SECURITY_TYPE_STOCK: u32 = 1;
const CASH_MARGIN_CASH: u32 = 1;
const DELIV_TYPE_UNSPECIFIED: u32 = 0;
const DELIV_TYPE_DEPOSIT: u32 = 2;
pub const ACCOUNT_TYPE_SPECIFIC: u32 = 4;
const EXPIRE_TODAY: u32 = 0;

#[derive(Deserialize, Debug)]
pub struct SendOrderResponse {
    #[serde(rename = "Result")]
    pub result: i64,
    #[serde(rename = "OrderId")]
    pub order_id: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
pub struct SendOrderParameter {
    pub password: String,
    pub symbol: String,
    pub exchange: u32,
    pub security_type: u32,
    pub side: OrderSide,
    pub cash_margin: u32,
    pub deliv_type: u32,
    pub fund_type: String,
    pub account_type: u32,
    pub qty: u64,
    pub front_order_type: OrderType,
    pub price: f64,
    pub expire_day: u32,
}

impl SendOrderParameter {
    /// 現物・特定口座の注文。成行は Price 0 で送る
    pub fn cash(password: &str, symbol: &str, exchange: u32, side: OrderSide, qty: u64, order_type: OrderType, price: Option<f64>) -> Self {
        let deliv_type = match side {
            OrderSide::Buy => DELIV_TYPE_DEPOSIT,
            OrderSide::Sell => DELIV_TYPE_UNSPECIFIED,
        };
        let price = match order_type {
            OrderType::Market => 0.0,
            OrderType::Limit => price.unwrap_or(0.0),
        };
        Self {
            password: password.to_string(),
            symbol: symbol.to_string(),
            exchange,
            security_type: SECURITY_TYPE_STOCK,
            side,
            cash_margin: CASH_MARGIN_CASH,
            deliv_type,
            fund_type: "  ".to_string(),
            account_type: ACCOUNT_TYPE_SPECIFIC,
            qty,
            front_order_type: order_type,
            price,
            expire_day: EXPIRE_TODAY,
        }
    }
}

/// Returns the accepted order id.
pub async fn send_order(session: &Session, parameter: &SendOrderParameter) -> Result<String, ApiResponseError> {
    let response: SendOrderResponse = api::post(session, PATH, parameter).await?;
    match response.order_id {
        Some(order_id) if response.result == 0 => Ok(order_id),
        _ => Err(ApiResponseError::Rejected(response.result)),
    }
}
