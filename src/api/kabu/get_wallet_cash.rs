use crate::api::kabu::api::{self, ApiResponseError, Session};
use serde::Deserialize;

const PATH: &str = "/wallet/cash";

// 現物取引余力
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WalletCash {
    #[serde(rename = "StockAccountWallet")]
    pub stock_account_wallet: Option<f64>,
}

pub async fn get_wallet_cash(session: &Session) -> Result<WalletCash, ApiResponseError> {
    api::get::<WalletCash>(session, PATH, None).await
}
