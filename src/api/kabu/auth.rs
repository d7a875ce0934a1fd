use crate::api::kabu::api::{self, ApiResponseError, Session};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

const PATH: &str = "/token";

pub const API_PASSWORD_ENV: &str = "KABU_API_PASSWORD";

#[derive(Serialize, Debug)]
pub struct TokenParameter<'a> {
    #[serde(rename = "APIPassword")]
    pub api_password: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "Token")]
    pub token: Option<String>,
}

// 環境変数があれば設定ファイルより優先する
pub fn resolve_api_password(configured: &str) -> String {
    match env::var(API_PASSWORD_ENV) {
        Ok(val) if !val.is_empty() => val,
        _ => configured.to_string(),
    }
}

/// Issues a new token and stores it on the session.
pub async fn authenticate(session: &Session, api_password: &str) -> Result<(), ApiResponseError> {
    session.clear_token();

    let parameter = TokenParameter { api_password };
    let response: TokenResponse = api::post_without_token(session, PATH, &parameter).await?;

    match response.token {
        Some(token) if response.result_code == 0 && !token.is_empty() => {
            session.set_token(token);
            info!("API認証成功");
            Ok(())
        }
        _ => Err(ApiResponseError::Rejected(response.result_code)),
    }
}
