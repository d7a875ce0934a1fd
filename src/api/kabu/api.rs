extern crate hyper;

use hyper::header::{HeaderMap, HeaderName, CONTENT_TYPE};
use hyper::http::HeaderValue;
use parking_lot::RwLock;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, error};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:18080/kabusapi";
const API_KEY_HEADER: &str = "x-api-key";

/// Connection to the kabu STATION gateway: shared HTTP client, base URL and
/// the API token obtained from `/token`.
#[derive(Debug)]
pub struct Session {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl Session {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set_token(&self, token: String) {
        *self.token.write() = Some(token);
    }

    pub fn clear_token(&self) {
        *self.token.write() = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }
}

/// Error body returned by the gateway on non-2xx responses.
#[derive(Deserialize, Debug, Clone)]
pub struct ApiErrorBody {
    #[serde(rename = "Code")]
    pub code: i64,
    #[serde(rename = "Message")]
    pub message: String,
}

#[derive(Debug)]
pub enum ApiResponseError {
    NotAuthenticated,
    InvalidHeader(String),
    Reqwest(reqwest::Error),
    StatusCode(StatusCode),
    ApiError(StatusCode, ApiErrorBody),
    Rejected(i64),
    UrlParse(url::ParseError),
    Deserialize(serde_json::Error),
}

impl ApiResponseError {
    /// The token was rejected; a new one must be issued.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiResponseError::NotAuthenticated
                | ApiResponseError::StatusCode(StatusCode::UNAUTHORIZED)
                | ApiResponseError::ApiError(StatusCode::UNAUTHORIZED, _)
        )
    }
}

impl fmt::Display for ApiResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiResponseError::NotAuthenticated => write!(f, "not authenticated"),
            ApiResponseError::InvalidHeader(s) => write!(f, "invalid header: {}", s),
            ApiResponseError::Reqwest(e) => write!(f, "http: {}", e),
            ApiResponseError::StatusCode(s) => write!(f, "status {}", s),
            ApiResponseError::ApiError(s, body) => write!(f, "status {} code {}: {}", s, body.code, body.message),
            ApiResponseError::Rejected(code) => write!(f, "rejected with result {}", code),
            ApiResponseError::UrlParse(e) => write!(f, "url: {}", e),
            ApiResponseError::Deserialize(e) => write!(f, "json: {}", e),
        }
    }
}

impl std::error::Error for ApiResponseError {}

impl From<serde_json::Error> for ApiResponseError {
    fn from(error: serde_json::Error) -> Self {
        ApiResponseError::Deserialize(error)
    }
}

impl From<StatusCode> for ApiResponseError {
    fn from(e: StatusCode) -> ApiResponseError {
        ApiResponseError::StatusCode(e)
    }
}

impl From<reqwest::Error> for ApiResponseError {
    fn from(e: reqwest::Error) -> ApiResponseError {
        ApiResponseError::Reqwest(e)
    }
}

impl From<url::ParseError> for ApiResponseError {
    fn from(e: url::ParseError) -> ApiResponseError {
        ApiResponseError::UrlParse(e)
    }
}

async fn handle_response<T: serde::de::DeserializeOwned + std::fmt::Debug>(
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<T, ApiResponseError> {
    let response = response?;
    let status = response.status();
    let response_text = response.text().await?;

    debug!("API response: {}", response_text);

    if status.is_success() {
        let parsed_response: T = serde_json::from_str(&response_text)?;
        Ok(parsed_response)
    } else {
        let error = match serde_json::from_str::<ApiErrorBody>(&response_text) {
            Ok(body) => ApiResponseError::ApiError(status, body),
            Err(_) => ApiResponseError::from(status),
        };
        error!("API error: {:?}", error);
        Err(error)
    }
}

fn make_url(session: &Session, path: &str, query: Option<&[(&str, String)]>) -> Result<Url, ApiResponseError> {
    let url_str = format!("{}{}", session.base_url(), path);
    let url = match query {
        Some(q) => Url::parse_with_params(&url_str, q)?,
        None => Url::parse(&url_str)?,
    };
    Ok(url)
}

fn make_http_header(token: Option<&str>) -> Result<HeaderMap, ApiResponseError> {
    let mut header = HeaderMap::new();
    header.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some(token) = token {
        let val = HeaderValue::from_str(token)
            .map_err(|e| ApiResponseError::InvalidHeader(e.to_string()))?;
        header.insert(HeaderName::from_static(API_KEY_HEADER), val);
    }

    Ok(header)
}

fn auth_header(session: &Session) -> Result<HeaderMap, ApiResponseError> {
    let token = session.token().ok_or(ApiResponseError::NotAuthenticated)?;
    make_http_header(Some(&token))
}

pub async fn get<T: serde::de::DeserializeOwned + std::fmt::Debug>(
    session: &Session,
    path: &str,
    query: Option<&[(&str, String)]>,
) -> Result<T, ApiResponseError> {
    let header = auth_header(session)?;
    let url = make_url(session, path, query)?;

    let get = session.client.get(url).headers(header).send().await;
    handle_response(get).await
}

pub async fn post<T: serde::Serialize, U: serde::de::DeserializeOwned + std::fmt::Debug>(
    session: &Session,
    path: &str,
    body: &T,
) -> Result<U, ApiResponseError> {
    let header = auth_header(session)?;
    let url = make_url(session, path, None)?;

    let post = session.client.post(url).headers(header).json(body).send().await;
    handle_response(post).await
}

// トークン発行のみ X-API-KEY なしで呼ぶ
pub async fn post_without_token<T: serde::Serialize, U: serde::de::DeserializeOwned + std::fmt::Debug>(
    session: &Session,
    path: &str,
    body: &T,
) -> Result<U, ApiResponseError> {
    let header = make_http_header(None)?;
    let url = make_url(session, path, None)?;

    let post = session.client.post(url).headers(header).json(body).send().await;
    handle_response(post).await
}
