//! HTTP login API of the hub.
//!
//! Async `reqwest` client for the login, refresh and logout endpoints.

use reqwest::StatusCode;
use serde::Serialize;
use thinghub_protocol::constants::{LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use tracing::debug;

use crate::ClientError;
use crate::config::ClientConfig;

#[derive(Serialize)]
struct LoginRequest<'a> {
    login: &'a str,
    password: &'a str,
}

/// Token endpoints of one hub.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    login_url: String,
    refresh_url: String,
    logout_url: String,
}

impl AuthClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            login_url: config.http_url(LOGIN_PATH),
            refresh_url: config.http_url(REFRESH_PATH),
            logout_url: config.http_url(LOGOUT_PATH),
        }
    }

    /// Exchanges a password for a bearer token.
    pub async fn login(&self, client_id: &str, password: &str) -> Result<String, ClientError> {
        let resp = self
            .http
            .post(&self.login_url)
            .json(&LoginRequest {
                login: client_id,
                password,
            })
            .send()
            .await?;
        debug!(client = %client_id, status = %resp.status(), "login response");
        Ok(check(resp).await?.json().await?)
    }

    /// Exchanges a valid token for a new one.
    pub async fn refresh(&self, token: &str) -> Result<String, ClientError> {
        let resp = self.http.post(&self.refresh_url).bearer_auth(token).send().await?;
        Ok(check_token(resp).await?.json().await?)
    }

    /// Revokes all tokens of the token's client.
    pub async fn logout(&self, token: &str) -> Result<(), ClientError> {
        let resp = self.http.post(&self.logout_url).bearer_auth(token).send().await?;
        check_token(resp).await?;
        Ok(())
    }
}

/// Like [`check`], but a 401 means the presented token is no longer valid.
async fn check_token(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    if resp.status() == StatusCode::UNAUTHORIZED {
        return Err(ClientError::InvalidToken);
    }
    check(resp).await
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Login {
        status: status.as_u16(),
        body,
    })
}
