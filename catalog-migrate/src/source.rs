//! HTTP client for the source repository read API.
//!
//! Implements [`SourceClient`] over `reqwest`. Credentials come from
//! [`SourceCredential`] and are attached to every request; status codes are
//! mapped onto [`SourceError`] so the core can tell fatal, missing, and
//! transient failures apart.

use async_trait::async_trait;
use catalog_migrate_core::contract::SourceClient;
use catalog_migrate_core::error::SourceError;
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::load_config::SourceCredential;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpSourceClient {
    http: Client,
    credential: SourceCredential,
}

impl HttpSourceClient {
    pub fn new(credential: SourceCredential) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("catalog-migrate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, credential })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn get(&self, url: &Url) -> Result<Vec<u8>, SourceError> {
        let request = self.http.get(url.clone());
        let request = match &self.credential {
            SourceCredential::Cookie(cookie) => request.header(COOKIE, cookie),
            SourceCredential::Bearer(token) => request.bearer_auth(token),
        };
        let transport = |e: reqwest::Error| SourceError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "Source response");
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SourceError::Unauthorized {
                    url: url.to_string(),
                    status: status.as_u16(),
                })
            }
            StatusCode::NOT_FOUND => {
                return Err(SourceError::NotFound {
                    url: url.to_string(),
                })
            }
            s if !s.is_success() => {
                return Err(SourceError::Status {
                    url: url.to_string(),
                    status: s.as_u16(),
                })
            }
            _ => {}
        }
        let body = response.bytes().await.map_err(transport)?;
        Ok(body.to_vec())
    }
}
