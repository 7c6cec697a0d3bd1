//! HTTP client for the target document store.
//!
//! [`DocumentStoreClient`] implements the core [`TargetStore`] trait against
//! two endpoints:
//!
//! - the content API (`{content_url}/source/{org}/{repo}/{path}`), used for
//!   existence checks (`HEAD`) and multipart uploads (`POST`, part `data`);
//! - the admin API (`{admin_url}/{preview|live}/{org}/{repo}/{branch}/{path}`),
//!   used for the two-phase release. Page paths are released without their
//!   `.html` extension; sheets keep `.json`.
//!
//! Every request carries the bearer token from `TARGET_AUTH_TOKEN`.

use async_trait::async_trait;
use catalog_migrate_core::contract::TargetStore;
use catalog_migrate_core::error::TargetError;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use crate::load_config::TargetSection;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct DocumentStoreClient {
    http: Client,
    token: String,
    content_url: String,
    admin_url: String,
    org: String,
    repo: String,
    branch: String,
}

impl DocumentStoreClient {
    pub fn new(target: &TargetSection, token: impl Into<String>) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("catalog-migrate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        info!(
            org = %target.org,
            repo = %target.repo,
            branch = %target.branch,
            "Initialised document store client"
        );
        Ok(Self {
            http,
            token: token.into(),
            content_url: target.content_url.trim_end_matches('/').to_string(),
            admin_url: target.admin_url.trim_end_matches('/').to_string(),
            org: target.org.clone(),
            repo: target.repo.clone(),
            branch: target.branch.clone(),
        })
    }

    pub fn source_url(&self, path: &str) -> String {
        format!(
            "{}/source/{}/{}/{}",
            self.content_url,
            self.org,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    /// `stage` is `preview` or `live`.
    pub fn release_url(&self, stage: &str, path: &str) -> String {
        let path = path.trim_start_matches('/');
        let path = path.strip_suffix(".html").unwrap_or(path);
        format!(
            "{}/{stage}/{}/{}/{}/{path}",
            self.admin_url, self.org, self.repo, self.branch
        )
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, TargetError> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| TargetError::Transport {
                path: path.to_string(),
                message: e.to_string(),
            })
    }

    async fn release(&self, stage: &str, path: &str) -> Result<(), TargetError> {
        let url = self.release_url(stage, path);
        let response = self.send(path, self.http.post(&url)).await?;
        check(path, response).await?;
        debug!(path, stage, "Released document");
        Ok(())
    }
}

/// Maps a non-success response onto [`TargetError`], keeping the body as message.
async fn check(path: &str, response: Response) -> Result<Response, TargetError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TargetError::Unauthorized {
            path: path.to_string(),
            status: status.as_u16(),
        });
    }
    let message = response.text().await.unwrap_or_default();
    Err(TargetError::Status {
        path: path.to_string(),
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl TargetStore for DocumentStoreClient {
    async fn exists(&self, path: &str) -> Result<bool, TargetError> {
        let response = self.send(path, self.http.head(self.source_url(path))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check(path, response).await.map(|_| true)
    }

    async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<(), TargetError> {
        let file_name = path.rsplit('/').next().unwrap_or(path).to_string();
        let part = Part::bytes(content.to_vec())
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(|e| TargetError::Transport {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        let form = Form::new().part("data", part);
        let request = self.http.post(self.source_url(path)).multipart(form);
        check(path, self.send(path, request).await?).await?;
        debug!(path, content_type, bytes = content.len(), "Uploaded document");
        Ok(())
    }

    async fn preview(&self, path: &str) -> Result<(), TargetError> {
        self.release("preview", path).await
    }

    async fn publish(&self, path: &str) -> Result<(), TargetError> {
        self.release("live", path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetSection {
        TargetSection {
            org: "acme".into(),
            repo: "site".into(),
            branch: "main".into(),
            destination: "catalogs".into(),
            sub_folder: "sub-catalogs".into(),
            content_url: "https://content.test/".into(),
            admin_url: "https://admin.test".into(),
        }
    }

    #[test]
    fn builds_content_and_release_urls() {
        let client = DocumentStoreClient::new(&target(), "token").unwrap();
        assert_eq!(
            client.source_url("/catalogs/a.json"),
            "https://content.test/source/acme/site/catalogs/a.json"
        );
        assert_eq!(
            client.release_url("preview", "catalogs/a.html"),
            "https://admin.test/preview/acme/site/main/catalogs/a"
        );
        assert_eq!(
            client.release_url("live", "catalogs/a.json"),
            "https://admin.test/live/acme/site/main/catalogs/a.json"
        );
    }
}
