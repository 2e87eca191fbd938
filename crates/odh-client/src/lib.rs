//! Bearer-token HTTP access to the target catalog API and the source feed.

use std::time::Duration;

use anyhow::Context;
use reqwest::header::{AUTHORIZATION, RANGE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "odh-client";

/// Error text the target API returns when a publication level is already at
/// the requested value. Such errors count as success.
const LEVEL_ALREADY_SET_MARKER: &str = "already has its publication level set to";

const REMOTE_INDEX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub token_url: String,
    pub source_url: String,
    pub client_key: String,
    pub client_secret: String,
    pub organization_id: String,
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http status {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },
    #[error("failed to acquire access token: {0}")]
    Auth(String),
    #[error("unexpected response from {url}: {reason}")]
    Protocol { url: String, reason: String },
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

/// True for the error body the API sends when a dataset already carries the
/// requested publication level.
pub fn is_level_already_set(error: &ApiError) -> bool {
    matches!(error, ApiError::Status { body, .. } if body.contains(LEVEL_ALREADY_SET_MARKER))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PagedResponse<T> {
    data: Vec<T>,
}

/// One dataset entry of the remote catalog index.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDataset {
    pub id: String,
    #[serde(default)]
    pub identifiers: Vec<String>,
}

/// Authenticated API client. The bearer token is shared mutable state behind
/// a mutex; a 401 triggers one reacquire-and-retry per call. Concurrent tasks
/// may each refresh during mass expiry, which is redundant but harmless.
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    token: Mutex<String>,
}

impl ApiClient {
    /// Builds the HTTP client and acquires the first token. A failure here is
    /// fatal for the whole run.
    pub async fn connect(config: ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building http client")?;
        let token = Self::acquire_token(&http, &config)
            .await
            .context("acquiring initial access token")?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(token),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn acquire_token(http: &reqwest::Client, config: &ClientConfig) -> Result<String, ApiError> {
        let response = http
            .post(&config.token_url)
            .basic_auth(&config.client_key, Some(&config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("token endpoint returned {status}: {body}")));
        }
        let token: TokenResponse = response.json().await?;
        Ok(format!("Bearer {}", token.access_token))
    }

    async fn refresh_token(&self) -> Result<String, ApiError> {
        let token = Self::acquire_token(&self.http, &self.config).await?;
        *self.token.lock().await = token.clone();
        Ok(token)
    }

    async fn token(&self) -> String {
        self.token.lock().await.clone()
    }

    /// Issues an authenticated request. On 401 the token is reacquired exactly
    /// once and the request retried once; any other non-success status maps to
    /// [`ApiError::Status`]. Every authenticated endpoint goes through here.
    pub async fn execute<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.token().await;
        let response = build(&self.http).header(AUTHORIZATION, token.as_str()).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check(response).await;
        }
        debug!("received 401, reacquiring access token");
        let token = self.refresh_token().await?;
        let response = build(&self.http).header(AUTHORIZATION, token.as_str()).send().await?;
        Self::check(response).await
    }

    async fn check(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            url,
            body,
        })
    }

    async fn body_id(response: Response) -> Result<Option<String>, ApiError> {
        let body = response.text().await?;
        let id = body.trim().trim_matches('"').to_string();
        Ok(if id.is_empty() { None } else { Some(id) })
    }

    /// Fetches the remote catalog index for the configured organization via
    /// full pagination.
    pub async fn list_datasets(&self) -> Result<Vec<RemoteDataset>, ApiError> {
        let url = format!("{}/datasets", self.config.api_base_url);
        let page_size = REMOTE_INDEX_PAGE_SIZE.to_string();
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let page_number = page.to_string();
            let response = self
                .execute(|http| {
                    http.get(&url).query(&[
                        ("publisherIdentifier", self.config.organization_id.as_str()),
                        ("pageSize", page_size.as_str()),
                        ("page", page_number.as_str()),
                    ])
                })
                .await?;
            let batch: PagedResponse<RemoteDataset> = response.json().await?;
            if batch.data.is_empty() {
                break;
            }
            all.extend(batch.data);
            page += 1;
        }
        debug!(datasets = all.len(), "fetched remote catalog index");
        Ok(all)
    }

    pub async fn get_dataset(&self, dataset_id: &str) -> Result<serde_json::Value, ApiError> {
        let url = format!("{}/datasets/{dataset_id}", self.config.api_base_url);
        let response = self.execute(|http| http.get(&url)).await?;
        Ok(response.json().await?)
    }

    /// Submits a new dataset. The response body is the created remote id.
    pub async fn create_dataset(&self, payload: &serde_json::Value) -> Result<String, ApiError> {
        let url = format!("{}/datasets", self.config.api_base_url);
        let response = self.execute(|http| http.post(&url).json(payload)).await?;
        Self::body_id(response).await?.ok_or_else(|| ApiError::Protocol {
            url,
            reason: "create returned an empty body instead of a dataset id".to_string(),
        })
    }

    /// Replaces an existing dataset. Returns the id echoed by the API, if any.
    pub async fn update_dataset(
        &self,
        dataset_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Option<String>, ApiError> {
        let url = format!("{}/datasets/{dataset_id}", self.config.api_base_url);
        let response = self.execute(|http| http.put(&url).json(payload)).await?;
        Self::body_id(response).await
    }

    pub async fn delete_dataset(&self, dataset_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/datasets/{dataset_id}", self.config.api_base_url);
        self.execute(|http| http.delete(&url)).await?;
        Ok(())
    }

    /// Changes the publication level. An error stating the level is already at
    /// the requested value is swallowed as success.
    pub async fn set_publication_level(&self, dataset_id: &str, level: &str) -> Result<(), ApiError> {
        let url = format!(
            "{}/datasets/{dataset_id}/publication-level",
            self.config.api_base_url
        );
        match self
            .execute(|http| http.put(&url).query(&[("level", level)]))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_level_already_set(&err) => {
                debug!(dataset_id, level, "publication level already set");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    pub async fn set_registration_status(&self, dataset_id: &str, status: &str) -> Result<(), ApiError> {
        let url = format!(
            "{}/datasets/{dataset_id}/registration-status",
            self.config.api_base_url
        );
        self.execute(|http| http.put(&url).query(&[("status", status)]))
            .await?;
        Ok(())
    }

    /// Deletes any structure attached to a dataset. A 404 means there was
    /// nothing to delete and counts as success.
    pub async fn delete_structures(&self, dataset_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/datasets/{dataset_id}/structures", self.config.api_base_url);
        match self.execute(|http| http.delete(&url)).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Uploads a Turtle shape document as multipart form data.
    pub async fn upload_structure(&self, dataset_id: &str, turtle: &str) -> Result<(), ApiError> {
        let url = format!(
            "{}/datasets/{dataset_id}/structures/imports",
            self.config.api_base_url
        );
        let turtle = turtle.to_string();
        self.execute(|http| {
            let part = reqwest::multipart::Part::text(turtle.clone())
                .file_name("structure.ttl")
                .mime_str("text/turtle")
                .expect("text/turtle is a valid mime type");
            http.post(&url)
                .multipart(reqwest::multipart::Form::new().part("file", part))
        })
        .await?;
        Ok(())
    }

    /// Fetches one page of the source catalog feed. The feed is public; no
    /// bearer token is attached.
    pub async fn fetch_source_page(&self, skip: u64, limit: u64) -> Result<Vec<u8>, ApiError> {
        let response = self
            .http
            .get(&self.config.source_url)
            .query(&[("skip", skip), ("limit", limit)])
            .send()
            .await?;
        let response = Self::check(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetches at most `limit` bytes from `url` via a ranged request. Servers
    /// ignoring the range header still work; the body is truncated locally.
    pub async fn fetch_prefix(&self, url: &str, limit: u64) -> Result<Vec<u8>, ApiError> {
        let response = self
            .http
            .get(url)
            .header(RANGE, format!("bytes=0-{}", limit.saturating_sub(1)))
            .send()
            .await?;
        let response = Self::check(response).await?;
        let mut body = response.bytes().await?.to_vec();
        if body.len() as u64 > limit {
            warn!(url, limit, received = body.len(), "range header ignored, truncating");
            body.truncate(limit as usize);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_already_set_error_is_recognized() {
        let err = ApiError::Status {
            status: 400,
            url: "https://api.example/datasets/1/publication-level".to_string(),
            body: "The resource already has its publication level set to Internal".to_string(),
        };
        assert!(is_level_already_set(&err));

        let other = ApiError::Status {
            status: 400,
            url: "https://api.example/datasets/1/publication-level".to_string(),
            body: "level transition not allowed".to_string(),
        };
        assert!(!is_level_already_set(&other));
    }

    #[test]
    fn not_found_is_only_matched_on_status_errors() {
        let missing = ApiError::Status {
            status: 404,
            url: "https://api.example/datasets/1/structures".to_string(),
            body: String::new(),
        };
        assert!(missing.is_not_found());
        assert!(!ApiError::Auth("nope".to_string()).is_not_found());
    }

    #[test]
    fn token_response_parses_access_token() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":300}"#).unwrap();
        assert_eq!(parsed.access_token, "abc");
    }
}
