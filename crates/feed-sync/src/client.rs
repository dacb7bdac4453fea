//! HTTP client for the contacts feed server.
//!
//! Feed and edit URLs are absolute; the engine builds them from the
//! configured feed root, so the client carries no base URL of its own.

use std::time::Duration;

use async_trait::async_trait;
use contactsync_core::contacts::Entry;
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::engine::FeedTransport;
use crate::error::{FeedSyncError, Result};
use crate::types::{ApiErrorResponse, FeedPage, FeedQuery, RawFeedPage};

/// Default timeout for feed requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

/// Client for the contacts, groups and photo feeds.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
}

impl FeedClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[ContactsSync] Feed response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[ContactsSync] Feed response error ({}): {}", status, preview);
    }

    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn headers(&self, token: &str, content_type: &'static str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));

        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| FeedSyncError::auth("Invalid access token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    fn json_headers(&self, token: &str) -> Result<HeaderMap> {
        self.headers(token, "application/json")
    }

    fn error_from_body(status: reqwest::StatusCode, body: &str) -> FeedSyncError {
        if let Ok(error) = serde_json::from_str::<ApiErrorResponse>(body) {
            return FeedSyncError::api(
                status.as_u16(),
                format!("{}: {}", error.code, error.message),
            );
        }
        FeedSyncError::api(status.as_u16(), format!("Request failed: {}", body))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            return Err(Self::error_from_body(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "[ContactsSync] Failed to deserialize feed response: {}",
                e
            );
            FeedSyncError::from(e)
        })
    }

    /// Check the status of a response whose body is binary or ignored.
    async fn parse_binary_response(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await?;
        Self::log_response(status, &body);
        Err(Self::error_from_body(status, &body))
    }
}

#[async_trait]
impl FeedTransport for FeedClient {
    /// GET {feed}?orderby=lastmodified&sortorder=ascending[&updated-min&showdeleted]
    async fn fetch_feed(&self, token: &str, feed_url: &str, query: &FeedQuery) -> Result<FeedPage> {
        debug!("[ContactsSync] Fetching feed {} {:?}", feed_url, query);

        let response = self
            .client
            .get(feed_url)
            .headers(self.json_headers(token)?)
            .query(&query.to_params())
            .send()
            .await?;

        let raw: RawFeedPage = Self::parse_response(response).await?;
        Ok(raw.into())
    }

    /// POST {create_url}
    async fn create_entry(&self, token: &str, create_url: &str, entry: &Entry) -> Result<Entry> {
        let response = self
            .client
            .post(create_url)
            .headers(self.json_headers(token)?)
            .json(entry)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// PUT {edit_url}
    async fn update_entry(&self, token: &str, edit_url: &str, entry: &Entry) -> Result<Entry> {
        let response = self
            .client
            .put(edit_url)
            .headers(self.json_headers(token)?)
            .json(entry)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// DELETE {edit_url}
    async fn delete_entry(&self, token: &str, edit_url: &str) -> Result<()> {
        let response = self
            .client
            .delete(edit_url)
            .headers(self.json_headers(token)?)
            .send()
            .await?;

        Self::parse_binary_response(response).await?;
        Ok(())
    }

    /// GET {photo_url}
    async fn get_media(&self, token: &str, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .headers(self.headers(token, PHOTO_CONTENT_TYPE)?)
            .send()
            .await?;

        let response = Self::parse_binary_response(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// PUT {photo_edit_url} with the raw image body.
    async fn update_media(&self, token: &str, edit_url: &str, data: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(edit_url)
            .headers(self.headers(token, PHOTO_CONTENT_TYPE)?)
            .body(data)
            .send()
            .await?;

        Self::parse_binary_response(response).await?;
        Ok(())
    }
}
