// REST pass-throughs to the platform backend
// One-shot fetches for history and contacts, plus the attachment upload.

use anyhow::{anyhow, Result};
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{Contact, HistoryRecord};

/// Backend base URL the chat endpoints hang off.
pub const DEFAULT_API_URL: &str = "http://localhost:8089/SmartCruit";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Thin HTTP client for the chat's one-shot requests. Fetches are not
/// retried; callers decide how a failure surfaces.
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<RestClient> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow!("failed to create HTTP client: {}", e))?;
        Ok(RestClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// `GET history/{me}/{peer}`: the persisted conversation, in the
    /// backend's own order. Never re-sorted here.
    pub async fn fetch_history(&self, me: &str, peer: &str) -> Result<Vec<HistoryRecord>> {
        let url = self.url(&format!("history/{}/{}", me, peer));
        let response = self.with_auth(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("history fetch returned {}", response.status()));
        }
        Ok(response.json().await?)
    }

    /// `GET conversations/{user}`: prior conversation partners.
    pub async fn fetch_conversations(&self, user_id: &str) -> Result<Vec<Contact>> {
        let url = self.url(&format!("conversations/{}", user_id));
        let response = self.with_auth(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("conversation fetch returned {}", response.status()));
        }
        Ok(response.json().await?)
    }

    /// `POST upload`: multipart attachment upload. Returns the URL the
    /// backend stored the file under.
    pub async fn upload_attachment(&self, filename: &str, bytes: Vec<u8>) -> Result<String> {
        let part = multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = multipart::Form::new().part("file", part);
        let response = self
            .with_auth(self.http.post(self.url("upload")))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("upload returned {}", response.status()));
        }
        let body: UploadResponse = response.json().await?;
        match body.url {
            Some(url) => Ok(url),
            None => Err(anyhow!(
                "upload rejected: {}",
                body.error.unwrap_or_else(|| "no URL in response".to_string())
            )),
        }
    }
}
