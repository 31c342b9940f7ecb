//! X (Twitter) API client.
//!
//! Media goes through the v1.1 upload endpoint (multipart), posts through
//! v2 `POST /2/tweets`. All requests are signed with OAuth 1.0a user context.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use xpost_core::config::XApiConfig;

use crate::error::{PublishError, Result};
use crate::gateway::PlatformApi;
use crate::oauth::OAuthCredentials;

pub struct XApi {
    client: reqwest::Client,
    creds: OAuthCredentials,
    api_base: String,
    upload_base: String,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    media_id_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Me {
    username: String,
}

impl XApi {
    pub fn new(config: &XApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            creds: OAuthCredentials {
                consumer_key: config.api_key.clone(),
                consumer_secret: config.api_secret.clone(),
                token: config.access_token.clone(),
                token_secret: config.access_token_secret.clone(),
            },
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
        }
    }

    fn auth(&self, method: &str, url: &str) -> Result<String> {
        self.creds.authorization_header(method, url, &[])
    }
}

/// Turn a non-2xx response into [`PublishError::Api`].
async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    warn!(status, body = %text, "X API error during {what}");
    Err(PublishError::Api {
        status,
        message: text,
    })
}

fn media_id(resp: MediaUploadResponse) -> Result<String> {
    resp.media_id_string
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PublishError::Parse("upload response has no media_id_string".into()))
}

fn post_id(resp: DataEnvelope<CreatedPost>) -> Result<String> {
    match resp.data {
        Some(post) if !post.id.is_empty() => Ok(post.id),
        _ => Err(PublishError::NoId),
    }
}

fn create_body(text: &str, media_ids: &[String]) -> serde_json::Value {
    let mut body = serde_json::json!({ "text": text });
    if !media_ids.is_empty() {
        body["media"] = serde_json::json!({ "media_ids": media_ids });
    }
    body
}

#[async_trait]
impl PlatformApi for XApi {
    fn name(&self) -> &str {
        "x"
    }

    async fn upload_media(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "media".to_string());
        let url = format!("{}/1.1/media/upload.json", self.upload_base);

        debug!(path = %path.display(), size = bytes.len(), "uploading media");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("media", part);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth("POST", &url)?)
            .multipart(form)
            .send()
            .await?;
        let resp = check_status(resp, "media upload").await?;

        let parsed: MediaUploadResponse = resp
            .json()
            .await
            .map_err(|e| PublishError::Parse(e.to_string()))?;
        media_id(parsed)
    }

    async fn create_post(&self, text: &str, media_ids: &[String]) -> Result<String> {
        let url = format!("{}/2/tweets", self.api_base);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", self.auth("POST", &url)?)
            .json(&create_body(text, media_ids))
            .send()
            .await?;
        let resp = check_status(resp, "create post").await?;

        let parsed: DataEnvelope<CreatedPost> = resp
            .json()
            .await
            .map_err(|e| PublishError::Parse(e.to_string()))?;
        post_id(parsed)
    }

    async fn verify_credentials(&self) -> Result<String> {
        let url = format!("{}/2/users/me", self.api_base);
        let resp = self
            .client
            .get(&url)
            .header("Authorization", self.auth("GET", &url)?)
            .send()
            .await?;
        let resp = check_status(resp, "verify credentials").await?;

        let parsed: DataEnvelope<Me> = resp
            .json()
            .await
            .map_err(|e| PublishError::Parse(e.to_string()))?;
        parsed
            .data
            .map(|me| me.username)
            .ok_or_else(|| PublishError::Parse("users/me response has no data".into()))
    }
}
