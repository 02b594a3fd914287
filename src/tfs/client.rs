// ABOUTME: Minimal Azure DevOps / TFS REST client with basic credentials.
// ABOUTME: GETs JSON relative to a project collection URL; 404 is surfaced as None instead of an error.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Longest response body quoted in an error message
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Clone)]
pub struct DevOpsClient {
    http: reqwest::Client,
    collection_url: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for DevOpsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevOpsClient")
            .field("collection_url", &self.collection_url)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl DevOpsClient {
    /// Authenticate with a personal access token (basic auth, empty user).
    pub fn with_token(collection_url: &str, token: &str) -> Self {
        Self::with_password(collection_url, "", token)
    }

    pub fn with_password(collection_url: &str, username: &str, password: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            collection_url: collection_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    /// Absolute URL for a path relative to the collection.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.collection_url, path.trim_start_matches('/'))
    }

    /// GET and decode `path`. Returns `Ok(None)` on 404.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<T>> {
        let url = self.url(path);
        tracing::debug!(url = %url, "DevOps request");

        let request = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => bail!("request cancelled: {}", url),
            response = request => response.with_context(|| format!("request failed: {}", url))?,
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read response from {}", url))?;

        // TF401232: the item does not exist or is not readable with these credentials
        if !status.is_success() && body.contains("TF401232") {
            return Ok(None);
        }

        if !status.is_success() {
            let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            bail!("{} returned {}: {}", url, status, snippet);
        }

        let value = serde_json::from_str(&body)
            .with_context(|| format!("unexpected response shape from {}", url))?;
        Ok(Some(value))
    }
}
