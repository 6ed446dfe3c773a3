//! `reqwest`-backed settings transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use url::Url;

use crate::config::ApiConfig;
use crate::settings::{Settings, SettingsPatch};
use crate::transport::{SettingsTransport, TransportError};

/// Maximum length for error response bodies carried in errors.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// HTTP client for the settings endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    settings_url: Url,
    auth_header: Option<HeaderValue>,
}

#[derive(Serialize)]
struct PatchBody<'a> {
    #[serde(flatten)]
    patch: &'a SettingsPatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

impl HttpTransport {
    /// Build a transport from the API section of the client config.
    pub fn new(config: &ApiConfig) -> Result<Self, TransportError> {
        let settings_url = settings_url(&config.base_url, &config.settings_path)?;

        let auth_header = match &config.auth_token {
            Some(token) => Some(
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| TransportError::Network(format!("Invalid auth token: {}", e)))?,
            ),
            None => None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("settings-cache/", env!("CARGO_PKG_VERSION")))
            .build()?;

        tracing::debug!(url = %settings_url, "HTTP settings transport ready");

        Ok(Self {
            client,
            settings_url,
            auth_header,
        })
    }

    pub fn settings_url(&self) -> &Url {
        &self.settings_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_header {
            Some(value) => request.header(AUTHORIZATION, value.clone()),
            None => request,
        }
    }

    async fn read_settings(response: Response) -> Result<Settings, TransportError> {
        let status = response.status();
        if status.is_success() {
            return response.json::<Settings>().await.map_err(TransportError::from);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();

        Err(TransportError::Status {
            status: status.as_u16(),
            body: truncate_body(&body),
            retry_after,
        })
    }
}

fn settings_url(base_url: &str, path: &str) -> Result<Url, TransportError> {
    let joined = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    joined
        .parse()
        .map_err(|e| TransportError::Network(format!("Invalid settings URL '{}': {}", joined, e)))
}

/// Truncate a response body to avoid carrying excessive data around.
fn truncate_body(body: &str) -> String {
    let total = body.chars().count();
    if total <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated, {} total chars)", head, total)
    }
}

#[async_trait]
impl SettingsTransport for HttpTransport {
    async fn fetch_settings(&self) -> Result<Settings, TransportError> {
        let request = self.authorize(self.client.get(self.settings_url.clone()));
        let response = request.send().await?;
        Self::read_settings(response).await
    }

    async fn patch_settings(
        &self,
        patch: &SettingsPatch,
        expected_version: Option<u64>,
    ) -> Result<Settings, TransportError> {
        let body = PatchBody {
            patch,
            version: expected_version,
        };
        let request = self
            .authorize(self.client.patch(self.settings_url.clone()))
            .json(&body);
        let response = request.send().await?;
        Self::read_settings(response).await
    }
}
