//! Newsletter subscription providers

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::SubscriptionConfig;

/// A reader asking to join the newsletter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub email: String,
    pub user_agent: Option<String>,
}

#[derive(Debug, Error)]
pub enum SubscribeError {
    /// The provider answered with a non-success status
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error(transparent)]
    Network(#[from] reqwest::Error),
}

/// Adds an email address to the mailing list
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<(), SubscribeError>;
}

#[derive(Serialize)]
struct BeehiivPayload<'a> {
    email: &'a str,
    reactivate_existing: bool,
    send_welcome_email: bool,
    utm_source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
}

/// Beehiiv publication subscriptions API
pub struct Beehiiv {
    http: Client,
    endpoint: String,
    api_key: String,
    publication_id: String,
}

impl Beehiiv {
    /// `None` when the API key or publication id is not configured
    pub fn from_config(config: &SubscriptionConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|k| !k.trim().is_empty())?;
        let publication_id = config
            .publication_id
            .clone()
            .filter(|id| !id.trim().is_empty())?;
        let http = match Client::builder().timeout(Duration::from_secs(10)).build() {
            Ok(http) => http,
            Err(e) => {
                tracing::error!("Failed to build subscription HTTP client: {}", e);
                return None;
            }
        };
        Some(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            publication_id,
        })
    }

    fn subscriptions_url(&self) -> String {
        format!(
            "{}/publications/{}/subscriptions",
            self.endpoint, self.publication_id
        )
    }
}

#[async_trait]
impl SubscriptionProvider for Beehiiv {
    async fn subscribe(&self, request: &SubscribeRequest) -> Result<(), SubscribeError> {
        let payload = BeehiivPayload {
            email: &request.email,
            reactivate_existing: true,
            send_welcome_email: true,
            utm_source: "website",
            user_agent: request.user_agent.as_deref(),
        };

        let response = self
            .http
            .post(self.subscriptions_url())
            .bearer_auth(&self.api_key)
            .header("X-Api-Key", &self.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        tracing::info!("beehiiv subscribe status={}", status.as_u16());
        if status.is_success() {
            return Ok(());
        }

        // Beehiiv reports failures as {"message": "..."}; anything else is opaque
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| {
                body.get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Subscription failed".to_string());
        Err(SubscribeError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
