//! EventSub subscription management (`/helix/eventsub/subscriptions`).
//!
//! Requests authenticate with an app access token plus the application's
//! client id.

use reqwest::{Client, StatusCode};
use url::Url;

use super::ClientError;
use crate::objects::eventsub::{CreateSubscriptionRequest, CreateSubscriptionResponse, Subscription};

/// Production API root.
pub const DEFAULT_API_BASE: &str = "https://api.twitch.tv/";

const SUBSCRIPTIONS_PATH: &str = "/helix/eventsub/subscriptions";

/// What happened to a subscription creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    /// Accepted (202); upstream will send a verification challenge.
    Created(Box<Subscription>),
    /// An identical subscription already exists (409).
    AlreadyExists,
}

/// Typed HTTP client for webhook subscription management.
#[derive(Debug, Clone)]
pub struct EventSubClient {
    http: Client,
    base_url: Url,
    client_id: String,
    app_token: String,
}

impl EventSubClient {
    pub fn new(base_url: Url, client_id: impl Into<String>, app_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            client_id: client_id.into(),
            app_token: app_token.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /helix/eventsub/subscriptions`
    pub async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<SubscriptionOutcome, ClientError> {
        let url = self.base_url.join(SUBSCRIPTIONS_PATH)?;

        let resp = self
            .http
            .post(url)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.app_token)
            .json(request)
            .send()
            .await?;

        match resp.status() {
            StatusCode::CONFLICT => Ok(SubscriptionOutcome::AlreadyExists),
            status if status.is_success() => {
                let bytes = resp.bytes().await?;
                let mut parsed: CreateSubscriptionResponse = serde_json::from_slice(&bytes)?;
                match parsed.data.pop() {
                    Some(sub) => Ok(SubscriptionOutcome::Created(Box::new(sub))),
                    None => Err(ClientError::Api {
                        status,
                        body: String::from_utf8_lossy(&bytes).into_owned(),
                    }),
                }
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(ClientError::Api { status, body })
            }
        }
    }

    /// `DELETE /helix/eventsub/subscriptions?id=...`
    pub async fn delete_subscription(&self, id: &str) -> Result<(), ClientError> {
        let mut url = self.base_url.join(SUBSCRIPTIONS_PATH)?;
        url.query_pairs_mut().append_pair("id", id);

        let resp = self
            .http
            .delete(url)
            .header("Client-Id", &self.client_id)
            .bearer_auth(&self.app_token)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(())
    }
}
