//! Webhook subscription registrar.
//!
//! Creates the upstream subscriptions that make the service deliver
//! notifications to our callback. Failed attempts are retried with
//! exponential backoff until the policy's attempt budget is spent.

use streamled_sdk::client::{ClientError, EventSubClient, SubscriptionOutcome};
use streamled_sdk::objects::eventsub::{CreateSubscriptionRequest, SubscriptionType};
use tracing::{info, warn};

use crate::config::{EventSubConfig, RetryPolicy};
use crate::context::Context;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("giving up on {kind} after {attempts} attempts: {last}")]
    GaveUp {
        kind: SubscriptionType,
        attempts: u32,
        #[source]
        last: ClientError,
    },
}

pub struct Registrar {
    client: EventSubClient,
    broadcaster_id: String,
    callback: String,
    secret: String,
    retry: RetryPolicy,
}

impl Registrar {
    pub fn new(ctx: &Context, config: &EventSubConfig) -> Self {
        let client = EventSubClient::new(
            config.api_base.clone(),
            config.client_id.clone(),
            config.app_token.clone(),
        )
        .with_http_client(ctx.http.clone());

        Self {
            client,
            broadcaster_id: config.broadcaster_id.clone(),
            callback: config.callback_url.to_string(),
            secret: config.secret.clone(),
            retry: config.retry,
        }
    }

    /// Create one subscription, retrying failures per the retry policy.
    ///
    /// An already existing subscription counts as success.
    pub async fn register(&self, kind: SubscriptionType) -> Result<SubscriptionOutcome, RegistrationError> {
        let request =
            CreateSubscriptionRequest::webhook(kind, &self.broadcaster_id, &self.callback, &self.secret);
        let attempts = self.retry.max_attempts.max(1);

        let mut attempt = 0;
        loop {
            match self.client.create_subscription(&request).await {
                Ok(outcome) => {
                    info!(kind = %kind, outcome = ?outcome, "Webhook subscription registered");
                    return Ok(outcome);
                }
                Err(e) if attempt + 1 >= attempts => {
                    warn!(kind = %kind, attempts, error = %e, "Webhook subscription failed");
                    return Err(RegistrationError::GaveUp {
                        kind,
                        attempts,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        kind = %kind,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Webhook subscription attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Register every supported subscription type.
    pub async fn register_all(&self) -> Result<(), RegistrationError> {
        for kind in SubscriptionType::ALL {
            self.register(kind).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer, max_attempts: u32) -> EventSubConfig {
        EventSubConfig {
            secret: "0123456789abcdef".into(),
            callback_url: Url::parse("https://panel.example.com/eventsub").unwrap(),
            broadcaster_id: "1337".into(),
            client_id: "cid".into(),
            app_token: "apptoken".into(),
            api_base: Url::parse(&server.uri()).unwrap(),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                max_attempts,
            },
        }
    }

    fn accepted() -> ResponseTemplate {
        ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "data": [{
                "id": "26b1c993",
                "status": "webhook_callback_verification_pending",
                "type": "stream.online",
                "version": "1",
                "condition": {"broadcaster_user_id": "1337"},
                "transport": {"method": "webhook", "callback": "https://panel.example.com/eventsub"},
                "created_at": "2019-11-16T10:11:12.634234626Z"
            }],
            "total": 1
        }))
    }

    #[tokio::test]
    async fn retries_until_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .and(body_partial_json(serde_json::json!({
                "type": "stream.online",
                "transport": {"method": "webhook", "secret": "0123456789abcdef"}
            })))
            .respond_with(accepted())
            .expect(1)
            .mount(&server)
            .await;

        let registrar = Registrar::new(&Context::default(), &config(&server, 8));
        let outcome = registrar.register(SubscriptionType::StreamOnline).await.unwrap();
        assert!(matches!(outcome, SubscriptionOutcome::Created(_)));
    }

    #[tokio::test]
    async fn gives_up_after_attempt_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let registrar = Registrar::new(&Context::default(), &config(&server, 3));
        let err = registrar
            .register(SubscriptionType::StreamOffline)
            .await
            .unwrap_err();
        let RegistrationError::GaveUp { kind, attempts, .. } = err;
        assert_eq!(kind, SubscriptionType::StreamOffline);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn existing_subscriptions_count_as_registered() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/helix/eventsub/subscriptions"))
            .respond_with(ResponseTemplate::new(409))
            .expect(4)
            .mount(&server)
            .await;

        let registrar = Registrar::new(&Context::default(), &config(&server, 8));
        registrar.register_all().await.unwrap();
    }
}
