//! Batch delivery — sends event batches to the collector via HTTP POST.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use uuid::Uuid;

use tally_core::config::{CollectorConfig, DeliveryMode};
use tally_core::error::{Result, TallyError};
use tally_core::models::event::{BatchPayload, Event};

/// Header carrying a per-request batch identifier.
pub const BATCH_ID_HEADER: &str = "X-Tally-Batch-Id";

/// Destination for flushed batches.
///
/// Implementations make exactly one delivery attempt per call. Retrying is the
/// queue's job.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_events(&self, events: &[Event]) -> Result<()>;
}

/// Build the sink selected by the collector configuration.
pub fn sink_from_config(config: &CollectorConfig) -> Result<Arc<dyn EventSink>> {
    match config.mode {
        DeliveryMode::Remote => Ok(Arc::new(CollectorClient::new(
            config.endpoint.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        DeliveryMode::Local => Ok(Arc::new(LocalSink)),
    }
}

/// POSTs `{"events": [...]}` to a fixed collector endpoint.
pub struct CollectorClient {
    endpoint: String,
    client: Client,
}

impl CollectorClient {
    /// Create a client with the given request timeout.
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tally/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { endpoint, client })
    }

    /// Create a client with a custom reqwest client (for testing).
    pub fn with_client(endpoint: String, client: Client) -> Self {
        Self { endpoint, client }
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for CollectorClient {
    async fn send_events(&self, events: &[Event]) -> Result<()> {
        let batch_id = Uuid::new_v4();
        let response = self
            .client
            .post(&self.endpoint)
            .header(BATCH_ID_HEADER, batch_id.to_string())
            .json(&BatchPayload { events })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TallyError::Delivery {
                status: status.as_u16(),
            });
        }

        tracing::debug!(
            batch_id = %batch_id,
            count = events.len(),
            "analytics batch accepted by collector"
        );
        Ok(())
    }
}

/// Development sink: logs the batch and reports success without touching the network.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalSink;

#[async_trait]
impl EventSink for LocalSink {
    async fn send_events(&self, events: &[Event]) -> Result<()> {
        for event in events {
            tracing::debug!(
                name = %event.name,
                session_id = %event.session_id,
                url = %event.context.url,
                "analytics event (local mode)"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::models::event::{EventContext, Properties, Viewport};
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_event(name: &str) -> Event {
        let mut properties = Properties::new();
        properties.insert("query".into(), json!("react hooks"));
        Event {
            name: name.to_string(),
            properties,
            timestamp: 1_700_000_000_000,
            session_id: "sess_1_abc".into(),
            context: EventContext {
                url: "/blog".into(),
                referrer: "direct".into(),
                user_agent: "Firefox on Linux".into(),
                viewport: Viewport {
                    width: 800,
                    height: 600,
                },
            },
        }
    }

    fn client_for(server: &MockServer) -> CollectorClient {
        CollectorClient::new(
            format!("{}/api/analytics/events", server.uri()),
            Duration::from_secs(5),
        )
        .expect("client should build")
    }

    #[tokio::test]
    async fn sends_batch_as_json_post() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/analytics/events"))
            .and(header("content-type", "application/json"))
            .and(header_exists(BATCH_ID_HEADER))
            .and(body_partial_json(json!({
                "events": [{"name": "search", "properties": {"query": "react hooks"}}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .send_events(&[sample_event("search")])
            .await
            .expect("2xx should be success");
    }

    #[tokio::test]
    async fn any_2xx_is_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .send_events(&[sample_event("share")])
            .await
            .expect("204 should be success");
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/analytics/events"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_events(&[sample_event("search")])
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Delivery { status: 503 }));
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn client_error_is_a_failure_too() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_events(&[sample_event("search")])
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Delivery { status: 400 }));
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        let client = CollectorClient::new(
            "http://127.0.0.1:1/api/analytics/events".to_string(),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.send_events(&[sample_event("search")]).await.unwrap_err();
        assert!(matches!(err, TallyError::Http(_)));
    }

    #[tokio::test]
    async fn respects_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
            .mount(&server)
            .await;

        let client = CollectorClient::new(
            format!("{}/api/analytics/events", server.uri()),
            Duration::from_secs(1),
        )
        .unwrap();

        let start = std::time::Instant::now();
        let result = client.send_events(&[sample_event("search")]).await;
        assert!(result.is_err());
        assert!(
            start.elapsed() < Duration::from_secs(8),
            "client should have timed out, but took {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn local_sink_always_succeeds() {
        LocalSink
            .send_events(&[sample_event("search"), sample_event("share")])
            .await
            .expect("local sink never fails");
    }

    #[test]
    fn sink_from_config_builds_remote_client() {
        let config = CollectorConfig::default();
        assert!(sink_from_config(&config).is_ok());

        let local = CollectorConfig {
            mode: DeliveryMode::Local,
            ..CollectorConfig::default()
        };
        assert!(sink_from_config(&local).is_ok());
    }

    #[test]
    fn endpoint_accessor() {
        let client = CollectorClient::with_client(
            "https://collector.example.com/events".to_string(),
            Client::new(),
        );
        assert_eq!(client.endpoint(), "https://collector.example.com/events");
    }
}
