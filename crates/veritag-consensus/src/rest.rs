//! REST gateway implementation of the consensus network client.
//!
//! Submissions go to a write gateway; finality lookups and topic reads go to
//! the read-only mirror API. The mirror delivers topic messages in sequence
//! order, which this client bridges into the push-based [`Subscription`]
//! channel by polling with a sequence cursor.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use veritag_core::{TopicId, TransactionId};

use crate::{
    client::{ConsensusNetwork, ConsensusRecord, Subscription, TransactionStatus},
    error::{ConsensusError, Result},
};

/// Configuration for the REST consensus client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the write gateway accepting submissions.
    pub gateway_url: String,

    /// Base URL of the read-only mirror API.
    pub mirror_url: String,

    /// Timeout applied to each HTTP request.
    pub request_timeout: Duration,

    /// User agent string for requests.
    pub user_agent: String,

    /// Cadence at which open subscriptions poll the mirror.
    pub poll_interval: Duration,

    /// Maximum topic messages fetched per mirror page.
    pub page_limit: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:5551".to_string(),
            mirror_url: "https://mirror.testnet.ledgerscan.io".to_string(),
            request_timeout: Duration::from_secs(10),
            user_agent: "Veritag/1.0".to_string(),
            poll_interval: Duration::from_secs(2),
            page_limit: 25,
        }
    }
}

/// REST-backed consensus network client.
///
/// One instance is created at process start and shared by reference; `close`
/// cancels every subscription spawned from this handle. Safe for concurrent
/// use, the underlying HTTP client pools connections.
#[derive(Debug)]
pub struct RestConsensusClient {
    http: reqwest::Client,
    config: GatewayConfig,
    root_cancel: CancellationToken,
    closed: AtomicBool,
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct SubmitResponse {
    transaction_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    consensus_timestamp: String,
    result: String,
}

#[derive(Deserialize)]
struct TopicMessagesResponse {
    messages: Vec<TopicMessage>,
}

#[derive(Deserialize)]
struct TopicMessage {
    sequence_number: u64,
    consensus_timestamp: String,
    message: String,
    #[serde(default)]
    transaction_id: Option<String>,
}

impl RestConsensusClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::Validation` if the HTTP client cannot be
    /// built with the provided settings.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ConsensusError::validation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config, root_cancel: CancellationToken::new(), closed: AtomicBool::new(false) })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConsensusError::network("consensus client is closed"));
        }
        Ok(())
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ConsensusError {
        if err.is_timeout() {
            ConsensusError::timeout(self.config.request_timeout)
        } else {
            ConsensusError::network(err.to_string())
        }
    }

    async fn fetch_topic_page(
        http: &reqwest::Client,
        mirror_url: &str,
        topic: &TopicId,
        start_time: DateTime<Utc>,
        after_sequence: Option<u64>,
        page_limit: u32,
        request_timeout: Duration,
    ) -> Result<Vec<ConsensusRecord>> {
        let url = format!("{mirror_url}/api/v1/topics/{topic}/messages");
        let response = http
            .get(&url)
            .query(&[
                ("timestamp", format!("gte:{}", format_consensus_timestamp(start_time))),
                ("limit", page_limit.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConsensusError::timeout(request_timeout)
                } else {
                    ConsensusError::network(e.to_string())
                }
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ConsensusError::invalid_topic(topic.to_string()));
        }
        if !response.status().is_success() {
            return Err(ConsensusError::network(format!(
                "mirror returned HTTP {}",
                response.status()
            )));
        }

        let page: TopicMessagesResponse =
            response.json().await.map_err(|e| ConsensusError::network(e.to_string()))?;

        let mut records = Vec::with_capacity(page.messages.len());
        for message in page.messages {
            if after_sequence.is_some_and(|last| message.sequence_number <= last) {
                continue;
            }
            records.push(ConsensusRecord {
                sequence_number: message.sequence_number,
                consensus_timestamp: parse_consensus_timestamp(&message.consensus_timestamp)?,
                raw_contents: Bytes::from(BASE64.decode(message.message.as_bytes()).map_err(
                    |e| ConsensusError::subscription(format!("undecodable message payload: {e}")),
                )?),
                transaction_id: message
                    .transaction_id
                    .as_deref()
                    .map(TransactionId::parse)
                    .transpose()?,
            });
        }

        Ok(records)
    }
}

#[async_trait::async_trait]
impl ConsensusNetwork for RestConsensusClient {
    async fn submit_message(&self, topic: &TopicId, payload: Bytes) -> Result<TransactionId> {
        self.ensure_open()?;

        let url = format!("{}/api/v1/topics/{topic}/messages", self.config.gateway_url);
        let encoded = BASE64.encode(&payload);

        let response = self
            .http
            .post(&url)
            .json(&SubmitRequest { message: &encoded })
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        match response.status() {
            status if status.is_success() => {},
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::BAD_REQUEST => {
                return Err(ConsensusError::invalid_topic(topic.to_string()));
            },
            reqwest::StatusCode::PAYLOAD_TOO_LARGE => {
                return Err(ConsensusError::payload_too_large(
                    payload.len(),
                    crate::submit::MAX_MESSAGE_BYTES,
                ));
            },
            status => {
                return Err(ConsensusError::network(format!("gateway returned HTTP {status}")));
            },
        }

        let body: SubmitResponse =
            response.json().await.map_err(|e| ConsensusError::network(e.to_string()))?;
        let transaction_id = TransactionId::parse(&body.transaction_id)?;

        debug!(%topic, %transaction_id, bytes = payload.len(), "message accepted by gateway");
        Ok(transaction_id)
    }

    async fn subscribe(&self, topic: &TopicId, start_time: DateTime<Utc>) -> Result<Subscription> {
        self.ensure_open()?;

        let cancel = self.root_cancel.child_token();
        let (sender, receiver) = mpsc::channel(64);

        let http = self.http.clone();
        let mirror_url = self.config.mirror_url.clone();
        let topic = topic.clone();
        let poll_interval = self.config.poll_interval;
        let page_limit = self.config.page_limit;
        let request_timeout = self.config.request_timeout;
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut last_sequence: Option<u64> = None;

            loop {
                let page = tokio::select! {
                    () = task_cancel.cancelled() => break,
                    page = Self::fetch_topic_page(
                        &http,
                        &mirror_url,
                        &topic,
                        start_time,
                        last_sequence,
                        page_limit,
                        request_timeout,
                    ) => page,
                };

                match page {
                    Ok(records) => {
                        for record in records {
                            last_sequence = Some(record.sequence_number);
                            if sender.send(Ok(record)).await.is_err() {
                                return;
                            }
                        }
                    },
                    Err(e) => {
                        warn!(%topic, error = %e, "topic subscription poll failed");
                        let _ = sender.send(Err(e)).await;
                        return;
                    },
                }

                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    () = tokio::time::sleep(poll_interval) => {},
                }
            }
        });

        Ok(Subscription::new(receiver, cancel))
    }

    async fn transaction_status(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<TransactionStatus>> {
        self.ensure_open()?;

        let url = format!("{}/api/v1/transactions/{transaction_id}", self.config.mirror_url);
        let response =
            self.http.get(&url).send().await.map_err(|e| self.map_transport_error(&e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ConsensusError::network(format!(
                "mirror returned HTTP {}",
                response.status()
            )));
        }

        let body: StatusResponse =
            response.json().await.map_err(|e| ConsensusError::network(e.to_string()))?;

        Ok(Some(TransactionStatus {
            consensus_timestamp: parse_consensus_timestamp(&body.consensus_timestamp)?,
            result: body.result,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.root_cancel.cancel();
        Ok(())
    }
}

/// Renders a timestamp in the mirror's `seconds.nanos` form.
pub fn format_consensus_timestamp(at: DateTime<Utc>) -> String {
    format!("{}.{:09}", at.timestamp(), at.timestamp_subsec_nanos())
}

/// Parses a mirror `seconds.nanos` timestamp.
///
/// # Errors
///
/// Returns `ConsensusError::Validation` for malformed input.
pub fn parse_consensus_timestamp(input: &str) -> Result<DateTime<Utc>> {
    let malformed =
        || ConsensusError::validation(format!("malformed consensus timestamp {input:?}"));

    let (seconds, nanos) = input.split_once('.').ok_or_else(malformed)?;
    let seconds: i64 = seconds.parse().map_err(|_| malformed())?;
    if nanos.is_empty() || nanos.len() > 9 || !nanos.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed());
    }
    let mut padded = nanos.to_string();
    while padded.len() < 9 {
        padded.push('0');
    }
    let nanos: u32 = padded.parse().map_err(|_| malformed())?;

    DateTime::from_timestamp(seconds, nanos).ok_or_else(malformed)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> RestConsensusClient {
        RestConsensusClient::new(GatewayConfig {
            gateway_url: server.uri(),
            mirror_url: server.uri(),
            poll_interval: Duration::from_millis(10),
            ..GatewayConfig::default()
        })
        .unwrap()
    }

    fn topic() -> TopicId {
        TopicId::parse("0.0.48211").unwrap()
    }

    #[test]
    fn consensus_timestamp_round_trips() {
        let at = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let rendered = format_consensus_timestamp(at);
        assert_eq!(rendered, "1700000000.123456789");
        assert_eq!(parse_consensus_timestamp(&rendered).unwrap(), at);
    }

    #[test]
    fn consensus_timestamp_accepts_short_nanos() {
        let parsed = parse_consensus_timestamp("1700000000.5").unwrap();
        assert_eq!(parsed.timestamp_subsec_nanos(), 500_000_000);
    }

    #[test]
    fn consensus_timestamp_rejects_garbage() {
        for input in ["", "1700000000", "abc.def", "1700000000.", "1.1234567890"] {
            assert!(parse_consensus_timestamp(input).is_err(), "should reject {input:?}");
        }
    }

    #[tokio::test]
    async fn submit_returns_transaction_id() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/v1/topics/0.0.48211/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transaction_id": "0.0.1234@1700000000.000000001"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tx = client.submit_message(&topic(), Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(tx.as_str(), "0.0.1234@1700000000.000000001");
    }

    #[tokio::test]
    async fn submit_maps_unknown_topic() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.submit_message(&topic(), Bytes::from_static(b"{}")).await.unwrap_err();
        assert!(matches!(err, ConsensusError::InvalidTopic { .. }));
    }

    #[tokio::test]
    async fn missing_transaction_is_a_clean_negative() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tx = TransactionId::parse("0.0.1234@1700000000.000000001").unwrap();
        assert!(client.transaction_status(&tx).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn confirmed_transaction_carries_timestamp() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path(
                "/api/v1/transactions/0.0.1234@1700000000.000000001",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "consensus_timestamp": "1700000060.000000000",
                "result": "SUCCESS"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let tx = TransactionId::parse("0.0.1234@1700000000.000000001").unwrap();
        let status = client.transaction_status(&tx).await.unwrap().unwrap();
        assert_eq!(status.result, "SUCCESS");
        assert_eq!(status.consensus_timestamp.timestamp(), 1_700_000_060);
    }

    #[tokio::test]
    async fn subscription_delivers_in_sequence_order() {
        let server = MockServer::start().await;
        let payload = BASE64.encode(b"{\"n\":1}");
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/api/v1/topics/0.0.48211/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [
                    {
                        "sequence_number": 1,
                        "consensus_timestamp": "1700000001.000000000",
                        "message": payload,
                    },
                    {
                        "sequence_number": 2,
                        "consensus_timestamp": "1700000002.000000000",
                        "message": payload,
                        "transaction_id": "0.0.1234@1700000000.000000001",
                    },
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut sub = client.subscribe(&topic(), Utc::now()).await.unwrap();

        let first = sub.recv().await.unwrap().unwrap();
        let second = sub.recv().await.unwrap().unwrap();
        assert_eq!(first.sequence_number, 1);
        assert_eq!(second.sequence_number, 2);
        assert!(first.transaction_id.is_none());
        assert!(second.transaction_id.is_some());
        assert_eq!(second.raw_contents.as_ref(), b"{\"n\":1}");

        sub.close();
    }

    #[tokio::test]
    async fn closed_client_rejects_operations() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        client.close().await.unwrap();

        let err = client.submit_message(&topic(), Bytes::from_static(b"{}")).await.unwrap_err();
        assert!(matches!(err, ConsensusError::NetworkUnavailable { .. }));
    }
}
