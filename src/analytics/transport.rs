//! Delivery of formatted payloads to the analytics collector.
//!
//! Delivery is best-effort: one attempt, bounded by a timeout, and failures
//! are logged and counted but never returned to the caller.

use std::{
    net::IpAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use ipnet::{Ipv4Net, Ipv6Net};
use uuid::Uuid;

use super::payload::{ParamValue, Payload};
use crate::{config::AnalyticsConfig, observability::metrics};

/// Destination for formatted payloads.
#[async_trait]
pub trait AnalyticsTransport: Send + Sync {
    /// Deliver one payload. Never fails from the caller's point of view.
    async fn send(&self, payload: &Payload);

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

/// Delivery failures. Logged by [`HttpTransport::send`], never propagated.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Collector request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Collector returned status {0}")]
    Status(reqwest::StatusCode),
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Form-encoded POST to a Measurement Protocol collector.
pub struct HttpTransport {
    client: reqwest::Client,
    collector_url: String,
}

impl HttpTransport {
    pub fn new(collector_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            collector_url: collector_url.into(),
        })
    }

    pub fn from_config(config: &AnalyticsConfig) -> Result<Self, TransportError> {
        Self::new(config.collector_url.clone(), config.timeout())
    }

    /// Single delivery attempt.
    pub async fn try_send(&self, payload: &Payload) -> Result<(), TransportError> {
        let form = prepare_form(payload);
        let response = self
            .client
            .post(&self.collector_url)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsTransport for HttpTransport {
    async fn send(&self, payload: &Payload) {
        let hit_type = payload.hit_type().to_string();
        match self.try_send(payload).await {
            Ok(()) => {
                tracing::debug!(hit_type = %hit_type, "Delivered analytics hit");
                metrics::record_analytics_delivery(&hit_type, "delivered");
            }
            Err(TransportError::Status(status)) => {
                tracing::warn!(
                    hit_type = %hit_type,
                    status = %status,
                    "Analytics collector rejected hit"
                );
                metrics::record_analytics_delivery(&hit_type, "rejected");
            }
            Err(e) => {
                tracing::warn!(hit_type = %hit_type, error = %e, "Failed to deliver analytics hit");
                metrics::record_analytics_delivery(&hit_type, "failed");
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wire pairs for a payload: absent values dropped, `uip` anonymized and a
/// `cid` added when the caller did not supply one.
pub fn prepare_form(payload: &Payload) -> Vec<(String, String)> {
    let mut payload = payload.clone();

    let ip = payload
        .get("uip")
        .and_then(ParamValue::as_text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(anonymize_ip);
    if let Some(ip) = &ip {
        payload.insert("uip", ip.as_str());
    }

    if payload.get("cid").is_none_or(ParamValue::is_blank) {
        let ua = payload
            .get("ua")
            .and_then(ParamValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        // An unparseable address anonymizes to "" and must not seed the id
        let ip = ip.as_deref().filter(|s| !s.is_empty());
        let cid = match (ip, ua) {
            (Some(ip), Some(ua)) => client_id(ip, ua),
            _ => Uuid::new_v4(),
        };
        payload.insert("cid", cid.to_string());
    }

    payload.to_form()
}

/// Deterministic client id for an (anonymized ip, user agent) pair.
pub fn client_id(ip: &str, user_agent: &str) -> Uuid {
    let name = format!("{ip}\n{user_agent}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// Zero the host part of an address: IPv4 to /24, IPv6 to /48.
///
/// Values that do not parse as an address are replaced by an empty string.
pub fn anonymize_ip(raw: &str) -> String {
    match raw.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => Ipv4Net::new(v4, 24)
            .map(|net| net.network().to_string())
            .unwrap_or_default(),
        Ok(IpAddr::V6(v6)) => Ipv6Net::new(v6, 48)
            .map(|net| net.network().to_string())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Disabled Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Drops every payload. Used when analytics is disabled.
pub struct DisabledTransport;

#[async_trait]
impl AnalyticsTransport for DisabledTransport {
    async fn send(&self, payload: &Payload) {
        tracing::trace!(hit_type = payload.hit_type(), "Analytics disabled, dropping hit");
        metrics::record_analytics_delivery(payload.hit_type(), "disabled");
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Recording Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Keeps every payload in memory. Useful as a spy in tests and dry runs.
#[derive(Default, Clone)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Payload>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads delivered so far, oldest first.
    pub fn sent(&self) -> Vec<Payload> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AnalyticsTransport for RecordingTransport {
    async fn send(&self, payload: &Payload) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(payload.clone());
        }
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, method, path},
    };

    use super::*;

    fn pageview_payload() -> Payload {
        let mut payload = Payload::new();
        payload.insert("t", "pageview");
        payload.insert("dl", "https://docs.example.com/");
        payload.insert("dt", ParamValue::Absent);
        payload.insert("v", "1");
        payload.insert("uip", "");
        payload.insert("ua", "");
        payload
    }

    fn form_value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[rstest]
    #[case::ipv4("203.0.113.77", "203.0.113.0")]
    #[case::ipv4_network("10.1.2.0", "10.1.2.0")]
    #[case::ipv6("2001:db8:abcd:12::1", "2001:db8:abcd::")]
    #[case::garbage("not-an-ip", "")]
    #[case::blank("", "")]
    fn test_anonymize_ip(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(anonymize_ip(raw), expected);
    }

    #[test]
    fn test_prepare_form_drops_absent_keeps_blank() {
        let form = prepare_form(&pageview_payload());
        assert!(form_value(&form, "dt").is_none());
        assert_eq!(form_value(&form, "uip"), Some(""));
        assert_eq!(form_value(&form, "ua"), Some(""));
        let cid = form_value(&form, "cid").unwrap();
        assert!(Uuid::parse_str(cid).is_ok());
    }

    #[test]
    fn test_prepare_form_deterministic_cid() {
        let mut payload = pageview_payload();
        payload.insert("uip", "198.51.100.23");
        payload.insert("ua", "Mozilla/5.0");

        let first = prepare_form(&payload);
        let second = prepare_form(&payload);
        assert_eq!(form_value(&first, "uip"), Some("198.51.100.0"));
        assert_eq!(form_value(&first, "cid"), form_value(&second, "cid"));
        assert_eq!(
            form_value(&first, "cid"),
            Some(client_id("198.51.100.0", "Mozilla/5.0").to_string().as_str())
        );
    }

    #[rstest]
    #[case::garbage("not-an-ip")]
    #[case::hostname("docs.example.com")]
    fn test_prepare_form_unparseable_ip_gets_random_cid(#[case] uip: &str) {
        let mut payload = pageview_payload();
        payload.insert("uip", uip);
        payload.insert("ua", "Mozilla/5.0");

        let first = prepare_form(&payload);
        let second = prepare_form(&payload);
        assert_eq!(form_value(&first, "uip"), Some(""));
        let shared = client_id("", "Mozilla/5.0").to_string();
        assert_ne!(form_value(&first, "cid"), Some(shared.as_str()));
        assert_ne!(form_value(&first, "cid"), form_value(&second, "cid"));
    }

    #[test]
    fn test_prepare_form_keeps_supplied_cid() {
        let mut payload = pageview_payload();
        payload.insert("cid", "555");
        let form = prepare_form(&payload);
        assert_eq!(form_value(&form, "cid"), Some("555"));
    }

    #[tokio::test]
    async fn test_http_transport_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collect"))
            .and(body_string_contains("t=pageview"))
            .and(body_string_contains("dl=https%3A%2F%2Fdocs.example.com%2F"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(format!("{}/collect", server.uri()), Duration::from_secs(3)).unwrap();
        transport.try_send(&pageview_payload()).await.unwrap();
        transport.send(&pageview_payload()).await;

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_http_transport_swallows_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(format!("{}/collect", server.uri()), Duration::from_secs(3)).unwrap();

        // `send` returns unit; reaching the next line is the assertion
        transport.send(&pageview_payload()).await;

        let err = transport.try_send(&pageview_payload()).await.unwrap_err();
        assert!(matches!(err, TransportError::Status(s) if s.as_u16() == 500));
    }

    #[tokio::test]
    async fn test_http_transport_timeout_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport =
            HttpTransport::new(format!("{}/collect", server.uri()), Duration::from_millis(100))
                .unwrap();
        let err = transport.try_send(&pageview_payload()).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(e) if e.is_timeout()));

        transport.send(&pageview_payload()).await;
    }

    #[tokio::test]
    async fn test_http_transport_unreachable_collector() {
        // Nothing listens on port 9 of localhost in the test environment
        let transport =
            HttpTransport::new("http://127.0.0.1:9/collect", Duration::from_secs(1)).unwrap();
        assert!(transport.try_send(&pageview_payload()).await.is_err());
        transport.send(&pageview_payload()).await;
    }

    #[tokio::test]
    async fn test_recording_transport_keeps_order() {
        let transport = RecordingTransport::new();
        let mut first = pageview_payload();
        first.insert("dl", "https://a.example.com/");
        let mut second = pageview_payload();
        second.insert("dl", "https://b.example.com/");

        transport.send(&first).await;
        transport.send(&second).await;

        assert_eq!(transport.sent(), vec![first, second]);
    }
}
