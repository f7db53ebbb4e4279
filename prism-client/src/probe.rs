//! Diagnostic prober
//!
//! Issues the single `GET /` request that identifies the server and turns the
//! response into a [`ProbeResult`]. The prober never retries; whether and when
//! to probe again is the gate's decision.

use crate::error::ClientError;
use crate::events::{EventEmitter, RequestMeta};
use crate::transport::{Method, RequestParams, Transport, TransportResponse};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Identity of the server as reported by its root endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    /// Distribution tag (`opensearch`, ...); `None` means the default tag
    pub distribution: Option<String>,
    /// Raw version string, e.g. `7.10.2`
    pub version: Option<String>,
    /// False when the body lacked the fields needed to classify it
    pub well_formed: bool,
}

impl ServerDescriptor {
    pub fn malformed() -> Self {
        Self {
            distribution: None,
            version: None,
            well_formed: false,
        }
    }

    /// Parse the root endpoint body
    pub fn from_body(body: Option<&serde_json::Value>) -> Self {
        let info = match body.map(|b| RootInfo::deserialize(b)) {
            Some(Ok(info)) => info,
            _ => return Self::malformed(),
        };

        match info.version {
            Some(RootVersion {
                number: Some(number),
                distribution,
            }) => Self {
                distribution,
                version: Some(number),
                well_formed: true,
            },
            _ => Self::malformed(),
        }
    }
}

/// Subset of the root info response the product check inspects
#[derive(Debug, Deserialize)]
struct RootInfo {
    #[serde(default)]
    version: Option<RootVersion>,
}

#[derive(Debug, Deserialize)]
struct RootVersion {
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    distribution: Option<String>,
}

/// Outcome of one probe attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    /// The server answered 2xx with a body, well-formed or not
    Ok(ServerDescriptor),
    /// The server refused the probe with 401 or 403
    Denied { status: u16 },
    /// Any other status, or no response at all
    TransportFailure(ClientError),
}

/// Issues the diagnostic request
pub struct DiagnosticProber {
    transport: Arc<dyn Transport>,
    events: Arc<EventEmitter>,
}

impl DiagnosticProber {
    pub fn new(transport: Arc<dyn Transport>, events: Arc<EventEmitter>) -> Self {
        Self { transport, events }
    }

    /// Send exactly one `GET /` and classify the transport-level outcome
    pub async fn probe(&self) -> ProbeResult {
        let params = RequestParams::new(Method::Get, "/");
        debug!("Sending product check request");

        let result = self.transport.perform(params).await;

        // The outcome only feeds the gate's classification; the request
        // event itself never carries it
        self.events.emit_request(
            None,
            RequestMeta {
                method: Method::Get,
                path: "/".to_string(),
                status: result.as_ref().ok().map(|response| response.status),
            },
        );

        match result {
            Ok(response) => Self::classify_response(response),
            Err(err) => ProbeResult::TransportFailure(err),
        }
    }

    fn classify_response(response: TransportResponse) -> ProbeResult {
        match response.status {
            401 | 403 => ProbeResult::Denied {
                status: response.status,
            },
            _ if response.is_success() => {
                ProbeResult::Ok(ServerDescriptor::from_body(response.body.as_ref()))
            }
            status => ProbeResult::TransportFailure(ClientError::Response {
                status,
                body: response.body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedTransport(Result<TransportResponse>);

    #[async_trait]
    impl Transport for FixedTransport {
        async fn perform(&self, _params: RequestParams) -> Result<TransportResponse> {
            self.0.clone()
        }
    }

    fn prober(result: Result<TransportResponse>) -> DiagnosticProber {
        DiagnosticProber::new(
            Arc::new(FixedTransport(result)),
            Arc::new(EventEmitter::new()),
        )
    }

    #[test]
    fn test_descriptor_default_distribution() {
        let body = json!({
            "name": "node-1",
            "cluster_name": "docker-cluster",
            "version": {"number": "7.10.2", "build_type": "docker"}
        });
        let descriptor = ServerDescriptor::from_body(Some(&body));
        assert!(descriptor.well_formed);
        assert_eq!(descriptor.version.as_deref(), Some("7.10.2"));
        assert_eq!(descriptor.distribution, None);
    }

    #[test]
    fn test_descriptor_with_distribution() {
        let body = json!({"version": {"number": "1.0.0", "distribution": "opensearch"}});
        let descriptor = ServerDescriptor::from_body(Some(&body));
        assert_eq!(descriptor.distribution.as_deref(), Some("opensearch"));
    }

    #[test]
    fn test_descriptor_missing_version_is_malformed() {
        let body = json!({"name": "node-1", "cluster_name": "docker-cluster"});
        assert_eq!(
            ServerDescriptor::from_body(Some(&body)),
            ServerDescriptor::malformed()
        );

        let body = json!({"version": {"build_type": "docker"}});
        assert!(!ServerDescriptor::from_body(Some(&body)).well_formed);

        assert!(!ServerDescriptor::from_body(None).well_formed);
        assert!(!ServerDescriptor::from_body(Some(&json!("plain text"))).well_formed);
        assert!(!ServerDescriptor::from_body(Some(&json!({"version": 7}))).well_formed);
    }

    #[tokio::test]
    async fn test_supported_response_is_ok() {
        let body = json!({"version": {"number": "7.10.0"}});
        let result = prober(Ok(TransportResponse::new(200, Some(body)))).probe().await;
        match result {
            ProbeResult::Ok(d) => assert_eq!(d.version.as_deref(), Some("7.10.0")),
            other => panic!("unexpected probe result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_security_statuses_are_denied() {
        for status in [401, 403] {
            let result = prober(Ok(TransportResponse::new(
                status,
                Some(json!({"security": "exception"})),
            )))
            .probe()
            .await;
            assert_eq!(result, ProbeResult::Denied { status });
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transport_failure() {
        let result = prober(Ok(TransportResponse::new(500, Some(json!({"error": "kaboom"})))))
            .probe()
            .await;
        assert!(matches!(
            result,
            ProbeResult::TransportFailure(ClientError::Response { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let result = prober(Err(ClientError::Timeout("request timed out".into())))
            .probe()
            .await;
        assert!(matches!(
            result,
            ProbeResult::TransportFailure(ClientError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_emits_one_request_event() {
        let events = Arc::new(EventEmitter::new());
        let mut rx = events.subscribe();
        let prober = DiagnosticProber::new(
            Arc::new(FixedTransport(Ok(TransportResponse::new(
                200,
                Some(json!({"version": {"number": "7.10.0"}})),
            )))),
            events,
        );

        prober.probe().await;

        let event = rx.recv().await.unwrap();
        assert!(event.error.is_none());
        assert_eq!(event.meta.method, Method::Get);
        assert_eq!(event.meta.path, "/");
        assert_eq!(event.meta.status, Some(200));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_request_event_carries_no_error() {
        let events = Arc::new(EventEmitter::new());
        let mut rx = events.subscribe();
        let prober = DiagnosticProber::new(
            Arc::new(FixedTransport(Err(ClientError::Timeout(
                "request timed out".into(),
            )))),
            events,
        );

        assert!(matches!(prober.probe().await, ProbeResult::TransportFailure(_)));

        let event = rx.recv().await.unwrap();
        assert!(event.error.is_none());
        assert_eq!(event.meta.path, "/");
        assert_eq!(event.meta.status, None);
    }
}
