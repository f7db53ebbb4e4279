//! Search cluster client
//!
//! A root client owns the lineage state: transport, event emitter and the
//! product check gate. Clients derived with [`Client::child`] share all three,
//! so a lineage probes the server at most once no matter how many children
//! exist or when they were created.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{EventEmitter, RequestEvent, RequestMeta};
use crate::gate::{CompatibilityGate, Verdict};
use crate::metrics::RequestTimer;
use crate::probe::DiagnosticProber;
use crate::transport::{HttpTransport, Method, RequestParams, Transport, TransportResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// State shared by every client in a lineage
struct Lineage {
    transport: Arc<dyn Transport>,
    events: Arc<EventEmitter>,
    /// `None` when the product check is disabled
    gate: Option<Arc<CompatibilityGate>>,
}

/// Per-client overrides for a derived client
#[derive(Debug, Clone, Default)]
pub struct ChildOptions {
    /// Extra headers, merged over the parent's
    pub headers: HashMap<String, String>,
    /// Request timeout override
    pub request_timeout: Option<Duration>,
}

/// Client for a search cluster
#[derive(Clone)]
pub struct Client {
    lineage: Arc<Lineage>,
    headers: HashMap<String, String>,
    request_timeout: Option<Duration>,
}

impl Client {
    /// Create a root client talking HTTP to `config.node`
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_transport(config, transport)
    }

    /// Create a root client on a custom transport
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let events = Arc::new(EventEmitter::new());

        let gate = if config.product_check.enabled {
            let policy = config.product_check.policy()?;
            let prober = DiagnosticProber::new(Arc::clone(&transport), Arc::clone(&events));
            Some(Arc::new(CompatibilityGate::new(
                prober,
                policy,
                Arc::clone(&events),
            )))
        } else {
            debug!("Product check disabled");
            None
        };

        Ok(Self {
            lineage: Arc::new(Lineage {
                transport,
                events,
                gate,
            }),
            headers: config.headers,
            request_timeout: None,
        })
    }

    /// Derive a client sharing this client's lineage
    pub fn child(&self, options: ChildOptions) -> Self {
        let mut headers = self.headers.clone();
        headers.extend(options.headers);

        Self {
            lineage: Arc::clone(&self.lineage),
            headers,
            request_timeout: options.request_timeout.or(self.request_timeout),
        }
    }

    /// True when both clients belong to the same lineage
    pub fn shares_lineage_with(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.lineage, &other.lineage)
    }

    /// Subscribe to request events
    pub fn subscribe(&self) -> broadcast::Receiver<RequestEvent> {
        self.lineage.events.subscribe()
    }

    /// Subscribe to warnings such as the degraded-mode notice
    pub fn subscribe_warnings(&self) -> broadcast::Receiver<String> {
        self.lineage.events.subscribe_warnings()
    }

    /// Current product check verdict; `None` when the check is disabled
    pub fn verdict(&self) -> Option<Verdict> {
        self.lineage.gate.as_ref().map(|gate| gate.verdict())
    }

    // ========================================
    // Public API
    // ========================================

    /// Send a request after the product check admits it
    ///
    /// Non-2xx responses are returned as [`ClientError::Response`].
    pub async fn request(&self, params: RequestParams) -> Result<TransportResponse> {
        let mut params = params;
        for (name, value) in &self.headers {
            params
                .headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        if params.timeout.is_none() {
            params.timeout = self.request_timeout;
        }

        let method = params.method;
        let path = params.path.clone();

        if let Some(gate) = &self.lineage.gate {
            if let Err(err) = gate.admit().await.into_result() {
                let err = ClientError::from(err);
                self.emit(Some(err.clone()), method, path, None);
                return Err(err);
            }
        }

        let timer = RequestTimer::new(method.as_str());
        let result = self.lineage.transport.perform(params).await;
        timer.finish();

        // Sent requests report their outcome to the caller, not to listeners
        self.emit(None, method, path, result.as_ref().ok().map(|r| r.status));

        match result {
            Ok(response) if response.is_success() => Ok(response),
            Ok(response) => Err(ClientError::Response {
                status: response.status,
                body: response.body,
            }),
            Err(err) => Err(err),
        }
    }

    /// Root info of the cluster (`GET /`)
    pub async fn info(&self) -> Result<serde_json::Value> {
        let response = self.request(RequestParams::new(Method::Get, "/")).await?;
        Ok(response.body.unwrap_or(serde_json::Value::Null))
    }

    /// Check that the cluster is reachable (`HEAD /`)
    ///
    /// A 404 is reported as `false`; any other failure is an error.
    pub async fn ping(&self) -> Result<bool> {
        match self.request(RequestParams::new(Method::Head, "/")).await {
            Ok(_) => Ok(true),
            Err(ClientError::Response { status: 404, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Search an index (`POST /{index}/_search`)
    pub async fn search(&self, index: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let params =
            RequestParams::new(Method::Post, format!("/{}/_search", index)).with_body(body);
        let response = self.request(params).await?;
        Ok(response.body.unwrap_or(serde_json::Value::Null))
    }

    /// Index a document
    ///
    /// Without an id this is `POST /{index}/_doc`; with one it is
    /// `PUT /{index}/_doc/{id}`.
    pub async fn index(
        &self,
        index: &str,
        id: Option<&str>,
        document: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let params = match id {
            Some(id) => RequestParams::new(Method::Put, format!("/{}/_doc/{}", index, id)),
            None => RequestParams::new(Method::Post, format!("/{}/_doc", index)),
        }
        .with_body(document);

        let response = self.request(params).await?;
        Ok(response.body.unwrap_or(serde_json::Value::Null))
    }

    fn emit(&self, error: Option<ClientError>, method: Method, path: String, status: Option<u16>) {
        self.lineage.events.emit_request(error, RequestMeta { method, path, status });
    }
}
