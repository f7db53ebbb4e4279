//! Product compatibility gate
//!
//! Every public client operation asks the gate for admission before it is
//! allowed onto the network. The gate probes the server at most once at a time
//! per lineage and caches the verdict:
//!
//! ```text
//! Unchecked ──admit──▶ Checking ──probe──▶ Supported          (cached)
//!     ▲                    │      ├──────▶ Unsupported        (cached)
//!     │                    │      └──────▶ PermissiveUnknown  (cached, notice once)
//!     └────────────────────┘ transport failure: queued callers rejected,
//!                            next admit probes again
//! ```

use crate::error::{GateError, DEGRADED_MODE_MESSAGE};
use crate::events::EventEmitter;
use crate::metrics;
use crate::policy::{Compatibility, VersionPolicy};
use crate::probe::{DiagnosticProber, ProbeResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Cached classification of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No probe has completed; the next admit starts one
    Unchecked,
    /// A probe is in flight
    Checking,
    Supported,
    Unsupported,
    /// Probe was denied by server security; operations proceed anyway
    PermissiveUnknown,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unchecked => "unchecked",
            Verdict::Checking => "checking",
            Verdict::Supported => "supported",
            Verdict::Unsupported => "unsupported",
            Verdict::PermissiveUnknown => "permissive_unknown",
        }
    }

    /// True once no further probe will ever be issued
    pub fn is_cached(&self) -> bool {
        matches!(self, Verdict::Supported | Verdict::Unsupported | Verdict::PermissiveUnknown)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer handed to a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    Reject(GateError),
}

impl Admission {
    pub fn into_result(self) -> Result<(), GateError> {
        match self {
            Admission::Proceed => Ok(()),
            Admission::Reject(err) => Err(err),
        }
    }
}

struct GateState {
    verdict: Verdict,
    waiters: Vec<oneshot::Sender<Admission>>,
    warning_emitted: bool,
}

/// Shared, single-flight product check
///
/// One instance exists per client lineage; derived clients hold the same
/// `Arc`.
pub struct CompatibilityGate {
    state: Mutex<GateState>,
    prober: DiagnosticProber,
    policy: VersionPolicy,
    events: Arc<EventEmitter>,
}

impl CompatibilityGate {
    pub fn new(prober: DiagnosticProber, policy: VersionPolicy, events: Arc<EventEmitter>) -> Self {
        Self {
            state: Mutex::new(GateState {
                verdict: Verdict::Unchecked,
                waiters: Vec::new(),
                warning_emitted: false,
            }),
            prober,
            policy,
            events,
        }
    }

    /// Current verdict
    pub fn verdict(&self) -> Verdict {
        self.state.lock().verdict
    }

    /// Number of callers suspended on the in-flight probe
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Ask whether an operation may proceed to the network
    ///
    /// Resolves immediately for cached verdicts. Otherwise the caller is queued
    /// behind the in-flight probe, starting one if none is running. Dropping
    /// the returned future only discards this caller's registration.
    pub async fn admit(self: &Arc<Self>) -> Admission {
        let (rx, start_probe) = {
            let mut state = self.state.lock();
            match state.verdict {
                Verdict::Supported | Verdict::PermissiveUnknown => return Admission::Proceed,
                Verdict::Unsupported => return Admission::Reject(GateError),
                Verdict::Checking => {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(tx);
                    (rx, false)
                }
                Verdict::Unchecked => {
                    let (tx, rx) = oneshot::channel();
                    state.verdict = Verdict::Checking;
                    state.waiters.push(tx);
                    (rx, true)
                }
            }
        };

        if start_probe {
            self.start_probe();
        }

        // A dropped sender means the probe task died without releasing us
        rx.await.unwrap_or(Admission::Reject(GateError))
    }

    /// Run the probe on its own task so no single caller owns it
    fn start_probe(self: &Arc<Self>) {
        debug!("Starting product check");
        let mut in_flight = InFlight {
            gate: Arc::clone(self),
            released: false,
        };

        tokio::spawn(async move {
            let start = Instant::now();
            let result = in_flight.gate.prober.probe().await;
            in_flight.gate.complete(result, start);
            in_flight.released = true;
        });
    }

    /// Classify a probe result, transition once and release every waiter
    fn complete(&self, result: ProbeResult, start: Instant) {
        let (next, admission) = match result {
            ProbeResult::Ok(descriptor) => match self.policy.classify(&descriptor) {
                Compatibility::Supported => {
                    info!(
                        "Product check passed: {} {}",
                        descriptor
                            .distribution
                            .as_deref()
                            .unwrap_or(self.policy.default_distribution()),
                        descriptor.version.as_deref().unwrap_or_default()
                    );
                    (Verdict::Supported, Admission::Proceed)
                }
                Compatibility::Unsupported => {
                    warn!(
                        "Product check failed: unsupported server {:?} {:?}",
                        descriptor.distribution, descriptor.version
                    );
                    (Verdict::Unsupported, Admission::Reject(GateError))
                }
            },
            ProbeResult::Denied { status } => {
                info!("Product check denied with status {}", status);
                (Verdict::PermissiveUnknown, Admission::Proceed)
            }
            ProbeResult::TransportFailure(err) => {
                warn!("Product check request failed: {}", err);
                (Verdict::Unchecked, Admission::Reject(GateError))
            }
        };

        metrics::record_product_check(
            if next == Verdict::Unchecked {
                "transport_failure"
            } else {
                next.as_str()
            },
            start.elapsed(),
        );
        self.release(next, admission);
    }

    fn release(&self, next: Verdict, admission: Admission) {
        let (waiters, emit_notice) = {
            let mut state = self.state.lock();
            state.verdict = next;
            let emit_notice = next == Verdict::PermissiveUnknown && !state.warning_emitted;
            if emit_notice {
                state.warning_emitted = true;
            }
            (std::mem::take(&mut state.waiters), emit_notice)
        };

        if emit_notice {
            self.events.emit_degraded_notice(DEGRADED_MODE_MESSAGE);
        }

        metrics::record_gate_waiters(waiters.len());
        for waiter in waiters {
            // Receiver gone means that caller was cancelled
            let _ = waiter.send(admission);
        }
    }
}

/// Resets the gate if the probe task ends without completing
struct InFlight {
    gate: Arc<CompatibilityGate>,
    released: bool,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.released {
            warn!("Product check aborted before completion");
            self.gate.release(Verdict::Unchecked, Admission::Reject(GateError));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, Result};
    use crate::transport::{RequestParams, Transport, TransportResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Transport that answers from a script once a permit is available
    struct GatedTransport {
        responses: Mutex<Vec<Result<TransportResponse>>>,
        permits: Semaphore,
        calls: AtomicUsize,
    }

    impl GatedTransport {
        fn new(responses: Vec<Result<TransportResponse>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                permits: Semaphore::new(0),
                calls: AtomicUsize::new(0),
            })
        }

        fn open(&self) {
            self.permits.add_permits(Semaphore::MAX_PERMITS / 2);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn perform(&self, _params: RequestParams) -> Result<TransportResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self.permits.acquire().await.expect("semaphore closed");
            self.responses.lock().remove(0)
        }
    }

    fn info(version: &str) -> Result<TransportResponse> {
        Ok(TransportResponse::new(200, Some(json!({"version": {"number": version}}))))
    }

    fn gate(transport: Arc<GatedTransport>) -> (Arc<CompatibilityGate>, Arc<EventEmitter>) {
        let events = Arc::new(EventEmitter::new());
        let prober = DiagnosticProber::new(transport, Arc::clone(&events));
        let gate = Arc::new(CompatibilityGate::new(
            prober,
            VersionPolicy::default(),
            Arc::clone(&events),
        ));
        (gate, events)
    }

    async fn wait_for_waiters(gate: &CompatibilityGate, count: usize) {
        while gate.waiting() < count {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_verdict_cached_states() {
        assert!(!Verdict::Unchecked.is_cached());
        assert!(!Verdict::Checking.is_cached());
        assert!(Verdict::Supported.is_cached());
        assert!(Verdict::Unsupported.is_cached());
        assert!(Verdict::PermissiveUnknown.is_cached());
    }

    #[tokio::test]
    async fn test_single_flight_supported() {
        let transport = GatedTransport::new(vec![info("7.10.2")]);
        let (gate, _) = gate(Arc::clone(&transport));
        assert_eq!(gate.verdict(), Verdict::Unchecked);

        let callers: Vec<_> = (0..5)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.admit().await })
            })
            .collect();

        wait_for_waiters(&gate, 5).await;
        assert_eq!(gate.verdict(), Verdict::Checking);
        transport.open();

        for caller in callers {
            assert_eq!(caller.await.unwrap(), Admission::Proceed);
        }
        assert_eq!(transport.calls(), 1);
        assert_eq!(gate.verdict(), Verdict::Supported);

        // Cached: no further probe
        assert_eq!(gate.admit().await, Admission::Proceed);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_is_permanent() {
        let transport = GatedTransport::new(vec![info("6.8.0")]);
        transport.open();
        let (gate, _) = gate(Arc::clone(&transport));

        assert_eq!(gate.admit().await, Admission::Reject(GateError));
        assert_eq!(gate.verdict(), Verdict::Unsupported);
        assert_eq!(gate.admit().await, Admission::Reject(GateError));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_resets_to_unchecked() {
        let transport = GatedTransport::new(vec![
            Ok(TransportResponse::new(500, Some(json!({"error": "kaboom"})))),
            info("7.10.0"),
        ]);
        transport.open();
        let (gate, _) = gate(Arc::clone(&transport));

        assert_eq!(gate.admit().await, Admission::Reject(GateError));
        assert_eq!(gate.verdict(), Verdict::Unchecked);

        assert_eq!(gate.admit().await, Admission::Proceed);
        assert_eq!(gate.verdict(), Verdict::Supported);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_connection_error_resets_to_unchecked() {
        let transport =
            GatedTransport::new(vec![Err(ClientError::Connection("connection refused".into()))]);
        transport.open();
        let (gate, _) = gate(Arc::clone(&transport));

        assert_eq!(gate.admit().await, Admission::Reject(GateError));
        assert_eq!(gate.verdict(), Verdict::Unchecked);
    }

    #[tokio::test]
    async fn test_denied_proceeds_and_warns_once() {
        let denied = TransportResponse::new(401, Some(json!({"security": "exception"})));
        let transport = GatedTransport::new(vec![Ok(denied)]);
        let (gate, events) = gate(Arc::clone(&transport));
        let mut warnings = events.subscribe_warnings();

        let callers: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move { gate.admit().await })
            })
            .collect();
        wait_for_waiters(&gate, 3).await;
        transport.open();

        for caller in callers {
            assert_eq!(caller.await.unwrap(), Admission::Proceed);
        }
        assert_eq!(gate.admit().await, Admission::Proceed);
        assert_eq!(gate.verdict(), Verdict::PermissiveUnknown);

        assert_eq!(warnings.recv().await.unwrap(), DEGRADED_MODE_MESSAGE);
        assert!(warnings.try_recv().is_err());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_waiters_released_in_arrival_order() {
        let transport = GatedTransport::new(vec![info("7.10.0")]);
        let (gate, _) = gate(Arc::clone(&transport));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut callers = Vec::new();
        for i in 0..5 {
            let caller_gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            callers.push(tokio::spawn(async move {
                let admission = caller_gate.admit().await;
                order.lock().push(i);
                admission
            }));
            // Queue each caller before spawning the next
            wait_for_waiters(&gate, i + 1).await;
        }
        transport.open();

        for caller in callers {
            assert_eq!(caller.await.unwrap(), Admission::Proceed);
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_block_check() {
        let transport = GatedTransport::new(vec![info("7.10.0")]);
        let (gate, _) = gate(Arc::clone(&transport));

        let first = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.admit().await })
        };
        let second = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.admit().await })
        };
        wait_for_waiters(&gate, 2).await;

        // Cancel the caller that started the probe
        first.abort();
        let _ = first.await;
        transport.open();

        assert_eq!(second.await.unwrap(), Admission::Proceed);
        assert_eq!(gate.verdict(), Verdict::Supported);
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn test_admission_into_result() {
        assert!(Admission::Proceed.into_result().is_ok());
        assert_eq!(Admission::Reject(GateError).into_result(), Err(GateError));
    }
}
