//! Prism Client - search cluster client with a product compatibility check
//!
//! Before any application request reaches the cluster, the client verifies
//! that the server is a distribution it is willing to talk to.
//!
//! # Architecture
//!
//! - **Gate**: single-flight, cached compatibility verdict shared by a lineage
//! - **Prober**: issues the one `GET /` diagnostic request
//! - **Policy**: minimum supported version per distribution tag
//! - **Client**: root and derived clients bound to one gate
//! - **Events**: request events and the one-shot degraded-mode notice
//! - **Transport**: pluggable request sender, reqwest-backed by default
//!
//! # Verdicts
//!
//! - Supported / permissive-unknown: every call proceeds, forever
//! - Unsupported or malformed root info: every call fails, forever
//! - Transport failure: queued calls fail, the next call probes again

pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod metrics;
pub mod policy;
pub mod probe;
pub mod transport;

mod client;

pub use client::{ChildOptions, Client};
pub use config::{ClientConfig, ProductCheckConfig};
pub use error::{ClientError, GateError, Result, DEGRADED_MODE_MESSAGE, PRODUCT_CHECK_MESSAGE};
pub use events::{EventEmitter, RequestEvent, RequestMeta};
pub use gate::{Admission, CompatibilityGate, Verdict};
pub use policy::{Compatibility, Version, VersionPolicy, DEFAULT_DISTRIBUTION};
pub use probe::{DiagnosticProber, ProbeResult, ServerDescriptor};
pub use transport::{HttpTransport, Method, RequestParams, Transport, TransportResponse};
