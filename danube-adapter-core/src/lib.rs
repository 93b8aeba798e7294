//! # Danube Adapter Core
//!
//! Framework for building adapters that bridge an external resource (a datastore, a
//! serial device, an HTTP endpoint) to a message bus.
//!
//! A concrete adapter implements [`Resource`] with its resource-specific connect, send
//! and receive logic. The [`AdapterRuntime`] supplies everything else: mode selection,
//! the connection lifecycle, a cancellable background polling loop for receiver modes,
//! the error-handling policy applied while polling, failure reports and an optional
//! audit channel for envelopes that could not be processed.
//!
//! ## Overview
//!
//! Adapters run in one of the modes they declare:
//! - **Receiver** (Publish, RequestReply): the runtime polls the resource at a fixed
//!   interval and the resource publishes envelopes to the bus
//! - **Sender** (Subscribe, SolicitResponse): the host hands envelopes to the runtime,
//!   which writes them to the resource
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use danube_adapter_core::{
//!     AdapterConfig, AdapterMode, AdapterRuntime, BusPublisher, ChannelBus, Envelope,
//!     Resource, ResourceError,
//! };
//! use std::sync::Arc;
//!
//! struct Counter;
//!
//! #[async_trait]
//! impl Resource for Counter {
//!     fn modes(&self) -> Vec<AdapterMode> {
//!         vec![AdapterMode::publish()]
//!     }
//!
//!     async fn connect(&self) -> Result<(), ResourceError> {
//!         Ok(())
//!     }
//!
//!     async fn receive(&self, bus: &BusPublisher) -> Result<(), ResourceError> {
//!         bus.publish(Envelope::text("/default/counter", "tick"))
//!             .await
//!             .map_err(|e| ResourceError::with_source("publish failed", e))
//!     }
//! }
//!
//! # async fn run() -> danube_adapter_core::AdapterResult<()> {
//! let (bus, mut envelopes) = ChannelBus::new();
//! let mut runtime = AdapterRuntime::new(Counter, AdapterConfig::default(), Arc::new(bus))?;
//! runtime.connect("publish").await?;
//! let first = envelopes.recv().await;
//! runtime.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling while polling
//!
//! - **StopPollingOnError**: report the failure and stop polling
//! - **SuppressConsecutiveErrors** (default): report the first failure of a run only
//! - **ReportAllErrors**: report every failure
//!
//! Report verbosity follows [`ErrorReportMode`]; `Information` and `Warning` include the
//! cause chain and the captured backtrace, `Error` only the summary line.

mod audit;
mod bus;
mod config;
mod enricher;
mod error;
mod message;
mod metrics;
mod mode;
mod policy;
mod reporter;
mod runtime;
mod state;
mod traits;

// Re-export public API
pub use audit::{
    AuditConnector, AuditSink, AuditSinkFactory, JsonLinesAuditFactory, JsonLinesAuditSink,
    AUDIT_CLOSE_TIMEOUT,
};
pub use bus::{
    BusPublisher, ChannelBus, DanubeBus, HostBus, BODY_KIND_ATTRIBUTE, ENVELOPE_ID_ATTRIBUTE,
};
pub use config::{AdapterConfig, MIN_POLLING_INTERVAL_SECS};
pub use enricher::{ErrorReportMode, MessageEnricher, ReportContext, Severity};
pub use error::{AdapterError, AdapterResult, ResourceError};
pub use message::{Body, Envelope, MetadataPair};
pub use metrics::AdapterMetrics;
pub use mode::{AdapterMode, Direction, ModeKind};
pub use policy::{
    evaluate, ErrorHandlingMode, FailureState, Notice, PolicyDecision, FAILURE_THRESHOLD,
};
pub use reporter::{HostReporter, TracingReporter};
pub use runtime::{AdapterRuntime, PollingContext, PollingStatus, JOIN_TIMEOUT};
pub use state::{ConnectionState, ConnectionStateMachine};
pub use traits::Resource;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
