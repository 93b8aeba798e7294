//! Contract implemented by concrete adapters.

use crate::bus::BusPublisher;
use crate::message::{Envelope, MetadataPair};
use crate::mode::AdapterMode;
use crate::ResourceError;
use async_trait::async_trait;

/// Resource-specific half of an adapter (datastore, serial device, HTTP endpoint, ...)
///
/// The runtime owns lifecycle, polling and error policy; implementations only do I/O.
/// Methods take `&self` because teardown may run while a receive is still in flight on
/// the polling task, so implementations keep their connection state behind interior
/// mutability.
///
/// The runtime does not time-bound any callback. Implementations that block a thread
/// should move that work to `tokio::task::spawn_blocking`; a forced shutdown can only
/// interrupt a callback at an await point.
///
/// # Example
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use danube_adapter_core::{AdapterMode, BusPublisher, Envelope, Resource, ResourceError};
///
/// struct Thermometer;
///
/// #[async_trait]
/// impl Resource for Thermometer {
///     fn modes(&self) -> Vec<AdapterMode> {
///         vec![AdapterMode::publish()]
///     }
///
///     async fn connect(&self) -> Result<(), ResourceError> {
///         Ok(())
///     }
///
///     async fn receive(&self, bus: &BusPublisher) -> Result<(), ResourceError> {
///         bus.publish(Envelope::text("/default/temperature", "21.5"))
///             .await
///             .map_err(|e| ResourceError::with_source("publish failed", e))
///     }
/// }
/// ```
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Name used in lifecycle logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Modes this adapter supports. Called once when the runtime is built.
    fn modes(&self) -> Vec<AdapterMode>;

    /// Fixed name/value pairs appended to every published envelope when metadata
    /// inclusion is enabled. Read once per connect cycle.
    fn metadata(&self) -> Vec<MetadataPair> {
        Vec::new()
    }

    /// Establish the backing connection. Called once per connect cycle; a failure is
    /// fatal to that connect attempt.
    async fn connect(&self) -> Result<(), ResourceError>;

    /// Best-effort teardown. Errors are logged by the runtime and never propagated.
    async fn disconnect(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Write a host envelope to the resource (sender direction)
    async fn send(&self, _envelope: &Envelope) -> Result<(), ResourceError> {
        Err(ResourceError::unsupported("send"))
    }

    /// One polling iteration (receiver direction). May publish any number of
    /// envelopes through `bus` before returning or failing.
    async fn receive(&self, _bus: &BusPublisher) -> Result<(), ResourceError> {
        Err(ResourceError::unsupported("receive"))
    }
}
