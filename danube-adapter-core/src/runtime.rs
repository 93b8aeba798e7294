//! Runtime managing the adapter lifecycle.
//!
//! The runtime handles:
//! - Mode selection and the connection state machine
//! - Resource connect/teardown
//! - The background polling task for receiver modes
//! - Direct send for sender modes
//! - Audit sink setup and release
//! - Bounded shutdown with forced termination as a last resort

mod polling;

pub use polling::{PollingContext, PollingStatus};

use crate::audit::{AuditConnector, AuditSinkFactory, JsonLinesAuditFactory};
use crate::bus::{BusPublisher, HostBus};
use crate::enricher::MessageEnricher;
use crate::message::Envelope;
use crate::metrics::AdapterMetrics;
use crate::mode::{AdapterMode, Direction};
use crate::reporter::{HostReporter, TracingReporter};
use crate::state::{ConnectionState, ConnectionStateMachine};
use crate::{AdapterConfig, AdapterError, AdapterResult, Resource};
use polling::PollingLoop;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long disconnect waits for the polling task before aborting it
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(90);

/// Per-connect-cycle state, dropped on disconnect
struct Session {
    audit: Option<Arc<AuditConnector>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Lifecycle controller for one adapter instance
///
/// The host drives `connect`, `send` and `disconnect` sequentially; receiver modes
/// additionally run one polling task between connect and disconnect.
pub struct AdapterRuntime<R: Resource> {
    resource: Arc<R>,
    config: AdapterConfig,
    bus: Arc<dyn HostBus>,
    reporter: Arc<dyn HostReporter>,
    audit_factory: Option<Arc<dyn AuditSinkFactory>>,
    machine: ConnectionStateMachine,
    metrics: AdapterMetrics,
    status: Arc<watch::Sender<PollingStatus>>,
    session: Option<Session>,
}

impl<R: Resource> AdapterRuntime<R> {
    /// Create a new runtime
    ///
    /// Fails with a startup validation error if the configuration or the resource's
    /// declared modes are invalid.
    pub fn new(resource: R, config: AdapterConfig, bus: Arc<dyn HostBus>) -> AdapterResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize tracing
        Self::init_tracing(&config);

        let machine = ConnectionStateMachine::new(resource.modes())?;

        info!("Initializing Adapter Runtime");
        info!("Adapter: {}", config.adapter_name);
        info!("Resource: {}", resource.name());
        info!(
            "Declared modes: {}",
            machine
                .declared()
                .iter()
                .map(|m| m.name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let audit_factory = config
            .audit_path
            .as_ref()
            .map(|path| Arc::new(JsonLinesAuditFactory::new(path)) as Arc<dyn AuditSinkFactory>);

        let (status, _) = watch::channel(PollingStatus::Idle);

        Ok(Self {
            resource: Arc::new(resource),
            reporter: Arc::new(TracingReporter::new(&config.adapter_name)),
            metrics: AdapterMetrics::new(&config.adapter_name),
            config,
            bus,
            audit_factory,
            machine,
            status: Arc::new(status),
            session: None,
        })
    }

    /// Replace the default tracing reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn HostReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use a custom audit sink instead of the JSON-lines file
    pub fn with_audit_factory(mut self, factory: Arc<dyn AuditSinkFactory>) -> Self {
        self.audit_factory = Some(factory);
        self
    }

    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Connection state as seen by the host
    ///
    /// A polling task stopped by the StopPollingOnError policy has already torn the
    /// resource down, so the adapter reads as disconnected from then on.
    pub fn state(&self) -> ConnectionState {
        if self.stopped_on_error() {
            ConnectionState::Disconnected
        } else {
            self.machine.state()
        }
    }

    pub fn active_mode(&self) -> Option<AdapterMode> {
        if self.stopped_on_error() {
            None
        } else {
            self.machine.active_mode()
        }
    }

    fn stopped_on_error(&self) -> bool {
        self.machine.state() == ConnectionState::Connected
            && *self.status.borrow() == PollingStatus::StoppedOnError
    }

    /// Finish the lifecycle of a cycle whose polling task stopped on error
    ///
    /// The task already ran resource teardown and released the audit sink.
    async fn reap_stopped(&mut self) -> AdapterResult<()> {
        if !self.stopped_on_error() {
            return Ok(());
        }

        debug!("Completing disconnect after polling stopped on error");
        self.machine.begin_disconnect()?;
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
            if let Some(task) = session.task {
                self.join_polling(task).await;
            }
        }
        self.machine.complete_disconnect()?;
        self.metrics.set_connected(false);
        Ok(())
    }

    /// Current status of the polling task
    pub fn polling_status(&self) -> PollingStatus {
        *self.status.borrow()
    }

    /// Subscribe to polling status changes
    pub fn watch_polling(&self) -> watch::Receiver<PollingStatus> {
        self.status.subscribe()
    }

    /// Connect the adapter in the named mode
    ///
    /// The mode name is matched case-insensitively against the declared modes before
    /// the resource is touched. A resource connect failure leaves the adapter
    /// disconnected and is not retried.
    pub async fn connect(&mut self, mode_name: &str) -> AdapterResult<AdapterMode> {
        self.reap_stopped().await?;

        let state = self.machine.state();
        if state != ConnectionState::Disconnected {
            return Err(AdapterError::invalid_state(
                ConnectionState::Disconnected,
                state,
            ));
        }

        let mode = self.machine.select_mode(mode_name)?;

        let audit_factory = if self.config.audit_on_failure && mode.is_polling() {
            let factory = self.audit_factory.clone().ok_or_else(|| {
                AdapterError::config(
                    "audit_on_failure requires audit_path or a custom audit sink factory",
                )
            })?;
            Some(factory)
        } else {
            None
        };

        self.machine.begin_connect(mode)?;
        info!("Connecting adapter {} in mode {}", self.config.adapter_name, mode);

        if let Err(e) = self.resource.connect().await {
            self.machine.abort_connect()?;
            error!("Resource connect failed: {}", e);
            return Err(AdapterError::connect(
                format!("Failed to connect adapter {}", self.config.adapter_name),
                e,
            ));
        }

        self.machine.complete_connect()?;
        self.metrics.set_connected(true);

        let audit = audit_factory.map(|factory| {
            Arc::new(AuditConnector::new(
                factory,
                Arc::clone(&self.reporter),
                self.metrics.clone(),
            ))
        });

        let cancel = CancellationToken::new();
        let task = if mode.is_polling() {
            Some(self.spawn_polling(audit.clone(), cancel.clone()))
        } else {
            self.status.send_replace(PollingStatus::Idle);
            None
        };

        self.session = Some(Session {
            audit,
            cancel,
            task,
        });

        info!("Adapter connected successfully");
        Ok(mode)
    }

    fn spawn_polling(
        &self,
        audit: Option<Arc<AuditConnector>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let metadata = if self.config.include_metadata {
            self.resource.metadata()
        } else {
            Vec::new()
        };

        let polling = PollingLoop {
            resource: Arc::clone(&self.resource),
            publisher: BusPublisher::new(Arc::clone(&self.bus), metadata, self.metrics.clone()),
            error_handling: self.config.error_handling,
            interval: self.config.polling_interval(),
            enricher: MessageEnricher::new(
                self.config.report_context(),
                self.config.error_report_mode,
            ),
            reporter: Arc::clone(&self.reporter),
            audit,
            metrics: self.metrics.clone(),
            status: Arc::clone(&self.status),
        };

        // Mark running before the task is scheduled so callers never observe Idle
        self.status.send_replace(PollingStatus::Running);
        tokio::spawn(polling.run(PollingContext::new(cancel)))
    }

    /// Hand a host envelope to the resource (sender modes)
    ///
    /// A resource failure is returned as `AdapterError::Resource` holding the
    /// resource's error unchanged.
    pub async fn send(&self, envelope: &Envelope) -> AdapterResult<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(AdapterError::invalid_state(ConnectionState::Connected, state));
        }

        match self.machine.active_mode() {
            Some(mode) if mode.direction() == Direction::Sender => {}
            Some(mode) => {
                return Err(AdapterError::invalid_state(
                    "a sender mode",
                    format!("mode {}", mode),
                ))
            }
            None => return Err(AdapterError::invalid_state("an active mode", "none")),
        }

        debug!("Sending envelope {} to resource", envelope.id);
        self.resource.send(envelope).await?;
        self.metrics.record_sent();
        Ok(())
    }

    /// Disconnect the adapter
    ///
    /// Teardown and audit release failures are logged, never returned; the adapter
    /// always ends up disconnected. A polling task that does not observe cancellation
    /// within [`JOIN_TIMEOUT`] is aborted. After the polling task stopped on error the
    /// resource is not torn down a second time.
    pub async fn disconnect(&mut self) -> AdapterResult<()> {
        if self.stopped_on_error() {
            return self.reap_stopped().await;
        }

        if self.machine.state() == ConnectionState::Disconnected {
            debug!("Adapter already disconnected");
            return Ok(());
        }

        self.machine.begin_disconnect()?;
        info!("Disconnecting adapter {}", self.config.adapter_name);

        if let Err(e) = self.resource.disconnect().await {
            warn!("Resource teardown failed: {}", e);
        }

        if let Some(session) = self.session.take() {
            session.cancel.cancel();

            if let Some(audit) = &session.audit {
                audit.release().await;
            }

            if let Some(task) = session.task {
                self.join_polling(task).await;
            }
        }

        self.machine.complete_disconnect()?;
        self.metrics.set_connected(false);
        info!("Adapter disconnected");
        Ok(())
    }

    async fn join_polling(&self, mut task: JoinHandle<()>) {
        match tokio::time::timeout(JOIN_TIMEOUT, &mut task).await {
            Ok(Ok(())) => debug!("Polling task stopped"),
            Ok(Err(e)) => {
                error!("Polling task failed: {}", e);
                self.status.send_replace(PollingStatus::Aborted);
            }
            Err(_) => {
                // Last resort: the task never reached its cancellable wait
                error!(
                    "Polling task did not stop within {:?}, forcing termination",
                    JOIN_TIMEOUT
                );
                task.abort();
                self.metrics.record_forced_termination();
                self.status.send_replace(PollingStatus::Aborted);
            }
        }
    }

    /// Initialize tracing/logging
    fn init_tracing(config: &AdapterConfig) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(); // Ignore if already initialized
    }
}

impl<R: Resource> Drop for AdapterRuntime<R> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }
}
