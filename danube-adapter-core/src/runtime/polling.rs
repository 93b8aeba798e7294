//! Polling loop for receiver adapters (External System → Bus)
//!
//! Runs as a single tokio task per connect cycle. Each iteration invokes the resource's
//! receive callback, applies the error policy on failure and then waits for the polling
//! interval. The wait is the only suspension point the runtime controls, and it is
//! raced against the cancellation token so a disconnect never waits a full interval.

use crate::audit::AuditConnector;
use crate::bus::BusPublisher;
use crate::enricher::MessageEnricher;
use crate::metrics::AdapterMetrics;
use crate::policy::{self, ErrorHandlingMode, FailureState, PolicyDecision};
use crate::reporter::HostReporter;
use crate::{Resource, ResourceError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Observable state of the polling task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    /// No polling task in this connect cycle (sender direction or disconnected)
    Idle,
    Running,
    /// Stopped after observing the cancellation signal
    Cancelled,
    /// Stopped by the StopPollingOnError policy, with the resource already torn down
    StoppedOnError,
    /// Forcibly terminated after the join timeout
    Aborted,
}

impl PollingStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, PollingStatus::Running)
    }
}

/// State owned by the polling task for one connect cycle
///
/// The control path only ever holds a clone of the cancellation token; the failure
/// state is never shared.
#[derive(Debug)]
pub struct PollingContext {
    failures: FailureState,
    cancel: CancellationToken,
}

impl PollingContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            failures: FailureState::reset(),
            cancel,
        }
    }

    pub fn failures(&self) -> FailureState {
        self.failures
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A successful iteration ends the current run of failures
    pub fn record_success(&mut self) {
        self.failures = FailureState::reset();
    }

    /// Apply the policy to a failed iteration and keep the resulting state
    pub fn record_failure(&mut self, mode: ErrorHandlingMode) -> PolicyDecision {
        let decision = policy::evaluate(mode, self.failures);
        self.failures = decision.next;
        decision
    }

    /// Wait for the interval; returns `false` if cancelled first
    async fn wait(&self, interval: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }
}

/// Everything the polling task needs, moved into it at spawn time
pub(crate) struct PollingLoop<R: Resource> {
    pub(crate) resource: Arc<R>,
    pub(crate) publisher: BusPublisher,
    pub(crate) error_handling: ErrorHandlingMode,
    pub(crate) interval: Duration,
    pub(crate) enricher: MessageEnricher,
    pub(crate) reporter: Arc<dyn HostReporter>,
    pub(crate) audit: Option<Arc<AuditConnector>>,
    pub(crate) metrics: AdapterMetrics,
    pub(crate) status: Arc<watch::Sender<PollingStatus>>,
}

impl<R: Resource> PollingLoop<R> {
    /// Main polling loop - runs until cancelled or stopped by the error policy
    pub(crate) async fn run(self, mut ctx: PollingContext) {
        info!(
            "Entering polling loop (interval: {:?}, error handling: {:?})",
            self.interval, self.error_handling
        );
        self.status.send_replace(PollingStatus::Running);

        let final_status = loop {
            let start = Instant::now();
            let result = self.resource.receive(&self.publisher).await;
            self.metrics.record_poll(start.elapsed());

            match result {
                Ok(()) => {
                    if ctx.failures().consecutive_failures > 0 {
                        info!(
                            "Polling recovered after {} failure(s)",
                            ctx.failures().consecutive_failures
                        );
                    }
                    ctx.record_success();
                }
                Err(err) => {
                    self.metrics.record_poll_failure();
                    let decision = ctx.record_failure(self.error_handling);
                    self.handle_failure(&err, &decision).await;

                    if decision.stop {
                        self.stop_on_error().await;
                        break PollingStatus::StoppedOnError;
                    }
                }
            }

            if !ctx.wait(self.interval).await {
                debug!("Polling loop cancelled");
                break PollingStatus::Cancelled;
            }
        };

        info!("Polling loop exited: {:?}", final_status);
        self.status.send_replace(final_status);
    }

    /// Best-effort teardown after the policy stopped the loop
    ///
    /// Runs before the final status is published, so an observer of
    /// `StoppedOnError` always sees a torn-down resource.
    async fn stop_on_error(&self) {
        info!("Stopping adapter after polling failure");
        if let Err(e) = self.resource.disconnect().await {
            warn!("Resource teardown failed: {}", e);
        }
        if let Some(audit) = &self.audit {
            audit.release().await;
        }
        self.metrics.set_connected(false);
    }

    async fn handle_failure(&self, err: &ResourceError, decision: &PolicyDecision) {
        let text = self.enricher.enrich(err, decision.notice);

        if decision.report {
            self.reporter.report(self.enricher.severity(), &text, Some(err));
        } else {
            debug!("Suppressed polling failure: {}", err);
        }
        self.metrics.record_report(!decision.report);

        if let (Some(audit), Some(envelope)) = (&self.audit, err.envelope()) {
            let party = self.enricher.party_for(err);
            audit.audit(envelope, err, &party, &text).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_tracks_failure_run() {
        let mut ctx = PollingContext::new(CancellationToken::new());
        let mode = ErrorHandlingMode::SuppressConsecutiveErrors;

        assert!(ctx.record_failure(mode).report);
        assert!(!ctx.record_failure(mode).report);
        assert_eq!(ctx.failures().consecutive_failures, 2);
        assert!(ctx.failures().suppressed);

        ctx.record_success();
        assert_eq!(ctx.failures(), FailureState::reset());
        assert!(ctx.record_failure(mode).report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_interrupted_by_cancel() {
        let cancel = CancellationToken::new();
        let ctx = PollingContext::new(cancel.clone());

        assert!(ctx.wait(Duration::from_secs(1)).await);

        let started = Instant::now();
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
        assert!(!ctx.wait(Duration::from_secs(3600)).await);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(ctx.is_cancelled());
        canceller.await.unwrap();
    }
}
