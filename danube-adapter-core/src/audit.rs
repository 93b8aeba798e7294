//! Audit side channel for envelopes that failed while polling.
//!
//! The sink is built lazily on the first failure of a connect cycle and released on
//! disconnect. Nothing in here ever propagates an error to the polling loop: build and
//! write failures are reported to the host at `Error` severity and the loop carries on.

use crate::enricher::Severity;
use crate::message::{Body, Envelope};
use crate::metrics::AdapterMetrics;
use crate::reporter::HostReporter;
use crate::{AdapterError, AdapterResult, ResourceError};
use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Destination for failed envelopes
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn audit(
        &self,
        envelope: &Envelope,
        error: &ResourceError,
        party_id: &str,
        detail: &str,
    ) -> AdapterResult<()>;

    /// Release any held resources
    async fn close(&self) -> AdapterResult<()> {
        Ok(())
    }
}

/// Builds an [`AuditSink`] on demand
#[async_trait]
pub trait AuditSinkFactory: Send + Sync {
    async fn create(&self) -> AdapterResult<Arc<dyn AuditSink>>;
}

enum SinkSlot {
    Empty,
    Ready(Arc<dyn AuditSink>),
    Released,
}

/// Upper bound on flushing the sink during release
pub const AUDIT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lazily established audit channel, one per connect cycle
///
/// The slot lock is never held across an await on the factory or the sink, so
/// `release` cannot be stalled by a hung build or write.
pub struct AuditConnector {
    factory: Arc<dyn AuditSinkFactory>,
    reporter: Arc<dyn HostReporter>,
    metrics: AdapterMetrics,
    slot: Mutex<SinkSlot>,
    released: CancellationToken,
}

impl AuditConnector {
    pub fn new(
        factory: Arc<dyn AuditSinkFactory>,
        reporter: Arc<dyn HostReporter>,
        metrics: AdapterMetrics,
    ) -> Self {
        Self {
            factory,
            reporter,
            metrics,
            slot: Mutex::new(SinkSlot::Empty),
            released: CancellationToken::new(),
        }
    }

    /// Record a failed envelope. Never fails.
    ///
    /// A failed build leaves the slot empty, so the next failure tries again.
    pub async fn audit(
        &self,
        envelope: &Envelope,
        error: &ResourceError,
        party_id: &str,
        detail: &str,
    ) {
        let Some(sink) = self.sink(envelope, error).await else {
            return;
        };

        let written = tokio::select! {
            biased;
            _ = self.released.cancelled() => {
                debug!("Audit sink released while writing envelope {}", envelope.id);
                return;
            }
            written = sink.audit(envelope, error, party_id, detail) => written,
        };

        if let Err(e) = written {
            self.metrics.record_audit_failure();
            self.reporter.report(
                Severity::Error,
                &format!("Failed to audit envelope {}: {}", envelope.id, e),
                Some(error),
            );
        }
    }

    async fn sink(
        &self,
        envelope: &Envelope,
        error: &ResourceError,
    ) -> Option<Arc<dyn AuditSink>> {
        match &*self.slot.lock().await {
            SinkSlot::Ready(sink) => return Some(Arc::clone(sink)),
            SinkSlot::Released => {
                debug!("Audit sink released, skipping envelope {}", envelope.id);
                return None;
            }
            SinkSlot::Empty => {}
        }

        let created = tokio::select! {
            biased;
            _ = self.released.cancelled() => {
                debug!("Audit sink released while it was being built");
                return None;
            }
            created = self.factory.create() => created,
        };

        let sink = match created {
            Ok(sink) => sink,
            Err(e) => {
                self.metrics.record_audit_failure();
                self.reporter.report(
                    Severity::Error,
                    &format!("Failed to establish audit sink: {}", e),
                    Some(error),
                );
                return None;
            }
        };

        let mut slot = self.slot.lock().await;
        match &*slot {
            SinkSlot::Empty => {
                *slot = SinkSlot::Ready(Arc::clone(&sink));
                Some(sink)
            }
            SinkSlot::Ready(existing) => Some(Arc::clone(existing)),
            SinkSlot::Released => {
                drop(slot);
                close_sink(sink).await;
                None
            }
        }
    }

    /// Close the sink and refuse further audits. Errors are logged only.
    ///
    /// Interrupts an in-flight build or write, and gives up on the flush after
    /// [`AUDIT_CLOSE_TIMEOUT`].
    pub async fn release(&self) {
        self.released.cancel();
        let previous = std::mem::replace(&mut *self.slot.lock().await, SinkSlot::Released);
        if let SinkSlot::Ready(sink) = previous {
            close_sink(sink).await;
        }
    }

    /// Whether a sink has been established in this cycle
    pub async fn is_established(&self) -> bool {
        matches!(*self.slot.lock().await, SinkSlot::Ready(_))
    }
}

async fn close_sink(sink: Arc<dyn AuditSink>) {
    match tokio::time::timeout(AUDIT_CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to close audit sink: {}", e),
        Err(_) => warn!(
            "Audit sink did not close within {:?}, abandoning it",
            AUDIT_CLOSE_TIMEOUT
        ),
    }
}

#[derive(Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    envelope_id: &'a str,
    topic: &'a str,
    body_kind: &'static str,
    body: String,
    metadata: &'a [crate::message::MetadataPair],
    party_id: &'a str,
    error: String,
    detail: &'a str,
}

/// Audit sink that appends one JSON document per line to a file
///
/// Binary bodies are stored base64-encoded.
pub struct JsonLinesAuditSink {
    file: Mutex<tokio::fs::File>,
}

impl JsonLinesAuditSink {
    /// Open (or create) the audit file in append mode
    pub async fn open(path: impl Into<PathBuf>) -> AdapterResult<Self> {
        let path = path.into();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                AdapterError::Audit(format!("Failed to open audit file {}: {}", path.display(), e))
            })?;

        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl AuditSink for JsonLinesAuditSink {
    async fn audit(
        &self,
        envelope: &Envelope,
        error: &ResourceError,
        party_id: &str,
        detail: &str,
    ) -> AdapterResult<()> {
        let (body_kind, body) = match &envelope.body {
            Body::Text(text) => ("text", text.clone()),
            Body::Bytes(bytes) => (
                "base64",
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ),
        };

        let record = AuditRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            envelope_id: &envelope.id,
            topic: &envelope.topic,
            body_kind,
            body,
            metadata: &envelope.metadata,
            party_id,
            error: error.to_string(),
            detail,
        };

        let mut line =
            serde_json::to_vec(&record).map_err(|e| AdapterError::Serialization(e.to_string()))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn close(&self) -> AdapterResult<()> {
        self.file.lock().await.sync_all().await?;
        Ok(())
    }
}

/// Factory opening a [`JsonLinesAuditSink`] at a fixed path
#[derive(Debug, Clone)]
pub struct JsonLinesAuditFactory {
    path: PathBuf,
}

impl JsonLinesAuditFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AuditSinkFactory for JsonLinesAuditFactory {
    async fn create(&self) -> AdapterResult<Arc<dyn AuditSink>> {
        let sink: Arc<dyn AuditSink> = Arc::new(JsonLinesAuditSink::open(&self.path).await?);
        Ok(sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingReporter {
        reports: StdMutex<Vec<(Severity, String)>>,
    }

    impl HostReporter for RecordingReporter {
        fn report(&self, severity: Severity, message: &str, _error: Option<&ResourceError>) {
            self.reports
                .lock()
                .unwrap()
                .push((severity, message.to_string()));
        }
    }

    struct FailingFactory {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl AuditSinkFactory for FailingFactory {
        async fn create(&self) -> AdapterResult<Arc<dyn AuditSink>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(AdapterError::Audit("store unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_json_lines_sink_writes_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let reporter = Arc::new(RecordingReporter::default());
        let connector = AuditConnector::new(
            Arc::new(JsonLinesAuditFactory::new(&path)),
            reporter.clone(),
            AdapterMetrics::new("test"),
        );

        let envelope = Envelope::bytes("/default/raw", vec![1, 2, 3]).with_metadata("k", "v");
        let error = ResourceError::new("insert rejected");
        connector.audit(&envelope, &error, "acme", "row 7").await;
        connector.audit(&envelope, &error, "acme", "row 8").await;
        assert!(connector.is_established().await);
        connector.release().await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["envelope_id"], envelope.id.as_str());
        assert_eq!(lines[0]["body_kind"], "base64");
        assert_eq!(lines[0]["body"], "AQID");
        assert_eq!(lines[0]["error"], "insert rejected");
        assert_eq!(lines[1]["detail"], "row 8");
        assert!(reporter.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_build_failure_is_reported_not_raised() {
        let factory = Arc::new(FailingFactory {
            attempts: AtomicUsize::new(0),
        });
        let reporter = Arc::new(RecordingReporter::default());
        let connector =
            AuditConnector::new(factory.clone(), reporter.clone(), AdapterMetrics::new("test"));

        let envelope = Envelope::text("/default/t", "x");
        let error = ResourceError::new("boom");
        connector.audit(&envelope, &error, "Unknown", "").await;

        let reports = reporter.reports.lock().unwrap().clone();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, Severity::Error);
        assert!(reports[0].1.contains("store unreachable"));
        assert_eq!(factory.attempts.load(Ordering::SeqCst), 1);
        assert!(!connector.is_established().await);
    }

    struct PendingFactory;

    #[async_trait]
    impl AuditSinkFactory for PendingFactory {
        async fn create(&self) -> AdapterResult<Arc<dyn AuditSink>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_interrupts_pending_build() {
        let reporter = Arc::new(RecordingReporter::default());
        let connector = Arc::new(AuditConnector::new(
            Arc::new(PendingFactory),
            reporter.clone(),
            AdapterMetrics::new("test"),
        ));

        let auditing = tokio::spawn({
            let connector = Arc::clone(&connector);
            async move {
                connector
                    .audit(&Envelope::text("/default/t", "x"), &ResourceError::new("boom"), "p", "")
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        tokio::time::timeout(std::time::Duration::from_secs(1), connector.release())
            .await
            .unwrap();
        auditing.await.unwrap();

        assert!(!connector.is_established().await);
        assert!(reporter.reports.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_released_connector_skips() {
        let factory = Arc::new(FailingFactory {
            attempts: AtomicUsize::new(0),
        });
        let reporter = Arc::new(RecordingReporter::default());
        let connector =
            AuditConnector::new(factory.clone(), reporter.clone(), AdapterMetrics::new("test"));

        connector.release().await;
        connector
            .audit(&Envelope::text("/default/t", "x"), &ResourceError::new("boom"), "p", "")
            .await;

        assert_eq!(factory.attempts.load(Ordering::SeqCst), 0);
        assert!(reporter.reports.lock().unwrap().is_empty());
    }
}
