//! Boundary to the host message bus.
//!
//! Resources never talk to the bus directly. During a polling iteration they receive a
//! [`BusPublisher`], which appends the metadata registered at connect time and forwards
//! envelopes to the host's [`HostBus`].

use crate::message::{Body, Envelope, MetadataPair};
use crate::metrics::AdapterMetrics;
use crate::{AdapterError, AdapterResult};
use async_trait::async_trait;
use danube_client::{DanubeClient, Producer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// Attribute carrying the envelope id on Danube messages
pub const ENVELOPE_ID_ATTRIBUTE: &str = "envelope_id";
/// Attribute telling consumers whether the body was text or bytes
pub const BODY_KIND_ATTRIBUTE: &str = "body_kind";

/// The host bus the framework publishes to
#[async_trait]
pub trait HostBus: Send + Sync {
    /// Hand an envelope to the bus. Durable delivery is the bus's concern.
    async fn publish(&self, envelope: Envelope) -> AdapterResult<()>;
}

/// Publishing handle given to a resource during a polling iteration
#[derive(Clone)]
pub struct BusPublisher {
    bus: Arc<dyn HostBus>,
    metadata: Arc<[MetadataPair]>,
    metrics: AdapterMetrics,
}

impl BusPublisher {
    /// `metadata` is appended to every published envelope; pass an empty list to disable
    pub fn new(
        bus: Arc<dyn HostBus>,
        metadata: Vec<MetadataPair>,
        metrics: AdapterMetrics,
    ) -> Self {
        Self {
            bus,
            metadata: metadata.into(),
            metrics,
        }
    }

    /// Metadata pairs appended to each envelope
    pub fn metadata(&self) -> &[MetadataPair] {
        &self.metadata
    }

    /// Publish an envelope produced by the resource
    pub async fn publish(&self, mut envelope: Envelope) -> AdapterResult<()> {
        envelope.append_metadata(self.metadata.iter());
        let topic = envelope.topic.clone();
        self.bus.publish(envelope).await?;
        self.metrics.record_published(&topic);
        Ok(())
    }
}

/// In-process bus backed by an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelBus {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelBus {
    /// Create the bus and the receiving end the host reads from
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl HostBus for ChannelBus {
    async fn publish(&self, envelope: Envelope) -> AdapterResult<()> {
        self.tx
            .send(envelope)
            .map_err(|_| AdapterError::Bus("channel receiver dropped".to_string()))
    }
}

/// Bus that publishes envelopes to Danube topics
///
/// One producer per topic, created on first use.
pub struct DanubeBus {
    client: DanubeClient,
    producer_name: String,
    reliable_dispatch: bool,
    producers: Mutex<HashMap<String, Producer>>, // topic -> producer
}

impl DanubeBus {
    /// Connect to a Danube broker
    pub async fn connect(
        service_url: &str,
        producer_name: impl Into<String>,
        reliable_dispatch: bool,
    ) -> AdapterResult<Self> {
        info!("Connecting to Danube at {}", service_url);

        let client = DanubeClient::builder()
            .service_url(service_url)
            .build()
            .await
            .map_err(|e| AdapterError::Bus(format!("Failed to create Danube client: {}", e)))?;

        Ok(Self {
            client,
            producer_name: producer_name.into(),
            reliable_dispatch,
            producers: Mutex::new(HashMap::new()),
        })
    }

    async fn create_producer(&self, topic: &str) -> AdapterResult<Producer> {
        // Generate producer name: adapter_name-topic_name
        let topic_suffix = topic.replace('/', "-");
        let producer_name = format!("{}-{}", self.producer_name, topic_suffix);

        let mut builder = self
            .client
            .new_producer()
            .with_topic(topic)
            .with_name(&producer_name);

        if self.reliable_dispatch {
            builder = builder.with_reliable_dispatch();
        }

        let mut producer = builder.build();
        producer.create().await.map_err(|e| {
            AdapterError::Bus(format!("Failed to create producer for topic {}: {}", topic, e))
        })?;

        info!("Producer created successfully for topic: {}", topic);
        Ok(producer)
    }
}

#[async_trait]
impl HostBus for DanubeBus {
    async fn publish(&self, envelope: Envelope) -> AdapterResult<()> {
        let mut producers = self.producers.lock().await;

        if !producers.contains_key(&envelope.topic) {
            let producer = self.create_producer(&envelope.topic).await?;
            producers.insert(envelope.topic.clone(), producer);
        }

        let producer = producers.get_mut(&envelope.topic).ok_or_else(|| {
            AdapterError::Bus(format!("No producer found for topic: {}", envelope.topic))
        })?;

        let mut attributes = envelope.metadata_map();
        attributes.insert(ENVELOPE_ID_ATTRIBUTE.to_string(), envelope.id.clone());
        let kind = match envelope.body {
            Body::Text(_) => "text",
            Body::Bytes(_) => "bytes",
        };
        attributes.insert(BODY_KIND_ATTRIBUTE.to_string(), kind.to_string());

        let message_id = producer
            .send(envelope.body.as_bytes().to_vec(), Some(attributes))
            .await
            .map_err(|e| {
                AdapterError::Bus(format!(
                    "Failed to publish to topic {}: {}",
                    envelope.topic, e
                ))
            })?;

        debug!("Envelope {} sent as message {}", envelope.id, message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publisher_appends_registered_metadata() {
        let (bus, mut rx) = ChannelBus::new();
        let publisher = BusPublisher::new(
            Arc::new(bus),
            vec![
                MetadataPair::new("adapter", "reader"),
                MetadataPair::new("site", "plant-a"),
            ],
            AdapterMetrics::new("reader"),
        );

        let envelope = Envelope::text("/default/readings", "21.5").with_metadata("sensor", "t-1");
        publisher.publish(envelope.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, envelope.id);
        assert_eq!(received.body, envelope.body);
        assert_eq!(
            received.metadata,
            vec![
                MetadataPair::new("sensor", "t-1"),
                MetadataPair::new("adapter", "reader"),
                MetadataPair::new("site", "plant-a"),
            ]
        );
    }

    #[tokio::test]
    async fn test_channel_bus_closed() {
        let (bus, rx) = ChannelBus::new();
        drop(rx);

        let result = bus.publish(Envelope::text("/default/t", "x")).await;
        assert!(matches!(result, Err(AdapterError::Bus(_))));
    }
}
