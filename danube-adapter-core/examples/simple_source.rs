//! Simple receiver adapter example
//!
//! Polls a fake sensor and publishes one reading per polling interval. Every fifth
//! reading fails so the error-handling policy can be observed in the logs.
//!
//! Usage:
//!   ADAPTER_NAME=simple-source \
//!   POLLING_INTERVAL_SECS=2 \
//!   DANUBE_SERVICE_URL=http://localhost:6650 \
//!   cargo run --example simple_source
//!
//! Without `DANUBE_SERVICE_URL` the envelopes are printed from an in-process bus.

use async_trait::async_trait;
use danube_adapter_core::{
    AdapterConfig, AdapterMode, AdapterRuntime, BusPublisher, ChannelBus, DanubeBus, Envelope,
    HostBus, MetadataPair, Resource, ResourceError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const TOPIC: &str = "/default/readings";

/// A fake temperature sensor
struct SimpleSensor {
    readings: AtomicU64,
}

#[async_trait]
impl Resource for SimpleSensor {
    fn modes(&self) -> Vec<AdapterMode> {
        vec![AdapterMode::publish()]
    }

    fn metadata(&self) -> Vec<MetadataPair> {
        vec![
            MetadataPair::new("adapter", "simple-sensor"),
            MetadataPair::new("unit", "celsius"),
        ]
    }

    async fn connect(&self) -> Result<(), ResourceError> {
        println!("Sensor connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ResourceError> {
        println!(
            "Sensor disconnected after {} readings",
            self.readings.load(Ordering::SeqCst)
        );
        Ok(())
    }

    async fn receive(&self, bus: &BusPublisher) -> Result<(), ResourceError> {
        let n = self.readings.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 5 == 0 {
            return Err(ResourceError::new(format!("sensor timeout on reading #{}", n)));
        }

        let value = 20.0 + (n % 7) as f64 * 0.5;
        let envelope = Envelope::from_json(
            TOPIC,
            &serde_json::json!({ "reading": n, "temperature": value }),
        )
        .map_err(|e| ResourceError::with_source("failed to encode reading", e))?;

        bus.publish(envelope)
            .await
            .map_err(|e| ResourceError::with_source("failed to publish reading", e))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = AdapterConfig::from_env().unwrap_or_else(|_| {
        println!("ADAPTER_NAME not set, using defaults");
        AdapterConfig {
            adapter_name: "simple-source".to_string(),
            polling_interval_secs: 2,
            ..AdapterConfig::default()
        }
    });
    config.include_metadata = true;

    let bus: Arc<dyn HostBus> = match std::env::var("DANUBE_SERVICE_URL") {
        Ok(url) => Arc::new(DanubeBus::connect(&url, config.adapter_name.clone(), true).await?),
        Err(_) => {
            let (bus, mut rx) = ChannelBus::new();
            tokio::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    println!(
                        "[{}] {} {:?}",
                        envelope.topic,
                        envelope.body_str().unwrap_or("<binary>"),
                        envelope.metadata_map()
                    );
                }
            });
            Arc::new(bus)
        }
    };

    let sensor = SimpleSensor {
        readings: AtomicU64::new(0),
    };
    let mut runtime = AdapterRuntime::new(sensor, config, bus)?;
    runtime.connect("publish").await?;

    println!("Polling, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;

    runtime.disconnect().await?;
    println!("Final polling status: {:?}", runtime.polling_status());
    Ok(())
}
