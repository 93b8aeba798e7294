//! Simple sender adapter example
//!
//! The host hands envelopes to the runtime, which writes them to a resource that
//! prints them to stdout.
//!
//! Usage:
//!   ADAPTER_NAME=simple-sink cargo run --example simple_sink

use async_trait::async_trait;
use danube_adapter_core::{
    AdapterConfig, AdapterMode, AdapterRuntime, ChannelBus, Envelope, Resource, ResourceError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A resource that prints every envelope it is given
struct StdoutWriter {
    written: AtomicU64,
}

#[async_trait]
impl Resource for StdoutWriter {
    fn modes(&self) -> Vec<AdapterMode> {
        vec![AdapterMode::subscribe(), AdapterMode::solicit_response()]
    }

    async fn connect(&self) -> Result<(), ResourceError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ResourceError> {
        println!(
            "Total envelopes written: {}",
            self.written.load(Ordering::SeqCst)
        );
        Ok(())
    }

    async fn send(&self, envelope: &Envelope) -> Result<(), ResourceError> {
        if envelope.body.is_empty() {
            return Err(ResourceError::new("refusing to write an empty body")
                .with_envelope(envelope.clone()));
        }

        let n = self.written.fetch_add(1, Ordering::SeqCst) + 1;
        println!("=== Envelope #{} ===", n);
        println!("Id: {}", envelope.id);
        println!("Topic: {}", envelope.topic);
        println!("Size: {} bytes", envelope.size());

        match envelope.body_str() {
            Ok(text) => println!("Body (text): {}", text),
            Err(_) => println!("Body (binary): {} bytes", envelope.body.len()),
        }

        if !envelope.metadata.is_empty() {
            println!("Metadata:");
            for pair in &envelope.metadata {
                println!("  {} = {}", pair.name, pair.value);
            }
        }
        println!();
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AdapterConfig::from_env().unwrap_or_else(|_| AdapterConfig {
        adapter_name: "simple-sink".to_string(),
        ..AdapterConfig::default()
    });

    // Sender modes never publish, the bus is only required by the runtime signature
    let (bus, _rx) = ChannelBus::new();
    let writer = StdoutWriter {
        written: AtomicU64::new(0),
    };
    let mut runtime = AdapterRuntime::new(writer, config, Arc::new(bus))?;
    runtime.connect("Subscribe").await?;

    let envelopes = vec![
        Envelope::text("/default/commands", "open-valve").with_metadata("valve", "3"),
        Envelope::bytes("/default/commands", vec![0x10, 0x20, 0x30]),
        Envelope::text("/default/commands", ""),
    ];

    for envelope in &envelopes {
        if let Err(e) = runtime.send(envelope).await {
            eprintln!("Send failed: {}", e);
        }
    }

    runtime.disconnect().await?;
    Ok(())
}
