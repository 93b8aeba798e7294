//! Envelopes exchanged with the host bus.
//!
//! An [`Envelope`] is built by adapter-specific code when data is received from the
//! resource, and handed to the resource unchanged when the host sends. The framework
//! never touches the body; it only appends registered metadata pairs.

use crate::{AdapterError, AdapterResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Envelope body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

impl Body {
    /// Body as raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Text(text) => text.as_bytes(),
            Body::Bytes(bytes) => bytes,
        }
    }

    /// Body size in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single name/value metadata entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPair {
    pub name: String,
    pub value: String,
}

impl MetadataPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Unit of data exchanged with the host bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique envelope identifier
    pub id: String,
    /// Bus topic the envelope belongs to
    pub topic: String,
    /// Payload, never modified by the framework
    pub body: Body,
    /// Ordered name/value pairs
    pub metadata: Vec<MetadataPair>,
}

impl Envelope {
    /// Create a new envelope with a generated id
    pub fn new(topic: impl Into<String>, body: Body) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            body,
            metadata: Vec::new(),
        }
    }

    /// Create an envelope with a text body
    pub fn text(topic: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(topic, Body::Text(text.into()))
    }

    /// Create an envelope with a binary body
    pub fn bytes(topic: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(topic, Body::Bytes(bytes))
    }

    /// Create an envelope from a JSON-serializable object
    pub fn from_json<T: Serialize>(topic: impl Into<String>, data: &T) -> AdapterResult<Self> {
        let text =
            serde_json::to_string(data).map_err(|e| AdapterError::Serialization(e.to_string()))?;
        Ok(Self::text(topic, text))
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Append a metadata pair
    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push(MetadataPair::new(name, value));
        self
    }

    /// Append pairs in order, keeping any already present
    pub fn append_metadata<'a>(&mut self, pairs: impl IntoIterator<Item = &'a MetadataPair>) {
        self.metadata.extend(pairs.into_iter().cloned());
    }

    /// First value registered under `name`
    pub fn get_metadata(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|pair| pair.name == name)
            .map(|pair| pair.value.as_str())
    }

    /// Metadata as a map, later pairs winning on duplicate names
    pub fn metadata_map(&self) -> HashMap<String, String> {
        self.metadata
            .iter()
            .map(|pair| (pair.name.clone(), pair.value.clone()))
            .collect()
    }

    /// Body as a UTF-8 string (if valid)
    pub fn body_str(&self) -> AdapterResult<&str> {
        std::str::from_utf8(self.body.as_bytes()).map_err(|e| {
            AdapterError::Serialization(format!("Body is not valid UTF-8: {}", e))
        })
    }

    /// Deserialize the body as JSON
    pub fn body_json<T: DeserializeOwned>(&self) -> AdapterResult<T> {
        serde_json::from_slice(self.body.as_bytes())
            .map_err(|e| AdapterError::Serialization(format!("Failed to deserialize JSON: {}", e)))
    }

    /// Body size in bytes
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[test]
    fn test_envelope_basic() {
        let envelope = Envelope::bytes("/default/events", b"test".to_vec());

        assert_eq!(envelope.topic, "/default/events");
        assert_eq!(envelope.body.as_bytes(), b"test");
        assert_eq!(envelope.size(), 4);
        assert!(envelope.metadata.is_empty());
        assert!(!envelope.id.is_empty());
    }

    #[test]
    fn test_envelope_json() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Reading {
            sensor: String,
            value: i32,
        }

        let data = Reading {
            sensor: "t-1".to_string(),
            value: 42,
        };

        let envelope = Envelope::from_json("/default/readings", &data).unwrap();
        let decoded: Reading = envelope.body_json().unwrap();

        assert_eq!(decoded, data);
        assert_eq!(envelope.body_str().unwrap(), r#"{"sensor":"t-1","value":42}"#);
    }

    #[test]
    fn test_metadata_order_preserved() {
        let mut envelope = Envelope::text("/default/events", "hello")
            .with_metadata("source", "serial-1")
            .with_metadata("line", "7");

        let registered = vec![MetadataPair::new("adapter", "demo")];
        envelope.append_metadata(&registered);

        let names: Vec<&str> = envelope.metadata.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["source", "line", "adapter"]);
        assert_eq!(envelope.get_metadata("line"), Some("7"));
        assert_eq!(envelope.get_metadata("missing"), None);
        assert_eq!(envelope.body, Body::Text("hello".to_string()));
    }

    #[test]
    fn test_invalid_utf8_body() {
        let envelope = Envelope::bytes("/default/raw", vec![0xff, 0xfe]);
        assert!(envelope.body_str().is_err());
    }
}
