//! Outbound message encoding: size policy and body compression

use crate::config::ProducerConfig;
use crate::error::{ProducerError, ProducerResult};
use crate::message::{properties, Destination, Message};
use chrono::{DateTime, Utc};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Body is zlib-compressed
pub const FLAG_COMPRESSED: u32 = 0x1;

/// Message is a half message awaiting a transaction decision
pub const FLAG_TRANSACTION_PREPARED: u32 = 0x4;

/// A message as handed to the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub topic: String,
    pub tag: Option<String>,
    pub key: String,
    pub body: Vec<u8>,
    pub properties: BTreeMap<String, String>,
    pub flags: u32,
    pub born_at: DateTime<Utc>,
}

impl WireMessage {
    /// Encode a message for a destination
    ///
    /// Rejects empty and oversized bodies, then compresses bodies above the
    /// configured threshold.
    pub fn encode(
        destination: &Destination,
        message: &Message,
        config: &ProducerConfig,
    ) -> ProducerResult<Self> {
        let payload = message.payload();

        if payload.is_empty() {
            return Err(ProducerError::PermanentSend(
                "message body length is zero".to_string(),
            ));
        }

        if payload.len() > config.max_message_size {
            return Err(ProducerError::MessageTooLarge {
                size: payload.len(),
                max: config.max_message_size,
            });
        }

        let mut flags = 0;
        let body = if payload.len() > config.compress_message_body_threshold {
            flags |= FLAG_COMPRESSED;
            compress(payload, config.compress_level)?
        } else {
            payload.to_vec()
        };

        let mut props = message.properties().clone();
        props.insert(properties::UNIQUE_KEY.to_string(), message.key().to_string());
        if let Some(tag) = destination.tag() {
            props.insert(properties::TAGS.to_string(), tag.to_string());
        }
        if props.get(properties::TRANSACTION_PREPARED).map(String::as_str) == Some("true") {
            flags |= FLAG_TRANSACTION_PREPARED;
        }

        Ok(Self {
            topic: destination.topic().to_string(),
            tag: destination.tag().map(str::to_string),
            key: message.key().to_string(),
            body,
            properties: props,
            flags,
            born_at: Utc::now(),
        })
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn is_half_message(&self) -> bool {
        self.flags & FLAG_TRANSACTION_PREPARED != 0
    }

    /// Uncompressed body
    pub fn decoded_body(&self) -> ProducerResult<Vec<u8>> {
        if !self.is_compressed() {
            return Ok(self.body.clone());
        }

        let mut decoder = ZlibDecoder::new(&self.body[..]);
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| ProducerError::PermanentSend(format!("decompression failed: {}", e)))?;
        Ok(decompressed)
    }

    /// Rebuild the application-level message
    pub fn to_message(&self) -> ProducerResult<Message> {
        let mut builder = Message::builder().key(self.key.clone()).payload(self.decoded_body()?);
        for (name, value) in &self.properties {
            builder = builder.property(name.clone(), value.clone());
        }
        Ok(builder.build())
    }
}

fn compress(payload: &[u8], level: u32) -> ProducerResult<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(payload)
        .map_err(|e| ProducerError::PermanentSend(format!("compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| ProducerError::PermanentSend(format!("compression failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination() -> Destination {
        Destination::parse("orders:created").unwrap()
    }

    #[test]
    fn test_small_body_sent_as_is() {
        let config = ProducerConfig::default();
        let message = Message::builder().key("k1").payload("hello").build();

        let wire = WireMessage::encode(&destination(), &message, &config).unwrap();
        assert!(!wire.is_compressed());
        assert_eq!(wire.body, b"hello");
        assert_eq!(wire.properties.get(properties::UNIQUE_KEY).unwrap(), "k1");
        assert_eq!(wire.properties.get(properties::TAGS).unwrap(), "created");
    }

    #[test]
    fn test_large_body_compressed_transparently() {
        let config = ProducerConfig::default();
        let payload = vec![b'x'; 3000];
        let message = Message::new(payload.clone());

        let wire = WireMessage::encode(&destination(), &message, &config).unwrap();
        assert!(wire.is_compressed());
        assert!(wire.body.len() < payload.len());
        assert_eq!(wire.decoded_body().unwrap(), payload);
        assert_eq!(wire.to_message().unwrap().payload(), &payload[..]);
    }

    #[test]
    fn test_oversized_body_rejected() {
        let config = ProducerConfig {
            max_message_size: 4096,
            ..Default::default()
        };
        let message = Message::new(vec![0u8; 5000]);

        let err = WireMessage::encode(&destination(), &message, &config).unwrap_err();
        assert_eq!(err, ProducerError::MessageTooLarge { size: 5000, max: 4096 });
    }

    #[test]
    fn test_empty_body_rejected() {
        let config = ProducerConfig::default();
        let err = WireMessage::encode(&destination(), &Message::new(Vec::new()), &config)
            .unwrap_err();
        assert!(matches!(err, ProducerError::PermanentSend(_)));
    }

    #[test]
    fn test_half_message_flag() {
        let config = ProducerConfig::default();
        let message = Message::builder()
            .payload("p")
            .property(properties::TRANSACTION_PREPARED, "true")
            .build();

        let wire = WireMessage::encode(&destination(), &message, &config).unwrap();
        assert!(wire.is_half_message());
    }
}
