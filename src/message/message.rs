use crate::error::ProducerResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// An application event to deliver
///
/// Immutable once built. Cloning is cheap; the payload is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    key: String,
    payload: Arc<[u8]>,
    properties: BTreeMap<String, String>,
}

impl Message {
    /// Message with a generated key and no properties
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self::builder().payload(payload).build()
    }

    /// Message whose payload is the JSON form of `value`
    pub fn json<T: Serialize>(value: &T) -> ProducerResult<Self> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(payload))
    }

    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Unique message key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Copy of this message with extra properties
    pub(crate) fn with_properties<I>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut properties = self.properties.clone();
        properties.extend(extra);
        Self {
            key: self.key.clone(),
            payload: self.payload.clone(),
            properties,
        }
    }
}

/// Builder for [`Message`]
#[derive(Debug, Default)]
pub struct MessageBuilder {
    key: Option<String>,
    payload: Vec<u8>,
    properties: BTreeMap<String, String>,
}

impl MessageBuilder {
    /// Set the unique key; a UUID v7 is generated otherwise
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> Message {
        let key = self
            .key
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        Message {
            key,
            payload: self.payload.into(),
            properties: self.properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_unique() {
        let a = Message::new(b"a".to_vec());
        let b = Message::new(b"a".to_vec());
        assert!(!a.key().is_empty());
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_builder_keeps_caller_key_and_properties() {
        let message = Message::builder()
            .key("order-42")
            .payload("created")
            .property("region", "eu")
            .build();

        assert_eq!(message.key(), "order-42");
        assert_eq!(message.payload(), b"created");
        assert_eq!(message.property("region"), Some("eu"));
    }

    #[test]
    fn test_json_payload() {
        #[derive(Serialize)]
        struct OrderCreated {
            order_id: u64,
        }

        let message = Message::json(&OrderCreated { order_id: 7 }).unwrap();
        assert_eq!(message.payload(), br#"{"order_id":7}"#);
    }

    #[test]
    fn test_with_properties_leaves_original_untouched() {
        let message = Message::builder().key("k").payload("p").build();
        let tagged = message.with_properties([("TRAN_MSG".to_string(), "true".to_string())]);

        assert_eq!(message.property("TRAN_MSG"), None);
        assert_eq!(tagged.property("TRAN_MSG"), Some("true"));
        assert_eq!(tagged.key(), "k");
    }
}
