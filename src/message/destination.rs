use crate::error::{ProducerError, ProducerResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_TOPIC_LENGTH: usize = 127;

static TOPIC_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[%|a-zA-Z0-9_-]+$").expect("topic pattern is valid"));

/// Where a message is sent: a topic and an optional tag
///
/// The textual form is `topic` or `topic:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    topic: String,
    tag: Option<String>,
}

impl Destination {
    /// Create a destination for a topic
    pub fn new(topic: impl Into<String>) -> ProducerResult<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        Ok(Self { topic, tag: None })
    }

    /// Create a destination for a topic with a tag
    pub fn with_tag(topic: impl Into<String>, tag: impl Into<String>) -> ProducerResult<Self> {
        let mut destination = Self::new(topic)?;
        let tag = tag.into();
        if !tag.is_empty() {
            destination.tag = Some(tag);
        }
        Ok(destination)
    }

    /// Parse `topic` or `topic:tag`
    pub fn parse(value: &str) -> ProducerResult<Self> {
        match value.split_once(':') {
            Some((topic, tag)) => Self::with_tag(topic, tag),
            None => Self::new(value),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }
}

fn validate_topic(topic: &str) -> ProducerResult<()> {
    if topic.is_empty() {
        return Err(ProducerError::PermanentSend("topic is empty".to_string()));
    }

    if topic.len() > MAX_TOPIC_LENGTH {
        return Err(ProducerError::PermanentSend(format!(
            "topic length {} exceeds {} characters",
            topic.len(),
            MAX_TOPIC_LENGTH
        )));
    }

    if !TOPIC_PATTERN.is_match(topic) {
        return Err(ProducerError::PermanentSend(format!(
            "topic '{}' contains illegal characters",
            topic
        )));
    }

    Ok(())
}

impl FromStr for Destination {
    type Err = ProducerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Destination {
    type Error = ProducerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.topic, tag),
            None => write!(f, "{}", self.topic),
        }
    }
}
