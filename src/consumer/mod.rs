//! Consumer listener identities
//!
//! Consumer delivery itself is provided by the consumer runtime. This module
//! fixes, at startup, which handler serves each (topic, consumer group) pair.

mod registry;

pub use registry::{ListenerKey, ListenerRegistry, ListenerRegistryBuilder, MessageListener};
