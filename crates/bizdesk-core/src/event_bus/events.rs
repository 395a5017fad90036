//! Event type definitions for the event bus.
//!
//! Events are string-tagged records carrying an opaque JSON payload. They are
//! immutable once built and shared between subscribers as `Arc<Event>`.
//! Events are cloneable and serializable for logging/replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PublishError;

static EVENT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Delivery priority of an event
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low = 0,
    /// Default priority.
    #[default]
    Normal = 1,
    /// Delivered ahead of normal traffic.
    High = 2,
    /// Delivered ahead of everything else.
    Critical = 3,
}

impl Priority {
    /// All priorities, lowest first.
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Numeric level (0 = low, 3 = critical).
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Priority {
    type Err = PublishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => Err(PublishError::InvalidPriority(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = PublishError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Priority::ALL
            .get(level as usize)
            .copied()
            .ok_or_else(|| PublishError::InvalidPriority(level.to_string()))
    }
}

/// Identifier of a published event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    fn generate(event_type: &str, timestamp: &DateTime<Utc>) -> Self {
        let seq = EVENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "{}_{}_{}",
            event_type,
            timestamp.timestamp_micros(),
            seq
        ))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable record of something that happened in the application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    event_type: String,
    data: Value,
    source: Option<String>,
    target: Option<String>,
    priority: Priority,
    timestamp: DateTime<Utc>,
    metadata: BTreeMap<String, Value>,
}

impl Event {
    /// Unique id of this event
    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// Type tag, e.g. `"customer_created"`
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Payload
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Component that published the event
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Soft-routing hint naming the intended receiving component
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Delivery priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Creation time
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Free-form metadata
    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match &self.source {
            Some(source) => format!("{} from {} ({})", self.event_type, source, self.priority),
            None => format!("{} ({})", self.event_type, self.priority),
        }
    }
}

/// Builder for an event about to be published.
///
/// Conversion failures are remembered and reported by [`NewEvent::build`],
/// so the builder chain itself never fails.
#[derive(Debug, Clone)]
pub struct NewEvent {
    event_type: String,
    data: Value,
    source: Option<String>,
    target: Option<String>,
    priority: Priority,
    metadata: BTreeMap<String, Value>,
    sync: bool,
    error: Option<PublishError>,
}

impl NewEvent {
    /// Start a new event of the given type with a null payload
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: Value::Null,
            source: None,
            target: None,
            priority: Priority::Normal,
            metadata: BTreeMap::new(),
            sync: false,
            error: None,
        }
    }

    /// Set the payload
    pub fn data(mut self, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => self.data = value,
            Err(e) => self.fail(PublishError::Payload(e.to_string())),
        }
        self
    }

    /// Set the publishing component
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the intended receiving component
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Set the priority
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the priority from its name (`"low"`, `"normal"`, `"high"`, `"critical"`)
    pub fn priority_named(mut self, name: &str) -> Self {
        match name.parse() {
            Ok(priority) => self.priority = priority,
            Err(e) => self.fail(e),
        }
        self
    }

    /// Attach a metadata entry
    pub fn metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.metadata.insert(key, value);
            }
            Err(e) => self.fail(PublishError::Metadata {
                key,
                reason: e.to_string(),
            }),
        }
        self
    }

    /// Deliver on the publisher's thread instead of queueing
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Whether this event will be dispatched synchronously
    pub fn is_sync(&self) -> bool {
        self.sync
    }

    /// Validate and freeze the event
    pub fn build(self) -> Result<Event, PublishError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.event_type.trim().is_empty() {
            return Err(PublishError::EmptyEventType);
        }

        let timestamp = Utc::now();
        Ok(Event {
            id: EventId::generate(&self.event_type, &timestamp),
            event_type: self.event_type,
            data: self.data,
            source: self.source,
            target: self.target,
            priority: self.priority,
            timestamp,
            metadata: self.metadata,
        })
    }

    fn fail(&mut self, err: PublishError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}
