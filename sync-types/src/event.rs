//! Storage-change notification envelope.
//!
//! The JSON published by the object store to the queue:
//!
//! ```json
//! {"Records": [{
//!     "eventSource": "aws:s3",
//!     "awsRegion": "us-west-2",
//!     "eventName": "ObjectCreated:Put",
//!     "s3": {"bucket": {"name": "srcbucket"},
//!            "object": {"key": "srcfolder/a.txt", "size": 1024}}
//! }]}
//! ```
//!
//! or, when a notification configuration is first attached,
//! `{"Event": "s3:TestEvent", ...}`. Every field is optional at the serde
//! level so that a structurally valid envelope with missing fields is reported
//! as [`EventError::Invalid`] rather than [`EventError::Malformed`].

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::fmt;

use crate::EventError;

/// `Event` value of the synthetic test notification.
pub const TEST_EVENT: &str = "s3:TestEvent";

/// Top-level notification body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Notification {
    /// Test-event marker.
    #[serde(rename = "Event", default)]
    pub event: Option<String>,
    /// Change records; exactly one is expected.
    #[serde(rename = "Records", default)]
    pub records: Option<Vec<EventRecord>>,
}

/// One change record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Publishing service (`aws:s3`).
    #[serde(default)]
    pub event_source: Option<String>,
    /// Region of the bucket that changed.
    #[serde(default)]
    pub aws_region: Option<String>,
    /// Event name, e.g. `ObjectCreated:Put`.
    #[serde(default)]
    pub event_name: Option<String>,
    /// Bucket and object reference.
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

/// Bucket and object reference of a record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3Entity {
    /// Bucket that changed.
    #[serde(default)]
    pub bucket: Option<BucketEntity>,
    /// Object that changed.
    #[serde(default)]
    pub object: Option<ObjectEntity>,
}

/// Bucket reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BucketEntity {
    /// Bucket name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Object reference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectEntity {
    /// URL-form encoded object key.
    #[serde(default)]
    pub key: Option<String>,
    /// Object size in bytes (absent on removal events).
    #[serde(default)]
    pub size: Option<u64>,
}

impl Notification {
    /// Parse a queue message body.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if the body is not a JSON object of
    /// the expected shape.
    pub fn parse(body: &str) -> Result<Self, EventError> {
        serde_json::from_str(body).map_err(|e| EventError::Malformed(e.to_string()))
    }

    /// Check whether this is the synthetic provider test event.
    pub fn is_test_event(&self) -> bool {
        self.event.as_deref() == Some(TEST_EVENT)
    }
}

impl ObjectEntity {
    /// Decode the key: `+` is a space, everything else is percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Invalid`] if the key is missing or does not
    /// decode to UTF-8.
    pub fn decoded_key(&self) -> Result<String, EventError> {
        let raw = self
            .key
            .as_deref()
            .ok_or_else(|| EventError::Invalid("missing s3.object.key".into()))?;
        let spaced = raw.replace('+', " ");
        percent_decode_str(&spaced)
            .decode_utf8()
            .map(|key| key.into_owned())
            .map_err(|e| EventError::Invalid(format!("undecodable object key {:?}: {}", raw, e)))
    }
}

/// The closed set of event families the processor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `ObjectCreated:*`
    ObjectCreated,
    /// `ObjectRemoved:*`
    ObjectRemoved,
    /// `ReducedRedundancyLostObject`
    ReducedRedundancyLostObject,
}

impl EventKind {
    /// Classify an event name by its family prefix.
    ///
    /// Accepts names with or without the `s3:` service prefix.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownAction`] for any other family.
    pub fn from_event_name(name: &str) -> Result<Self, EventError> {
        let unprefixed = name.strip_prefix("s3:").unwrap_or(name);
        let family = unprefixed.split(':').next().unwrap_or_default();
        match family {
            "ObjectCreated" => Ok(Self::ObjectCreated),
            "ObjectRemoved" => Ok(Self::ObjectRemoved),
            "ReducedRedundancyLostObject" => Ok(Self::ReducedRedundancyLostObject),
            _ => Err(EventError::UnknownAction(name.to_string())),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectCreated => write!(f, "ObjectCreated"),
            Self::ObjectRemoved => write!(f, "ObjectRemoved"),
            Self::ReducedRedundancyLostObject => write!(f, "ReducedRedundancyLostObject"),
        }
    }
}
