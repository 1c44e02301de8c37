//! Wire format for cross-instance change messages.

use crate::error::ChannelResult;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Where a change originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// The change was made through this store instance.
    Local,
    /// The change was received from another instance.
    Remote,
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSource::Local => f.write_str("local"),
            ChangeSource::Remote => f.write_str("remote"),
        }
    }
}

/// A committed mutation announced to other store instances.
///
/// `value` and `previous_value` distinguish "unset" (`None`, omitted on the
/// wire) from an explicit JSON `null` (`Some(Value::Null)`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Path segments of the changed location. Empty for the root.
    pub path: Vec<String>,
    /// New value, `None` for a deletion.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Value before the change.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<Value>,
    /// Milliseconds since the Unix epoch at which the change was made.
    pub timestamp: u64,
    /// Source as stamped by the sender (always `local` on the wire).
    pub source: ChangeSource,
    /// Identifier of the sending instance.
    pub origin: String,
}

/// Maps a present field, including `null`, to `Some`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl SyncMessage {
    /// Encodes the message as JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be serialized.
    pub fn encode(&self) -> ChannelResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a message from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid message.
    pub fn decode(text: &str) -> ChannelResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns the path joined with `.`.
    pub fn joined_path(&self) -> String {
        self.path.join(".")
    }
}
