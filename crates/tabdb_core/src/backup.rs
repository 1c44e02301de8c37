//! Backup and restore envelopes.
//!
//! A backup is the whole root document wrapped in a JSON envelope:
//!
//! ```text
//! {"format":"tabdb-backup","version":1,"exportedAt":<ms>,"checksum":"<hex>","data":{...}}
//! ```
//!
//! The checksum is the SHA-256 of the compact JSON encoding of `data`.
//! Restoring validates the whole envelope before any state is touched.

use crate::document::{now_millis, validate_loaded};
use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Envelope format tag.
pub const BACKUP_FORMAT: &str = "tabdb-backup";
/// Current envelope version.
pub const BACKUP_VERSION: u32 = 1;

/// A self-describing snapshot of the root document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEnvelope {
    /// Always [`BACKUP_FORMAT`].
    pub format: String,
    /// Envelope version.
    pub version: u32,
    /// When the backup was taken, in milliseconds since the Unix epoch.
    pub exported_at: u64,
    /// Hex SHA-256 of the compact encoding of `data`.
    pub checksum: String,
    /// The root document.
    pub data: Value,
}

impl BackupEnvelope {
    /// Wraps a document, stamping the time and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be encoded.
    pub fn new(data: Value) -> CoreResult<Self> {
        Ok(Self {
            format: BACKUP_FORMAT.to_string(),
            version: BACKUP_VERSION,
            exported_at: now_millis(),
            checksum: checksum(&data)?,
            data,
        })
    }

    /// Encodes the envelope as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses and validates backup text.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ImportValidation`] if the text is not an
    /// envelope, has the wrong format tag or a newer version, fails its
    /// checksum, or does not carry an object document of a supported version.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let envelope: Self = serde_json::from_str(text)
            .map_err(|e| CoreError::import_validation(format!("malformed backup: {e}")))?;

        if envelope.format != BACKUP_FORMAT {
            return Err(CoreError::import_validation(format!(
                "unknown backup format {:?}",
                envelope.format
            )));
        }
        if envelope.version > BACKUP_VERSION {
            return Err(CoreError::import_validation(format!(
                "backup version {} is newer than supported version {BACKUP_VERSION}",
                envelope.version
            )));
        }

        let actual = checksum(&envelope.data)?;
        if !actual.eq_ignore_ascii_case(&envelope.checksum) {
            return Err(CoreError::import_validation("backup checksum mismatch"));
        }

        // Same rules as a document read from the backend
        let data = validate_loaded(envelope.data)
            .map_err(|e| CoreError::import_validation(e.to_string()))?;

        Ok(Self { data, ..envelope })
    }

    /// Consumes the envelope, returning the document.
    pub fn into_data(self) -> Value {
        self.data
    }
}

/// Computes the hex SHA-256 of a value's compact JSON encoding.
///
/// # Errors
///
/// Returns an error if the value cannot be encoded.
pub fn checksum(data: &Value) -> CoreResult<String> {
    let bytes = serde_json::to_vec(data)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!({"version": 1, "projects": {"list": {"p1": {"name": "Foo"}}}})
    }

    #[test]
    fn envelope_roundtrip() {
        let text = BackupEnvelope::new(document()).unwrap().to_json().unwrap();
        let parsed = BackupEnvelope::parse(&text).unwrap();
        assert_eq!(parsed.format, BACKUP_FORMAT);
        assert_eq!(parsed.into_data(), document());
    }

    #[test]
    fn wire_fields_are_camel_case() {
        let text = BackupEnvelope::new(document()).unwrap().to_json().unwrap();
        let raw: Value = serde_json::from_str(&text).unwrap();
        assert!(raw.get("exportedAt").is_some());
        assert_eq!(raw["checksum"].as_str().unwrap().len(), 64);
    }

    #[test]
    fn tampered_data_fails_checksum() {
        let mut envelope = BackupEnvelope::new(document()).unwrap();
        envelope.data["projects"]["list"]["p1"]["name"] = json!("Bar");
        let text = serde_json::to_string(&envelope).unwrap();

        let err = BackupEnvelope::parse(&text).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn rejects_malformed_input() {
        for text in ["", "not json", "[]", "{}", r#"{"format":"tabdb-backup"}"#] {
            let err = BackupEnvelope::parse(text).unwrap_err();
            assert!(matches!(err, CoreError::ImportValidation { .. }), "{text}");
        }
    }

    #[test]
    fn rejects_wrong_format_and_newer_version() {
        let mut envelope = BackupEnvelope::new(document()).unwrap();
        envelope.format = "other".into();
        assert!(BackupEnvelope::parse(&serde_json::to_string(&envelope).unwrap()).is_err());

        let mut envelope = BackupEnvelope::new(document()).unwrap();
        envelope.version = BACKUP_VERSION + 1;
        assert!(BackupEnvelope::parse(&serde_json::to_string(&envelope).unwrap()).is_err());
    }

    #[test]
    fn rejects_non_object_data() {
        let envelope = BackupEnvelope::new(json!([1, 2, 3])).unwrap();
        let err = BackupEnvelope::parse(&envelope.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, CoreError::ImportValidation { .. }));
    }
}
