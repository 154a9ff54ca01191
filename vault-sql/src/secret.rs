//! Secret types and structures.

use crate::snapshot::Snapshot;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::trace;

/// A leased secret as returned by Vault's logical read and lease renewal
/// endpoints.
///
/// A renewal produces a new `Secret`; an issued one is never mutated.
#[derive(Clone, Default, Deserialize)]
pub struct Secret {
    /// Request identifier assigned by Vault
    #[serde(default)]
    pub request_id: String,
    /// Lease identifier, empty for unleased secrets
    #[serde(default)]
    pub lease_id: String,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
    /// Whether the lease can be extended
    #[serde(default)]
    pub renewable: bool,
    /// Secret payload; absent on lease renewal responses
    #[serde(default)]
    pub data: Option<HashMap<String, serde_json::Value>>,
    /// Warnings attached by Vault
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

impl Secret {
    /// Create an unleased secret with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a string field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.data
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Attach lease information.
    #[must_use]
    pub fn with_lease(mut self, lease_id: impl Into<String>, ttl: Duration, renewable: bool) -> Self {
        self.lease_id = lease_id.into();
        self.lease_duration = ttl.as_secs();
        self.renewable = renewable;
        self
    }

    /// Lease duration as a [`Duration`].
    #[must_use]
    pub const fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_duration)
    }

    /// Whether this secret carries a lease that can be renewed.
    #[must_use]
    pub fn is_renewable(&self) -> bool {
        self.renewable && !self.lease_id.is_empty()
    }

    /// Extract the string-valued fields usable in a connection template.
    ///
    /// Non-string values are skipped.
    #[must_use]
    pub fn credential_fields(&self) -> Snapshot {
        let Some(data) = &self.data else {
            return Snapshot::default();
        };
        data.iter()
            .filter_map(|(name, value)| match value {
                serde_json::Value::String(s) => Some((name.clone(), SecretString::from(s.clone()))),
                _ => {
                    trace!(field = %name, "Skipping non-string secret field");
                    None
                }
            })
            .collect()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fields: Vec<&str> = self
            .data
            .iter()
            .flat_map(|data| data.keys())
            .map(String::as_str)
            .collect();
        fields.sort_unstable();

        f.debug_struct("Secret")
            .field("request_id", &self.request_id)
            .field("lease_id", &self.lease_id)
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .field("fields", &fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_RESPONSE: &str = r#"{
  "request_id": "e0e5a6c1-5e69-5cf3-c9d2-020af192de36",
  "lease_id": "database/creds/readonly/7aa462ab-98cb-fdcb-b226-f0a0d37644cc",
  "renewable": true,
  "lease_duration": 20,
  "data": {
    "password": "pass",
    "username": "user",
    "max_connections": 5
  },
  "wrap_info": null,
  "warnings": null,
  "auth": null
}"#;

    #[test]
    fn test_deserialize_read_response() {
        let secret: Secret = serde_json::from_str(READ_RESPONSE).unwrap();
        assert_eq!(
            secret.lease_id,
            "database/creds/readonly/7aa462ab-98cb-fdcb-b226-f0a0d37644cc"
        );
        assert_eq!(secret.lease_ttl(), Duration::from_secs(20));
        assert!(secret.is_renewable());

        let fields = secret.credential_fields();
        assert_eq!(fields.get("username"), Some("user"));
        assert_eq!(fields.get("password"), Some("pass"));
        assert_eq!(fields.get("max_connections"), None);
    }

    #[test]
    fn test_deserialize_renew_response_without_data() {
        let body = r#"{"lease_id": "db/creds/x/1", "renewable": true, "lease_duration": 60, "data": null}"#;
        let secret: Secret = serde_json::from_str(body).unwrap();
        assert!(secret.data.is_none());
        assert!(secret.credential_fields().is_empty());
    }

    #[test]
    fn test_renewable_requires_lease_id() {
        let secret = Secret::new().with_lease("", Duration::from_secs(30), true);
        assert!(!secret.is_renewable());
    }

    #[test]
    fn test_debug_lists_field_names_only() {
        let secret = Secret::new()
            .with_field("username", "app_user")
            .with_field("password", "db-password-xyz");
        let debug = format!("{secret:?}");
        assert!(debug.contains("username"));
        assert!(debug.contains("password"));
        assert!(!debug.contains("app_user"));
        assert!(!debug.contains("db-password-xyz"));
    }
}
