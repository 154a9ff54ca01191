//! Canned Vault responses and secrets.

use std::time::Duration;
use vault_sql::Secret;

/// Secret path used throughout the tests.
pub const SECRET_PATH: &str = "database/creds/app";

/// MySQL-style connection string template.
pub const MYSQL_TEMPLATE: &str = "{{username}}:{{password}}@tcp(127.0.0.1:3306)/database";

/// Body of a logical read on the database secrets engine.
#[must_use]
pub fn read_response() -> serde_json::Value {
    serde_json::json!({
        "request_id": "bd4d3b41-1df1-4e8c-93b8-d8b5d1b6d2c0",
        "lease_id": "database/creds/app/2f6a614c",
        "renewable": true,
        "lease_duration": 3600,
        "data": {
            "username": "user",
            "password": "pass"
        },
        "wrap_info": null,
        "warnings": null,
        "auth": null
    })
}

/// Body of a lease renewal, which carries no data.
#[must_use]
pub fn renew_response(lease_id: &str, ttl: u64) -> serde_json::Value {
    serde_json::json!({
        "request_id": "6cf0a6a1-6d0c-4c11-9b8e-f3d1b0f5a9e2",
        "lease_id": lease_id,
        "renewable": true,
        "lease_duration": ttl,
        "data": null,
        "warnings": null
    })
}

/// A renewable secret with a username and password.
#[must_use]
pub fn credentials(username: &str, password: &str) -> Secret {
    Secret::new()
        .with_field("username", username)
        .with_field("password", password)
        .with_lease(format!("{SECRET_PATH}/{username}"), Duration::from_secs(3600), true)
}

/// A renewal carrying only the given fields.
#[must_use]
pub fn renewal(fields: &[(&str, &str)]) -> Secret {
    fields
        .iter()
        .fold(Secret::new(), |secret, (name, value)| secret.with_field(*name, *value))
        .with_lease(format!("{SECRET_PATH}/renewed"), Duration::from_secs(3600), true)
}
