//! Proptest generators for credential fields and templates.

use proptest::prelude::*;
use std::collections::HashMap;

/// Generate field names as they appear in Vault secrets.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("username".to_string()),
        Just("password".to_string()),
        Just("host".to_string()),
        "[a-z][a-z0-9_]{0,11}",
    ]
}

/// Generate credential values, including characters that look like
/// template syntax.
pub fn field_value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9!@#$%^&*-]{0,32}",
        Just("{{username}}".to_string()),
        Just("p{a}ss}}".to_string()),
    ]
}

/// Generate a set of fields as delivered by one fetch or renewal.
pub fn fields_strategy() -> impl Strategy<Value = HashMap<String, String>> {
    prop::collection::hash_map(field_name_strategy(), field_value_strategy(), 0..6)
}

/// Generate a connection string template mixing literal text and
/// placeholders.
pub fn template_strategy() -> impl Strategy<Value = String> {
    let part = prop_oneof![
        "[a-z0-9:@/().]{0,12}",
        field_name_strategy().prop_map(|name| format!("{{{{{name}}}}}")),
    ];
    prop::collection::vec(part, 0..8).prop_map(|parts| parts.concat())
}
