use std::collections::BTreeMap;

use serde_json::{json, Value};

/// Consumer type label sent with every registration.
pub const SYSTEM_TYPE_LABEL: &str = "system";

/// Display name used when the caller does not pick one.
pub const DEFAULT_CONSUMER_NAME: &str = "admin";

/// Host facts, ordered by key so payloads are stable.
pub type Facts = BTreeMap<String, String>;

/// Build the `registerConsumer` body.
///
/// The shape `{type, name, facts:{metadata:{entry:[{key,value}...]}}}` is what
/// the service expects and must not change.
pub fn build_payload(name: &str, facts: &Facts) -> Value {
    let entries: Vec<Value> = facts
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();

    json!({
        "type": { "label": SYSTEM_TYPE_LABEL },
        "name": name,
        "facts": {
            "metadata": {
                "entry": entries
            }
        }
    })
}
