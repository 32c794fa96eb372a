//! Serialized state registry.
//!
//! A process-global, string-keyed store of JSON values, used to carry
//! initial state from a server render into the client pass. A server stores
//! values under well-known keys and exports the registry as one JSON object;
//! the client imports that object and takes each value exactly once while
//! building its reactive graph.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::StateError;

static REGISTRY: OnceLock<Mutex<HashMap<String, JsonValue>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, JsonValue>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Serialize `value` and store it under `key`, replacing any previous entry.
pub fn store<T: Serialize>(key: &str, value: &T) -> Result<(), StateError> {
    let json = serde_json::to_value(value).map_err(|source| StateError::Serialize {
        key: key.to_owned(),
        source,
    })?;
    registry()
        .lock()
        .expect("state registry lock poisoned")
        .insert(key.to_owned(), json);
    Ok(())
}

/// Remove and decode the value stored under `key`. Returns `Ok(None)` when
/// the key is absent; a second take of the same key sees nothing.
pub fn take<T: DeserializeOwned>(key: &str) -> Result<Option<T>, StateError> {
    let json = registry()
        .lock()
        .expect("state registry lock poisoned")
        .remove(key);
    match json {
        Some(json) => {
            let value =
                serde_json::from_value(json).map_err(|source| StateError::Deserialize {
                    key: key.to_owned(),
                    source,
                })?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Export the whole registry as a JSON object string.
pub fn export() -> Result<String, StateError> {
    let guard = registry().lock().expect("state registry lock poisoned");
    let object: serde_json::Map<String, JsonValue> = guard
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Ok(JsonValue::Object(object).to_string())
}

/// Replace the registry contents with the entries of a JSON object payload.
pub fn import(payload: &str) -> Result<(), StateError> {
    let parsed: JsonValue = serde_json::from_str(payload)?;
    let JsonValue::Object(object) = parsed else {
        return Err(StateError::InvalidPayload);
    };

    let mut guard = registry().lock().expect("state registry lock poisoned");
    guard.clear();
    for (key, value) in object {
        guard.insert(key, value);
    }
    debug!(entries = guard.len(), "state registry imported");
    Ok(())
}

/// Drop every entry.
pub fn clear() {
    registry()
        .lock()
        .expect("state registry lock poisoned")
        .clear();
}

/// Serializes tests that touch the global registry.
#[cfg(test)]
pub(crate) fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}
