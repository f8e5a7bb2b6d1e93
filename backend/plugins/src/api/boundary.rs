//! Values crossing between the host and a context are deep-copied through
//! JSON, so neither side can keep a live reference into the other.

use plugdock_core::{HostError, HostResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn to_wire<T: Serialize + ?Sized>(value: &T) -> HostResult<String> {
    serde_json::to_string(value).map_err(|e| HostError::Boundary(e.to_string()))
}

pub fn from_wire<T: DeserializeOwned>(raw: &str) -> HostResult<T> {
    serde_json::from_str(raw).map_err(|e| HostError::Boundary(e.to_string()))
}

/// Deep copy of `value` as a `U`.
pub fn transfer<T: Serialize + ?Sized, U: DeserializeOwned>(value: &T) -> HostResult<U> {
    let raw = serde_json::to_value(value).map_err(|e| HostError::Boundary(e.to_string()))?;
    serde_json::from_value(raw).map_err(|e| HostError::Boundary(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    #[test]
    fn test_transfer_copies() {
        let mut original = json!({"a": [1, 2]});
        let copy: Value = transfer(&original).unwrap();
        original["a"][0] = json!(9);
        assert_eq!(copy["a"][0], 1);
    }

    #[test]
    fn test_unrepresentable_values_are_rejected() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON");
        assert!(matches!(to_wire(&map), Err(HostError::Boundary(_))));
        assert!(from_wire::<Value>("{").is_err());
    }
}
