//! Bound query parameters.
//!
//! Names are either chosen by the caller (`team_id`, `sampling_factor`, ...)
//! or generated from a counter owned by this map (`hogql_val_0`, ...). The
//! counter lives as long as one compilation, so generated names never collide.
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::errors::PrinterError;

const GENERATED_PREFIX: &str = "hogql_val_";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    values: Map<String, Value>,
    next_index: usize,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under a fresh generated name and return the placeholder.
    pub fn add_value(&mut self, value: Value) -> String {
        let name = format!("{}{}", GENERATED_PREFIX, self.next_index);
        self.next_index += 1;
        self.values.insert(name.clone(), value);
        placeholder(&name)
    }

    /// Bind a caller-chosen name. Re-binding the same value is a no-op.
    pub fn insert(&mut self, name: &str, value: Value) -> Result<(), PrinterError> {
        match self.values.get(name) {
            Some(existing) if *existing != value => Err(PrinterError::ParamConflict {
                name: name.to_string(),
                existing: existing.clone(),
                new: value,
            }),
            Some(_) => Ok(()),
            None => {
                self.values.insert(name.to_string(), value);
                Ok(())
            }
        }
    }

    /// Merge another map's named values into this one, keeping insertion order.
    pub fn merge(&mut self, other: ParamMap) -> Result<(), PrinterError> {
        for (name, value) in other.values {
            self.insert(&name, value)?;
        }
        self.next_index = self.next_index.max(other.next_index);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(String::as_str).collect()
    }
}

impl Serialize for ParamMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.values.serialize(serializer)
    }
}

/// `%(name)s`
pub fn placeholder(name: &str) -> String {
    format!("%({})s", name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_names_are_sequential() {
        let mut params = ParamMap::new();
        assert_eq!(params.add_value(json!("a")), "%(hogql_val_0)s");
        assert_eq!(params.add_value(json!("a")), "%(hogql_val_1)s");
        assert_eq!(params.names(), vec!["hogql_val_0", "hogql_val_1"]);
    }

    #[test]
    fn test_insert_conflict() {
        let mut params = ParamMap::new();
        params.insert("team_id", json!(42)).unwrap();
        params.insert("team_id", json!(42)).unwrap();
        let err = params.insert("team_id", json!(43)).unwrap_err();
        assert!(matches!(err, PrinterError::ParamConflict { name, .. } if name == "team_id"));
    }

    #[test]
    fn test_merge_keeps_order_and_counter() {
        let mut params = ParamMap::new();
        params.insert("team_id", json!(1)).unwrap();

        let mut other = ParamMap::new();
        other.insert("timezone", json!("UTC")).unwrap();
        other.add_value(json!("x"));

        params.merge(other).unwrap();
        assert_eq!(params.names(), vec!["team_id", "timezone", "hogql_val_0"]);
        assert_eq!(params.add_value(json!("y")), "%(hogql_val_1)s");
    }

    #[test]
    fn test_serializes_as_ordered_object() {
        let mut params = ParamMap::new();
        params.insert("b", json!(1)).unwrap();
        params.insert("a", json!([1, 2])).unwrap();
        assert_eq!(serde_json::to_string(&params).unwrap(), r#"{"b":1,"a":[1,2]}"#);
    }
}
