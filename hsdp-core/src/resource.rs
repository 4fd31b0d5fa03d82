//! Resource - Records handed to us by the host and the values they hold
//!
//! A [`Record`] is the host's mutable attribute container for one managed
//! remote entity. It carries the remote identifier (empty when the entity is
//! not managed), the prior attribute snapshot from state, and the current
//! (planned or refreshed) attributes.

use std::collections::HashMap;

/// Attribute value of a record
#[derive(Debug, Clone)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    /// Unordered collection; equality ignores order
    Set(Vec<Value>),
    /// Nested block
    Map(HashMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x))
            }
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Build a set of strings
    pub fn string_set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Set(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Build a list of integers
    pub fn int_list<I: IntoIterator<Item = i64>>(items: I) -> Self {
        Value::List(items.into_iter().map(Value::Int).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Items of a list or set; empty for scalars
    pub fn items(&self) -> &[Value] {
        match self {
            Value::List(items) | Value::Set(items) => items,
            _ => &[],
        }
    }

    /// Whether the value is the zero value of its type
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::List(items) | Value::Set(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            Value::Int(_) | Value::Bool(_) => false,
        }
    }

    /// Convert a JSON value. Arrays become lists; the schema turns them
    /// into sets where the attribute is declared as one.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(|f| Value::Int(f as i64))
                }
            }
            serde_json::Value::Array(arr) => {
                Some(Value::List(arr.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(obj) => Some(Value::Map(
                obj.iter()
                    .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            )),
            serde_json::Value::Null => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) | Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// The host's per-resource attribute container
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub resource_type: String,
    id: String,
    prior: HashMap<String, Value>,
    attributes: HashMap<String, Value>,
}

impl Record {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: String::new(),
            prior: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    /// Set a current attribute (builder form)
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Set a prior-state attribute (builder form)
    pub fn with_prior(mut self, key: impl Into<String>, value: Value) -> Self {
        self.prior.insert(key.into(), value);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Remote identifier, empty when the entity is not managed
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Drift to empty: the remote entity is gone
    pub fn clear_id(&mut self) {
        self.id.clear();
    }

    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.attributes
    }

    pub fn prior(&self) -> &HashMap<String, Value> {
        &self.prior
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// String attribute, or empty string when unset
    pub fn get_string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Items of a list or set attribute; empty when unset
    pub fn get_items(&self, key: &str) -> &[Value] {
        self.get(key).map(Value::items).unwrap_or(&[])
    }

    /// String items of a list or set attribute
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        strings_of(self.get(key))
    }

    /// String items of the prior snapshot of a list or set attribute
    pub fn prior_strings(&self, key: &str) -> Vec<String> {
        strings_of(self.prior.get(key))
    }

    /// First nested block of an attribute, accepting either a single map or
    /// a list of maps
    pub fn get_block(&self, key: &str) -> Option<&HashMap<String, Value>> {
        match self.get(key)? {
            Value::Map(map) => Some(map),
            Value::List(items) | Value::Set(items) => match items.first() {
                Some(Value::Map(map)) => Some(map),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.set(key, Value::String(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// (prior, current) values of an attribute
    pub fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        (self.prior.get(key), self.attributes.get(key))
    }

    /// Whether an attribute differs between prior state and current
    /// attributes. An absent attribute equals an empty one.
    pub fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        non_empty(old) != non_empty(new)
    }

    /// Whether any of the given attributes changed
    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    /// Promote current attributes to the prior snapshot after a successful
    /// apply
    pub fn commit(&mut self) {
        self.prior = self.attributes.clone();
    }

    /// Build a record from its JSON form:
    /// `{"id": "...", "prior": {...}, "attributes": {...}}`
    pub fn from_json(resource_type: impl Into<String>, json: &serde_json::Value) -> Self {
        let mut record = Record::new(resource_type);
        if let Some(id) = json.get("id").and_then(|v| v.as_str()) {
            record.id = id.to_string();
        }
        record.prior = object_to_map(json.get("prior"));
        record.attributes = object_to_map(json.get("attributes"));
        record
    }

    pub fn to_json(&self) -> serde_json::Value {
        let attrs = |map: &HashMap<String, Value>| {
            serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
        };
        serde_json::json!({
            "type": self.resource_type,
            "id": self.id,
            "prior": attrs(&self.prior),
            "attributes": attrs(&self.attributes),
        })
    }
}

fn non_empty(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_empty())
}

fn strings_of(value: Option<&Value>) -> Vec<String> {
    value
        .map(Value::items)
        .unwrap_or(&[])
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn object_to_map(json: Option<&serde_json::Value>) -> HashMap<String, Value> {
    match json {
        Some(serde_json::Value::Object(obj)) => obj
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect(),
        _ => HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_equality_ignores_order() {
        assert_eq!(
            Value::string_set(["a", "b"]),
            Value::string_set(["b", "a"])
        );
        assert_ne!(
            Value::List(vec![Value::string("a"), Value::string("b")]),
            Value::List(vec![Value::string("b"), Value::string("a")])
        );
    }

    #[test]
    fn clear_id_drifts_to_empty() {
        let mut record = Record::new("hsdp_iam_role").with_id("role-1");
        assert!(record.exists());
        record.clear_id();
        assert!(!record.exists());
        assert_eq!(record.id(), "");
    }

    #[test]
    fn has_change_treats_absent_as_empty() {
        let record = Record::new("hsdp_iam_group")
            .with_prior("users", Value::Set(vec![]))
            .with_attribute("description", Value::string("x"));
        assert!(!record.has_change("users"));
        assert!(record.has_change("description"));
    }

    #[test]
    fn has_change_detects_set_difference() {
        let record = Record::new("hsdp_iam_role")
            .with_prior("permissions", Value::string_set(["A", "B"]))
            .with_attribute("permissions", Value::string_set(["B", "C"]));
        assert!(record.has_change("permissions"));
        assert_eq!(record.prior_strings("permissions"), vec!["A", "B"]);
    }

    #[test]
    fn get_block_accepts_list_of_maps() {
        let mut principal = HashMap::new();
        principal.insert("region".to_string(), Value::string("eu-west"));
        let record = Record::new("x").with_attribute("principal", Value::List(vec![Value::Map(principal)]));
        let block = record.get_block("principal").unwrap();
        assert_eq!(block.get("region"), Some(&Value::string("eu-west")));
    }

    #[test]
    fn json_round_trip_keeps_identifier() {
        let json = serde_json::json!({
            "id": "abc",
            "attributes": {"name": "TESTAPP", "ports": [22, 80]},
        });
        let record = Record::from_json("hsdp_iam_application", &json);
        assert_eq!(record.id(), "abc");
        assert_eq!(record.get_str("name"), Some("TESTAPP"));
        assert_eq!(record.get_items("ports").len(), 2);
        assert_eq!(record.to_json()["id"], "abc");
    }
}
