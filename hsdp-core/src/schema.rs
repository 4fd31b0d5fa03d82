//! Schema - Attribute schemas for resource and data-source types
//!
//! Each resource type declares its attributes: type, cardinality, whether the
//! host must supply them, whether a change forces replacement, and whether the
//! value is sensitive.

use std::collections::HashMap;
use std::fmt;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered set
    Set(Box<AttributeType>),
    /// Nested block (one or more maps with the given attributes)
    Block(Vec<AttributeSchema>),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (AttributeType::String, Value::String(_)) => Ok(()),
            (AttributeType::Int, Value::Int(_)) => Ok(()),
            (AttributeType::Bool, Value::Bool(_)) => Ok(()),

            (AttributeType::Enum(variants), Value::String(s)) => {
                if variants.iter().any(|v| v == s) {
                    Ok(())
                } else {
                    Err(TypeError::InvalidEnumVariant {
                        value: s.clone(),
                        expected: variants.clone(),
                    })
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                base.validate(v)?;
                validate(v).map_err(|msg| TypeError::ValidationFailed { message: msg })
            }

            (
                AttributeType::List(inner) | AttributeType::Set(inner),
                Value::List(items) | Value::Set(items),
            ) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate(item).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            (AttributeType::Block(attrs), Value::Map(map)) => validate_block(attrs, map),

            (AttributeType::Block(attrs), Value::List(items) | Value::Set(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let Value::Map(map) = item else {
                        return Err(TypeError::ListItemError {
                            index: i,
                            inner: Box::new(TypeError::TypeMismatch {
                                expected: "Block".to_string(),
                                got: item.type_name(),
                            }),
                        });
                    };
                    validate_block(attrs, map).map_err(|e| TypeError::ListItemError {
                        index: i,
                        inner: Box::new(e),
                    })?;
                }
                Ok(())
            }

            _ => Err(TypeError::TypeMismatch {
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    /// Bring a host-supplied value into the shape this type expects
    /// (JSON arrays arrive as lists; set-typed attributes become sets)
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (AttributeType::Set(inner), Value::List(items) | Value::Set(items)) => {
                Value::Set(items.into_iter().map(|v| inner.coerce(v)).collect())
            }
            (AttributeType::List(inner), Value::List(items)) => {
                Value::List(items.into_iter().map(|v| inner.coerce(v)).collect())
            }
            (AttributeType::Custom { base, .. }, v) => base.coerce(v),
            (_, v) => v,
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

fn validate_block(attrs: &[AttributeSchema], map: &HashMap<String, Value>) -> Result<(), TypeError> {
    for attr in attrs {
        match map.get(&attr.name) {
            Some(v) => attr
                .attr_type
                .validate(v)
                .map_err(|e| TypeError::BlockField {
                    name: attr.name.clone(),
                    inner: Box::new(e),
                })?,
            None if attr.required => {
                return Err(TypeError::MissingRequired {
                    name: attr.name.clone(),
                });
            }
            None => {}
        }
    }
    Ok(())
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Invalid enum variant '{value}', expected one of: {}", expected.join(", "))]
    InvalidEnumVariant {
        value: String,
        expected: Vec<String>,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' conflicts with '{other}'")]
    Conflict { name: String, other: String },

    #[error("List item at index {index}: {inner}")]
    ListItemError { index: usize, inner: Box<TypeError> },

    #[error("Block field '{name}': {inner}")]
    BlockField { name: String, inner: Box<TypeError> },
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Set(_) => "Set".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    /// Set by the provider rather than the host configuration
    pub computed: bool,
    /// Changing this attribute replaces the remote entity
    pub force_new: bool,
    /// Never shown in plans or diagnostics
    pub sensitive: bool,
    /// Attributes that may not be set together with this one
    pub conflicts_with: Vec<String>,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            computed: false,
            force_new: false,
            sensitive: false,
            conflicts_with: Vec::new(),
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn conflicts_with(mut self, names: &[&str]) -> Self {
        self.conflicts_with = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        // Check required attributes
        for (name, schema) in &self.attributes {
            if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
                errors.push(TypeError::MissingRequired { name: name.clone() });
            }
        }

        // Type check each attribute
        for (name, value) in attributes {
            if let Some(schema) = self.attributes.get(name)
                && let Err(e) = schema.attr_type.validate(value)
            {
                errors.push(e);
            }
            // Unknown attributes are allowed (for flexibility)
        }

        // Mutually exclusive attributes; report each pair once
        let mut names: Vec<&String> = self.attributes.keys().collect();
        names.sort();
        for name in names {
            let schema = &self.attributes[name];
            if !is_set(attributes.get(name)) {
                continue;
            }
            for other in &schema.conflicts_with {
                let declared_both_ways = self
                    .attributes
                    .get(other)
                    .is_some_and(|o| o.conflicts_with.contains(name));
                if is_set(attributes.get(other)) && (name < other || !declared_both_ways) {
                    errors.push(TypeError::Conflict {
                        name: name.clone(),
                        other: other.clone(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Apply defaults and coerce collection shapes
    pub fn normalize(&self, attributes: &mut HashMap<String, Value>) {
        for (name, schema) in &self.attributes {
            match attributes.remove(name) {
                Some(value) => {
                    attributes.insert(name.clone(), schema.attr_type.coerce(value));
                }
                None => {
                    if let Some(default) = &schema.default {
                        attributes.insert(name.clone(), default.clone());
                    }
                }
            }
        }
    }

    /// Names of attributes whose values must never be displayed
    pub fn sensitive_attributes(&self) -> Vec<&str> {
        self.attributes
            .values()
            .filter(|a| a.sensitive)
            .map(|a| a.name.as_str())
            .collect()
    }

    /// String values of sensitive attributes present in `attributes`,
    /// including sensitive fields of nested blocks
    pub fn sensitive_values(&self, attributes: &HashMap<String, Value>) -> Vec<String> {
        let mut out = Vec::new();
        for schema in self.attributes.values() {
            if let Some(value) = attributes.get(&schema.name) {
                collect_sensitive(schema, value, &mut out);
            }
        }
        out
    }
}

fn collect_sensitive(schema: &AttributeSchema, value: &Value, out: &mut Vec<String>) {
    if schema.sensitive {
        if let Value::String(s) = value
            && !s.is_empty()
        {
            out.push(s.clone());
        }
        return;
    }
    if let AttributeType::Block(fields) = &schema.attr_type {
        let maps: Vec<&HashMap<String, Value>> = match value {
            Value::Map(map) => vec![map],
            other => other
                .items()
                .iter()
                .filter_map(|v| match v {
                    Value::Map(map) => Some(map),
                    _ => None,
                })
                .collect(),
        };
        for map in maps {
            for field in fields {
                if let Some(v) = map.get(&field.name) {
                    collect_sensitive(field, v, out);
                }
            }
        }
    }
}

fn is_set(value: Option<&Value>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// Port number type (1-65535)
    pub fn port_number() -> AttributeType {
        AttributeType::Custom {
            name: "PortNumber".to_string(),
            base: Box::new(AttributeType::Int),
            validate: |value| {
                if let Value::Int(n) = value {
                    if (1..=65535).contains(n) {
                        Ok(())
                    } else {
                        Err(format!("Port number {} must be between 1 and 65535", n))
                    }
                } else {
                    Err("Expected integer".to_string())
                }
            },
        }
    }

    /// Set of port numbers
    pub fn port_set() -> AttributeType {
        AttributeType::Set(Box::new(port_number()))
    }

    /// Set of strings
    pub fn string_set() -> AttributeType {
        AttributeType::Set(Box::new(AttributeType::String))
    }

    /// The optional `principal` block accepted by every resource
    pub fn principal_block() -> AttributeType {
        AttributeType::Block(vec![
            AttributeSchema::new("service_id", AttributeType::String),
            AttributeSchema::new("service_private_key", AttributeType::String).sensitive(),
            AttributeSchema::new("endpoint", AttributeType::String),
            AttributeSchema::new("region", AttributeType::String),
            AttributeSchema::new("environment", AttributeType::String),
            AttributeSchema::new("organization_context", AttributeType::String),
        ])
    }
}
