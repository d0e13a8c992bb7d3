//! Resource - Representing resources and their state

use std::collections::HashMap;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "aws_lakeformation_data_cells_filter")
    pub resource_type: String,
    /// Resource name (local label given by the operator)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    /// Ordered list. Also carries sets and nested blocks
    /// (a block is a list of maps).
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    /// True for the zero value of each variant: "", 0, false, [] and {}.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Int(i) => *i == 0,
            Value::Bool(b) => !*b,
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Collect the string members of a list or set
    pub fn string_items(&self) -> Vec<String> {
        self.as_list()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Build a list value from strings
    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    /// Convert to JSON for persistence
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert from JSON. Nulls and non-integral numbers have no counterpart.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
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
}

/// Look up `key` and return it only when it is set to a non-zero value
pub fn get_ok<'a>(attributes: &'a HashMap<String, Value>, key: &str) -> Option<&'a Value> {
    attributes.get(key).filter(|v| !v.is_empty())
}

/// Desired state declared by the operator
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// Operator overrides for operation timeouts (e.g. "create" => "30m")
    pub timeouts: HashMap<String, String>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            timeouts: HashMap::new(),
            read_only: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, operation: impl Into<String>, duration: impl Into<String>) -> Self {
        self.timeouts.insert(operation.into(), duration.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    /// Non-zero top-level attribute
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        get_ok(&self.attributes, key)
    }

    /// Non-empty string attribute
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get_ok(key).and_then(Value::as_str)
    }

    /// First element of a single-element nested block
    pub fn block(&self, key: &str) -> Option<&HashMap<String, Value>> {
        self.attributes
            .get(key)
            .and_then(Value::as_list)
            .and_then(|items| items.first())
            .and_then(Value::as_map)
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider-side identifier persisted by the host
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_are_skipped_by_get_ok() {
        let resource = Resource::new("test", "example")
            .with_attribute("blank", Value::String(String::new()))
            .with_attribute("none", Value::List(vec![]))
            .with_attribute("name", Value::String("x".to_string()));

        assert!(resource.get_ok("blank").is_none());
        assert!(resource.get_ok("none").is_none());
        assert!(resource.get_ok("missing").is_none());
        assert_eq!(resource.get_str("name"), Some("x"));
    }

    #[test]
    fn block_returns_first_element() {
        let mut inner = HashMap::new();
        inner.insert("name".to_string(), Value::String("f".to_string()));
        let resource = Resource::new("test", "example")
            .with_attribute("filter", Value::List(vec![Value::Map(inner)]));

        let block = resource.block("filter").unwrap();
        assert_eq!(block.get("name"), Some(&Value::String("f".to_string())));
        assert!(resource.block("other").is_none());
    }

    #[test]
    fn json_conversion_keeps_structure() {
        let json = serde_json::json!({
            "name": "a",
            "count": 3,
            "ids": ["x", "y"],
            "skip": null,
        });
        let value = Value::from_json(&json).unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["ids"].string_items(), vec!["x", "y"]);
        assert_eq!(value.to_json()["count"], serde_json::json!(3));
    }

    #[test]
    fn resource_id_display() {
        let id = ResourceId::new("aws_db_subnet_group", "main");
        assert_eq!(id.to_string(), "aws_db_subnet_group.main");
    }
}
