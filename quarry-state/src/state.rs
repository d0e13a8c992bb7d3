//! State file structures
//!
//! The driver records, per managed resource, the identifier returned by the
//! provider on create and the attributes observed by the last read.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quarry_core::resource::{ResourceId, State, Value};
use serde::{Deserialize, Serialize};

/// The main state file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Identity of this state history; a write with another lineage is refused
    pub lineage: String,
    /// Version of Quarry that last wrote this state
    pub quarry_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self::with_lineage(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_lineage(lineage: String) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage,
            quarry_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Prepare for a new write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.quarry_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.matches(id))
    }

    /// Add or replace the entry for the same resource address
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        let id = resource.id();
        match self.resources.iter_mut().find(|r| r.matches(&id)) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self.resources.iter().position(|r| r.matches(id))?;
        Some(self.resources.remove(pos))
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Recorded state of one managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub resource_type: String,
    pub name: String,
    /// Provider name (e.g., "aws")
    pub provider: String,
    /// Identifier returned by the provider on create
    pub identifier: String,
    /// Attributes observed by the last read
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(
        id: &ResourceId,
        provider: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: id.resource_type.clone(),
            name: id.name.clone(),
            provider: provider.into(),
            identifier: identifier.into(),
            attributes: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Record a provider state. `None` when the state carries no identifier.
    pub fn from_state(state: &State, provider: impl Into<String>) -> Option<Self> {
        let identifier = state.identifier.as_ref()?;
        let mut resource = Self::new(&state.id, provider, identifier.clone());
        resource.attributes = state
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Some(resource)
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    pub fn matches(&self, id: &ResourceId) -> bool {
        self.resource_type == id.resource_type && self.name == id.name
    }

    /// Attributes converted back to provider values
    pub fn values(&self) -> HashMap<String, Value> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
            .collect()
    }
}
