//! Input document
//!
//! ```json
//! {
//!   "provider": { "region": "us-east-1" },
//!   "resources": [
//!     {
//!       "type": "aws_db_subnet_group",
//!       "name": "private",
//!       "attributes": { "subnet_ids": ["subnet-1", "subnet-2"] },
//!       "timeouts": { "delete": "5m" }
//!     }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use quarry_core::resource::{Resource, Value};
use quarry_provider_aws::config::ProviderConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    provider: serde_json::Value,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    timeouts: HashMap<String, String>,
    #[serde(default)]
    data_source: bool,
}

/// Parsed input: provider settings and resources in declaration order
#[derive(Debug)]
pub struct Document {
    pub provider: ProviderConfig,
    pub resources: Vec<Resource>,
}

impl Document {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        let raw: RawDocument =
            serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

        let provider = ProviderConfig::from_json(&raw.provider).map_err(|e| e.to_string())?;

        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(raw.resources.len());
        for entry in raw.resources {
            let resource = entry.into_resource()?;
            if !seen.insert(resource.id.clone()) {
                return Err(format!("Duplicate resource {}", resource.id));
            }
            resources.push(resource);
        }

        Ok(Self {
            provider,
            resources,
        })
    }

    /// Managed resources, excluding data sources
    pub fn managed(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| !r.is_data_source())
    }
}

impl RawResource {
    fn into_resource(self) -> Result<Resource, String> {
        let mut resource =
            Resource::new(self.resource_type, self.name).with_read_only(self.data_source);

        for (key, value) in self.attributes {
            let value = Value::from_json(&value).ok_or_else(|| {
                format!(
                    "{}: attribute '{}' must not be null or fractional",
                    resource.id, key
                )
            })?;
            resource.attributes.insert(key, value);
        }
        resource.timeouts = self.timeouts;

        Ok(resource)
    }
}
