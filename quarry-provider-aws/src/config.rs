//! Provider configuration
//!
//! The `provider` block of an input document. Region values may be written
//! either as plain AWS names (`us-east-1`) or in the enum form
//! `aws.Region.us_east_1`.

use std::collections::BTreeMap;

use quarry_core::schema::validate_account_id;
use serde::Deserialize;
use thiserror::Error;

/// Services whose endpoint can be overridden
pub const ENDPOINT_SERVICES: &[&str] = &["lakeformation", "rds"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Provider region must not be empty")]
    MissingRegion,

    #[error("Invalid account_id: {0}")]
    InvalidAccountId(String),

    #[error("Unknown endpoint service '{0}', expected one of: lakeformation, rds")]
    UnknownEndpoint(String),
}

/// Settings used to build the AWS clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub region: String,
    /// Named profile from the shared AWS config files
    #[serde(default)]
    pub profile: Option<String>,
    /// Account used when a resource leaves its catalog id unset
    #[serde(default)]
    pub account_id: Option<String>,
    /// Per-service endpoint URLs (e.g. a local emulator)
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            profile: None,
            account_id: None,
            endpoints: BTreeMap::new(),
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_endpoint(mut self, service: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(service.into(), url.into());
        self
    }

    /// Parse and validate a `provider` block
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        let mut config: ProviderConfig = serde_json::from_value(value.clone())?;
        config.region = normalize_region(&config.region);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::MissingRegion);
        }
        if let Some(account_id) = &self.account_id {
            validate_account_id(account_id).map_err(ConfigError::InvalidAccountId)?;
        }
        if let Some(service) = self
            .endpoints
            .keys()
            .find(|k| !ENDPOINT_SERVICES.contains(&k.as_str()))
        {
            return Err(ConfigError::UnknownEndpoint(service.clone()));
        }
        Ok(())
    }

    /// Endpoint override for `service`, if any
    pub fn endpoint(&self, service: &str) -> Option<&str> {
        self.endpoints.get(service).map(String::as_str)
    }
}

/// Convert an enum-style region (`aws.Region.ap_northeast_1` or
/// `Region.ap_northeast_1`) to its AWS name. Plain names are returned as is.
pub fn normalize_region(value: &str) -> String {
    let parts: Vec<&str> = value.split('.').collect();

    let raw = match parts.as_slice() {
        [type_name, raw] if *type_name == "Region" => raw,
        [provider, type_name, raw] if *provider == "aws" && *type_name == "Region" => raw,
        _ => return value.to_string(),
    };

    raw.replace('_', "-")
}
