//! Service-package registry
//!
//! Every service (Lake Formation, RDS, ...) publishes a static table of the
//! resources and data sources it implements. The registry merges those tables
//! and builds handlers on demand, handing each factory the client value `C`
//! explicitly instead of looking clients up from shared state.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::provider::{DataSourceHandler, ResourceHandler};

/// Tagging support of a resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTags {
    /// Attribute holding the ARN used to tag the resource
    pub identifier_attribute: Option<&'static str>,
}

/// Table entry for a managed resource type
pub struct ResourceRegistration<C> {
    pub factory: fn(Arc<C>) -> Box<dyn ResourceHandler>,
    pub type_name: &'static str,
    /// Display name used in error messages
    pub name: Option<&'static str>,
    pub tags: Option<ResourceTags>,
}

/// Table entry for a data source type
pub struct DataSourceRegistration<C> {
    pub factory: fn(Arc<C>) -> Box<dyn DataSourceHandler>,
    pub type_name: &'static str,
    pub name: Option<&'static str>,
    pub tags: Option<ResourceTags>,
}

/// Static table of one service's resources and data sources
pub trait ServicePackage<C>: Send + Sync {
    /// Service name (e.g., "lakeformation")
    fn service_package_name(&self) -> &'static str;

    fn sdk_resources(&self) -> Vec<ResourceRegistration<C>>;

    fn sdk_data_sources(&self) -> Vec<DataSourceRegistration<C>> {
        Vec::new()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Type '{type_name}' is registered by both '{first}' and '{second}'")]
    Duplicate {
        type_name: &'static str,
        first: &'static str,
        second: &'static str,
    },
}

struct Entry<R> {
    registration: R,
    service: &'static str,
}

/// Lookup table over all registered service packages
pub struct Registry<C> {
    resources: BTreeMap<&'static str, Entry<ResourceRegistration<C>>>,
    data_sources: BTreeMap<&'static str, Entry<DataSourceRegistration<C>>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
        }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of packages
    pub fn from_packages(
        packages: Vec<Box<dyn ServicePackage<C>>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for package in packages {
            registry.register(package.as_ref())?;
        }
        Ok(registry)
    }

    /// Add every entry of `package`. Type names must be unique.
    pub fn register(&mut self, package: &dyn ServicePackage<C>) -> Result<(), RegistryError> {
        let service = package.service_package_name();

        for registration in package.sdk_resources() {
            if let Some(existing) = self.resources.get(registration.type_name) {
                return Err(RegistryError::Duplicate {
                    type_name: registration.type_name,
                    first: existing.service,
                    second: service,
                });
            }
            self.resources.insert(
                registration.type_name,
                Entry {
                    registration,
                    service,
                },
            );
        }

        for registration in package.sdk_data_sources() {
            if let Some(existing) = self.data_sources.get(registration.type_name) {
                return Err(RegistryError::Duplicate {
                    type_name: registration.type_name,
                    first: existing.service,
                    second: service,
                });
            }
            self.data_sources.insert(
                registration.type_name,
                Entry {
                    registration,
                    service,
                },
            );
        }

        Ok(())
    }

    /// Registered resource type names, sorted
    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    /// Registered data source type names, sorted
    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }

    pub fn resource(&self, type_name: &str) -> Option<&ResourceRegistration<C>> {
        self.resources.get(type_name).map(|e| &e.registration)
    }

    pub fn data_source(&self, type_name: &str) -> Option<&DataSourceRegistration<C>> {
        self.data_sources.get(type_name).map(|e| &e.registration)
    }

    /// Service that registered a resource type
    pub fn resource_service(&self, type_name: &str) -> Option<&'static str> {
        self.resources.get(type_name).map(|e| e.service)
    }

    /// Build the handler for a resource type
    pub fn resource_handler(
        &self,
        type_name: &str,
        client: Arc<C>,
    ) -> Option<Box<dyn ResourceHandler>> {
        self.resource(type_name).map(|r| (r.factory)(client))
    }

    /// Build the handler for a data source type
    pub fn data_source_handler(
        &self,
        type_name: &str,
        client: Arc<C>,
    ) -> Option<Box<dyn DataSourceHandler>> {
        self.data_source(type_name).map(|r| (r.factory)(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BoxFuture, ProviderResult};
    use crate::resource::{Resource, State};
    use crate::schema::ResourceSchema;
    use std::time::Duration;

    struct Client {
        label: &'static str,
    }

    struct EchoHandler {
        client: Arc<Client>,
    }

    impl ResourceHandler for EchoHandler {
        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new(self.client.label)
        }

        fn create<'a>(
            &'a self,
            resource: &'a Resource,
            _timeout: Duration,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn read<'a>(
            &'a self,
            resource: &'a Resource,
            _identifier: &'a str,
        ) -> BoxFuture<'a, ProviderResult<State>> {
            let id = resource.id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn delete<'a>(
            &'a self,
            _resource: &'a Resource,
            _identifier: &'a str,
            _timeout: Duration,
        ) -> BoxFuture<'a, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn echo(client: Arc<Client>) -> Box<dyn ResourceHandler> {
        Box::new(EchoHandler { client })
    }

    struct Package {
        name: &'static str,
        types: Vec<&'static str>,
    }

    impl ServicePackage<Client> for Package {
        fn service_package_name(&self) -> &'static str {
            self.name
        }

        fn sdk_resources(&self) -> Vec<ResourceRegistration<Client>> {
            self.types
                .iter()
                .map(|t| ResourceRegistration {
                    factory: echo,
                    type_name: *t,
                    name: Some("Echo"),
                    tags: None,
                })
                .collect()
        }
    }

    #[test]
    fn builds_handlers_with_the_given_client() {
        let registry = Registry::from_packages(vec![Box::new(Package {
            name: "echo",
            types: vec!["echo_b", "echo_a"],
        })])
        .unwrap();

        assert_eq!(registry.resource_types(), vec!["echo_a", "echo_b"]);
        assert_eq!(registry.resource_service("echo_a"), Some("echo"));

        let handler = registry
            .resource_handler("echo_a", Arc::new(Client { label: "explicit" }))
            .unwrap();
        assert_eq!(handler.schema().resource_type, "explicit");
        assert!(registry.resource_handler("missing", Arc::new(Client { label: "x" })).is_none());
        assert!(registry.data_source_types().is_empty());
    }

    #[test]
    fn duplicate_type_names_are_rejected() {
        let result = Registry::from_packages(vec![
            Box::new(Package {
                name: "first",
                types: vec!["shared"],
            }),
            Box::new(Package {
                name: "second",
                types: vec!["shared"],
            }),
        ]);

        assert_eq!(
            result.err(),
            Some(RegistryError::Duplicate {
                type_name: "shared",
                first: "first",
                second: "second",
            })
        );
    }
}
