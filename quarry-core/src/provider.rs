//! Provider - Traits abstracting resource operations
//!
//! A Provider exposes the resource types of one infrastructure (AWS, ...) to
//! the host. Each resource type is served by a `ResourceHandler` that turns a
//! configuration record into remote API calls.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;
use crate::timeouts::{Operation, ResourceTimeouts};

/// Lifecycle action an error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Creating,
    Reading,
    Updating,
    Deleting,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Creating => "creating",
            Action::Reading => "reading",
            Action::Updating => "updating",
            Action::Deleting => "deleting",
        };
        f.write_str(s)
    }
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub action: Option<Action>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] ", id.resource_type, id.name)?;
        }
        if let Some(action) = self.action {
            write!(f, "{} ", action)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref cause) = self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            action: None,
            cause: None,
        }
    }

    /// Error annotated with the lifecycle action, the service and resource
    /// display names, and an identifier or request snapshot.
    ///
    /// Renders as `creating Lake Formation Data Cells Filter (123): cause`.
    pub fn action(
        action: Action,
        service: &str,
        resource_name: &str,
        detail: &str,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: format!("{} {} ({})", service, resource_name, detail),
            resource_id: None,
            action: Some(action),
            cause: Some(Box::new(cause)),
        }
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// CRUD handler for one managed resource type
///
/// Handlers receive the operator's configuration record on every call; the
/// host persists only the identifier returned by `create`.
pub trait ResourceHandler: Send + Sync {
    /// Accepted configuration
    fn schema(&self) -> ResourceSchema;

    /// Default operation timeouts
    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::default()
    }

    /// Budget of the retry phase `op` runs before its final attempt, given
    /// the resolved operator `timeout`. `None` when `op` does not retry.
    ///
    /// The host bounds the call with `retry::outer_bound`.
    fn retry_budget(&self, _op: Operation, _timeout: Duration) -> Option<Duration> {
        None
    }

    /// Create the resource; the returned state carries its identifier
    fn create<'a>(
        &'a self,
        resource: &'a Resource,
        timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Read the resource identified by `identifier`
    fn read<'a>(
        &'a self,
        resource: &'a Resource,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>>;

    /// Update in place. Resources whose fields all force replacement keep
    /// the default, which refuses.
    fn update<'a>(
        &'a self,
        resource: &'a Resource,
        _identifier: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        let id = resource.id.clone();
        Box::pin(async move {
            Err(ProviderError::new(format!(
                "Update not supported for {}, delete and recreate",
                id.resource_type
            ))
            .for_resource(id))
        })
    }

    /// Delete the resource, bounded by `timeout`
    fn delete<'a>(
        &'a self,
        resource: &'a Resource,
        identifier: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<()>>;
}

/// Read-only lookup of an existing remote object
pub trait DataSourceHandler: Send + Sync {
    fn schema(&self) -> ResourceSchema;

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::default()
    }

    fn read<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>>;
}

/// Main Provider trait
///
/// Each infrastructure provider (AWS, ...) implements this trait.
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "aws")
    fn name(&self) -> &'static str;

    /// Resource type names this Provider can manage
    fn resource_types(&self) -> Vec<&'static str>;

    /// Data source type names this Provider can read
    fn data_source_types(&self) -> Vec<&'static str>;

    /// Check a configuration record against its schema
    fn validate(&self, resource: &Resource) -> ProviderResult<()>;

    /// Get the current state of a resource by its persisted identifier
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(&self, resource: &Resource, identifier: &str)
    -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    ///
    /// Returns State with identifier set to the value the host persists
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource in place
    fn update(&self, resource: &Resource, identifier: &str)
    -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Read a data source
    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<&'static str> {
        (**self).resource_types()
    }

    fn data_source_types(&self) -> Vec<&'static str> {
        (**self).data_source_types()
    }

    fn validate(&self, resource: &Resource) -> ProviderResult<()> {
        (**self).validate(resource)
    }

    fn read(
        &self,
        resource: &Resource,
        identifier: &str,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(resource, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        resource: &Resource,
        identifier: &str,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(resource, identifier)
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(resource, identifier)
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read_data_source(resource)
    }
}
