//! Quarry AWS Provider
//!
//! Resource types are contributed by service packages (`service::*`) and
//! looked up through a `Registry`. Every lifecycle call is checked against
//! the handler schema and bounded by its resolved timeout, extended past
//! any retry phase so the final attempt can finish.

pub mod awserr;
pub mod config;
pub mod conns;
pub mod names;
pub mod service;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use quarry_core::provider::{
    Action, BoxFuture, DataSourceHandler, Provider, ProviderError, ProviderResult,
    ResourceHandler,
};
use quarry_core::registry::Registry;
use quarry_core::retry::outer_bound;
use quarry_core::resource::{Resource, ResourceId, State};
use quarry_core::schema::ResourceSchema;
use quarry_core::timeouts::{Operation, ResourceTimeouts};

use crate::config::ProviderConfig;
use crate::conns::AwsClient;
use crate::service::service_packages;

/// AWS Provider
pub struct AwsProvider {
    client: Arc<AwsClient>,
    registry: Registry<AwsClient>,
}

impl AwsProvider {
    /// Create a new AWS Provider from a validated configuration
    pub async fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let client = AwsClient::from_config(config).await;
        Self::with_client(Arc::new(client))
    }

    /// Create with a specific client (for testing)
    pub fn with_client(client: Arc<AwsClient>) -> ProviderResult<Self> {
        let registry = Registry::from_packages(service_packages())
            .map_err(|e| ProviderError::new("Invalid service package table").with_cause(e))?;
        Ok(Self { client, registry })
    }

    pub fn registry(&self) -> &Registry<AwsClient> {
        &self.registry
    }

    fn resource_handler(&self, resource: &Resource) -> ProviderResult<Box<dyn ResourceHandler>> {
        if resource.is_data_source() {
            return Err(ProviderError::new("Data sources are read-only")
                .for_resource(resource.id.clone()));
        }
        self.registry
            .resource_handler(&resource.id.resource_type, self.client.clone())
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "Unknown resource type: {}",
                    resource.id.resource_type
                ))
                .for_resource(resource.id.clone())
            })
    }

    fn data_source_handler(
        &self,
        resource: &Resource,
    ) -> ProviderResult<Box<dyn DataSourceHandler>> {
        self.registry
            .data_source_handler(&resource.id.resource_type, self.client.clone())
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "Unknown data source type: {}",
                    resource.id.resource_type
                ))
                .for_resource(resource.id.clone())
            })
    }

    /// Longest a lifecycle call for `resource` may take under `op`
    pub fn operation_bound(&self, resource: &Resource, op: Operation) -> ProviderResult<Duration> {
        if resource.is_data_source() {
            let handler = self.data_source_handler(resource)?;
            return resolve_timeout(&handler.timeouts(), Operation::Read, resource);
        }
        let handler = self.resource_handler(resource)?;
        let (_, bound) = limits(handler.as_ref(), op, resource)?;
        Ok(bound)
    }

    async fn create_resource(&self, resource: Resource) -> ProviderResult<State> {
        let handler = self.resource_handler(&resource)?;
        let resource = prepare(&handler.schema(), &resource)?;
        let (timeout, bound) = limits(handler.as_ref(), Operation::Create, &resource)?;

        info!("creating {}", resource.id);
        let state = bounded(
            &resource.id,
            Action::Creating,
            bound,
            handler.create(&resource, timeout),
        )
        .await?;
        info!("created {}", resource.id);
        Ok(state)
    }

    async fn read_resource(&self, resource: Resource, identifier: String) -> ProviderResult<State> {
        let handler = self.resource_handler(&resource)?;
        let resource = with_defaults(&handler.schema(), &resource);
        let timeout = resolve_timeout(&handler.timeouts(), Operation::Read, &resource)?;

        info!("reading {} ({})", resource.id, identifier);
        bounded(
            &resource.id,
            Action::Reading,
            timeout,
            handler.read(&resource, &identifier),
        )
        .await
    }

    async fn update_resource(
        &self,
        resource: Resource,
        identifier: String,
    ) -> ProviderResult<State> {
        let handler = self.resource_handler(&resource)?;
        let resource = prepare(&handler.schema(), &resource)?;
        let (timeout, bound) = limits(handler.as_ref(), Operation::Update, &resource)?;

        info!("updating {} ({})", resource.id, identifier);
        let state = bounded(
            &resource.id,
            Action::Updating,
            bound,
            handler.update(&resource, &identifier, timeout),
        )
        .await?;
        info!("updated {}", resource.id);
        Ok(state)
    }

    async fn delete_resource(&self, resource: Resource, identifier: String) -> ProviderResult<()> {
        let handler = self.resource_handler(&resource)?;
        let resource = with_defaults(&handler.schema(), &resource);
        let (timeout, bound) = limits(handler.as_ref(), Operation::Delete, &resource)?;

        info!("deleting {} ({})", resource.id, identifier);
        bounded(
            &resource.id,
            Action::Deleting,
            bound,
            handler.delete(&resource, &identifier, timeout),
        )
        .await?;
        info!("deleted {}", resource.id);
        Ok(())
    }

    async fn read_data_source_inner(&self, resource: Resource) -> ProviderResult<State> {
        let handler = self.data_source_handler(&resource)?;
        let resource = prepare(&handler.schema(), &resource)?;
        let timeout = resolve_timeout(&handler.timeouts(), Operation::Read, &resource)?;

        info!("reading data source {}", resource.id);
        bounded(&resource.id, Action::Reading, timeout, handler.read(&resource)).await
    }
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<&'static str> {
        self.registry.resource_types()
    }

    fn data_source_types(&self) -> Vec<&'static str> {
        self.registry.data_source_types()
    }

    fn validate(&self, resource: &Resource) -> ProviderResult<()> {
        if resource.is_data_source() {
            let handler = self.data_source_handler(resource)?;
            check(&handler.schema(), resource)?;
            resolve_timeout(&handler.timeouts(), Operation::Read, resource)?;
        } else {
            let handler = self.resource_handler(resource)?;
            check(&handler.schema(), resource)?;
            for op in [
                Operation::Create,
                Operation::Read,
                Operation::Update,
                Operation::Delete,
            ] {
                resolve_timeout(&handler.timeouts(), op, resource)?;
            }
        }
        Ok(())
    }

    fn read(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.read_resource(resource, identifier).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(resource).await })
    }

    fn update(
        &self,
        resource: &Resource,
        identifier: &str,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.update_resource(resource, identifier).await })
    }

    fn delete(&self, resource: &Resource, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let resource = resource.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(resource, identifier).await })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_inner(resource).await })
    }
}

/// Check a record against its schema, reporting every violation
fn check(schema: &ResourceSchema, resource: &Resource) -> ProviderResult<()> {
    schema.validate(&resource.attributes).map_err(|errors| {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        ProviderError::new(format!("Invalid configuration: {}", details.join("; ")))
            .for_resource(resource.id.clone())
    })
}

fn with_defaults(schema: &ResourceSchema, resource: &Resource) -> Resource {
    let mut prepared = resource.clone();
    schema.apply_defaults(&mut prepared.attributes);
    prepared
}

fn prepare(schema: &ResourceSchema, resource: &Resource) -> ProviderResult<Resource> {
    check(schema, resource)?;
    Ok(with_defaults(schema, resource))
}

fn resolve_timeout(
    timeouts: &ResourceTimeouts,
    op: Operation,
    resource: &Resource,
) -> ProviderResult<Duration> {
    timeouts.resolve(op, resource).map_err(|e| {
        ProviderError::new("Invalid timeouts")
            .with_cause(e)
            .for_resource(resource.id.clone())
    })
}

/// Resolved operator timeout for `op` and the outer bound of the call
fn limits(
    handler: &dyn ResourceHandler,
    op: Operation,
    resource: &Resource,
) -> ProviderResult<(Duration, Duration)> {
    let timeout = resolve_timeout(&handler.timeouts(), op, resource)?;
    Ok((timeout, outer_bound(timeout, handler.retry_budget(op, timeout))))
}

/// Run `fut` under `timeout`; on expiry the future is dropped, abandoning
/// any in-flight remote call.
async fn bounded<T>(
    id: &ResourceId,
    action: Action,
    timeout: Duration,
    fut: impl Future<Output = ProviderResult<T>>,
) -> ProviderResult<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) if err.resource_id.is_none() => Err(err.for_resource(id.clone())),
        Ok(Err(err)) => Err(err),
        Err(_) => {
            let mut err = ProviderError::new(format!("timed out after {:?}", timeout))
                .for_resource(id.clone());
            err.action = Some(action);
            Err(err)
        }
    }
}
