//! aws_db_subnet_group data source

use std::sync::Arc;

use quarry_core::provider::{
    Action, BoxFuture, DataSourceHandler, ProviderError, ProviderResult,
};
use quarry_core::resource::{Resource, State};
use quarry_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::subnet_group::{RES_NAME, TYPE_NAME, find_db_subnet_group, flatten_db_subnet_group};
use crate::conns::AwsClient;
use crate::names;

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("Existing RDS DB subnet group")
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(AttributeSchema::new("description", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("arn", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new(
                "subnet_ids",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .read_only(),
        )
        .attribute(
            AttributeSchema::new(
                "supported_network_types",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .read_only(),
        )
}

pub struct SubnetGroupDataSource {
    client: Arc<AwsClient>,
}

pub fn data_source(client: Arc<AwsClient>) -> Box<dyn DataSourceHandler> {
    Box::new(SubnetGroupDataSource { client })
}

impl SubnetGroupDataSource {
    async fn read_group(&self, resource: &Resource) -> ProviderResult<State> {
        let name = resource.get_str("name").ok_or_else(|| {
            ProviderError::new("name is required").for_resource(resource.id.clone())
        })?;

        let group = find_db_subnet_group(&self.client, name)
            .await
            .map_err(|e| ProviderError::action(Action::Reading, names::RDS, RES_NAME, name, e))?
            .ok_or_else(|| {
                ProviderError::new(format!("no matching {} {} found for '{}'", names::RDS, RES_NAME, name))
                    .for_resource(resource.id.clone())
            })?;

        Ok(State::existing(resource.id.clone(), flatten_db_subnet_group(&group)).with_identifier(name))
    }
}

impl DataSourceHandler for SubnetGroupDataSource {
    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn read<'a>(&'a self, resource: &'a Resource) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_group(resource))
    }
}
