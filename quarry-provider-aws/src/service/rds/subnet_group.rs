//! aws_db_subnet_group

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use log::{debug, info};
use quarry_core::provider::{Action, BoxFuture, ProviderError, ProviderResult, ResourceHandler};
use quarry_core::resource::{Resource, State, Value};
use quarry_core::retry::{ErrorClass, Retrier};
use quarry_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use quarry_core::timeouts::Operation;
use regex::Regex;

use super::api::{
    CreateDbSubnetGroupInput, DbSubnetGroup, ERR_CODE_DB_SUBNET_GROUP_NOT_FOUND,
    ERR_CODE_INVALID_DB_SUBNET_GROUP_STATE, ModifyDbSubnetGroupInput,
};
use crate::awserr::ApiError;
use crate::conns::AwsClient;
use crate::names;

pub const TYPE_NAME: &str = "aws_db_subnet_group";
pub const RES_NAME: &str = "DB Subnet Group";

pub const DEFAULT_DESCRIPTION: &str = "Managed by Quarry";

/// Prefix of names generated for groups created without one
pub const GENERATED_NAME_PREFIX: &str = "quarry-";

static NAME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z_ .-]+$").ok());

/// DB subnet group name: 1 to 255 lowercase alphanumerics, spaces,
/// underscores, periods or hyphens, and not `default`
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 255 {
        return Err(format!(
            "Invalid DB subnet group name '{}': must be 1 to 255 characters",
            name
        ));
    }
    if name == "default" {
        return Err("DB subnet group name must not be 'default'".to_string());
    }
    if !NAME_PATTERN.as_ref().is_some_and(|re| re.is_match(name)) {
        return Err(format!(
            "Invalid DB subnet group name '{}': only lowercase alphanumerics, spaces, underscores, periods and hyphens are allowed",
            name
        ));
    }
    Ok(())
}

fn name_type() -> AttributeType {
    AttributeType::Custom {
        name: "DbSubnetGroupName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => validate_name(s),
            _ => Err("Expected string".to_string()),
        },
    }
}

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(TYPE_NAME)
        .with_description("RDS DB subnet group")
        .attribute(
            AttributeSchema::new("name", name_type())
                .computed()
                .force_new()
                .with_description("Generated when unset"),
        )
        .attribute(
            AttributeSchema::new("description", AttributeType::String)
                .with_default(Value::String(DEFAULT_DESCRIPTION.to_string())),
        )
        .attribute(
            AttributeSchema::new(
                "subnet_ids",
                AttributeType::Set(Box::new(types::non_empty_string())),
            )
            .required(),
        )
        .attribute(AttributeSchema::new("arn", AttributeType::String).read_only())
        .attribute(AttributeSchema::new("vpc_id", AttributeType::String).read_only())
        .attribute(
            AttributeSchema::new(
                "supported_network_types",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .read_only(),
        )
}

/// Observable attributes of a remote group
pub fn flatten_db_subnet_group(group: &DbSubnetGroup) -> HashMap<String, Value> {
    let mut subnet_ids = group.subnet_ids.clone();
    subnet_ids.sort();

    let mut attributes = HashMap::new();
    attributes.insert("name".to_string(), Value::String(group.name.clone()));
    attributes.insert(
        "description".to_string(),
        Value::String(group.description.clone()),
    );
    attributes.insert("subnet_ids".to_string(), Value::string_list(subnet_ids));
    if let Some(arn) = &group.arn {
        attributes.insert("arn".to_string(), Value::String(arn.clone()));
    }
    if let Some(vpc_id) = &group.vpc_id {
        attributes.insert("vpc_id".to_string(), Value::String(vpc_id.clone()));
    }
    attributes.insert(
        "supported_network_types".to_string(),
        Value::string_list(group.supported_network_types.iter().cloned()),
    );
    attributes
}

fn subnet_ids(resource: &Resource) -> Vec<String> {
    let mut ids = resource
        .get_ok("subnet_ids")
        .map(Value::string_items)
        .unwrap_or_default();
    ids.sort();
    ids.dedup();
    ids
}

fn description(resource: &Resource) -> String {
    resource
        .get_str("description")
        .unwrap_or(DEFAULT_DESCRIPTION)
        .to_string()
}

/// Dependants (instances, clusters) may still be detaching
fn classify_delete(err: &ApiError) -> ErrorClass {
    if err.code_equals(ERR_CODE_INVALID_DB_SUBNET_GROUP_STATE) {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

/// Look up a group by name; `None` when the service does not know it
pub(super) async fn find_db_subnet_group(
    client: &AwsClient,
    name: &str,
) -> Result<Option<DbSubnetGroup>, ApiError> {
    match client.rds().describe_db_subnet_groups(name).await {
        Ok(groups) => Ok(groups.into_iter().find(|g| g.name == name)),
        Err(e) if e.code_equals(ERR_CODE_DB_SUBNET_GROUP_NOT_FOUND) => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct SubnetGroupResource {
    client: Arc<AwsClient>,
}

pub fn resource(client: Arc<AwsClient>) -> Box<dyn ResourceHandler> {
    Box::new(SubnetGroupResource { client })
}

impl SubnetGroupResource {
    async fn create_group(&self, resource: &Resource) -> ProviderResult<State> {
        let name = match resource.get_str("name") {
            Some(name) => name.to_string(),
            None => format!("{}{}", GENERATED_NAME_PREFIX, uuid::Uuid::new_v4().simple()),
        };
        let input = CreateDbSubnetGroupInput {
            name: name.clone(),
            description: description(resource),
            subnet_ids: subnet_ids(resource),
        };

        self.client
            .rds()
            .create_db_subnet_group(&input)
            .await
            .map_err(|e| ProviderError::action(Action::Creating, names::RDS, RES_NAME, &name, e))?;

        info!("created {} {} ({})", names::RDS, RES_NAME, name);
        self.read_group(resource, &name).await
    }

    async fn read_group(&self, resource: &Resource, name: &str) -> ProviderResult<State> {
        let group = find_db_subnet_group(&self.client, name)
            .await
            .map_err(|e| ProviderError::action(Action::Reading, names::RDS, RES_NAME, name, e))?;

        match group {
            Some(group) => Ok(
                State::existing(resource.id.clone(), flatten_db_subnet_group(&group))
                    .with_identifier(name),
            ),
            None => {
                debug!("{} {} ({}) not found", names::RDS, RES_NAME, name);
                Ok(State::not_found(resource.id.clone()))
            }
        }
    }

    async fn update_group(&self, resource: &Resource, name: &str) -> ProviderResult<State> {
        let input = ModifyDbSubnetGroupInput {
            name: name.to_string(),
            description: Some(description(resource)),
            subnet_ids: subnet_ids(resource),
        };

        self.client
            .rds()
            .modify_db_subnet_group(&input)
            .await
            .map_err(|e| ProviderError::action(Action::Updating, names::RDS, RES_NAME, name, e))?;

        self.read_group(resource, name).await
    }

    async fn delete_group(&self, name: &str, timeout: Duration) -> ProviderResult<()> {
        let api = self.client.rds();

        let result = Retrier::new(timeout)
            .run(|| api.delete_db_subnet_group(name), classify_delete)
            .await;

        match result {
            Ok(()) => {
                info!("deleted {} {} ({})", names::RDS, RES_NAME, name);
                Ok(())
            }
            Err(e) if e.code_equals(ERR_CODE_DB_SUBNET_GROUP_NOT_FOUND) => Ok(()),
            Err(e) => Err(ProviderError::action(
                Action::Deleting,
                names::RDS,
                RES_NAME,
                name,
                e,
            )),
        }
    }
}

impl ResourceHandler for SubnetGroupResource {
    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn retry_budget(&self, op: Operation, timeout: Duration) -> Option<Duration> {
        (op == Operation::Delete).then_some(timeout)
    }

    fn create<'a>(
        &'a self,
        resource: &'a Resource,
        _timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.create_group(resource))
    }

    fn read<'a>(
        &'a self,
        resource: &'a Resource,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_group(resource, identifier))
    }

    fn update<'a>(
        &'a self,
        resource: &'a Resource,
        identifier: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.update_group(resource, identifier))
    }

    fn delete<'a>(
        &'a self,
        _resource: &'a Resource,
        identifier: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_group(identifier, timeout))
    }
}
