//! RDS API seam for DB subnet groups

use async_trait::async_trait;
use aws_sdk_rds::Client;
use aws_sdk_rds::types;

use crate::awserr::ApiError;

pub const ERR_CODE_DB_SUBNET_GROUP_NOT_FOUND: &str = "DBSubnetGroupNotFoundFault";
pub const ERR_CODE_INVALID_DB_SUBNET_GROUP_STATE: &str = "InvalidDBSubnetGroupStateFault";

/// DB subnet group as reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbSubnetGroup {
    pub name: String,
    pub description: String,
    pub arn: Option<String>,
    pub vpc_id: Option<String>,
    pub status: Option<String>,
    pub subnet_ids: Vec<String>,
    pub supported_network_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDbSubnetGroupInput {
    pub name: String,
    pub description: String,
    pub subnet_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyDbSubnetGroupInput {
    pub name: String,
    pub description: Option<String>,
    pub subnet_ids: Vec<String>,
}

#[async_trait]
pub trait RdsApi: Send + Sync {
    async fn create_db_subnet_group(
        &self,
        input: &CreateDbSubnetGroupInput,
    ) -> Result<DbSubnetGroup, ApiError>;

    /// Groups matching `name`; the service reports an unknown name as
    /// `DBSubnetGroupNotFoundFault`
    async fn describe_db_subnet_groups(&self, name: &str) -> Result<Vec<DbSubnetGroup>, ApiError>;

    async fn modify_db_subnet_group(&self, input: &ModifyDbSubnetGroupInput)
    -> Result<(), ApiError>;

    async fn delete_db_subnet_group(&self, name: &str) -> Result<(), ApiError>;
}

/// `RdsApi` over the AWS SDK client
pub struct SdkRds {
    client: Client,
}

impl SdkRds {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RdsApi for SdkRds {
    async fn create_db_subnet_group(
        &self,
        input: &CreateDbSubnetGroupInput,
    ) -> Result<DbSubnetGroup, ApiError> {
        let output = self
            .client
            .create_db_subnet_group()
            .db_subnet_group_name(&input.name)
            .db_subnet_group_description(&input.description)
            .set_subnet_ids(Some(input.subnet_ids.clone()))
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .db_subnet_group()
            .map(from_sdk)
            .ok_or_else(|| ApiError::new("EmptyResult", "CreateDBSubnetGroup returned no group"))
    }

    async fn describe_db_subnet_groups(&self, name: &str) -> Result<Vec<DbSubnetGroup>, ApiError> {
        let output = self
            .client
            .describe_db_subnet_groups()
            .db_subnet_group_name(name)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        Ok(output.db_subnet_groups().iter().map(from_sdk).collect())
    }

    async fn modify_db_subnet_group(
        &self,
        input: &ModifyDbSubnetGroupInput,
    ) -> Result<(), ApiError> {
        self.client
            .modify_db_subnet_group()
            .db_subnet_group_name(&input.name)
            .set_db_subnet_group_description(input.description.clone())
            .set_subnet_ids(Some(input.subnet_ids.clone()))
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }

    async fn delete_db_subnet_group(&self, name: &str) -> Result<(), ApiError> {
        self.client
            .delete_db_subnet_group()
            .db_subnet_group_name(name)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }
}

fn from_sdk(group: &types::DbSubnetGroup) -> DbSubnetGroup {
    DbSubnetGroup {
        name: group.db_subnet_group_name().unwrap_or_default().to_string(),
        description: group
            .db_subnet_group_description()
            .unwrap_or_default()
            .to_string(),
        arn: group.db_subnet_group_arn().map(str::to_string),
        vpc_id: group.vpc_id().map(str::to_string),
        status: group.subnet_group_status().map(str::to_string),
        subnet_ids: group
            .subnets()
            .iter()
            .filter_map(|s| s.subnet_identifier().map(str::to_string))
            .collect(),
        supported_network_types: group.supported_network_types().to_vec(),
    }
}
