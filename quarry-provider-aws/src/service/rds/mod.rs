//! Amazon RDS

use quarry_core::registry::{
    DataSourceRegistration, ResourceRegistration, ResourceTags, ServicePackage,
};

use crate::conns::AwsClient;

pub mod api;
pub mod subnet_group;
pub mod subnet_group_data_source;

pub struct RdsPackage;

impl ServicePackage<AwsClient> for RdsPackage {
    fn service_package_name(&self) -> &'static str {
        "rds"
    }

    fn sdk_resources(&self) -> Vec<ResourceRegistration<AwsClient>> {
        vec![ResourceRegistration {
            factory: subnet_group::resource,
            type_name: subnet_group::TYPE_NAME,
            name: Some(subnet_group::RES_NAME),
            tags: Some(ResourceTags {
                identifier_attribute: Some("arn"),
            }),
        }]
    }

    fn sdk_data_sources(&self) -> Vec<DataSourceRegistration<AwsClient>> {
        vec![DataSourceRegistration {
            factory: subnet_group_data_source::data_source,
            type_name: subnet_group::TYPE_NAME,
            name: None,
            tags: None,
        }]
    }
}
