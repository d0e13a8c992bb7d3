//! AWS Lake Formation

use std::time::Duration;

use quarry_core::registry::{ResourceRegistration, ServicePackage};

use crate::conns::AwsClient;

pub mod api;
pub mod data_cells_filter;

/// Window for newly granted IAM permissions to become visible to
/// Lake Formation
pub const IAM_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(2 * 60);

pub const ERR_CODE_CONCURRENT_MODIFICATION: &str = "ConcurrentModificationException";
pub const ERR_CODE_ACCESS_DENIED: &str = "AccessDeniedException";

pub struct LakeFormationPackage;

impl ServicePackage<AwsClient> for LakeFormationPackage {
    fn service_package_name(&self) -> &'static str {
        "lakeformation"
    }

    fn sdk_resources(&self) -> Vec<ResourceRegistration<AwsClient>> {
        vec![ResourceRegistration {
            factory: data_cells_filter::resource,
            type_name: data_cells_filter::TYPE_NAME,
            name: Some(data_cells_filter::RES_NAME),
            tags: None,
        }]
    }
}
