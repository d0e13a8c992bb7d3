//! Service packages

use quarry_core::registry::ServicePackage;

use crate::conns::AwsClient;

pub mod lakeformation;
pub mod rds;

/// Every service package this provider ships
pub fn service_packages() -> Vec<Box<dyn ServicePackage<AwsClient>>> {
    vec![
        Box::new(lakeformation::LakeFormationPackage),
        Box::new(rds::RdsPackage),
    ]
}
