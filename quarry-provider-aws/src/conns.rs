//! Service connections
//!
//! `AwsClient` bundles one API handle per service. It is built once from the
//! provider configuration and handed to every handler factory.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};
use log::debug;

use crate::config::ProviderConfig;
use crate::service::lakeformation::api::{LakeFormationApi, SdkLakeFormation};
use crate::service::rds::api::{RdsApi, SdkRds};

pub struct AwsClient {
    region: String,
    account_id: Option<String>,
    lakeformation: Arc<dyn LakeFormationApi>,
    rds: Arc<dyn RdsApi>,
}

impl AwsClient {
    /// Build SDK clients from the shared AWS configuration chain
    pub async fn from_config(config: &ProviderConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        let mut lakeformation = aws_sdk_lakeformation::config::Builder::from(&sdk_config);
        if let Some(url) = config.endpoint("lakeformation") {
            debug!("using lakeformation endpoint {}", url);
            lakeformation = lakeformation.endpoint_url(url);
        }

        let mut rds = aws_sdk_rds::config::Builder::from(&sdk_config);
        if let Some(url) = config.endpoint("rds") {
            debug!("using rds endpoint {}", url);
            rds = rds.endpoint_url(url);
        }

        Self {
            region: config.region.clone(),
            account_id: config.account_id.clone(),
            lakeformation: Arc::new(SdkLakeFormation::new(
                aws_sdk_lakeformation::Client::from_conf(lakeformation.build()),
            )),
            rds: Arc::new(SdkRds::new(aws_sdk_rds::Client::from_conf(rds.build()))),
        }
    }

    /// Create with specific API implementations (for testing)
    pub fn with_apis(
        region: impl Into<String>,
        lakeformation: Arc<dyn LakeFormationApi>,
        rds: Arc<dyn RdsApi>,
    ) -> Self {
        Self {
            region: region.into(),
            account_id: None,
            lakeformation,
            rds,
        }
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Account used as the default catalog id
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn lakeformation(&self) -> &dyn LakeFormationApi {
        self.lakeformation.as_ref()
    }

    pub fn rds(&self) -> &dyn RdsApi {
        self.rds.as_ref()
    }
}
