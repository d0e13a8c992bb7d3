//! In-memory service fakes for handler tests

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::awserr::ApiError;
use crate::conns::AwsClient;
use crate::service::lakeformation::api::{
    CreateDataCellsFilterInput, DataCellsFilter, DataCellsFilterKey, LakeFormationApi,
};
use crate::service::rds::api::{
    CreateDbSubnetGroupInput, DbSubnetGroup, ERR_CODE_DB_SUBNET_GROUP_NOT_FOUND,
    ModifyDbSubnetGroupInput, RdsApi,
};

pub const ACCOUNT_ID: &str = "123456789012";

pub fn conflict() -> ApiError {
    ApiError::new(
        "ConcurrentModificationException",
        "Resource is being modified by another request",
    )
}

pub fn not_yet_authorized() -> ApiError {
    ApiError::new(
        "AccessDeniedException",
        "User: arn:aws:iam::123456789012:role/etl is not authorized to perform: lakeformation:CreateDataCellsFilter",
    )
}

pub fn denied() -> ApiError {
    ApiError::new(
        "AccessDeniedException",
        "Insufficient Lake Formation permission(s) on orders",
    )
}

fn matches(filter: &DataCellsFilter, key: &DataCellsFilterKey) -> bool {
    filter.name == key.name
        && filter.database_name == key.database_name
        && filter.table_name == key.table_name
}

/// Scripted Lake Formation: queued errors are returned first, then calls
/// act on an in-memory filter list. Every call takes `latency`.
#[derive(Default)]
pub struct FakeLakeFormation {
    latency: Duration,
    create_errors: Mutex<VecDeque<ApiError>>,
    create_blocked_until: Mutex<Option<(Instant, ApiError)>>,
    delete_errors: Mutex<VecDeque<ApiError>>,
    delete_blocked_until: Mutex<Option<(Instant, ApiError)>>,
    get_error: Mutex<Option<ApiError>>,
    filters: Mutex<Vec<DataCellsFilter>>,
    requests: Mutex<Vec<CreateDataCellsFilterInput>>,
    create_calls: AtomicU32,
    get_calls: AtomicU32,
    delete_calls: AtomicU32,
}

impl FakeLakeFormation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_create(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.create_errors.lock().unwrap().extend(errors);
        self
    }

    /// Every create before `until` fails with `error`
    pub fn fail_create_until(self, until: Instant, error: ApiError) -> Self {
        *self.create_blocked_until.lock().unwrap() = Some((until, error));
        self
    }

    pub fn fail_delete(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.delete_errors.lock().unwrap().extend(errors);
        self
    }

    /// Every delete answered before `until` fails with `error`
    pub fn fail_delete_until(self, until: Instant, error: ApiError) -> Self {
        *self.delete_blocked_until.lock().unwrap() = Some((until, error));
        self
    }

    pub fn fail_get(self, error: ApiError) -> Self {
        *self.get_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_filter(self, filter: DataCellsFilter) -> Self {
        self.filters.lock().unwrap().push(filter);
        self
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CreateDataCellsFilterInput> {
        self.requests.lock().unwrap().clone()
    }

    pub fn filter_count(&self) -> usize {
        self.filters.lock().unwrap().len()
    }

    async fn respond(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl LakeFormationApi for FakeLakeFormation {
    async fn create_data_cells_filter(
        &self,
        input: &CreateDataCellsFilterInput,
    ) -> Result<(), ApiError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(input.clone());
        self.respond().await;

        if let Some(err) = self.create_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some((until, err)) = self.create_blocked_until.lock().unwrap().as_ref()
            && Instant::now() < *until
        {
            return Err(err.clone());
        }

        self.filters.lock().unwrap().push(input.table_data.clone());
        Ok(())
    }

    async fn get_data_cells_filter(
        &self,
        key: &DataCellsFilterKey,
    ) -> Result<DataCellsFilter, ApiError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await;

        if let Some(err) = self.get_error.lock().unwrap().clone() {
            return Err(err);
        }

        self.filters
            .lock()
            .unwrap()
            .iter()
            .find(|f| matches(f, key))
            .cloned()
            .ok_or_else(|| ApiError::new("EntityNotFoundException", "Entity not found"))
    }

    async fn delete_data_cells_filter(&self, key: &DataCellsFilterKey) -> Result<(), ApiError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await;

        if let Some(err) = self.delete_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        if let Some((until, err)) = self.delete_blocked_until.lock().unwrap().as_ref()
            && Instant::now() < *until
        {
            return Err(err.clone());
        }

        let mut filters = self.filters.lock().unwrap();
        let before = filters.len();
        filters.retain(|f| !matches(f, key));
        if filters.len() == before {
            return Err(ApiError::new("EntityNotFoundException", "Entity not found"));
        }
        Ok(())
    }
}

/// In-memory RDS subnet groups
#[derive(Default)]
pub struct FakeRds {
    groups: Mutex<BTreeMap<String, DbSubnetGroup>>,
    create_errors: Mutex<VecDeque<ApiError>>,
    delete_errors: Mutex<VecDeque<ApiError>>,
    delete_calls: AtomicU32,
    modify_calls: AtomicU32,
}

impl FakeRds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(self, group: DbSubnetGroup) -> Self {
        self.groups
            .lock()
            .unwrap()
            .insert(group.name.clone(), group);
        self
    }

    pub fn fail_create(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.create_errors.lock().unwrap().extend(errors);
        self
    }

    pub fn fail_delete(self, errors: impl IntoIterator<Item = ApiError>) -> Self {
        self.delete_errors.lock().unwrap().extend(errors);
        self
    }

    pub fn group(&self, name: &str) -> Option<DbSubnetGroup> {
        self.groups.lock().unwrap().get(name).cloned()
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn modify_calls(&self) -> u32 {
        self.modify_calls.load(Ordering::SeqCst)
    }
}

pub fn subnet_group(name: &str, subnet_ids: &[&str]) -> DbSubnetGroup {
    DbSubnetGroup {
        name: name.to_string(),
        description: "Managed by Quarry".to_string(),
        arn: Some(format!(
            "arn:aws:rds:us-east-1:{}:subgrp:{}",
            ACCOUNT_ID, name
        )),
        vpc_id: Some("vpc-0a1b2c3d".to_string()),
        status: Some("Complete".to_string()),
        subnet_ids: subnet_ids.iter().map(|s| s.to_string()).collect(),
        supported_network_types: vec!["IPV4".to_string()],
    }
}

fn group_not_found(name: &str) -> ApiError {
    ApiError::new(
        ERR_CODE_DB_SUBNET_GROUP_NOT_FOUND,
        format!("DBSubnetGroup {} not found.", name),
    )
}

#[async_trait]
impl RdsApi for FakeRds {
    async fn create_db_subnet_group(
        &self,
        input: &CreateDbSubnetGroupInput,
    ) -> Result<DbSubnetGroup, ApiError> {
        if let Some(err) = self.create_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let mut groups = self.groups.lock().unwrap();
        if groups.contains_key(&input.name) {
            return Err(ApiError::new(
                "DBSubnetGroupAlreadyExists",
                format!("The DB subnet group '{}' already exists.", input.name),
            ));
        }

        let subnet_ids: Vec<&str> = input.subnet_ids.iter().map(String::as_str).collect();
        let mut group = subnet_group(&input.name, &subnet_ids);
        group.description = input.description.clone();
        groups.insert(input.name.clone(), group.clone());
        Ok(group)
    }

    async fn describe_db_subnet_groups(&self, name: &str) -> Result<Vec<DbSubnetGroup>, ApiError> {
        self.group(name)
            .map(|g| vec![g])
            .ok_or_else(|| group_not_found(name))
    }

    async fn modify_db_subnet_group(
        &self,
        input: &ModifyDbSubnetGroupInput,
    ) -> Result<(), ApiError> {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);

        let mut groups = self.groups.lock().unwrap();
        let group = groups
            .get_mut(&input.name)
            .ok_or_else(|| group_not_found(&input.name))?;
        if let Some(description) = &input.description {
            group.description = description.clone();
        }
        group.subnet_ids = input.subnet_ids.clone();
        Ok(())
    }

    async fn delete_db_subnet_group(&self, name: &str) -> Result<(), ApiError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(err) = self.delete_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        self.groups
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| group_not_found(name))
    }
}

pub fn client(lakeformation: Arc<FakeLakeFormation>, rds: Arc<FakeRds>) -> Arc<AwsClient> {
    Arc::new(AwsClient::with_apis("us-east-1", lakeformation, rds))
}
