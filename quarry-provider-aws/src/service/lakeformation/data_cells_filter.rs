//! aws_lakeformation_data_cells_filter
//!
//! Every field forces replacement, so the resource has create, read and
//! delete only. The identifier is the hashcode of the canonical create
//! request because the service assigns no id of its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::info;
use quarry_core::hashcode::identifier_for;
use quarry_core::provider::{Action, BoxFuture, ProviderError, ProviderResult, ResourceHandler};
use quarry_core::resource::{Resource, State, Value, get_ok};
use quarry_core::retry::{Backoff, ErrorClass, Retrier};
use quarry_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema, types};
use quarry_core::timeouts::{DEFAULT_TIMEOUT, Operation, ResourceTimeouts};

use super::api::{ColumnWildcard, CreateDataCellsFilterInput, DataCellsFilter, RowFilter};
use super::{ERR_CODE_ACCESS_DENIED, ERR_CODE_CONCURRENT_MODIFICATION, IAM_PROPAGATION_TIMEOUT};
use crate::awserr::ApiError;
use crate::conns::AwsClient;
use crate::names;

pub const TYPE_NAME: &str = "aws_lakeformation_data_cells_filter";
pub const RES_NAME: &str = "Resource Data Cells Filter";

pub fn schema() -> ResourceSchema {
    let filter = BlockSchema::new()
        .max_items(1)
        .attribute(
            AttributeSchema::new("catalog_id", types::account_id())
                .computed()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("database_name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("table_name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("filter_expression", AttributeType::String)
                .force_new()
                .with_description("PartiQL condition selecting the visible rows"),
        )
        .attribute(
            AttributeSchema::new(
                "excluded_column_names",
                AttributeType::Set(Box::new(types::non_empty_string())),
            )
            .force_new(),
        );

    ResourceSchema::new(TYPE_NAME)
        .with_description("Row and column level access filter on a Data Catalog table")
        .attribute(
            AttributeSchema::new("catalog_id", types::account_id())
                .computed()
                .force_new()
                .with_description("Catalog owning the table; defaults to the provider account"),
        )
        .attribute(
            AttributeSchema::new("data_cells_filter", AttributeType::Block(Box::new(filter)))
                .required()
                .force_new(),
        )
}

/// Build the request object from a configuration record.
///
/// Only fields that are set and non-empty reach the request. The top-level
/// `catalog_id` wins over the one inside the block.
pub fn expand_data_cells_filter(resource: &Resource) -> DataCellsFilter {
    let empty = HashMap::new();
    let block = resource.block("data_cells_filter").unwrap_or(&empty);
    let string = |key: &str| get_ok(block, key).and_then(Value::as_str).map(str::to_string);

    let mut filter = DataCellsFilter {
        table_catalog_id: resource
            .get_str("catalog_id")
            .map(str::to_string)
            .or_else(|| string("catalog_id")),
        database_name: string("database_name"),
        table_name: string("table_name"),
        name: string("name"),
        ..Default::default()
    };

    if let Some(expression) = string("filter_expression") {
        filter.row_filter = Some(RowFilter {
            filter_expression: Some(expression),
        });
    }

    if let Some(columns) = get_ok(block, "excluded_column_names") {
        // Set semantics: member order must not change the identifier
        let mut names = columns.string_items();
        names.retain(|n| !n.is_empty());
        names.sort();
        names.dedup();
        if !names.is_empty() {
            filter.column_wildcard = Some(ColumnWildcard {
                excluded_column_names: names,
            });
        }
    }

    filter
}

/// Observable attributes of a remote filter
pub fn flatten_data_cells_filter(filter: &DataCellsFilter) -> HashMap<String, Value> {
    let mut block = HashMap::new();
    let mut put = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            block.insert(key.to_string(), Value::String(v.clone()));
        }
    };
    put("catalog_id", &filter.table_catalog_id);
    put("database_name", &filter.database_name);
    put("table_name", &filter.table_name);
    put("name", &filter.name);
    if let Some(row_filter) = &filter.row_filter {
        put("filter_expression", &row_filter.filter_expression);
    }
    if let Some(wildcard) = &filter.column_wildcard {
        block.insert(
            "excluded_column_names".to_string(),
            Value::string_list(wildcard.excluded_column_names.iter().cloned()),
        );
    }

    let mut attributes = HashMap::new();
    if let Some(catalog_id) = &filter.table_catalog_id {
        attributes.insert("catalog_id".to_string(), Value::String(catalog_id.clone()));
    }
    attributes.insert(
        "data_cells_filter".to_string(),
        Value::List(vec![Value::Map(block)]),
    );
    attributes
}

/// Conflicts and not-yet-propagated grants clear up on their own
pub fn classify(err: &ApiError) -> ErrorClass {
    if err.code_equals(ERR_CODE_CONCURRENT_MODIFICATION)
        || err.message_contains(ERR_CODE_ACCESS_DENIED, "is not authorized")
    {
        ErrorClass::Retryable
    } else {
        ErrorClass::Fatal
    }
}

pub struct DataCellsFilterResource {
    client: Arc<AwsClient>,
    propagation_timeout: Duration,
    backoff: Backoff,
}

pub fn resource(client: Arc<AwsClient>) -> Box<dyn ResourceHandler> {
    Box::new(DataCellsFilterResource::new(client))
}

impl DataCellsFilterResource {
    pub fn new(client: Arc<AwsClient>) -> Self {
        Self {
            client,
            propagation_timeout: IAM_PROPAGATION_TIMEOUT,
            backoff: Backoff::default(),
        }
    }

    /// Budget of the retry phase of create, whatever the operator create
    /// timeout says
    pub fn with_propagation_timeout(mut self, timeout: Duration) -> Self {
        self.propagation_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Request object with the provider account filled in as catalog
    fn request(&self, resource: &Resource) -> DataCellsFilter {
        let mut filter = expand_data_cells_filter(resource);
        if filter.table_catalog_id.is_none() {
            filter.table_catalog_id = self.client.account_id().map(str::to_string);
        }
        filter
    }

    /// Create retries through the propagation window; delete retries for
    /// the operator timeout.
    fn budget(&self, op: Operation, timeout: Duration) -> Duration {
        match op {
            Operation::Create => self.propagation_timeout,
            _ => timeout,
        }
    }

    fn retrier(&self, op: Operation, timeout: Duration) -> Retrier {
        Retrier::new(self.budget(op, timeout)).with_backoff(self.backoff)
    }

    pub fn create_input(&self, resource: &Resource) -> CreateDataCellsFilterInput {
        CreateDataCellsFilterInput {
            table_data: self.request(resource),
        }
    }

    async fn create_filter(&self, resource: &Resource, timeout: Duration) -> ProviderResult<State> {
        let input = self.create_input(resource);
        let snapshot = input.canonical().render();
        let api = self.client.lakeformation();

        self.retrier(Operation::Create, timeout)
            .run(|| api.create_data_cells_filter(&input), classify)
            .await
            .map_err(|e| {
                ProviderError::action(
                    Action::Creating,
                    names::LAKE_FORMATION,
                    RES_NAME,
                    &snapshot,
                    e,
                )
            })?;

        let identifier = identifier_for(&snapshot);
        info!("created {} {} ({})", names::LAKE_FORMATION, RES_NAME, identifier);

        self.read_filter(resource, &identifier).await
    }

    async fn read_filter(&self, resource: &Resource, identifier: &str) -> ProviderResult<State> {
        let key = self.request(resource).key();

        let filter = self
            .client
            .lakeformation()
            .get_data_cells_filter(&key)
            .await
            .map_err(|e| {
                ProviderError::action(
                    Action::Reading,
                    names::LAKE_FORMATION,
                    RES_NAME,
                    identifier,
                    e,
                )
            })?;

        Ok(
            State::existing(resource.id.clone(), flatten_data_cells_filter(&filter))
                .with_identifier(identifier),
        )
    }

    async fn delete_filter(
        &self,
        resource: &Resource,
        identifier: &str,
        timeout: Duration,
    ) -> ProviderResult<()> {
        let key = self.request(resource).key();
        let api = self.client.lakeformation();

        self.retrier(Operation::Delete, timeout)
            .run(|| api.delete_data_cells_filter(&key), classify)
            .await
            .map_err(|e| {
                ProviderError::action(
                    Action::Deleting,
                    names::LAKE_FORMATION,
                    RES_NAME,
                    identifier,
                    e,
                )
            })?;

        info!("deleted {} {} ({})", names::LAKE_FORMATION, RES_NAME, identifier);
        Ok(())
    }
}

impl ResourceHandler for DataCellsFilterResource {
    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn timeouts(&self) -> ResourceTimeouts {
        ResourceTimeouts::default()
            .with_create(DEFAULT_TIMEOUT)
            .with_delete(DEFAULT_TIMEOUT)
    }

    fn retry_budget(&self, op: Operation, timeout: Duration) -> Option<Duration> {
        matches!(op, Operation::Create | Operation::Delete).then(|| self.budget(op, timeout))
    }

    fn create<'a>(
        &'a self,
        resource: &'a Resource,
        timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.create_filter(resource, timeout))
    }

    fn read<'a>(
        &'a self,
        resource: &'a Resource,
        identifier: &'a str,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        Box::pin(self.read_filter(resource, identifier))
    }

    fn delete<'a>(
        &'a self,
        resource: &'a Resource,
        identifier: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, ProviderResult<()>> {
        Box::pin(self.delete_filter(resource, identifier, timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        ACCOUNT_ID, FakeLakeFormation, FakeRds, client, conflict, denied, not_yet_authorized,
    };
    use tokio::time::Instant;

    fn block(pairs: &[(&str, Value)]) -> Value {
        Value::List(vec![Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )])
    }

    fn filter_resource(table: &str, extra: &[(&str, Value)]) -> Resource {
        let mut pairs = vec![
            ("database_name", Value::String("sales".to_string())),
            ("table_name", Value::String(table.to_string())),
            ("name", Value::String("eu_only".to_string())),
        ];
        pairs.extend(extra.iter().cloned());
        Resource::new(TYPE_NAME, "eu_orders").with_attribute("data_cells_filter", block(&pairs))
    }

    fn handler(api: Arc<FakeLakeFormation>) -> DataCellsFilterResource {
        DataCellsFilterResource::new(client(api, Arc::new(FakeRds::new())))
    }

    #[test]
    fn expand_omits_absent_and_empty_fields() {
        let resource = filter_resource(
            "orders",
            &[
                ("filter_expression", Value::String(String::new())),
                ("excluded_column_names", Value::List(vec![])),
            ],
        );

        let filter = expand_data_cells_filter(&resource);

        assert_eq!(filter.database_name.as_deref(), Some("sales"));
        assert_eq!(filter.table_name.as_deref(), Some("orders"));
        assert_eq!(filter.name.as_deref(), Some("eu_only"));
        assert_eq!(filter.table_catalog_id, None);
        assert_eq!(filter.row_filter, None);
        assert_eq!(filter.column_wildcard, None);
    }

    #[test]
    fn expand_populates_optional_fields_when_set() {
        let resource = filter_resource(
            "orders",
            &[
                ("filter_expression", Value::String("region = 'eu'".to_string())),
                ("excluded_column_names", Value::string_list(["card_number"])),
            ],
        );

        let filter = expand_data_cells_filter(&resource);

        assert_eq!(
            filter.row_filter,
            Some(RowFilter {
                filter_expression: Some("region = 'eu'".to_string())
            })
        );
        assert_eq!(
            filter.column_wildcard,
            Some(ColumnWildcard {
                excluded_column_names: vec!["card_number".to_string()]
            })
        );
    }

    #[test]
    fn expand_prefers_top_level_catalog_id() {
        let nested = filter_resource(
            "orders",
            &[("catalog_id", Value::String("210987654321".to_string()))],
        );
        assert_eq!(
            expand_data_cells_filter(&nested).table_catalog_id.as_deref(),
            Some("210987654321")
        );

        let both = nested.with_attribute("catalog_id", Value::String(ACCOUNT_ID.to_string()));
        assert_eq!(
            expand_data_cells_filter(&both).table_catalog_id.as_deref(),
            Some(ACCOUNT_ID)
        );
    }

    #[test]
    fn schema_rejects_invalid_records() {
        let schema = schema();
        assert!(schema.is_replace_only());
        assert!(schema.validate(&filter_resource("orders", &[]).attributes).is_ok());

        let two_blocks = Resource::new(TYPE_NAME, "x").with_attribute(
            "data_cells_filter",
            Value::List(vec![
                Value::Map(HashMap::new()),
                Value::Map(HashMap::new()),
            ]),
        );
        assert!(schema.validate(&two_blocks.attributes).is_err());

        let blank_column = filter_resource(
            "orders",
            &[("excluded_column_names", Value::string_list([""]))],
        );
        assert!(schema.validate(&blank_column.attributes).is_err());

        let bad_account = filter_resource("orders", &[])
            .with_attribute("catalog_id", Value::String("12345".to_string()));
        assert!(schema.validate(&bad_account.attributes).is_err());
    }

    #[test]
    fn identifier_is_deterministic_and_distinct() {
        let h = handler(Arc::new(FakeLakeFormation::new()));
        let id = |r: &Resource| identifier_for(&h.create_input(r).canonical().render());

        let a = filter_resource("orders", &[("excluded_column_names", Value::string_list(["a", "b"]))]);
        let reordered =
            filter_resource("orders", &[("excluded_column_names", Value::string_list(["b", "a"]))]);
        let other_table =
            filter_resource("returns", &[("excluded_column_names", Value::string_list(["a", "b"]))]);

        assert_eq!(id(&a), id(&a.clone()));
        assert_eq!(id(&a), id(&reordered));
        assert_ne!(id(&a), id(&other_table));
        assert!(id(&a).chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn account_id_fills_unset_catalog() {
        let client = Arc::new(
            AwsClient::with_apis(
                "us-east-1",
                Arc::new(FakeLakeFormation::new()),
                Arc::new(FakeRds::new()),
            )
            .with_account_id(ACCOUNT_ID),
        );
        let h = DataCellsFilterResource::new(client);

        let input = h.create_input(&filter_resource("orders", &[]));
        assert_eq!(input.table_data.table_catalog_id.as_deref(), Some(ACCOUNT_ID));
    }

    #[tokio::test(start_paused = true)]
    async fn create_retries_conflicts_then_reads() {
        let api = Arc::new(
            FakeLakeFormation::new().fail_create([conflict(), not_yet_authorized(), conflict()]),
        );
        let h = handler(api.clone());
        let resource = filter_resource("orders", &[]);

        let state = h.create(&resource, DEFAULT_TIMEOUT).await.unwrap();

        let expected = identifier_for(&h.create_input(&resource).canonical().render());
        assert_eq!(state.identifier, Some(expected));
        assert!(state.exists);
        assert_eq!(api.create_calls(), 4);
        assert!(api.create_calls() <= Backoff::default().max_attempts_within(IAM_PROPAGATION_TIMEOUT));
        assert_eq!(api.get_calls(), 1);
        assert_eq!(api.requests()[0], api.requests()[3]);
    }

    #[tokio::test(start_paused = true)]
    async fn create_fails_fast_on_fatal_error() {
        let api = Arc::new(FakeLakeFormation::new().fail_create([denied()]));
        let h = handler(api.clone());

        let err = h
            .create(&filter_resource("orders", &[]), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(api.create_calls(), 1);
        assert_eq!(api.get_calls(), 0);
        assert_eq!(err.action, Some(Action::Creating));
        let message = err.to_string();
        assert!(message.starts_with("creating Lake Formation Resource Data Cells Filter ({"));
        assert!(message.contains("TableName: \"orders\""));
        assert!(message.ends_with("Insufficient Lake Formation permission(s) on orders"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_succeeds_on_attempt_after_propagation_window() {
        let window = Duration::from_secs(10);
        let start = Instant::now();
        let api = Arc::new(
            FakeLakeFormation::new().fail_create_until(start + window, not_yet_authorized()),
        );
        let h = handler(api.clone()).with_propagation_timeout(window);

        let state = h
            .create(&filter_resource("orders", &[]), DEFAULT_TIMEOUT)
            .await
            .unwrap();

        assert!(state.identifier.is_some());
        assert!(Instant::now() >= start + window);
        // 0s, 0.5s, 1.5s, 3.5s, 7.5s inside the window, then the final attempt
        assert_eq!(api.create_calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn create_reports_final_attempt_error() {
        let api = Arc::new(
            FakeLakeFormation::new()
                .fail_create_until(Instant::now() + Duration::from_secs(3600), conflict()),
        );
        let h = handler(api.clone()).with_propagation_timeout(Duration::from_secs(2));

        let err = h
            .create(&filter_resource("orders", &[]), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(api.create_calls(), 4);
        assert!(err.to_string().contains("ConcurrentModificationException"));
        assert_eq!(api.filter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn short_create_timeout_keeps_propagation_window() {
        let window = Duration::from_secs(10);
        let start = Instant::now();
        let api = Arc::new(
            FakeLakeFormation::new().fail_create_until(start + window, not_yet_authorized()),
        );
        let h = handler(api.clone()).with_propagation_timeout(window);

        assert_eq!(h.retry_budget(Operation::Create, Duration::from_secs(1)), Some(window));
        assert_eq!(
            h.retry_budget(Operation::Delete, Duration::from_secs(1)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(h.retry_budget(Operation::Read, DEFAULT_TIMEOUT), None);

        let state = h
            .create(&filter_resource("orders", &[]), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(state.identifier.is_some());
        assert_eq!(api.create_calls(), 6);
    }

    #[tokio::test]
    async fn read_error_is_a_reading_failure() {
        let api = Arc::new(
            FakeLakeFormation::new().fail_get(ApiError::new("EntityNotFoundException", "gone")),
        );
        let h = handler(api.clone());

        let err = h
            .read(&filter_resource("orders", &[]), "1234")
            .await
            .unwrap_err();

        assert_eq!(api.get_calls(), 1);
        assert_eq!(
            err.to_string(),
            "reading Lake Formation Resource Data Cells Filter (1234): EntityNotFoundException: gone"
        );
    }

    #[tokio::test]
    async fn read_flattens_remote_filter() {
        let resource = filter_resource(
            "orders",
            &[
                ("catalog_id", Value::String(ACCOUNT_ID.to_string())),
                ("filter_expression", Value::String("true".to_string())),
            ],
        );
        let remote = expand_data_cells_filter(&resource);
        let h = handler(Arc::new(FakeLakeFormation::new().with_filter(remote)));

        let state = h.read(&resource, "1234").await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("1234"));
        assert_eq!(
            state.attributes.get("catalog_id"),
            Some(&Value::String(ACCOUNT_ID.to_string()))
        );
        let block = &state.attributes["data_cells_filter"].as_list().unwrap()[0];
        let block = block.as_map().unwrap();
        assert_eq!(block["filter_expression"], Value::String("true".to_string()));
        assert_eq!(block["table_name"], Value::String("orders".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn delete_retries_then_removes() {
        let resource = filter_resource("orders", &[]);
        let api = Arc::new(
            FakeLakeFormation::new()
                .with_filter(expand_data_cells_filter(&resource))
                .fail_delete([conflict(), conflict()]),
        );
        let h = handler(api.clone());

        h.delete(&resource, "1234", DEFAULT_TIMEOUT).await.unwrap();

        assert_eq!(api.delete_calls(), 3);
        assert_eq!(api.filter_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delete_fatal_error_keeps_filter() {
        let resource = filter_resource("orders", &[]);
        let api = Arc::new(
            FakeLakeFormation::new()
                .with_filter(expand_data_cells_filter(&resource))
                .fail_delete([denied()]),
        );
        let h = handler(api.clone());

        let err = h
            .delete(&resource, "1234", DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        assert_eq!(api.delete_calls(), 1);
        assert_eq!(api.filter_count(), 1);
        assert_eq!(err.action, Some(Action::Deleting));
        assert!(
            err.to_string()
                .starts_with("deleting Lake Formation Resource Data Cells Filter (1234): AccessDeniedException")
        );
    }

    #[test]
    fn classifies_transient_errors() {
        assert_eq!(classify(&conflict()), ErrorClass::Retryable);
        assert_eq!(classify(&not_yet_authorized()), ErrorClass::Retryable);
        assert_eq!(classify(&denied()), ErrorClass::Fatal);
        assert_eq!(
            classify(&ApiError::new("InvalidInputException", "is not authorized")),
            ErrorClass::Fatal
        );
    }
}
