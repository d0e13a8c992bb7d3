//! Lake Formation API seam
//!
//! Handlers talk to `LakeFormationApi`; `SdkLakeFormation` implements it
//! over `aws-sdk-lakeformation`, tests substitute in-memory fakes.

use async_trait::async_trait;
use aws_sdk_lakeformation::Client;
use aws_sdk_lakeformation::types;
use quarry_core::hashcode::CanonicalNode;

use crate::awserr::ApiError;

/// Row filter of a data cells filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub filter_expression: Option<String>,
}

/// Columns excluded from a wildcard projection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnWildcard {
    pub excluded_column_names: Vec<String>,
}

/// Data cells filter as exchanged with the service.
/// Unset fields are left for the service to default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataCellsFilter {
    pub table_catalog_id: Option<String>,
    pub database_name: Option<String>,
    pub table_name: Option<String>,
    pub name: Option<String>,
    pub row_filter: Option<RowFilter>,
    pub column_wildcard: Option<ColumnWildcard>,
}

impl DataCellsFilter {
    /// Lookup key for get and delete
    pub fn key(&self) -> DataCellsFilterKey {
        DataCellsFilterKey {
            table_catalog_id: self.table_catalog_id.clone(),
            database_name: self.database_name.clone(),
            table_name: self.table_name.clone(),
            name: self.name.clone(),
        }
    }

    /// Fields in alphabetical order, unset fields omitted
    pub fn canonical(&self) -> CanonicalNode {
        CanonicalNode::fields()
            .field(
                "ColumnWildcard",
                self.column_wildcard.as_ref().map(|w| {
                    CanonicalNode::fields()
                        .field(
                            "ExcludedColumnNames",
                            Some(CanonicalNode::List(
                                w.excluded_column_names
                                    .iter()
                                    .map(CanonicalNode::string)
                                    .collect(),
                            )),
                        )
                        .build()
                }),
            )
            .string("DatabaseName", self.database_name.as_deref())
            .string("Name", self.name.as_deref())
            .field(
                "RowFilter",
                self.row_filter.as_ref().map(|f| {
                    CanonicalNode::fields()
                        .string("FilterExpression", f.filter_expression.as_deref())
                        .build()
                }),
            )
            .string("TableCatalogId", self.table_catalog_id.as_deref())
            .string("TableName", self.table_name.as_deref())
            .build()
    }
}

/// Key of an existing filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataCellsFilterKey {
    pub table_catalog_id: Option<String>,
    pub database_name: Option<String>,
    pub table_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateDataCellsFilterInput {
    pub table_data: DataCellsFilter,
}

impl CreateDataCellsFilterInput {
    pub fn canonical(&self) -> CanonicalNode {
        CanonicalNode::fields()
            .field("TableData", Some(self.table_data.canonical()))
            .build()
    }
}

#[async_trait]
pub trait LakeFormationApi: Send + Sync {
    async fn create_data_cells_filter(
        &self,
        input: &CreateDataCellsFilterInput,
    ) -> Result<(), ApiError>;

    async fn get_data_cells_filter(
        &self,
        key: &DataCellsFilterKey,
    ) -> Result<DataCellsFilter, ApiError>;

    async fn delete_data_cells_filter(&self, key: &DataCellsFilterKey) -> Result<(), ApiError>;
}

/// `LakeFormationApi` over the AWS SDK client
pub struct SdkLakeFormation {
    client: Client,
}

impl SdkLakeFormation {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LakeFormationApi for SdkLakeFormation {
    async fn create_data_cells_filter(
        &self,
        input: &CreateDataCellsFilterInput,
    ) -> Result<(), ApiError> {
        let table_data = to_sdk(&input.table_data)?;
        self.client
            .create_data_cells_filter()
            .table_data(table_data)
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }

    async fn get_data_cells_filter(
        &self,
        key: &DataCellsFilterKey,
    ) -> Result<DataCellsFilter, ApiError> {
        let output = self
            .client
            .get_data_cells_filter()
            .set_table_catalog_id(key.table_catalog_id.clone())
            .set_database_name(key.database_name.clone())
            .set_table_name(key.table_name.clone())
            .set_name(key.name.clone())
            .send()
            .await
            .map_err(ApiError::from_sdk)?;

        output
            .data_cells_filter()
            .map(from_sdk)
            .ok_or_else(|| ApiError::new("EntityNotFoundException", "empty GetDataCellsFilter result"))
    }

    async fn delete_data_cells_filter(&self, key: &DataCellsFilterKey) -> Result<(), ApiError> {
        self.client
            .delete_data_cells_filter()
            .set_table_catalog_id(key.table_catalog_id.clone())
            .set_database_name(key.database_name.clone())
            .set_table_name(key.table_name.clone())
            .set_name(key.name.clone())
            .send()
            .await
            .map_err(ApiError::from_sdk)?;
        Ok(())
    }
}

fn to_sdk(filter: &DataCellsFilter) -> Result<types::DataCellsFilter, ApiError> {
    let mut builder = types::DataCellsFilter::builder()
        .set_table_catalog_id(filter.table_catalog_id.clone())
        .set_database_name(filter.database_name.clone())
        .set_table_name(filter.table_name.clone())
        .set_name(filter.name.clone());

    if let Some(row_filter) = &filter.row_filter {
        builder = builder.row_filter(
            types::RowFilter::builder()
                .set_filter_expression(row_filter.filter_expression.clone())
                .build(),
        );
    }

    if let Some(wildcard) = &filter.column_wildcard {
        builder = builder.column_wildcard(
            types::ColumnWildcard::builder()
                .set_excluded_column_names(Some(wildcard.excluded_column_names.clone()))
                .build(),
        );
    }

    builder.build().map_err(|e| ApiError::local(e.to_string()))
}

fn from_sdk(filter: &types::DataCellsFilter) -> DataCellsFilter {
    DataCellsFilter {
        table_catalog_id: Some(filter.table_catalog_id().to_string()),
        database_name: Some(filter.database_name().to_string()),
        table_name: Some(filter.table_name().to_string()),
        name: Some(filter.name().to_string()),
        row_filter: filter.row_filter().map(|f| RowFilter {
            filter_expression: f.filter_expression().map(str::to_string),
        }),
        column_wildcard: filter.column_wildcard().map(|w| ColumnWildcard {
            excluded_column_names: w.excluded_column_names().to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_lists_set_fields_alphabetically() {
        let input = CreateDataCellsFilterInput {
            table_data: DataCellsFilter {
                table_catalog_id: Some("123456789012".to_string()),
                database_name: Some("sales".to_string()),
                table_name: Some("orders".to_string()),
                name: Some("eu_only".to_string()),
                row_filter: Some(RowFilter {
                    filter_expression: Some("region = 'eu'".to_string()),
                }),
                column_wildcard: Some(ColumnWildcard {
                    excluded_column_names: vec!["card_number".to_string()],
                }),
            },
        };

        let expected = concat!(
            "{\n",
            "  TableData: {\n",
            "    ColumnWildcard: {\n",
            "      ExcludedColumnNames: [\"card_number\"]\n",
            "    },\n",
            "    DatabaseName: \"sales\",\n",
            "    Name: \"eu_only\",\n",
            "    RowFilter: {\n",
            "      FilterExpression: \"region = 'eu'\"\n",
            "    },\n",
            "    TableCatalogId: \"123456789012\",\n",
            "    TableName: \"orders\"\n",
            "  }\n",
            "}"
        );
        assert_eq!(input.canonical().render(), expected);
    }

    #[test]
    fn key_copies_lookup_fields() {
        let filter = DataCellsFilter {
            database_name: Some("db".to_string()),
            table_name: Some("t".to_string()),
            name: Some("f".to_string()),
            row_filter: Some(RowFilter {
                filter_expression: Some("true".to_string()),
            }),
            ..Default::default()
        };

        assert_eq!(
            filter.key(),
            DataCellsFilterKey {
                table_catalog_id: None,
                database_name: Some("db".to_string()),
                table_name: Some("t".to_string()),
                name: Some("f".to_string()),
            }
        );
    }
}
