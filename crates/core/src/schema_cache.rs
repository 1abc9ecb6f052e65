use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::query_runner::{QueryBackend, QueryBackendError};
use crate::statements::QueryRequest;

pub const INTROSPECTION_SQL: &str =
    "SELECT table_name, column_name, data_type FROM information_schema.columns";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
}

impl ColumnSchema {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaCatalog {
    pub tables: Vec<TableSchema>,
}

impl SchemaCatalog {
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|table| table.name == name)
    }

    #[must_use]
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.name.clone()).collect()
    }

    #[must_use]
    pub fn list_columns(&self, table_name: &str) -> Vec<ColumnSchema> {
        self.table(table_name)
            .map(|table| table.columns.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaDirectoryError {
    #[error("introspection query failed: {0}")]
    Backend(#[source] QueryBackendError),
    #[error("invalid return from information_schema.columns: row {row} has {width} cells")]
    MalformedRow { row: usize, width: usize },
}

/// Folds `(table, column, type)` rows into a catalog sorted by table name.
///
/// Columns keep arrival order. A single row of the wrong width rejects the
/// whole result.
pub fn parse_catalog_rows(rows: &[Vec<String>]) -> Result<SchemaCatalog, SchemaDirectoryError> {
    let mut tables: Vec<TableSchema> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (index, row) in rows.iter().enumerate() {
        let [table_name, column_name, data_type] = row.as_slice() else {
            return Err(SchemaDirectoryError::MalformedRow {
                row: index,
                width: row.len(),
            });
        };

        let position = *positions.entry(table_name.as_str()).or_insert_with(|| {
            tables.push(TableSchema {
                name: table_name.clone(),
                columns: Vec::new(),
            });
            tables.len() - 1
        });
        tables[position]
            .columns
            .push(ColumnSchema::new(column_name.clone(), data_type.clone()));
    }

    tables.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(SchemaCatalog { tables })
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaState {
    #[default]
    Loading,
    Error {
        message: String,
    },
    Loaded(Arc<SchemaCatalog>),
}

impl SchemaState {
    /// The loaded catalog, or an empty one while loading or after a failure.
    #[must_use]
    pub fn catalog(&self) -> Arc<SchemaCatalog> {
        match self {
            Self::Loaded(catalog) => Arc::clone(catalog),
            Self::Loading | Self::Error { .. } => Arc::new(SchemaCatalog::default()),
        }
    }
}

pub type SchemaWatch = watch::Receiver<SchemaState>;

#[derive(Debug)]
pub struct SchemaDirectory<B: QueryBackend> {
    backend: B,
    state: watch::Sender<SchemaState>,
}

impl<B: QueryBackend> SchemaDirectory<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        let (state, _) = watch::channel(SchemaState::Loading);
        Self { backend, state }
    }

    #[must_use]
    pub fn state(&self) -> SchemaState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> SchemaWatch {
        self.state.subscribe()
    }

    pub async fn refresh(&self) -> SchemaState {
        let next = match self.fetch_catalog().await {
            Ok(catalog) => {
                info!(tables = catalog.tables.len(), "schema loaded");
                SchemaState::Loaded(Arc::new(catalog))
            }
            Err(error) => {
                warn!(%error, "schema introspection failed");
                SchemaState::Error {
                    message: error.to_string(),
                }
            }
        };
        self.state.send_replace(next.clone());
        next
    }

    async fn fetch_catalog(&self) -> Result<SchemaCatalog, SchemaDirectoryError> {
        let request = QueryRequest::new(vec![INTROSPECTION_SQL.to_string()]);
        let response = self
            .backend
            .execute(&request)
            .await
            .map_err(SchemaDirectoryError::Backend)?;
        parse_catalog_rows(&response.rows)
    }
}
