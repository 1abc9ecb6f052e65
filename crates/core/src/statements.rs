use serde::{Deserialize, Serialize};

pub const STATEMENT_DELIMITER: char = ';';

/// Splits raw editor text into the statements sent to the server.
///
/// Fragments are trimmed and empty ones dropped; order and duplicates are kept.
#[must_use]
pub fn split_statements(text: &str) -> Vec<String> {
    text.split(STATEMENT_DELIMITER)
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct QueryRequest {
    pub stmts: Vec<String>,
    #[serde(default)]
    pub distributed: bool,
}

impl QueryRequest {
    #[must_use]
    pub fn new(stmts: Vec<String>) -> Self {
        Self {
            stmts,
            distributed: false,
        }
    }

    /// Builds a request from several editor buffers, in order.
    #[must_use]
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(sources.into_iter().flat_map(split_statements).collect())
    }

    #[must_use]
    pub fn with_distributed(mut self, distributed: bool) -> Self {
        self.distributed = distributed;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}
