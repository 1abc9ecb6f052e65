use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::schema_cache::{ColumnSchema, SchemaCatalog, SchemaWatch, TableSchema};

const SQL_KEYWORDS: [&str; 32] = [
    "SELECT", "FROM", "WHERE", "GROUP", "BY", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN",
    "LEFT", "RIGHT", "INNER", "OUTER", "ON", "AS", "AND", "OR", "NOT", "NULL", "IN", "IS",
    "DISTINCT", "COUNT", "INSERT", "INTO", "VALUES", "CREATE", "TABLE", "EXPLAIN", "UNION", "WITH",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompletionKind {
    Column,
    Table,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionItem {
    pub label: String,
    pub kind: CompletionKind,
    pub detail: Option<String>,
}

static CREATE_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\bCREATE\s+(?:OR\s+REPLACE\s+)?(?:EXTERNAL\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?([A-Za-z_][\w.]*|`[^`]+`|\x22[^\x22]+\x22)\s*\((.*)\)",
    )
    .expect("CREATE TABLE pattern is valid")
});

static COLUMN_DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]\w*|`[^`]+`|\x22[^\x22]+\x22)\s+([A-Za-z]\w*(?:\s*\([^)]*\))?)")
        .expect("column definition pattern is valid")
});

const CONSTRAINT_PREFIXES: [&str; 6] = [
    "PRIMARY", "FOREIGN", "UNIQUE", "CONSTRAINT", "CHECK", "KEY",
];

fn unquote(identifier: &str) -> String {
    identifier
        .trim_matches(|c| c == '`' || c == '"')
        .to_string()
}

/// Splits a column list on top-level commas, ignoring those inside parens.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (index, character) in body.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Extracts table definitions from `CREATE TABLE` statements in DDL text.
///
/// Statements that do not look like a table definition are skipped.
#[must_use]
pub fn tables_from_ddl(ddl: &str) -> Vec<TableSchema> {
    let mut tables = Vec::new();
    for statement in crate::statements::split_statements(ddl) {
        let Some(captures) = CREATE_TABLE_RE.captures(&statement) else {
            continue;
        };
        let name = unquote(&captures[1]);
        let columns = split_top_level(&captures[2])
            .into_iter()
            .filter_map(|definition| {
                let captures = COLUMN_DEFINITION_RE.captures(definition)?;
                let column = unquote(&captures[1]);
                let is_constraint = CONSTRAINT_PREFIXES
                    .iter()
                    .any(|prefix| column.eq_ignore_ascii_case(prefix));
                (!is_constraint).then(|| ColumnSchema::new(column, captures[2].to_string()))
            })
            .collect();
        tables.push(TableSchema { name, columns });
    }
    tables
}

/// Completion candidates drawn from the live schema and the DDL buffer.
///
/// The provider holds a subscription, so it always sees the latest
/// introspection result without being rebuilt.
#[derive(Debug, Clone)]
pub struct CompletionProvider {
    schema: SchemaWatch,
}

impl CompletionProvider {
    #[must_use]
    pub fn new(schema: SchemaWatch) -> Self {
        Self { schema }
    }

    fn known_tables(&self, ddl: &str) -> BTreeMap<String, Vec<ColumnSchema>> {
        let catalog: std::sync::Arc<SchemaCatalog> = self.schema.borrow().catalog();
        let mut tables = BTreeMap::new();
        for table in tables_from_ddl(ddl) {
            tables.insert(table.name, table.columns);
        }
        for table in &catalog.tables {
            tables.insert(table.name.clone(), table.columns.clone());
        }
        tables
    }

    /// Suggestions for the word being typed.
    ///
    /// `table.prefix` offers that table's columns; anything else offers
    /// tables, columns, then keywords whose names start with the word.
    #[must_use]
    pub fn suggest(&self, word: &str, ddl: &str) -> Vec<CompletionItem> {
        let tables = self.known_tables(ddl);

        if let Some((table_name, column_prefix)) = word.rsplit_once('.') {
            let Some(columns) = tables.get(table_name) else {
                return Vec::new();
            };
            return columns
                .iter()
                .filter(|column| starts_with_ignore_case(&column.name, column_prefix))
                .map(|column| CompletionItem {
                    label: column.name.clone(),
                    kind: CompletionKind::Column,
                    detail: Some(column.data_type.clone()),
                })
                .collect();
        }

        if word.is_empty() {
            return Vec::new();
        }

        let mut items = Vec::new();
        for (table_name, columns) in &tables {
            if starts_with_ignore_case(table_name, word) {
                items.push(CompletionItem {
                    label: table_name.clone(),
                    kind: CompletionKind::Table,
                    detail: Some(format!("{} columns", columns.len())),
                });
            }
        }
        for (table_name, columns) in &tables {
            for column in columns {
                if starts_with_ignore_case(&column.name, word)
                    && !items.iter().any(|item| item.label == column.name)
                {
                    items.push(CompletionItem {
                        label: column.name.clone(),
                        kind: CompletionKind::Column,
                        detail: Some(format!("{table_name}: {}", column.data_type)),
                    });
                }
            }
        }
        for keyword in SQL_KEYWORDS {
            if starts_with_ignore_case(keyword, word) {
                items.push(CompletionItem {
                    label: keyword.to_string(),
                    kind: CompletionKind::Keyword,
                    detail: None,
                });
            }
        }
        items.sort_by(|left, right| left.kind.cmp(&right.kind).then(left.label.cmp(&right.label)));
        items
    }
}

fn starts_with_ignore_case(candidate: &str, prefix: &str) -> bool {
    candidate
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// The identifier (possibly `table.column`) ending at byte offset `cursor`.
#[must_use]
pub fn word_before_cursor(text: &str, cursor: usize) -> &str {
    let head = text.get(..cursor).unwrap_or(text);
    let start = head
        .char_indices()
        .rev()
        .find(|(_, character)| !(character.is_alphanumeric() || matches!(character, '_' | '.')))
        .map_or(0, |(index, character)| index + character.len_utf8());
    &head[start..]
}
