//! Table model.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::column::ColumnInfo;
use crate::naming::{qualified, quote_ident};

/// A table and its columns, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name as it exists in the database.
    pub name: String,
    /// Columns keyed by their current name.
    #[serde(default)]
    pub columns: IndexMap<String, ColumnInfo>,
}

impl TableInfo {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
        }
    }

    /// Add a column keyed by its name.
    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.insert(column.column_name.clone(), column);
        self
    }

    /// Look up a column by its current name.
    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    /// `CREATE TABLE` statement for this table.
    pub fn create_sql(&self, schema: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .values()
            .map(ColumnInfo::definition_sql)
            .collect();
        if columns.is_empty() {
            return format!("CREATE TABLE {} ()", qualified(schema, &self.name));
        }
        format!(
            "CREATE TABLE {} ({})",
            qualified(schema, &self.name),
            columns.join(", ")
        )
    }

    /// `DROP TABLE` statement for this table.
    pub fn drop_sql(&self, schema: &str) -> String {
        format!("DROP TABLE {}", qualified(schema, &self.name))
    }

    /// `ALTER TABLE ... RENAME TO` statement.
    pub fn rename_sql(schema: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            qualified(schema, from),
            quote_ident(to)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_create_sql_keeps_declaration_order() {
        let table = TableInfo::new("users")
            .column(ColumnInfo::new("id", "serial").not_null())
            .column(ColumnInfo::new("email", "text").not_null())
            .column(ColumnInfo::new("bio", "text"));

        assert_eq!(
            table.create_sql("public"),
            "CREATE TABLE \"public\".\"users\" (\"id\" serial NOT NULL, \"email\" text NOT NULL, \"bio\" text)"
        );
    }

    #[test]
    fn test_rename_sql() {
        assert_eq!(
            TableInfo::rename_sql("public", "books", "user_books"),
            "ALTER TABLE \"public\".\"books\" RENAME TO \"user_books\""
        );
    }

    #[test]
    fn test_column_order_does_not_affect_equality() {
        let a = TableInfo::new("t")
            .column(ColumnInfo::new("a", "text"))
            .column(ColumnInfo::new("b", "text"));
        let b = TableInfo::new("t")
            .column(ColumnInfo::new("b", "text"))
            .column(ColumnInfo::new("a", "text"));
        assert_eq!(a, b);
    }
}
