//! Index, constraint and trigger definitions.
//!
//! Each definition carries the name it has (or will have) in the database and
//! the semantic fields that make up its identity. Snapshots key these
//! definitions by [`Constraint::key`], which for everything but triggers is
//! the identity hash, so two snapshots agree on a key exactly when they agree
//! on the definition regardless of naming.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::naming::{
    CHECK_SUFFIX, FOREIGN_KEY_SUFFIX, INDEX_SUFFIX, UNIQUE_SUFFIX, constraint_name,
    identity_hash, primary_key_name, qualified, quote_column_or_expr, quote_ident, quote_list,
};

/// Behaviour shared by every keyed, per-table schema object.
pub trait Constraint: Clone + PartialEq + fmt::Debug {
    /// Entity kind label (`"index"`, `"foreignKey"`, ...).
    const KIND: &'static str;

    /// Name in the database.
    fn name(&self) -> &str;

    /// Replace the name.
    fn set_name(&mut self, name: String);

    /// Columns of the owning table the object covers.
    fn columns(&self) -> &[String];

    /// Hash over the semantic identity.
    fn identity_hash(&self) -> String;

    /// Name the engine would give this object on `table`.
    fn canonical_name(&self, table: &str) -> String;

    /// Rewrite owning-table column references.
    fn map_columns(&mut self, f: &dyn Fn(&str) -> String);

    /// Rewrite references to other tables.
    fn map_tables(&mut self, _f: &dyn Fn(&str) -> String) {}

    /// Key under which snapshots store the object.
    fn key(&self) -> String {
        self.identity_hash()
    }

    /// Whether both definitions are equal once names are ignored.
    fn same_definition(&self, other: &Self) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.set_name(String::new());
        b.set_name(String::new());
        a == b
    }

    /// Copy with the canonical name for `table`.
    fn with_canonical_name(&self, table: &str) -> Self {
        let mut named = self.clone();
        named.set_name(self.canonical_name(table));
        named
    }
}

/// A (possibly unique) index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    /// Index name.
    #[serde(default)]
    pub name: String,
    /// Indexed columns or expressions, in order.
    pub columns: Vec<String>,
    /// `CREATE UNIQUE INDEX`.
    #[serde(default)]
    pub unique: bool,
    /// Access method, `btree` when absent.
    #[serde(default)]
    pub method: Option<String>,
    /// Partial index predicate.
    #[serde(default)]
    pub predicate: Option<String>,
    /// `NULLS NOT DISTINCT`.
    #[serde(default)]
    pub nulls_not_distinct: bool,
}

impl IndexDefinition {
    /// Plain btree index over `columns`.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            method: None,
            predicate: None,
            nulls_not_distinct: false,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Use a specific access method.
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Restrict the index to rows matching `predicate`.
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// `CREATE INDEX` statement.
    pub fn create_sql(&self, schema: &str, table: &str, concurrently: bool) -> String {
        let mut sql = String::from("CREATE ");
        if self.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if concurrently {
            sql.push_str("CONCURRENTLY ");
        }
        sql.push_str(&quote_ident(&self.name));
        sql.push_str(" ON ");
        sql.push_str(&qualified(schema, table));
        if let Some(method) = &self.method {
            sql.push_str(&format!(" USING {}", method));
        }
        let elements: Vec<String> = self.columns.iter().map(|c| quote_column_or_expr(c)).collect();
        sql.push_str(&format!(" ({})", elements.join(", ")));
        if self.nulls_not_distinct {
            sql.push_str(" NULLS NOT DISTINCT");
        }
        if let Some(predicate) = &self.predicate {
            sql.push_str(&format!(" WHERE {}", predicate));
        }
        sql
    }

    /// `DROP INDEX` statement.
    pub fn drop_sql(schema: &str, name: &str, concurrently: bool) -> String {
        if concurrently {
            format!("DROP INDEX CONCURRENTLY IF EXISTS {}", qualified(schema, name))
        } else {
            format!("DROP INDEX IF EXISTS {}", qualified(schema, name))
        }
    }

    /// `ALTER INDEX ... RENAME TO` statement.
    pub fn rename_sql(schema: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER INDEX {} RENAME TO {}",
            qualified(schema, from),
            quote_ident(to)
        )
    }
}

impl Constraint for IndexDefinition {
    const KIND: &'static str = "index";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn identity_hash(&self) -> String {
        let mut parts = vec![
            Self::KIND.to_string(),
            self.unique.to_string(),
            self.method.clone().unwrap_or_else(|| "btree".to_string()),
            self.nulls_not_distinct.to_string(),
            self.predicate.clone().unwrap_or_default(),
        ];
        parts.extend(self.columns.iter().cloned());
        identity_hash(parts)
    }

    fn canonical_name(&self, table: &str) -> String {
        constraint_name(table, &self.identity_hash(), INDEX_SUFFIX)
    }

    fn map_columns(&mut self, f: &dyn Fn(&str) -> String) {
        self.columns = self.columns.iter().map(|c| f(c)).collect();
        self.predicate = self.predicate.as_deref().map(|p| rewrite_identifiers(p, f));
    }
}

/// A unique constraint backed by a unique index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueDefinition {
    /// Constraint name.
    #[serde(default)]
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// `NULLS DISTINCT` (the Postgres default) vs `NULLS NOT DISTINCT`.
    #[serde(default = "default_true")]
    pub nulls_distinct: bool,
}

fn default_true() -> bool {
    true
}

impl UniqueDefinition {
    /// Unique constraint over `columns` with distinct nulls.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            nulls_distinct: true,
        }
    }

    /// Treat NULLs as equal.
    pub fn nulls_not_distinct(mut self) -> Self {
        self.nulls_distinct = false;
        self
    }

    /// Name of the index built ahead of attaching the constraint.
    pub fn index_name(&self) -> String {
        format!("{}_idx", self.name)
    }

    /// Constraint body, e.g. `UNIQUE NULLS NOT DISTINCT ("a", "b")`.
    pub fn constraint_sql(&self) -> String {
        let nulls = if self.nulls_distinct { "" } else { " NULLS NOT DISTINCT" };
        format!("UNIQUE{} ({})", nulls, quote_list(&self.columns))
    }

    /// The unique index that backs this constraint.
    pub fn backing_index(&self) -> IndexDefinition {
        IndexDefinition {
            name: self.index_name(),
            columns: self.columns.clone(),
            unique: true,
            method: None,
            predicate: None,
            nulls_not_distinct: !self.nulls_distinct,
        }
    }
}

impl Constraint for UniqueDefinition {
    const KIND: &'static str = "unique";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn identity_hash(&self) -> String {
        let mut columns = self.columns.clone();
        columns.sort();
        let mut parts = vec![Self::KIND.to_string(), self.nulls_distinct.to_string()];
        parts.extend(columns);
        identity_hash(parts)
    }

    fn canonical_name(&self, table: &str) -> String {
        constraint_name(table, &self.identity_hash(), UNIQUE_SUFFIX)
    }

    fn map_columns(&mut self, f: &dyn Fn(&str) -> String) {
        self.columns = self.columns.iter().map(|c| f(c)).collect();
    }
}

/// A table's primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDefinition {
    /// Constraint name.
    #[serde(default)]
    pub name: String,
    /// Key columns.
    pub columns: Vec<String>,
}

impl PrimaryKeyDefinition {
    /// Primary key over `columns`.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Constraint body, e.g. `PRIMARY KEY ("id")`.
    pub fn constraint_sql(&self) -> String {
        format!("PRIMARY KEY ({})", quote_list(&self.columns))
    }
}

impl Constraint for PrimaryKeyDefinition {
    const KIND: &'static str = "primaryKey";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn identity_hash(&self) -> String {
        let mut columns = self.columns.clone();
        columns.sort();
        let mut parts = vec![Self::KIND.to_string()];
        parts.extend(columns);
        identity_hash(parts)
    }

    fn canonical_name(&self, table: &str) -> String {
        primary_key_name(table)
    }

    fn map_columns(&mut self, f: &dyn Fn(&str) -> String) {
        self.columns = self.columns.iter().map(|c| f(c)).collect();
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForeignKeyAction {
    /// `NO ACTION`.
    #[default]
    NoAction,
    /// `RESTRICT`.
    Restrict,
    /// `CASCADE`.
    Cascade,
    /// `SET NULL`.
    SetNull,
    /// `SET DEFAULT`.
    SetDefault,
}

impl ForeignKeyAction {
    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDefinition {
    /// Constraint name.
    #[serde(default)]
    pub name: String,
    /// Referencing columns of the owning table.
    pub columns: Vec<String>,
    /// Referenced table (same schema).
    pub target_table: String,
    /// Referenced columns, paired with `columns`.
    pub target_columns: Vec<String>,
    /// `ON DELETE` action.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// `ON UPDATE` action.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKeyDefinition {
    /// Foreign key from `columns` to `target_table(target_columns)`.
    pub fn new<I, S, J, T>(columns: I, target_table: impl Into<String>, target_columns: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            target_table: target_table.into(),
            target_columns: target_columns.into_iter().map(Into::into).collect(),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Set the `ON DELETE` action.
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the `ON UPDATE` action.
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    /// Constraint body referencing `schema`.
    pub fn constraint_sql(&self, schema: &str) -> String {
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_list(&self.columns),
            qualified(schema, &self.target_table),
            quote_list(&self.target_columns),
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        )
    }

    /// Rewrite referenced column names.
    pub fn map_target_columns(&mut self, f: &dyn Fn(&str) -> String) {
        self.target_columns = self.target_columns.iter().map(|c| f(c)).collect();
    }
}

impl Constraint for ForeignKeyDefinition {
    const KIND: &'static str = "foreignKey";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn identity_hash(&self) -> String {
        identity_hash([
            Self::KIND.to_string(),
            self.columns.join(","),
            self.target_table.clone(),
            self.target_columns.join(","),
            self.on_delete.as_sql().to_string(),
            self.on_update.as_sql().to_string(),
        ])
    }

    fn canonical_name(&self, table: &str) -> String {
        constraint_name(table, &self.identity_hash(), FOREIGN_KEY_SUFFIX)
    }

    fn map_columns(&mut self, f: &dyn Fn(&str) -> String) {
        self.columns = self.columns.iter().map(|c| f(c)).collect();
    }

    fn map_tables(&mut self, f: &dyn Fn(&str) -> String) {
        self.target_table = f(&self.target_table);
    }
}

/// A check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// Constraint name.
    #[serde(default)]
    pub name: String,
    /// Boolean SQL expression.
    pub expression: String,
    /// Columns mentioned by the expression.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl CheckDefinition {
    /// Check constraint over `expression`.
    pub fn new(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        Self {
            name: String::new(),
            columns: referenced_identifiers(&expression),
            expression,
        }
    }

    /// Constraint body, e.g. `CHECK (price > 0)`.
    pub fn constraint_sql(&self) -> String {
        format!("CHECK ({})", self.expression)
    }

    fn normalized_expression(&self) -> String {
        self.expression.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Constraint for CheckDefinition {
    const KIND: &'static str = "check";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn identity_hash(&self) -> String {
        identity_hash([Self::KIND.to_string(), self.normalized_expression()])
    }

    fn canonical_name(&self, table: &str) -> String {
        constraint_name(table, &self.identity_hash(), CHECK_SUFFIX)
    }

    fn map_columns(&mut self, f: &dyn Fn(&str) -> String) {
        self.expression = rewrite_identifiers(&self.expression, f);
        self.columns = self.columns.iter().map(|c| f(c)).collect();
    }
}

/// A row or statement trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinition {
    /// Trigger name.
    pub name: String,
    /// `BEFORE`, `AFTER` or `INSTEAD OF`.
    pub timing: String,
    /// Events such as `INSERT`, `UPDATE`.
    pub events: Vec<String>,
    /// Columns of `UPDATE OF`.
    #[serde(default)]
    pub columns: Vec<String>,
    /// `ROW` or `STATEMENT`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Function call, e.g. `moddatetime(updated_at)`.
    pub function: String,
    /// `WHEN` condition.
    #[serde(default)]
    pub condition: Option<String>,
}

fn default_level() -> String {
    "ROW".to_string()
}

impl TriggerDefinition {
    /// Row-level trigger.
    pub fn new<I, S>(
        name: impl Into<String>,
        timing: impl Into<String>,
        events: I,
        function: impl Into<String>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            timing: timing.into(),
            events: events.into_iter().map(Into::into).collect(),
            columns: Vec::new(),
            level: default_level(),
            function: function.into(),
            condition: None,
        }
    }

    /// `CREATE TRIGGER` statement.
    pub fn create_sql(&self, schema: &str, table: &str) -> String {
        let events: Vec<String> = self
            .events
            .iter()
            .map(|event| {
                if event.eq_ignore_ascii_case("UPDATE") && !self.columns.is_empty() {
                    format!("UPDATE OF {}", quote_list(&self.columns))
                } else {
                    event.to_uppercase()
                }
            })
            .collect();
        let mut sql = format!(
            "CREATE OR REPLACE TRIGGER {} {} {} ON {} FOR EACH {}",
            quote_ident(&self.name),
            self.timing,
            events.join(" OR "),
            qualified(schema, table),
            self.level
        );
        if let Some(condition) = &self.condition {
            sql.push_str(&format!(" WHEN ({})", condition));
        }
        sql.push_str(&format!(" EXECUTE FUNCTION {}", self.function));
        sql
    }

    /// `DROP TRIGGER` statement.
    pub fn drop_sql(&self, schema: &str, table: &str) -> String {
        format!(
            "DROP TRIGGER IF EXISTS {} ON {}",
            quote_ident(&self.name),
            qualified(schema, table)
        )
    }
}

impl Constraint for TriggerDefinition {
    const KIND: &'static str = "trigger";

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn identity_hash(&self) -> String {
        let mut parts = vec![
            Self::KIND.to_string(),
            self.timing.clone(),
            self.events.join(","),
            self.level.clone(),
            self.function.clone(),
            self.condition.clone().unwrap_or_default(),
        ];
        parts.extend(self.columns.iter().cloned());
        identity_hash(parts)
    }

    fn canonical_name(&self, _table: &str) -> String {
        self.name.clone()
    }

    fn map_columns(&mut self, f: &dyn Fn(&str) -> String) {
        self.columns = self.columns.iter().map(|c| f(c)).collect();
        self.condition = self.condition.as_deref().map(|c| rewrite_identifiers(c, f));
    }

    // Triggers carry user-chosen names and are matched by them.
    fn key(&self) -> String {
        self.name.clone()
    }
}

static TOKEN_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"((?:[^"]|"")+)"|([A-Za-z_][A-Za-z0-9_$]*)"#).ok()
});

/// Rewrite identifiers in a SQL expression, leaving string literals alone.
pub fn rewrite_identifiers(expression: &str, f: &dyn Fn(&str) -> String) -> String {
    let Some(pattern) = TOKEN_PATTERN.as_ref() else {
        return expression.to_string();
    };
    pattern
        .replace_all(expression, |caps: &Captures<'_>| {
            if is_cast_target(expression, caps.get(0).map_or(0, |m| m.start())) {
                caps[0].to_string()
            } else if let Some(quoted) = caps.get(1) {
                quote_ident(&f(&quoted.as_str().replace("\"\"", "\"")))
            } else if let Some(bare) = caps.get(2) {
                f(bare.as_str())
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

const SQL_WORDS: &[&str] = &[
    "and", "or", "not", "is", "null", "true", "false", "in", "like", "ilike", "between", "any",
    "all", "case", "when", "then", "else", "end", "cast", "as", "similar", "to", "escape",
];

/// Whether the token at `start` is the type of a `::` cast.
fn is_cast_target(expression: &str, start: usize) -> bool {
    expression[..start].trim_end().ends_with("::")
}

fn referenced_identifiers(expression: &str) -> Vec<String> {
    let mut found = Vec::new();
    let Some(pattern) = TOKEN_PATTERN.as_ref() else {
        return found;
    };
    for caps in pattern.captures_iter(expression) {
        if caps.get(0).is_some_and(|m| is_cast_target(expression, m.start())) {
            continue;
        }
        let ident = match (caps.get(1), caps.get(2)) {
            (Some(quoted), _) => quoted.as_str().replace("\"\"", "\""),
            (None, Some(bare)) => {
                let word = bare.as_str();
                // Skip keywords and function names.
                let next = expression[bare.end()..].trim_start();
                if SQL_WORDS.contains(&word.to_ascii_lowercase().as_str()) || next.starts_with('(')
                {
                    continue;
                }
                word.to_string()
            }
            _ => continue,
        };
        if !found.contains(&ident) {
            found.push(ident);
        }
    }
    found
}
