//! Rename resolution.
//!
//! Rename intents are recorded one hop at a time (`a -> b`, later `b -> c`).
//! The resolver folds every chain into a single `from -> to` pair per entity,
//! checks each pair against both snapshots and exposes name lookups in both
//! directions.
//!
//! Table renames are resolved before column renames. A column intent recorded
//! against an old table name is re-keyed to the table's current name first.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_schema::{NamingPolicy, SchemaSnapshot};
use tracing::{debug, info};

use crate::error::{MigrateResult, MigrationError};

/// What an intent renames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RenameKind {
    /// A table.
    #[serde(rename = "tableRename")]
    Table,
    /// A column of one table.
    #[serde(rename = "columnRename")]
    Column,
}

impl RenameKind {
    /// Short label used in file names and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Column => "column",
        }
    }
}

/// A declared rename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenameIntent {
    /// Schema of the table.
    pub schema: String,
    /// Owning table of a column rename; equals `from` for table renames.
    pub table: String,
    /// Previous name.
    pub from: String,
    /// New name.
    pub to: String,
    /// Table or column.
    pub kind: RenameKind,
}

impl RenameIntent {
    /// Rename table `from` to `to`.
    pub fn table(schema: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        Self {
            schema: schema.into(),
            table: from.clone(),
            from,
            to: to.into(),
            kind: RenameKind::Table,
        }
    }

    /// Rename column `from` of `table` to `to`.
    pub fn column(
        schema: impl Into<String>,
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            from: from.into(),
            to: to.into(),
            kind: RenameKind::Column,
        }
    }

    /// Apply a naming policy to every identifier.
    pub fn with_policy(&self, policy: NamingPolicy) -> Self {
        Self {
            schema: self.schema.clone(),
            table: policy.apply(&self.table),
            from: policy.apply(&self.from),
            to: policy.apply(&self.to),
            kind: self.kind,
        }
    }
}

/// A rename chain collapsed to its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenamePair {
    /// Name in the live database.
    pub from: String,
    /// Name in the desired schema.
    pub to: String,
}

impl RenamePair {
    /// Create a pair.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Why a pair was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleReason {
    /// `from` does not exist in the actual snapshot.
    MissingSource,
    /// `to` does not exist in the desired snapshot.
    MissingTarget,
    /// `from` and `to` are equal.
    NoOp,
    /// Another pair with the same `from` or `to` won.
    Ambiguous,
}

/// A discarded rename pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleRename {
    /// `schema` or `schema.table`.
    pub scope: String,
    /// The discarded pair.
    pub pair: RenamePair,
    /// Why it was discarded.
    pub reason: StaleReason,
}

/// Rename pairs per scope, validated against both snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRenames {
    tables: BTreeMap<String, Vec<RenamePair>>,
    columns: BTreeMap<String, Vec<RenamePair>>,
    stale: Vec<StaleRename>,
    /// Every name on a kept table chain, mapped to the chain's current name.
    #[serde(default)]
    table_aliases: BTreeMap<String, BTreeMap<String, String>>,
}

fn column_scope(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

impl ResolvedRenames {
    /// No renames at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether no rename applies.
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(Vec::is_empty) && self.columns.values().all(Vec::is_empty)
    }

    /// Table renames in `schema`.
    pub fn table_renames(&self, schema: &str) -> &[RenamePair] {
        self.tables.get(schema).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Column renames of `table` (current name) in `schema`.
    pub fn column_renames(&self, schema: &str, table: &str) -> &[RenamePair] {
        self.columns
            .get(&column_scope(schema, table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pairs discarded while resolving.
    pub fn stale(&self) -> &[StaleRename] {
        &self.stale
    }

    /// Current name of a table known by `name` in the database.
    pub fn current_table_name(&self, schema: &str, name: &str) -> String {
        self.table_renames(schema)
            .iter()
            .find(|p| p.from == name)
            .map_or_else(|| name.to_string(), |p| p.to.clone())
    }

    /// Current name of a table known by any name of its rename chain,
    /// including intermediate names that never existed in the database.
    pub fn chained_table_name(&self, schema: &str, name: &str) -> String {
        self.table_aliases
            .get(schema)
            .and_then(|aliases| aliases.get(name))
            .cloned()
            .unwrap_or_else(|| self.current_table_name(schema, name))
    }

    /// Database name of a table currently called `name`.
    pub fn previous_table_name(&self, schema: &str, name: &str) -> String {
        self.table_renames(schema)
            .iter()
            .find(|p| p.to == name)
            .map_or_else(|| name.to_string(), |p| p.from.clone())
    }

    /// Current name of column `name` of `table` (current table name).
    pub fn current_column_name(&self, schema: &str, table: &str, name: &str) -> String {
        self.column_renames(schema, table)
            .iter()
            .find(|p| p.from == name)
            .map_or_else(|| name.to_string(), |p| p.to.clone())
    }

    /// Database name of column `name` of `table` (current table name).
    pub fn previous_column_name(&self, schema: &str, table: &str, name: &str) -> String {
        self.column_renames(schema, table)
            .iter()
            .find(|p| p.to == name)
            .map_or_else(|| name.to_string(), |p| p.from.clone())
    }

    /// Whether `table` (current name) was renamed.
    pub fn is_table_renamed(&self, schema: &str, table: &str) -> bool {
        self.table_renames(schema).iter().any(|p| p.to == table)
    }
}

/// Folds rename intents into [`ResolvedRenames`].
#[derive(Debug, Clone, Copy)]
pub struct RenameResolver<'a> {
    desired: &'a SchemaSnapshot,
    actual: &'a SchemaSnapshot,
}

impl<'a> RenameResolver<'a> {
    /// Resolver validating against `desired` and `actual`.
    pub fn new(desired: &'a SchemaSnapshot, actual: &'a SchemaSnapshot) -> Self {
        Self { desired, actual }
    }

    /// Resolve `intents`.
    ///
    /// Fails with [`MigrationError::RenameCycle`] when any scope contains a
    /// cycle. Stale pairs are dropped and reported through
    /// [`ResolvedRenames::stale`].
    pub fn resolve(&self, intents: &[RenameIntent]) -> MigrateResult<ResolvedRenames> {
        let mut resolved = ResolvedRenames::default();

        let mut table_scopes: BTreeMap<String, BTreeSet<(String, String)>> = BTreeMap::new();
        for intent in intents.iter().filter(|i| i.kind == RenameKind::Table) {
            table_scopes
                .entry(intent.schema.clone())
                .or_default()
                .insert((intent.from.clone(), intent.to.clone()));
        }

        for (schema, edges) in &table_scopes {
            let pairs = collapse(schema, edges)?;
            let pairs = self.keep_valid(schema, pairs, &mut resolved.stale, |pair| {
                if !self.actual.tables.contains_key(&pair.from) {
                    Some(StaleReason::MissingSource)
                } else if !self.desired.tables.contains_key(&pair.to) {
                    Some(StaleReason::MissingTarget)
                } else {
                    None
                }
            });
            let pairs = disambiguate(schema, pairs, &mut resolved.stale, |name| {
                self.desired.table_rank(name)
            });
            if !pairs.is_empty() {
                resolved
                    .table_aliases
                    .insert(schema.clone(), chain_aliases(edges, &pairs));
                resolved.tables.insert(schema.clone(), pairs);
            }
        }

        let mut column_scopes: BTreeMap<(String, String), BTreeSet<(String, String)>> =
            BTreeMap::new();
        for intent in intents.iter().filter(|i| i.kind == RenameKind::Column) {
            let table = resolved.chained_table_name(&intent.schema, &intent.table);
            column_scopes
                .entry((intent.schema.clone(), table))
                .or_default()
                .insert((intent.from.clone(), intent.to.clone()));
        }

        for ((schema, table), edges) in &column_scopes {
            let scope = column_scope(schema, table);
            let live_table = resolved.previous_table_name(schema, table);
            let actual_table = self.actual.get_table(&live_table);
            let desired_table = self.desired.get_table(table);

            let pairs = collapse(&scope, edges)?;
            let pairs = self.keep_valid(&scope, pairs, &mut resolved.stale, |pair| {
                if !actual_table.is_some_and(|t| t.columns.contains_key(&pair.from)) {
                    Some(StaleReason::MissingSource)
                } else if !desired_table.is_some_and(|t| t.columns.contains_key(&pair.to)) {
                    Some(StaleReason::MissingTarget)
                } else {
                    None
                }
            });
            let pairs = disambiguate(&scope, pairs, &mut resolved.stale, |name| {
                desired_table
                    .and_then(|t| t.columns.get_index_of(name))
                    .unwrap_or(usize::MAX)
            });
            if !pairs.is_empty() {
                resolved.columns.insert(scope, pairs);
            }
        }

        info!(
            tables = resolved.tables.values().map(Vec::len).sum::<usize>(),
            columns = resolved.columns.values().map(Vec::len).sum::<usize>(),
            stale = resolved.stale.len(),
            "Resolved renames"
        );
        Ok(resolved)
    }

    fn keep_valid(
        &self,
        scope: &str,
        pairs: Vec<RenamePair>,
        stale: &mut Vec<StaleRename>,
        check: impl Fn(&RenamePair) -> Option<StaleReason>,
    ) -> Vec<RenamePair> {
        let mut kept = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let reason = if pair.from == pair.to {
                Some(StaleReason::NoOp)
            } else {
                check(&pair)
            };
            match reason {
                Some(reason) => {
                    debug!(scope, from = %pair.from, to = %pair.to, ?reason, "Discarding stale rename");
                    stale.push(StaleRename {
                        scope: scope.to_string(),
                        pair,
                        reason,
                    });
                }
                None => kept.push(pair),
            }
        }
        kept
    }
}

/// Collapse the edges of one scope into `root -> terminal` pairs.
fn collapse(scope: &str, edges: &BTreeSet<(String, String)>) -> MigrateResult<Vec<RenamePair>> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut targets: BTreeSet<&str> = BTreeSet::new();
    for (from, to) in edges {
        if from == to {
            continue;
        }
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
        targets.insert(to.as_str());
    }

    detect_cycle(scope, &adjacency)?;

    let mut pairs = BTreeSet::new();
    for root in adjacency.keys().filter(|n| !targets.contains(*n)) {
        let mut stack = vec![*root];
        while let Some(node) = stack.pop() {
            match adjacency.get(node) {
                Some(next) => stack.extend(next.iter().copied()),
                None => {
                    pairs.insert(RenamePair::new(*root, node));
                }
            }
        }
    }

    // No-op intents survive as pairs so they are reported as stale.
    for (from, to) in edges.iter().filter(|(from, to)| from == to) {
        pairs.insert(RenamePair::new(from.as_str(), to.as_str()));
    }

    Ok(pairs.into_iter().collect())
}

/// Map every name on a `from -> to` path of `pairs` to the pair's `to`.
///
/// A name shared by the paths of several pairs keeps the first pair.
fn chain_aliases(
    edges: &BTreeSet<(String, String)>,
    pairs: &[RenamePair],
) -> BTreeMap<String, String> {
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (from, to) in edges.iter().filter(|(from, to)| from != to) {
        adjacency.entry(from.as_str()).or_default().push(to.as_str());
    }
    let reachable = |start: &str| -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start.to_string()];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            if let Some(next) = adjacency.get(node.as_str()) {
                stack.extend(next.iter().map(|n| n.to_string()));
            }
        }
        seen
    };

    let mut aliases = BTreeMap::new();
    for pair in pairs {
        for node in reachable(&pair.from) {
            if reachable(&node).contains(&pair.to) {
                aliases.entry(node).or_insert_with(|| pair.to.clone());
            }
        }
    }
    aliases
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn detect_cycle(scope: &str, adjacency: &BTreeMap<&str, Vec<&str>>) -> MigrateResult<()> {
    let mut marks: BTreeMap<&str, Mark> = BTreeMap::new();

    for start in adjacency.keys().copied() {
        if marks.contains_key(start) {
            continue;
        }
        // (node, index of the next child to visit)
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Visiting);

        while let Some((node, child)) = stack.last().copied() {
            let children = adjacency.get(node).map_or(&[][..], Vec::as_slice);
            if child >= children.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let next = children[child];
            match marks.get(next) {
                Some(Mark::Visiting) => {
                    let begin = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[begin..].iter().map(|(n, _)| n.to_string()).collect();
                    path.push(next.to_string());
                    return Err(MigrationError::RenameCycle {
                        scope: scope.to_string(),
                        path,
                    });
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next, Mark::Visiting);
                    stack.push((next, 0));
                }
            }
        }
    }
    Ok(())
}

/// Keep one pair per `from` and per `to`, preferring the lowest rank.
fn disambiguate(
    scope: &str,
    pairs: Vec<RenamePair>,
    stale: &mut Vec<StaleRename>,
    rank: impl Fn(&str) -> usize,
) -> Vec<RenamePair> {
    let mut ordered = pairs;
    ordered.sort_by(|a, b| {
        rank(&a.to)
            .cmp(&rank(&b.to))
            .then_with(|| a.from.cmp(&b.from))
            .then_with(|| a.to.cmp(&b.to))
    });

    let mut seen_from = BTreeSet::new();
    let mut seen_to = BTreeSet::new();
    let mut kept = Vec::new();
    for pair in ordered {
        if seen_from.contains(&pair.from) || seen_to.contains(&pair.to) {
            debug!(scope, from = %pair.from, to = %pair.to, "Discarding ambiguous rename");
            stale.push(StaleRename {
                scope: scope.to_string(),
                pair,
                reason: StaleReason::Ambiguous,
            });
            continue;
        }
        seen_from.insert(pair.from.clone());
        seen_to.insert(pair.to.clone());
        kept.push(pair);
    }
    kept.sort();
    kept
}
