//! Declarative table mappings.
//!
//! A [`TableSpec`] describes everything the engine needs to load one
//! destination table: which legacy tables feed it, how each legacy column maps
//! onto a destination column, which coercion applies, which rows are dropped,
//! and how a uniqueness conflict is resolved. Adding a table means adding an
//! entry to [`builtin`]; the engine has no per-table code.

mod tables;

pub use tables::builtin;

use serde::Serialize;

use crate::coerce::Coerce;
use crate::core::{Row, SourceRecord, SqlValue};
use crate::error::{MigrateError, Result};

/// Optional table groups that are migrated only on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableGroup {
    /// Always migrated.
    Core,
    /// Saved conversation history; large and independently managed.
    SavedMessages,
}

/// A legacy column reference. Older and newer legacy snapshots sometimes
/// name the same column differently, so a reference lists candidate names in
/// preference order. An empty list reads as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceColumn {
    pub candidates: Vec<&'static str>,
}

impl SourceColumn {
    pub fn named(name: &'static str) -> Self {
        Self {
            candidates: vec![name],
        }
    }

    pub fn any(names: &[&'static str]) -> Self {
        Self {
            candidates: names.to_vec(),
        }
    }

    /// A column the legacy table never had; always read as null.
    pub fn absent() -> Self {
        Self {
            candidates: Vec::new(),
        }
    }

    /// Pick the first candidate present in `available`.
    pub fn resolve<'a>(&self, available: &'a [String]) -> Option<&'a str> {
        self.candidates.iter().find_map(|c| {
            available
                .iter()
                .find(|a| a.eq_ignore_ascii_case(c))
                .map(String::as_str)
        })
    }
}

/// One legacy table feeding a destination table.
#[derive(Debug, Clone, Serialize)]
pub struct SourceTable {
    pub table: &'static str,
    /// Legacy columns, positionally aligned with the destination columns.
    pub columns: Vec<SourceColumn>,
}

impl SourceTable {
    /// Map a legacy table whose column names match `dest` one-to-one.
    pub fn same_names(table: &'static str, dest: &[ColumnSpec]) -> Self {
        Self {
            table,
            columns: dest.iter().map(|c| SourceColumn::named(c.name)).collect(),
        }
    }
}

/// A destination column and the coercion applied to the value feeding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub coerce: Coerce,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, coerce: Coerce) -> Self {
        Self { name, coerce }
    }

    pub const fn keep(name: &'static str) -> Self {
        Self::new(name, Coerce::Keep)
    }
}

/// Row filter evaluated on the coerced destination row. Rows failing any
/// filter are dropped silently and not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "column")]
pub enum RowFilter {
    NonNull(&'static str),
    NonZero(&'static str),
    NonEmpty(&'static str),
}

impl RowFilter {
    pub fn column(&self) -> &'static str {
        match self {
            RowFilter::NonNull(c) | RowFilter::NonZero(c) | RowFilter::NonEmpty(c) => c,
        }
    }

    pub fn accepts(&self, row: &Row) -> bool {
        let value = row.get(self.column()).unwrap_or(&SqlValue::Null);
        match self {
            RowFilter::NonNull(_) => !value.is_null(),
            RowFilter::NonZero(_) => !matches!(value, SqlValue::Int(0) | SqlValue::Null),
            RowFilter::NonEmpty(_) => !value.is_falsy(),
        }
    }
}

/// What happens when an incoming row collides with an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "columns")]
pub enum ConflictPolicy {
    /// Keep the existing row; the incoming one is skipped.
    Ignore,
    /// Overwrite the listed columns with the incoming values.
    Update(Vec<&'static str>),
}

/// Mapping for one destination table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSpec {
    /// Destination table name.
    pub name: &'static str,
    pub group: TableGroup,
    /// Contributing legacy tables, in merge order (later wins).
    pub sources: Vec<SourceTable>,
    /// Destination columns, in statement order.
    pub columns: Vec<ColumnSpec>,
    pub filters: Vec<RowFilter>,
    /// Columns uniquely identifying a logical record. Required for
    /// multi-source tables and for [`ConflictPolicy::Update`].
    pub conflict_key: Vec<&'static str>,
    pub on_conflict: ConflictPolicy,
    /// Auto-generated identity column whose counter needs reconciling after
    /// explicit values were bulk-inserted.
    pub identity: Option<&'static str>,
}

impl TableSpec {
    /// Start a spec with a single same-named legacy source, no filters,
    /// no key, and [`ConflictPolicy::Ignore`].
    pub fn new(name: &'static str, columns: Vec<ColumnSpec>) -> Self {
        let source = SourceTable::same_names(name, &columns);
        Self {
            name,
            group: TableGroup::Core,
            sources: vec![source],
            columns,
            filters: Vec::new(),
            conflict_key: Vec::new(),
            on_conflict: ConflictPolicy::Ignore,
            identity: None,
        }
    }

    pub fn sources(mut self, sources: Vec<SourceTable>) -> Self {
        self.sources = sources;
        self
    }

    /// Replace the legacy column for one destination column of every source.
    pub fn source_column(mut self, dest: &str, column: SourceColumn) -> Self {
        if let Some(idx) = self.columns.iter().position(|c| c.name == dest) {
            for source in &mut self.sources {
                if let Some(slot) = source.columns.get_mut(idx) {
                    *slot = column.clone();
                }
            }
        }
        self
    }

    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn key(mut self, columns: &[&'static str]) -> Self {
        self.conflict_key = columns.to_vec();
        self
    }

    pub fn update_on_conflict(mut self, columns: &[&'static str]) -> Self {
        self.on_conflict = ConflictPolicy::Update(columns.to_vec());
        self
    }

    pub fn identity(mut self, column: &'static str) -> Self {
        self.identity = Some(column);
        self
    }

    pub fn group(mut self, group: TableGroup) -> Self {
        self.group = group;
        self
    }

    /// Destination column names in order.
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.sources.len() > 1
    }

    /// Check the mapping invariants. Called before any row of the table is read.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(MigrateError::mapping(self.name, "no destination columns"));
        }
        if self.sources.is_empty() {
            return Err(MigrateError::mapping(self.name, "no legacy source tables"));
        }
        for source in &self.sources {
            if source.columns.len() != self.columns.len() {
                return Err(MigrateError::mapping(
                    self.name,
                    format!(
                        "column count mismatch while copying {} -> {}: {} source vs {} destination columns",
                        source.table,
                        self.name,
                        source.columns.len(),
                        self.columns.len()
                    ),
                ));
            }
        }
        for col in self.filters.iter().map(RowFilter::column).chain(
            self.conflict_key
                .iter()
                .copied()
                .chain(self.identity.into_iter()),
        ) {
            if !self.has_column(col) {
                return Err(MigrateError::mapping(
                    self.name,
                    format!("column {} is not a destination column", col),
                ));
            }
        }
        if let ConflictPolicy::Update(cols) = &self.on_conflict {
            if self.conflict_key.is_empty() {
                return Err(MigrateError::mapping(
                    self.name,
                    "update-on-conflict requires a conflict key",
                ));
            }
            if cols.is_empty() {
                return Err(MigrateError::mapping(
                    self.name,
                    "update-on-conflict lists no columns",
                ));
            }
            for col in cols {
                if !self.has_column(col) || self.conflict_key.contains(col) {
                    return Err(MigrateError::mapping(
                        self.name,
                        format!("cannot overwrite {} on conflict", col),
                    ));
                }
            }
        }
        if self.is_merged() && self.conflict_key.is_empty() {
            return Err(MigrateError::mapping(
                self.name,
                "tables merged from several sources need a conflict key",
            ));
        }
        Ok(())
    }

    /// Coerce one legacy record into a destination row, or `None` when a
    /// filter rejects it.
    pub fn shape(&self, record: SourceRecord) -> Option<Row> {
        let fields = self
            .columns
            .iter()
            .zip(record.into_values())
            .map(|(col, value)| (col.name, col.coerce.apply(value)))
            .collect();
        let row = Row::new(fields);
        self.filters.iter().all(|f| f.accepts(&row)).then_some(row)
    }
}

/// Specs to run, in load order, honoring the optional group flag.
pub fn selected(include_saved_messages: bool) -> Vec<TableSpec> {
    builtin()
        .into_iter()
        .filter(|spec| include_saved_messages || spec.group == TableGroup::Core)
        .collect()
}
