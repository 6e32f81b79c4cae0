//! Keyed merge of rows coming from one or more legacy tables.
//!
//! Rows are fed in source-table order. A later row whose key was already seen
//! replaces the earlier row in full, but keeps the earlier row's position, so
//! output order is the order in which keys were first seen.

use std::collections::HashMap;

use tracing::debug;

use crate::core::{MergeKey, Row};

/// Accumulates rows for one destination table.
#[derive(Debug, Default)]
pub struct Merger {
    key: Vec<&'static str>,
    index: HashMap<MergeKey, usize>,
    rows: Vec<Row>,
    replaced: usize,
}

impl Merger {
    /// An empty key disables deduplication: every row is kept.
    pub fn new(key: &[&'static str]) -> Self {
        Self {
            key: key.to_vec(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, row: Row) {
        if self.key.is_empty() {
            self.rows.push(row);
            return;
        }
        let key = MergeKey::from_row(&row, &self.key);
        match self.index.get(&key) {
            Some(&pos) => {
                debug!("replacing row with key {}", key);
                self.rows[pos] = row;
                self.replaced += 1;
            }
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
            }
        }
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = Row>) {
        for row in rows {
            self.push(row);
        }
    }

    /// Number of incoming rows that overwrote an earlier one.
    pub fn replaced(&self) -> usize {
        self.replaced
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SqlValue;

    fn dl(url: &str, res: i64, title: &str) -> Row {
        Row::new(vec![
            ("url", url.into()),
            ("resolution", SqlValue::Int(res)),
            ("title", title.into()),
        ])
    }

    #[test]
    fn test_later_row_wins_whole() {
        let mut merger = Merger::new(&["url", "resolution"]);
        merger.extend([dl("a", 720, "old"), dl("b", 720, "other")]);
        merger.extend([dl("a", 720, "new")]);
        assert_eq!(merger.replaced(), 1);
        let rows = merger.into_rows();
        assert_eq!(rows, vec![dl("a", 720, "new"), dl("b", 720, "other")]);
    }

    #[test]
    fn test_distinct_composite_keys_are_kept() {
        let mut merger = Merger::new(&["url", "resolution"]);
        merger.extend([dl("a", 720, "x"), dl("a", 1080, "y")]);
        assert_eq!(merger.len(), 2);
    }

    #[test]
    fn test_no_key_keeps_everything() {
        let mut merger = Merger::new(&[]);
        merger.extend([dl("a", 1, "x"), dl("a", 1, "x")]);
        assert_eq!(merger.len(), 2);
        assert_eq!(merger.replaced(), 0);
    }

    #[test]
    fn test_first_seen_order_is_stable() {
        let mut merger = Merger::new(&["url", "resolution"]);
        merger.extend([dl("c", 1, "1"), dl("a", 1, "2"), dl("b", 1, "3")]);
        merger.extend([dl("b", 1, "4"), dl("c", 1, "5")]);
        let urls: Vec<_> = merger
            .into_rows()
            .iter()
            .map(|r| r.get("url").cloned().unwrap())
            .collect();
        assert_eq!(urls, vec!["c".into(), "a".into(), SqlValue::from("b")]);
    }
}
