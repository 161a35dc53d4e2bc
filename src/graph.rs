//! Reference Graph
//!
//! Directed graph over tables built from the foreign key edges of a catalog.
//! An edge `A.col -> B.col'` means table A's column references table B's column.

use crate::introspection::TableReference;
use serde::Serialize;
use std::collections::BTreeMap;

/// Adjacency structure: table name to its outgoing edges
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ReferenceGraph {
    outgoing: BTreeMap<String, Vec<TableReference>>,
}

impl ReferenceGraph {
    /// Build the graph from the raw edge list of the introspector
    pub fn new(references: impl IntoIterator<Item = TableReference>) -> Self {
        let mut outgoing: BTreeMap<String, Vec<TableReference>> = BTreeMap::new();
        for reference in references {
            outgoing
                .entry(reference.table.clone())
                .or_default()
                .push(reference);
        }
        Self { outgoing }
    }

    /// Edges leaving `table` (the foreign keys it declares)
    pub fn outgoing(&self, table: &str) -> &[TableReference] {
        self.outgoing.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Edges pointing into `table`. Scans every edge.
    pub fn incoming(&self, table: &str) -> Vec<&TableReference> {
        self.edges()
            .filter(|r| r.referenced_table == table)
            .collect()
    }

    /// The first edge of `table` pointing back into `table`
    pub fn self_reference(&self, table: &str) -> Option<&TableReference> {
        self.outgoing(table).iter().find(|r| r.is_self_reference())
    }

    /// The referencing column of the first self-referencing edge, if any
    pub fn self_referencing_column(&self, table: &str) -> Option<&str> {
        self.self_reference(table).map(|r| r.column.as_str())
    }

    pub fn is_self_referencing(&self, table: &str) -> bool {
        self.self_referencing_column(table).is_some()
    }

    /// The edge declared on `table.column`, if the column is a foreign key
    pub fn reference_for_column(&self, table: &str, column: &str) -> Option<&TableReference> {
        self.outgoing(table).iter().find(|r| r.column == column)
    }

    /// Every edge, grouped by referencing table
    pub fn edges(&self) -> impl Iterator<Item = &TableReference> {
        self.outgoing.values().flatten()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(Vec::len).sum()
    }
}
