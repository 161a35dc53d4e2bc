//! Dependency Sequencer
//!
//! Orders tables so that each one comes after every other table it references
//! (Kahn's algorithm over out-degrees). Self-loops never block a table.

use crate::error::CloneError;
use crate::graph::ReferenceGraph;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Insertion order for `tables`.
///
/// Only edges between tables of the list are considered. Tables that can never
/// be ranked because of a cycle between distinct tables are reported as a
/// [`CloneError::CyclicSchema`] instead of being dropped.
pub fn sequence(graph: &ReferenceGraph, tables: &[String]) -> Result<Vec<String>, CloneError> {
    let mut requested: Vec<&str> = Vec::with_capacity(tables.len());
    for table in tables {
        if !requested.contains(&table.as_str()) {
            requested.push(table);
        }
    }
    let members: HashSet<&str> = requested.iter().copied().collect();

    let mut out_degrees: BTreeMap<&str, usize> = BTreeMap::new();
    let mut ready: Vec<&str> = Vec::new();

    for &table in &requested {
        let degree = graph
            .outgoing(table)
            .iter()
            .filter(|r| !r.is_self_reference() && members.contains(r.referenced_table.as_str()))
            .count();
        out_degrees.insert(table, degree);
        if degree == 0 {
            ready.push(table);
        }
    }

    let mut order: Vec<String> = Vec::with_capacity(requested.len());
    let mut visited: HashSet<&str> = HashSet::new();

    while let Some(table) = ready.pop() {
        if !visited.insert(table) {
            continue;
        }
        order.push(table.to_string());

        for edge in graph.incoming(table) {
            if edge.is_self_reference() {
                continue;
            }
            let Some(degree) = out_degrees.get_mut(edge.table.as_str()) else {
                continue;
            };
            *degree = degree.saturating_sub(1);
            if *degree == 0 && !visited.contains(edge.table.as_str()) {
                ready.push(edge.table.as_str());
            }
        }
    }

    if order.len() < requested.len() {
        let unranked: Vec<String> = requested
            .iter()
            .filter(|t| !visited.contains(*t))
            .map(|t| t.to_string())
            .collect();
        return Err(CloneError::CyclicSchema { tables: unranked });
    }

    debug!("Insertion order: {}", order.join(", "));
    Ok(order)
}
