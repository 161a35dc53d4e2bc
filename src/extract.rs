//! Subset Extractor ("Download")
//!
//! Walks the reference graph in both directions from every seed and captures
//! each row transitively connected to it. The walk is driven by an explicit
//! stack, so deep schemas cost heap memory instead of call-stack frames, and
//! every store call is checked against the operation deadline.

use crate::error::{CloneError, Partial};
use crate::graph::ReferenceGraph;
use crate::options::{Deadline, ExclusionSet, SeedPredicate};
use crate::store::RelationalStore;
use crate::subset::{value_text, Row, Subset, Value};
use tracing::{debug, info};

/// Pending unit of work on the traversal stack
#[derive(Debug)]
enum Step {
    /// Fetch rows of `table` where `column = value`.
    /// Seeds are always fetched; derived predicates are skipped when already satisfied.
    Fetch {
        table: String,
        column: String,
        value: Value,
        seed: bool,
    },
    /// A fetched row, captured and expanded when not seen before
    Capture { table: String, row: Row },
}

pub struct Extractor<'a, S: ?Sized> {
    store: &'a S,
    graph: &'a ReferenceGraph,
    deadline: Deadline,
}

impl<'a, S> Extractor<'a, S>
where
    S: RelationalStore + ?Sized,
{
    pub fn new(store: &'a S, graph: &'a ReferenceGraph) -> Self {
        Self {
            store,
            graph,
            deadline: Deadline::none(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Collect every row reachable from `seeds` without expanding into `exclude`.
    ///
    /// On failure the rows captured so far are returned alongside the error.
    pub async fn extract(
        &self,
        seeds: &[SeedPredicate],
        exclude: &ExclusionSet,
    ) -> Result<Subset, Partial<Subset>> {
        let mut subset = Subset::new();

        for seed in seeds {
            info!("Extracting from seed {}", seed);
            let mut stack = vec![Step::Fetch {
                table: seed.table.clone(),
                column: seed.column.clone(),
                value: seed.value.clone(),
                seed: true,
            }];

            while let Some(step) = stack.pop() {
                match step {
                    Step::Fetch {
                        table,
                        column,
                        value,
                        seed,
                    } => {
                        if !seed && subset.contains_match(&table, &column, &value) {
                            continue;
                        }
                        if value.is_null() {
                            continue;
                        }

                        let rows = match self.fetch(&table, &column, &value).await {
                            Ok(rows) => rows,
                            Err(error) => return Err(Partial::new(error, subset)),
                        };

                        // reversed so the first row is expanded first
                        stack.extend(
                            rows.into_iter()
                                .rev()
                                .map(|row| Step::Capture {
                                    table: table.clone(),
                                    row,
                                }),
                        );
                    }
                    Step::Capture { table, row } => {
                        if !subset.insert(&table, row.clone()) {
                            continue;
                        }
                        let mut next = self.expand(&table, &row, exclude);
                        next.reverse();
                        stack.extend(next);
                    }
                }
            }
        }

        info!(
            "Extracted {} rows from {} tables",
            subset.row_count(),
            subset.tables().count()
        );
        Ok(subset)
    }

    /// Predicates derived from a newly captured row, in visiting order:
    /// what the row references first, then what references the row.
    fn expand(&self, table: &str, row: &Row, exclude: &ExclusionSet) -> Vec<Step> {
        let outgoing = self
            .graph
            .outgoing(table)
            .iter()
            .filter(|r| !exclude.contains(&r.referenced_table))
            .map(|r| Step::Fetch {
                table: r.referenced_table.clone(),
                column: r.referenced_column.clone(),
                value: row.get(&r.column).clone(),
                seed: false,
            });

        let incoming = self
            .graph
            .incoming(table)
            .into_iter()
            .filter(|r| !exclude.contains(&r.table))
            .map(|r| Step::Fetch {
                table: r.table.clone(),
                column: r.column.clone(),
                value: row.get(&r.referenced_column).clone(),
                seed: false,
            });

        outgoing.chain(incoming).collect()
    }

    async fn fetch(&self, table: &str, column: &str, value: &Value) -> Result<Vec<Row>, CloneError> {
        debug!("Fetching {} where {} = {}", table, column, value_text(value));

        self.deadline
            .run(self.store.fetch_rows(table, column, value))
            .await?
            .map_err(|source| CloneError::Query {
                table: table.to_string(),
                column: column.to_string(),
                value: value_text(value).into_owned(),
                source,
            })
    }
}
