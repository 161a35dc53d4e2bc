//! Download / Upload orchestration
//!
//! Each operation reads the catalog once, builds the reference graph and runs
//! its phase under a single deadline.

use crate::error::{CloneError, Partial};
use crate::extract::Extractor;
use crate::graph::ReferenceGraph;
use crate::introspection::{Introspector, TableReference};
use crate::load::{IdentifierMap, Loader};
use crate::options::{Deadline, DownloadOptions, UploadOptions};
use crate::sequence::sequence;
use crate::store::RelationalStore;
use crate::subset::Subset;
use std::time::Instant;
use tracing::info;

/// Extract the subset described by `options` from `store`
pub async fn download<S>(store: &S, options: &DownloadOptions) -> Result<Subset, Partial<Subset>>
where
    S: RelationalStore + ?Sized,
{
    let started = Instant::now();
    let deadline = Deadline::after(options.timeout());

    let references = deadline
        .run(Introspector::references(store))
        .await
        .and_then(|r| r)
        .map_err(|e| Partial::new(e, Subset::new()))?;
    let graph = ReferenceGraph::new(references);

    info!(
        "Download: {} seeds, {} references, {} excluded tables",
        options.seeds().len(),
        graph.edge_count(),
        options.exclude().iter().count()
    );

    let subset = Extractor::new(store, &graph)
        .with_deadline(deadline)
        .extract(options.seeds(), options.exclude())
        .await?;

    info!(
        "Download finished in {:?}: {} rows, checksum {}",
        started.elapsed(),
        subset.row_count(),
        subset.checksum()
    );
    Ok(subset)
}

/// Insert `subset` into `store`, returning the old-to-new identifier map
pub async fn upload<S>(
    store: &S,
    subset: &Subset,
    options: &UploadOptions,
) -> Result<IdentifierMap, Partial<IdentifierMap>>
where
    S: RelationalStore + ?Sized,
{
    let started = Instant::now();
    let deadline = Deadline::after(options.timeout);

    let catalog = deadline
        .run(Introspector::introspect(store))
        .await
        .and_then(|c| c)
        .map_err(|e| Partial::new(e, IdentifierMap::new()))?;
    let graph = ReferenceGraph::new(catalog.references);

    let tables: Vec<String> = subset.tables().cloned().collect();
    let order = sequence(&graph, &tables).map_err(|e| Partial::new(e, IdentifierMap::new()))?;

    info!("Upload: {} rows into {} tables, order {}", subset.row_count(), order.len(), order.join(" -> "));

    let ids = Loader::new(store, &graph, &catalog.primary_keys, &catalog.auto_values)
        .with_policy(options.unresolved_references)
        .with_deadline(deadline)
        .load(&order, subset)
        .await?;

    info!("Upload finished in {:?}: {} new identifiers", started.elapsed(), ids.len());
    Ok(ids)
}

/// Insertion order over every table of `store`
pub async fn dependency_order<S>(store: &S) -> Result<Vec<String>, CloneError>
where
    S: RelationalStore + ?Sized,
{
    let tables = store.list_tables().await.map_err(CloneError::Introspection)?;
    let graph = ReferenceGraph::new(Introspector::references(store).await?);
    sequence(&graph, &tables)
}

/// Foreign key edges of `store`
pub async fn references<S>(store: &S) -> Result<Vec<TableReference>, CloneError>
where
    S: RelationalStore + ?Sized,
{
    Introspector::references(store).await
}
