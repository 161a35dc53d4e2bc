//! Subset Loader ("Upload")
//!
//! Inserts captured rows table by table in dependency order. Server-generated
//! columns are left out of every INSERT; the generated key is recorded in the
//! [`IdentifierMap`] and substituted into the foreign keys of later rows.

use crate::error::{CloneError, Partial};
use crate::graph::ReferenceGraph;
use crate::introspection::{AutoValueSet, PrimaryKeys, TableReference};
use crate::options::{Deadline, UnresolvedReferencePolicy};
use crate::store::RelationalStore;
use crate::subset::{compare_values, value_text, Row, Subset, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Old key (as text) to new key (as text), per table.
///
/// Owned by a single load; grows as rows are inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentifierMap(BTreeMap<String, BTreeMap<String, String>>);

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, old: impl Into<String>, new: impl Into<String>) {
        self.0
            .entry(table.to_string())
            .or_default()
            .insert(old.into(), new.into());
    }

    pub fn get(&self, table: &str, old: &str) -> Option<&str> {
        self.0.get(table)?.get(old).map(String::as_str)
    }

    /// Recorded identifiers of one table
    pub fn table(&self, table: &str) -> Option<&BTreeMap<String, String>> {
        self.0.get(table)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Which columns of a table take part in an INSERT and which key comes back
#[derive(Debug)]
struct TablePlan<'a> {
    table: &'a str,
    auto_values: &'a [String],
    /// Auto-value column whose generated value is requested back
    returning: Option<&'a str>,
    /// Column holding the original key that `returning` replaces
    key: Option<&'a str>,
}

pub struct Loader<'a, S: ?Sized> {
    store: &'a S,
    graph: &'a ReferenceGraph,
    primary_keys: &'a PrimaryKeys,
    auto_values: &'a AutoValueSet,
    policy: UnresolvedReferencePolicy,
    deadline: Deadline,
}

impl<'a, S> Loader<'a, S>
where
    S: RelationalStore + ?Sized,
{
    pub fn new(
        store: &'a S,
        graph: &'a ReferenceGraph,
        primary_keys: &'a PrimaryKeys,
        auto_values: &'a AutoValueSet,
    ) -> Self {
        Self {
            store,
            graph,
            primary_keys,
            auto_values,
            policy: UnresolvedReferencePolicy::default(),
            deadline: Deadline::none(),
        }
    }

    pub fn with_policy(mut self, policy: UnresolvedReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// Insert the rows of `subset`, one table at a time in `order`.
    ///
    /// Every table with captured rows must appear in `order`; otherwise nothing
    /// is inserted. Aborts on the first failing row. The identifiers recorded
    /// up to that point come back with the error.
    pub async fn load(
        &self,
        order: &[String],
        subset: &Subset,
    ) -> Result<IdentifierMap, Partial<IdentifierMap>> {
        let mut ids = IdentifierMap::new();

        let unordered: Vec<&String> = subset
            .tables()
            .filter(|t| subset.has_table(t) && !order.contains(*t))
            .collect();
        if !unordered.is_empty() {
            let tables: Vec<&str> = unordered.iter().map(|t| t.as_str()).collect();
            return Err(Partial::new(
                CloneError::Configuration(format!(
                    "tables with captured rows are missing from the insertion order: {}",
                    tables.join(", ")
                )),
                ids,
            ));
        }

        for table in order {
            let rows = subset.rows(table);
            if rows.is_empty() {
                continue;
            }

            if let Err(error) = self.load_table(table, rows, subset, &mut ids).await {
                return Err(Partial::new(error, ids));
            }
        }

        info!("Loaded {} rows, recorded {} new identifiers", subset.row_count(), ids.len());
        Ok(ids)
    }

    async fn load_table(
        &self,
        table: &str,
        rows: &[Row],
        subset: &Subset,
        ids: &mut IdentifierMap,
    ) -> Result<(), CloneError> {
        let plan = self.plan(table);
        let rows = match self.graph.self_reference(table) {
            Some(edge) => parent_first(rows, edge)?,
            None => rows.iter().collect(),
        };

        debug!("Inserting {} rows into {}", rows.len(), table);

        for row in rows {
            let (columns, values) = self.insertable(&plan, row, subset, ids)?;

            let generated = self
                .deadline
                .run(self.store.insert_row(table, &columns, &values, plan.returning))
                .await?
                .map_err(|source| CloneError::Insert {
                    table: table.to_string(),
                    source,
                })?;

            if let (Some(new), Some(key)) = (generated, plan.key) {
                let old = row.get(key);
                if old.is_null() {
                    warn!("Row of {} has no value in key column {}, new identifier {} not recorded", table, key, new);
                } else {
                    ids.insert(table, value_text(old), new);
                }
            }
        }

        Ok(())
    }

    fn plan<'t>(&'t self, table: &'t str) -> TablePlan<'t> {
        let auto_values = self.auto_values.columns(table);
        let primary_key = self.primary_keys.single(table);

        let returning = match primary_key {
            Some(pk) if auto_values.iter().any(|c| c == pk) => Some(pk),
            _ => auto_values.first().map(String::as_str),
        };

        TablePlan {
            table,
            auto_values,
            returning,
            key: primary_key.or(returning),
        }
    }

    /// Column names and values for the INSERT, with foreign keys remapped
    fn insertable(
        &self,
        plan: &TablePlan<'_>,
        row: &Row,
        subset: &Subset,
        ids: &IdentifierMap,
    ) -> Result<(Vec<String>, Vec<Value>), CloneError> {
        let mut columns = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());

        for (column, value) in row.iter() {
            if plan.auto_values.contains(column) {
                continue;
            }

            let value = match self.graph.reference_for_column(plan.table, column) {
                Some(edge) if !value.is_null() && self.is_remapped(edge, subset) => {
                    self.remap(edge, value, ids)?
                }
                _ => value.clone(),
            };

            columns.push(column.clone());
            values.push(value);
        }

        Ok((columns, values))
    }

    /// Whether values of `edge` point at generated keys that this load replaces
    fn is_remapped(&self, edge: &TableReference, subset: &Subset) -> bool {
        let target = &edge.referenced_table;
        if !subset.has_table(target) {
            return false;
        }
        let plan = self.plan(target);
        let column = Some(edge.referenced_column.as_str());
        plan.returning == column && plan.key == column
    }

    fn remap(&self, edge: &TableReference, value: &Value, ids: &IdentifierMap) -> Result<Value, CloneError> {
        let old = value_text(value);
        if let Some(new) = ids.get(&edge.referenced_table, &old) {
            return Ok(typed_like(value, new));
        }

        match self.policy {
            UnresolvedReferencePolicy::Fail => Err(CloneError::UnresolvedReference {
                table: edge.table.clone(),
                column: edge.column.clone(),
                referenced_table: edge.referenced_table.clone(),
                value: old.into_owned(),
            }),
            UnresolvedReferencePolicy::KeepOriginal => {
                warn!(
                    "{}.{} = {} has no new identifier in {}, keeping the original value",
                    edge.table, edge.column, old, edge.referenced_table
                );
                Ok(value.clone())
            }
        }
    }
}

/// New identifier with the JSON type of the value it replaces
fn typed_like(original: &Value, new: &str) -> Value {
    if original.is_number() {
        if let Ok(n) = new.parse::<serde_json::Number>() {
            return Value::Number(n);
        }
    }
    Value::String(new.to_string())
}

/// Rows of a self-referencing table sorted parent-first.
///
/// Sorting is by the referencing column (nulls first). The result is then
/// checked: a row whose parent is part of the batch must come after it.
fn parent_first<'r>(rows: &'r [Row], edge: &TableReference) -> Result<Vec<&'r Row>, CloneError> {
    let mut sorted: Vec<&Row> = rows.iter().collect();
    sorted.sort_by(|a, b| compare_values(a.get(&edge.column), b.get(&edge.column)));

    let mut positions: HashMap<String, usize> = HashMap::new();
    for (i, row) in sorted.iter().enumerate() {
        let key = row.get(&edge.referenced_column);
        if !key.is_null() {
            positions.entry(value_text(key).into_owned()).or_insert(i);
        }
    }

    for (i, row) in sorted.iter().enumerate() {
        let parent = row.get(&edge.column);
        if parent.is_null() {
            continue;
        }
        if let Some(&p) = positions.get(&*value_text(parent)) {
            if p > i {
                return Err(CloneError::SelfReferenceOrder {
                    table: edge.table.clone(),
                    column: edge.column.clone(),
                    value: value_text(parent).into_owned(),
                });
            }
        }
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;
    use crate::sequence::sequence;
    use crate::store::memory::MemoryStore;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    struct Target {
        store: MemoryStore,
        graph: ReferenceGraph,
        primary_keys: PrimaryKeys,
        auto_values: AutoValueSet,
    }

    impl Target {
        async fn new(store: MemoryStore) -> Self {
            Self {
                graph: ReferenceGraph::new(store.list_references().await.unwrap()),
                primary_keys: store.list_primary_keys().await.unwrap(),
                auto_values: store.list_auto_value_columns().await.unwrap(),
                store,
            }
        }

        fn loader(&self) -> Loader<'_, MemoryStore> {
            Loader::new(&self.store, &self.graph, &self.primary_keys, &self.auto_values)
        }

        async fn load(&self, subset: &Subset) -> Result<IdentifierMap, Partial<IdentifierMap>> {
            let tables: Vec<String> = subset.tables().cloned().collect();
            let order = sequence(&self.graph, &tables).unwrap();
            self.loader().load(&order, subset).await
        }
    }

    fn shop() -> MemoryStore {
        MemoryStore::new()
            .with_table("person", &["id"], Some("id"))
            .with_table("purchase", &["id"], Some("id"))
            .with_reference(TableReference::new("purchase", "person_id", "person", "id"))
    }

    #[tokio::test]
    async fn test_foreign_keys_use_new_identifiers() {
        let target = Target::new(shop()).await;
        let mut subset = Subset::new();
        subset.insert("purchase", row! {"id" => 10, "person_id" => 1, "from" => "2023-11-22"});
        subset.insert("purchase", row! {"id" => 11, "person_id" => 2, "from" => "2023-11-23"});
        subset.insert("person", row! {"id" => 1, "name" => "Alice"});
        subset.insert("person", row! {"id" => 2, "name" => "Bob"});

        let ids = target.load(&subset).await.unwrap();

        assert_eq!(ids.get("person", "1"), Some("1001"));
        assert_eq!(ids.get("person", "2"), Some("1002"));
        assert_eq!(ids.get("purchase", "10"), Some("1001"));

        let inserted = target.store.inserted();
        assert_eq!(inserted[0].table, "person");
        assert_eq!(inserted[0].row, row! {"id" => 1001, "name" => "Alice"});

        for purchase in target.store.inserted_into("purchase") {
            let old = subset
                .rows("purchase")
                .iter()
                .find(|r| r.get("from") == purchase.get("from"))
                .unwrap();
            let expected = ids.get("person", &value_text(old.get("person_id"))).unwrap();
            assert_eq!(purchase.get("person_id"), &json!(expected.parse::<i64>().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_self_referencing_rows_insert_parents_first() {
        let store = MemoryStore::new()
            .with_table("category", &["id"], Some("id"))
            .with_reference(TableReference::new("category", "parent_id", "category", "id"));
        let target = Target::new(store).await;

        let mut subset = Subset::new();
        subset.insert("category", row! {"id" => 3, "parent_id" => 2});
        subset.insert("category", row! {"id" => 1, "parent_id" => null});
        subset.insert("category", row! {"id" => 2, "parent_id" => 1});

        let ids = target.load(&subset).await.unwrap();

        let old_ids: Vec<String> = target
            .store
            .inserted_into("category")
            .iter()
            .map(|r| {
                let new = value_text(r.get("id")).into_owned();
                ids.table("category")
                    .unwrap()
                    .iter()
                    .find(|(_, n)| **n == new)
                    .map(|(old, _)| old.clone())
                    .unwrap()
            })
            .collect();
        assert_eq!(old_ids, vec!["1", "2", "3"]);

        let parents: Vec<Value> = target
            .store
            .inserted_into("category")
            .iter()
            .map(|r| r.get("parent_id").clone())
            .collect();
        assert_eq!(parents, vec![Value::Null, json!(1001), json!(1002)]);
    }

    #[tokio::test]
    async fn test_unsortable_self_reference_is_reported() {
        let store = MemoryStore::new()
            .with_table("node", &["id"], Some("id"))
            .with_reference(TableReference::new("node", "parent_id", "node", "id"));
        let target = Target::new(store).await;

        // node 2 sorts before its parent 1, whose own parent is 9
        let mut subset = Subset::new();
        subset.insert("node", row! {"id" => 9, "parent_id" => null});
        subset.insert("node", row! {"id" => 1, "parent_id" => 9});
        subset.insert("node", row! {"id" => 2, "parent_id" => 1});

        let failure = target.load(&subset).await.unwrap_err();
        assert!(matches!(failure.error, CloneError::SelfReferenceOrder { .. }));
        assert!(target.store.inserted().is_empty());
    }

    #[tokio::test]
    async fn test_missing_parent_identifier_fails_by_default() {
        let target = Target::new(shop()).await;
        let mut subset = Subset::new();
        subset.insert("person", row! {"id" => 1, "name" => "Alice"});
        subset.insert("purchase", row! {"id" => 10, "person_id" => 7});

        let failure = target.load(&subset).await.unwrap_err();

        match &failure.error {
            CloneError::UnresolvedReference { table, value, .. } => {
                assert_eq!(table, "purchase");
                assert_eq!(value, "7");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(failure.partial.get("person", "1"), Some("1001"));
    }

    #[tokio::test]
    async fn test_missing_parent_identifier_kept_when_allowed() {
        let target = Target::new(shop()).await;
        let mut subset = Subset::new();
        subset.insert("person", row! {"id" => 1, "name" => "Alice"});
        subset.insert("purchase", row! {"id" => 10, "person_id" => 7});

        let tables: Vec<String> = subset.tables().cloned().collect();
        let order = sequence(&target.graph, &tables).unwrap();
        target
            .loader()
            .with_policy(UnresolvedReferencePolicy::KeepOriginal)
            .load(&order, &subset)
            .await
            .unwrap();

        assert_eq!(target.store.inserted_into("purchase")[0].get("person_id"), &json!(7));
    }

    #[tokio::test]
    async fn test_references_outside_the_subset_pass_through() {
        let target = Target::new(shop()).await;
        let mut subset = Subset::new();
        subset.insert("purchase", row! {"id" => 10, "person_id" => 1, "from" => "2023-11-22"});

        target.load(&subset).await.unwrap();

        let purchase = &target.store.inserted_into("purchase")[0];
        assert_eq!(purchase.get("person_id"), &json!(1));
        assert_eq!(purchase.get("from"), &json!("2023-11-22"));
    }

    #[tokio::test]
    async fn test_declared_primary_key_is_the_mapping_key() {
        // `code` is the key; `seq` is generated, so it is what comes back
        let store = MemoryStore::new()
            .with_table("country", &["code"], Some("seq"))
            .with_table("city", &["id"], None)
            .with_reference(TableReference::new("city", "country_code", "country", "code"));
        let target = Target::new(store).await;

        let mut subset = Subset::new();
        subset.insert("country", row! {"seq" => 4, "code" => "CH", "name" => "Switzerland"});
        subset.insert("city", row! {"id" => 1, "country_code" => "CH"});

        let ids = target.load(&subset).await.unwrap();

        assert_eq!(ids.get("country", "CH"), Some("1001"));
        assert!(ids.table("city").is_none());
        // the generated column is not the referenced key, so the reference is untouched
        assert_eq!(target.store.inserted_into("city")[0].get("country_code"), &json!("CH"));
        assert_eq!(
            target.store.inserted_into("country")[0],
            row! {"seq" => 1001, "code" => "CH", "name" => "Switzerland"}
        );
    }

    #[tokio::test]
    async fn test_every_auto_value_column_is_left_out() {
        let store = MemoryStore::new()
            .with_table("event", &["id"], Some("created_at"))
            .with_auto_value("event", "id");
        let target = Target::new(store).await;

        let mut subset = Subset::new();
        subset.insert("event", row! {"id" => 3, "created_at" => "2024-01-01", "kind" => "login"});

        let ids = target.load(&subset).await.unwrap();

        assert_eq!(ids.get("event", "3"), Some("1001"));
        assert_eq!(target.store.inserted_into("event")[0], row! {"id" => 1001, "kind" => "login"});
    }

    #[tokio::test]
    async fn test_order_missing_a_captured_table_is_rejected() {
        let target = Target::new(shop()).await;
        let mut subset = Subset::new();
        subset.insert("person", row! {"id" => 1, "name" => "Alice"});
        subset.insert("purchase", row! {"id" => 10, "person_id" => 1});

        let failure = target
            .loader()
            .load(&["person".to_string()], &subset)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, CloneError::Configuration(ref m) if m.contains("purchase")));
        assert!(failure.partial.is_empty());
        assert!(target.store.inserted().is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_returns_identifiers_so_far() {
        let target = Target::new(shop().failing_insert("purchase")).await;
        let mut subset = Subset::new();
        subset.insert("person", row! {"id" => 1});
        subset.insert("purchase", row! {"id" => 10, "person_id" => 1});

        let failure = target.load(&subset).await.unwrap_err();

        assert!(matches!(failure.error, CloneError::Insert { .. }));
        assert_eq!(failure.partial.get("person", "1"), Some("1001"));
    }

    #[tokio::test]
    async fn test_deadline_aborts_load() {
        let target = Target::new(shop().with_latency(Duration::from_millis(50))).await;
        let mut subset = Subset::new();
        subset.insert("person", row! {"id" => 1});
        subset.insert("person", row! {"id" => 2});

        let order = vec!["person".to_string()];
        let failure = target
            .loader()
            .with_deadline(Deadline::after(Some(Duration::from_millis(10))))
            .load(&order, &subset)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, CloneError::Timeout(_)));
        assert!(failure.partial.is_empty());
    }

    #[test]
    fn test_typed_like_keeps_numbers_numeric() {
        assert_eq!(typed_like(&json!(7), "1001"), json!(1001));
        assert_eq!(typed_like(&json!("7"), "1001"), json!("1001"));
        assert_eq!(typed_like(&json!(7), "a-uuid"), json!("a-uuid"));

        let wide = typed_like(&json!(7), "123456789012345678901234567890");
        assert!(wide.is_number());
        assert_eq!(value_text(&wide), "123456789012345678901234567890");
    }
}
