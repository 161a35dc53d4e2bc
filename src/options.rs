//! Download and upload options
//!
//! Seeds (where extraction starts), the exclusion set (tables never expanded),
//! the unresolved-reference policy and per-operation deadlines.

use crate::error::CloneError;
use crate::subset::{value_text, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_$]*$").expect("identifier pattern is valid"));

/// Whether a name is a plain PostgreSQL identifier
pub fn is_identifier(name: &str) -> bool {
    name.len() <= 63 && IDENTIFIER.is_match(name)
}

/// A starting point for extraction: rows of `table` where `column = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPredicate {
    pub table: String,
    pub column: String,
    pub value: Value,
}

impl SeedPredicate {
    pub fn new(table: impl Into<String>, column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }
}

impl std::fmt::Display for SeedPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} = {}", self.table, self.column, value_text(&self.value))
    }
}

/// Tables that extraction must never expand into
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionSet(BTreeSet<String>);

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>) {
        self.0.insert(table.into());
    }

    pub fn contains(&self, table: &str) -> bool {
        self.0.contains(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }
}

impl<T: Into<String>> FromIterator<T> for ExclusionSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Validated options for one Download
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    seeds: Vec<SeedPredicate>,
    exclude: ExclusionSet,
    timeout: Option<Duration>,
}

impl DownloadOptions {
    pub fn builder() -> DownloadOptionsBuilder {
        DownloadOptionsBuilder::default()
    }

    pub fn seeds(&self) -> &[SeedPredicate] {
        &self.seeds
    }

    pub fn exclude(&self) -> &ExclusionSet {
        &self.exclude
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Collects seeds and excluded tables, then validates them in [`build`](Self::build)
#[derive(Debug, Clone, Default)]
pub struct DownloadOptionsBuilder {
    seeds: Vec<SeedPredicate>,
    exclude: ExclusionSet,
    timeout: Option<Duration>,
}

impl DownloadOptionsBuilder {
    /// Add a starting point for the cloning process
    pub fn include(mut self, table: impl Into<String>, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.seeds.push(SeedPredicate::new(table, column, value));
        self
    }

    pub fn seed(mut self, seed: SeedPredicate) -> Self {
        self.seeds.push(seed);
        self
    }

    /// Never expand into `table` during extraction
    pub fn dont_recurse(mut self, table: impl Into<String>) -> Self {
        self.exclude.insert(table);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<DownloadOptions, CloneError> {
        if self.seeds.is_empty() {
            return Err(CloneError::Configuration(
                "starting point for cloning is missing".to_string(),
            ));
        }

        for seed in &self.seeds {
            for name in [&seed.table, &seed.column] {
                if !is_identifier(name) {
                    return Err(CloneError::Configuration(format!(
                        "'{name}' is not a valid table or column name"
                    )));
                }
            }
        }

        if let Some(table) = self.exclude.iter().find(|t| !is_identifier(t)) {
            return Err(CloneError::Configuration(format!(
                "'{table}' is not a valid table name"
            )));
        }

        Ok(DownloadOptions {
            seeds: self.seeds,
            exclude: self.exclude,
            timeout: self.timeout,
        })
    }
}

/// What to do with a foreign key value whose referenced row was remapped
/// in this upload but has no recorded new identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReferencePolicy {
    /// Abort the upload with an `UnresolvedReference` error
    #[default]
    Fail,
    /// Insert the original value unchanged and log a warning
    KeepOriginal,
}

impl std::str::FromStr for UnresolvedReferencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "keep_original" | "keep-original" => Ok(Self::KeepOriginal),
            other => Err(format!("unknown unresolved reference policy '{other}'")),
        }
    }
}

/// Options for one Upload
#[derive(Debug, Clone, Copy, Default)]
pub struct UploadOptions {
    pub unresolved_references: UnresolvedReferencePolicy,
    pub timeout: Option<Duration>,
}

/// Point in time after which an operation gives up
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline {
    at: Option<(Instant, Duration)>,
}

impl Deadline {
    /// No deadline
    pub fn none() -> Self {
        Self::default()
    }

    /// Deadline `budget` from now, or none.
    /// A budget too large to represent as an instant means no deadline.
    pub fn after(budget: Option<Duration>) -> Self {
        Self {
            at: budget.and_then(|b| Instant::now().checked_add(b).map(|at| (at, b))),
        }
    }

    /// Run `fut`, failing with `Timeout` if the deadline passes first
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, CloneError> {
        match self.at {
            None => Ok(fut.await),
            Some((at, budget)) => tokio::time::timeout_at(at, fut)
                .await
                .map_err(|_| CloneError::Timeout(budget)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_no_seed_is_a_configuration_error() {
        let err = assert_err!(DownloadOptions::builder().dont_recurse("user").build());
        assert!(matches!(err, CloneError::Configuration(_)));
    }

    #[test]
    fn test_builder_collects_seeds_and_exclusions() {
        let options = assert_ok!(DownloadOptions::builder()
            .include("purchase", "from", "2023-11-22")
            .include("person", "legal_name", "Alice")
            .dont_recurse("user")
            .build());

        assert_eq!(options.seeds().len(), 2);
        assert_eq!(options.seeds()[0].to_string(), "purchase.from = 2023-11-22");
        assert!(options.exclude().contains("user"));
        assert!(!options.exclude().contains("person"));
    }

    #[test]
    fn test_invalid_identifiers_are_rejected() {
        assert_err!(DownloadOptions::builder()
            .include("person; drop table x", "id", 1)
            .build());
        assert_err!(DownloadOptions::builder()
            .include("person", "id", 1)
            .dont_recurse("bad name")
            .build());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("fail".parse::<UnresolvedReferencePolicy>(), Ok(UnresolvedReferencePolicy::Fail));
        assert_eq!(
            "KEEP_ORIGINAL".parse::<UnresolvedReferencePolicy>(),
            Ok(UnresolvedReferencePolicy::KeepOriginal)
        );
        assert!("maybe".parse::<UnresolvedReferencePolicy>().is_err());
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Some(Duration::from_millis(10)));
        let result = deadline
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await;
        assert!(matches!(result, Err(CloneError::Timeout(_))));

        let value = Deadline::none().run(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_means_none() {
        let deadline = Deadline::after(Some(Duration::from_secs(u64::MAX)));
        let value = assert_ok!(deadline.run(async { 7 }).await);
        assert_eq!(value, 7);
    }
}
