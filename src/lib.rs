//! sqlclone - referentially consistent subset cloning for PostgreSQL
//!
//! Extracts every row transitively connected to a set of seed rows from a
//! source database ([`transfer::download`]) and re-inserts them into a target
//! database in foreign key order, remapping server-generated keys on the way
//! ([`transfer::upload`]).

pub mod config;
pub mod connection;
pub mod error;
pub mod extract;
pub mod graph;
pub mod introspection;
pub mod load;
pub mod models;
pub mod options;
pub mod routes;
pub mod sequence;
pub mod state;
pub mod store;
pub mod subset;
pub mod transfer;

pub use error::{CloneError, Partial};
pub use extract::Extractor;
pub use graph::ReferenceGraph;
pub use load::{IdentifierMap, Loader};
pub use options::{DownloadOptions, UnresolvedReferencePolicy, UploadOptions};
pub use sequence::sequence;
pub use store::{PgStore, RelationalStore};
pub use subset::{Row, Subset, Value};
