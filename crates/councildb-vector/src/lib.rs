//! Document store: an in-memory corpus searched by linear-scan cosine
//! similarity, with LanceDB persistence and embedding-fingerprint tracking.

pub mod migration;
pub mod schema;
pub mod store;
pub mod table;
pub mod writer;

pub use migration::{Fingerprint, MigrationStatus};
pub use store::{DocumentStore, IngestOutcome, QueryInput};
pub use writer::LanceCorpus;
