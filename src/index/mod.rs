//! Collections: the write path, the read path and maintenance.
//!
//! An [`IndexHandle`] owns one collection. Writes go through a
//! [`WriteSession`], which builds a dirty tree per field and commits it as a
//! new page. Reads go through a [`SearchSession`], which scans the committed
//! pages of each queried field.

pub mod config;
pub mod files;
pub mod handle;
pub mod query;
pub mod search;
pub mod validate;
pub mod write;

pub use config::IndexConfig;
pub use files::CollectionFiles;
pub use handle::IndexHandle;
pub use query::{Occur, Query, QueryParser, Term};
pub use search::{paginate, Scorer, SearchHit, SearchResults, SearchSession};
pub use validate::{ValidationReport, Validator};
pub use write::{CommitStats, WriteSession};
