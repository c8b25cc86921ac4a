//! # Code Index Search
//!
//! Queryable union of every persisted directory index.
//!
//! ```text
//! <cache>/code-index/<dir>/{SymbolKeys, SymbolNames}
//!     │
//!     ├──> DirectoryIndex (immutable, Arc-swapped on reload)
//!     │
//!     └──> AggregateIndex
//!            ├─> populate_query: per-directory fuzzy streams ─> k-way score merge
//!            └─> lookup_symbol:  definition wins, declaration as fallback
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use codeindex_indexer::{CancellationToken, IndexLayout};
//! use codeindex_search::AggregateIndex;
//!
//! #[tokio::main]
//! async fn main() -> codeindex_search::Result<()> {
//!     let layout = IndexLayout::new("/path/to/project", "/path/to/project/.codeindex/cache");
//!     let aggregate = AggregateIndex::new();
//!     aggregate.load_all(&layout).await?;
//!
//!     let found = aggregate
//!         .populate_query("func parse", 20, &CancellationToken::new())
//!         .await?;
//!     for hit in &found.results {
//!         println!("{:8.1} {} {}", hit.score, hit.title, hit.location);
//!     }
//!     if let Some(symbol) = aggregate.lookup_symbol("config::parse") {
//!         println!("{symbol:?}");
//!     }
//!     Ok(())
//! }
//! ```

mod aggregate;
mod directory_index;
mod error;
mod merge;
mod query;
mod result;

pub use aggregate::{AggregateIndex, LoadOutcome};
pub use directory_index::DirectoryIndex;
pub use error::{Result, SearchError};
pub use merge::{collect_top, ScoreMerge, Scored};
pub use query::parse_query;
pub use result::{Location, QueryResults, SearchResult, Symbol};
