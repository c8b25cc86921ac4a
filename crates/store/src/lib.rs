//! # Code Index Store
//!
//! The two persisted structures written once per indexed directory:
//!
//! ```text
//! <index dir>/
//!     ├──> SymbolKeys   (KeyMap)     exact key  -> record, definitions preferred
//!     └──> SymbolNames  (FuzzyIndex) fuzzy name -> record, plus index-wide metadata
//! ```
//!
//! Both are built in memory, written atomically (temp file + rename) and loaded
//! read-only. A loaded index is immutable, so it can be shared behind an `Arc`
//! and queried from any thread.
//!
//! ## Example
//!
//! ```no_run
//! use codeindex_store::{FuzzyIndex, FuzzyIndexBuilder};
//!
//! #[tokio::main]
//! async fn main() -> codeindex_store::Result<()> {
//!     let mut builder = FuzzyIndexBuilder::new();
//!     builder.insert("parse_args", 7u32, 0);
//!     builder.set_metadata_u32("n_files", 1);
//!     builder.write("/tmp/SymbolNames").await?;
//!
//!     let index: FuzzyIndex<u32> = FuzzyIndex::load("/tmp/SymbolNames").await?;
//!     for hit in index.query("pargs", 10) {
//!         let (name, value) = index.get(&hit).expect("hit from this index");
//!         println!("{name} -> {value} ({})", hit.score);
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod fuzzy;
mod key_map;
mod persist;

pub use error::{Result, StoreError};
pub use fuzzy::{FuzzyIndex, FuzzyIndexBuilder, FuzzyMatch, FuzzyMatches};
pub use key_map::{KeyMap, KeyMapBuilder};
pub use persist::{newest_mtime, StagedFile, FORMAT_VERSION};
