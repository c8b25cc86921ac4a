use codeindex_indexer::{EntryFlags, SymbolKind};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A position in a source file. Line and column are 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Location {
    /// Convert a 1-based stored position.
    #[must_use]
    pub fn from_stored(path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line: line.saturating_sub(1),
            column: column.saturating_sub(1),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.path.display(),
            self.line + 1,
            self.column + 1
        )
    }
}

/// One displayable fuzzy search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub subtitle: String,
    pub icon_name: &'static str,
    pub kind: SymbolKind,
    pub location: Location,
    pub score: f32,
}

/// Results of [`crate::AggregateIndex::populate_query`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResults {
    pub results: Vec<SearchResult>,
    /// More matches existed than were returned.
    pub truncated: bool,
}

/// Resolution of an exact symbol key. Exactly one of `definition` and
/// `declaration` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub key: String,
    pub flags: EntryFlags,
    pub definition: Option<Location>,
    pub declaration: Option<Location>,
}

impl Symbol {
    /// Definition if known, otherwise the declaration.
    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.definition.as_ref().or(self.declaration.as_ref())
    }
}
