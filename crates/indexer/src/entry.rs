use serde::{Deserialize, Serialize};
use std::ops::BitOr;

/// Separates the one-letter kind code from the name in fuzzy index keys.
pub const NAME_SEPARATOR: char = '\u{1F}';

/// Kind of an extracted symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Variable,
    Struct,
    Union,
    Enum,
    Class,
    Constant,
    Macro,
    Other,
}

impl SymbolKind {
    pub const ALL: [Self; 9] = [
        Self::Function,
        Self::Variable,
        Self::Struct,
        Self::Union,
        Self::Enum,
        Self::Class,
        Self::Constant,
        Self::Macro,
        Self::Other,
    ];

    /// One-letter code stored in front of every fuzzy index key.
    #[must_use]
    pub const fn prefix(self) -> char {
        match self {
            Self::Function => 'f',
            Self::Variable => 'v',
            Self::Struct => 's',
            Self::Union => 'u',
            Self::Enum => 'e',
            Self::Class => 'c',
            Self::Constant => 'a',
            Self::Macro => 'm',
            Self::Other => 'x',
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Variable => "variable",
            Self::Struct => "struct",
            Self::Union => "union",
            Self::Enum => "enum",
            Self::Class => "class",
            Self::Constant => "constant",
            Self::Macro => "macro",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub const fn icon_name(self) -> &'static str {
        match self {
            Self::Function => "lang-function-symbolic",
            Self::Variable => "lang-variable-symbolic",
            Self::Struct => "lang-struct-symbolic",
            Self::Union => "lang-union-symbolic",
            Self::Enum => "lang-enum-symbolic",
            Self::Class => "lang-class-symbolic",
            Self::Constant => "lang-constant-symbolic",
            Self::Macro => "lang-define-symbolic",
            Self::Other => "lang-symbol-symbolic",
        }
    }
}

/// Entry flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryFlags(u32);

impl EntryFlags {
    pub const NONE: Self = Self(0);
    pub const IS_DEFINITION: Self = Self(1);
    pub const IS_MEMBER: Self = Self(1 << 1);
    pub const IS_STATIC: Self = Self(1 << 2);

    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn is_definition(self) -> bool {
        self.contains(Self::IS_DEFINITION)
    }
}

impl BitOr for EntryFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// 1-based start position of a symbol inside its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceRange {
    pub line: u32,
    pub column: u32,
}

/// One symbol occurrence produced by a file indexer.
///
/// An empty `key` keeps the entry out of exact lookup; an empty `name` keeps
/// it out of fuzzy search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub name: String,
    pub kind: SymbolKind,
    pub flags: EntryFlags,
    pub range: SourceRange,
}

impl Entry {
    pub fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Self {
            key: String::new(),
            name: name.into(),
            kind,
            flags: EntryFlags::NONE,
            range: SourceRange::default(),
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: EntryFlags) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.range = SourceRange { line, column };
        self
    }
}

/// Value stored per key in `SymbolKeys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
    pub flags: EntryFlags,
}

/// Value stored per name in `SymbolNames`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
    pub flags: EntryFlags,
    pub kind: SymbolKind,
}

/// Key under which a name is stored in the fuzzy index: kind code, separator, name.
#[must_use]
pub fn fuzzy_key(kind: SymbolKind, name: &str) -> String {
    let mut key = String::with_capacity(name.len() + 2);
    key.push(kind.prefix());
    key.push(NAME_SEPARATOR);
    key.push_str(name);
    key
}

/// Inverse of [`fuzzy_key`]: the display name without the two-character prefix.
#[must_use]
pub fn display_name(key: &str) -> &str {
    key.char_indices()
        .nth(2)
        .map_or("", |(offset, _)| &key[offset..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuzzy_key_round_trips_through_display_name() {
        let key = fuzzy_key(SymbolKind::Function, "parse_args");
        assert_eq!(key, "f\u{1F}parse_args");
        assert_eq!(display_name(&key), "parse_args");
        assert_eq!(display_name("f\u{1F}"), "");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn kind_prefixes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in SymbolKind::ALL {
            assert!(seen.insert(kind.prefix()), "duplicate prefix for {kind:?}");
        }
    }

    #[test]
    fn flags_compose() {
        let flags = EntryFlags::IS_DEFINITION | EntryFlags::IS_STATIC;
        assert!(flags.is_definition());
        assert!(flags.contains(EntryFlags::IS_STATIC));
        assert!(!flags.contains(EntryFlags::IS_MEMBER));
        assert!(!EntryFlags::NONE.is_definition());
        assert_eq!(EntryFlags::from_bits(flags.bits()), flags);
    }
}
