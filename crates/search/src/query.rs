use codeindex_indexer::{SymbolKind, NAME_SEPARATOR};

/// Kinds selectable by the first word of a two-word query, in match order.
const KIND_WORDS: [(&str, SymbolKind); 8] = [
    ("function", SymbolKind::Function),
    ("variable", SymbolKind::Variable),
    ("struct", SymbolKind::Struct),
    ("union", SymbolKind::Union),
    ("enum", SymbolKind::Enum),
    ("class", SymbolKind::Class),
    ("constant", SymbolKind::Constant),
    ("macro", SymbolKind::Macro),
];

/// Turn user input into the text matched against fuzzy index keys.
///
/// `"parse"` becomes `"\u{1F}parse"`; `"func parse"` becomes
/// `"f\u{1F}parse"`; an unknown first word is dropped, leaving `"\u{1F}parse"`.
#[must_use]
pub fn parse_query(text: &str) -> String {
    let (kind, rest) = match text.split_once(' ') {
        Some((word, rest)) => (kind_for_word(word), rest),
        None => (None, text),
    };

    let mut query = String::with_capacity(rest.len() + 2);
    if let Some(kind) = kind {
        query.push(kind.prefix());
    }
    query.push(NAME_SEPARATOR);
    query.push_str(rest);
    query
}

/// Case-sensitive: `fun`, `func` and `function` all select functions.
fn kind_for_word(word: &str) -> Option<SymbolKind> {
    if word.is_empty() {
        return None;
    }
    KIND_WORDS
        .iter()
        .find(|(name, _)| name.starts_with(word))
        .map(|&(_, kind)| kind)
}
