//! Line-oriented indexers for Python and Rust, so the binary works without
//! external plugins.

use async_trait::async_trait;
use codeindex_indexer::{Entry, EntryFlags, FileIndexer, FileInfo, IndexerPlugin, SymbolKind};
use regex::Regex;
use std::sync::Arc;

/// Every built-in plugin, in match priority order.
pub fn plugins() -> Result<Vec<Arc<dyn IndexerPlugin>>, regex::Error> {
    Ok(vec![
        Arc::new(BuiltinPlugin {
            id: "python",
            languages: "python",
            indexer: Arc::new(PythonIndexer::new()?),
        }),
        Arc::new(BuiltinPlugin {
            id: "rust",
            languages: "rust",
            indexer: Arc::new(RustIndexer::new()?),
        }),
    ])
}

struct BuiltinPlugin {
    id: &'static str,
    languages: &'static str,
    indexer: Arc<dyn FileIndexer>,
}

impl IndexerPlugin for BuiltinPlugin {
    fn id(&self) -> &str {
        self.id
    }

    fn languages(&self) -> &str {
        self.languages
    }

    fn create(&self) -> Arc<dyn FileIndexer> {
        Arc::clone(&self.indexer)
    }
}

async fn read_source(file: &FileInfo) -> codeindex_indexer::Result<(String, String)> {
    let bytes = tokio::fs::read(&file.path).await?;
    let stem = file
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((stem, String::from_utf8_lossy(&bytes).into_owned()))
}

/// 1-based column of a byte offset.
#[allow(clippy::cast_possible_truncation)]
fn column_of(offset: usize) -> u32 {
    offset as u32 + 1
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_constant_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_uppercase())
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

pub struct PythonIndexer {
    def: Regex,
    class: Regex,
    assign: Regex,
}

impl PythonIndexer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            def: Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)")?,
            class: Regex::new(r"^\s*class\s+([A-Za-z_]\w*)")?,
            assign: Regex::new(r"^([A-Za-z_]\w*)\s*(?::[^=]*)?=[^=]")?,
        })
    }

    /// Methods are keyed under their enclosing class: `module::Class::method`.
    pub fn entries(&self, module: &str, text: &str) -> Vec<Entry> {
        let mut entries = Vec::new();
        let mut classes: Vec<(usize, String)> = Vec::new();

        for (line_no, line) in (1u32..).zip(text.lines()) {
            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                continue;
            }
            let indent = indent_of(line);
            while classes.last().is_some_and(|(level, _)| *level >= indent) {
                classes.pop();
            }
            let scope = classes.iter().fold(module.to_string(), |mut scope, (_, name)| {
                scope.push_str("::");
                scope.push_str(name);
                scope
            });

            if let Some(name) = self.class.captures(line).and_then(|c| c.get(1)) {
                let mut flags = EntryFlags::IS_DEFINITION;
                if !classes.is_empty() {
                    flags = flags | EntryFlags::IS_MEMBER;
                }
                entries.push(
                    Entry::new(name.as_str(), SymbolKind::Class)
                        .with_key(format!("{scope}::{}", name.as_str()))
                        .with_flags(flags)
                        .at(line_no, column_of(name.start())),
                );
                classes.push((indent, name.as_str().to_string()));
            } else if let Some(name) = self.def.captures(line).and_then(|c| c.get(1)) {
                let mut flags = EntryFlags::IS_DEFINITION;
                if !classes.is_empty() {
                    flags = flags | EntryFlags::IS_MEMBER;
                }
                entries.push(
                    Entry::new(name.as_str(), SymbolKind::Function)
                        .with_key(format!("{scope}::{}", name.as_str()))
                        .with_flags(flags)
                        .at(line_no, column_of(name.start())),
                );
            } else if let Some(name) = self.assign.captures(line).and_then(|c| c.get(1)) {
                let kind = if is_constant_name(name.as_str()) {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                entries.push(
                    Entry::new(name.as_str(), kind)
                        .with_key(format!("{module}::{}", name.as_str()))
                        .with_flags(EntryFlags::IS_DEFINITION | EntryFlags::IS_STATIC)
                        .at(line_no, column_of(name.start())),
                );
            }
        }
        entries
    }
}

#[async_trait]
impl FileIndexer for PythonIndexer {
    async fn index_file(
        &self,
        file: &FileInfo,
        _build_flags: &[String],
    ) -> codeindex_indexer::Result<Vec<Entry>> {
        let (module, text) = read_source(file).await?;
        Ok(self.entries(&module, &text))
    }
}

pub struct RustIndexer {
    function: Regex,
    item: Regex,
    constant: Regex,
    macro_rules: Regex,
}

impl RustIndexer {
    pub fn new() -> Result<Self, regex::Error> {
        const VISIBILITY: &str = r"(?:pub(?:\([^)]*\))?\s+)?";
        Ok(Self {
            function: Regex::new(&format!(
                r#"^\s*{VISIBILITY}(?:(?:const|async|unsafe|extern\s+"[^"]*")\s+)*fn\s+([A-Za-z_]\w*)"#
            ))?,
            item: Regex::new(&format!(
                r"^\s*{VISIBILITY}(struct|enum|union|trait|type)\s+([A-Za-z_]\w*)"
            ))?,
            constant: Regex::new(&format!(
                r"^\s*{VISIBILITY}(const|static)\s+(?:mut\s+)?([A-Za-z_]\w*)\s*:"
            ))?,
            macro_rules: Regex::new(r"^\s*macro_rules!\s+([A-Za-z_]\w*)")?,
        })
    }

    /// A `fn` line ending in `;` is a declaration (trait method without a
    /// body, foreign function); everything else is a definition.
    pub fn entries(&self, module: &str, text: &str) -> Vec<Entry> {
        let mut entries = Vec::new();
        for (line_no, line) in (1u32..).zip(text.lines()) {
            let trimmed = line.trim_start();
            if trimmed.starts_with("//") {
                continue;
            }
            let nested = indent_of(line) > 0;

            let found = if let Some(name) = self.function.captures(line).and_then(|c| c.get(1)) {
                let mut flags = if line.trim_end().ends_with(';') {
                    EntryFlags::NONE
                } else {
                    EntryFlags::IS_DEFINITION
                };
                if nested {
                    flags = flags | EntryFlags::IS_MEMBER;
                }
                Some((name, SymbolKind::Function, flags))
            } else if let Some(caps) = self.item.captures(line) {
                let kind = match &caps[1] {
                    "struct" => SymbolKind::Struct,
                    "enum" => SymbolKind::Enum,
                    "union" => SymbolKind::Union,
                    "trait" => SymbolKind::Class,
                    _ => SymbolKind::Other,
                };
                caps.get(2)
                    .map(|name| (name, kind, EntryFlags::IS_DEFINITION))
            } else if let Some(caps) = self.constant.captures(line) {
                let mut flags = EntryFlags::IS_DEFINITION;
                if &caps[1] == "static" {
                    flags = flags | EntryFlags::IS_STATIC;
                }
                caps.get(2).map(|name| (name, SymbolKind::Constant, flags))
            } else {
                self.macro_rules
                    .captures(line)
                    .and_then(|c| c.get(1))
                    .map(|name| (name, SymbolKind::Macro, EntryFlags::IS_DEFINITION))
            };

            if let Some((name, kind, flags)) = found {
                entries.push(
                    Entry::new(name.as_str(), kind)
                        .with_key(format!("{module}::{}", name.as_str()))
                        .with_flags(flags)
                        .at(line_no, column_of(name.start())),
                );
            }
        }
        entries
    }
}

#[async_trait]
impl FileIndexer for RustIndexer {
    async fn index_file(
        &self,
        file: &FileInfo,
        _build_flags: &[String],
    ) -> codeindex_indexer::Result<Vec<Entry>> {
        let (module, text) = read_source(file).await?;
        Ok(self.entries(&module, &text))
    }
}
