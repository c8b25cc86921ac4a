use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// How files of one language are recognized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LanguageDefinition {
    pub id: String,
    #[serde(default)]
    pub globs: Vec<String>,
    #[serde(default)]
    pub mime_types: Vec<String>,
    /// Interpreter names accepted on a `#!` line of extension-less files.
    #[serde(default)]
    pub shebangs: Vec<String>,
}

impl LanguageDefinition {
    fn new(id: &str, globs: &[&str], mime_types: &[&str], shebangs: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            globs: globs.iter().map(|s| (*s).to_string()).collect(),
            mime_types: mime_types.iter().map(|s| (*s).to_string()).collect(),
            shebangs: shebangs.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Compile the file-name globs of this language.
    pub fn glob_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.globs {
            builder.add(Glob::new(pattern)?);
        }
        Ok(builder.build()?)
    }
}

fn builtin_definitions() -> Vec<LanguageDefinition> {
    vec![
        LanguageDefinition::new("c", &["*.c", "*.h"], &["text/x-c", "text/x-chdr"], &[]),
        LanguageDefinition::new(
            "cpp",
            &["*.cpp", "*.cc", "*.cxx", "*.hpp", "*.hh", "*.hxx"],
            &["text/x-c++src", "text/x-c++hdr"],
            &[],
        ),
        LanguageDefinition::new(
            "python",
            &["*.py", "*.pyw"],
            &["text/x-python", "text/x-python3"],
            &["python", "python3"],
        ),
        LanguageDefinition::new("rust", &["*.rs"], &["text/rust"], &[]),
        LanguageDefinition::new(
            "js",
            &["*.js", "*.mjs", "*.cjs"],
            &["application/javascript"],
            &["node", "gjs"],
        ),
        LanguageDefinition::new("typescript", &["*.ts", "*.tsx"], &["text/x-typescript"], &[]),
        LanguageDefinition::new("go", &["*.go"], &["text/x-go"], &[]),
        LanguageDefinition::new("java", &["*.java"], &["text/x-java"], &[]),
    ]
}

/// Language id -> recognition rules. Stands in for the host's language manager.
#[derive(Debug, Clone)]
pub struct LanguageCatalog {
    languages: Vec<LanguageDefinition>,
    matchers: Vec<GlobSet>,
}

impl LanguageCatalog {
    /// Built-in definitions for the common languages.
    pub fn builtin() -> Result<Self> {
        Self::from_definitions(builtin_definitions())
    }

    /// Built-in definitions with `overrides` merged in by id.
    pub fn with_overrides(overrides: &[LanguageDefinition]) -> Result<Self> {
        let mut languages = builtin_definitions();
        for def in overrides {
            match languages.iter_mut().find(|existing| existing.id == def.id) {
                Some(existing) => *existing = def.clone(),
                None => languages.push(def.clone()),
            }
        }
        Self::from_definitions(languages)
    }

    pub fn from_definitions(languages: Vec<LanguageDefinition>) -> Result<Self> {
        let matchers = languages
            .iter()
            .map(LanguageDefinition::glob_set)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            languages,
            matchers,
        })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LanguageDefinition> {
        self.languages.iter().find(|def| def.id == id)
    }

    #[must_use]
    pub fn languages(&self) -> &[LanguageDefinition] {
        &self.languages
    }

    /// Best-effort content type: file-name globs first, then the `#!` line.
    #[must_use]
    pub fn content_type_for(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_string_lossy();
        for (def, globs) in self.languages.iter().zip(&self.matchers) {
            if globs.is_match(file_name.as_ref()) {
                return def.mime_types.first().cloned();
            }
        }

        if path.extension().is_some() {
            return None;
        }
        let interpreter = read_shebang_interpreter(path)?;
        self.languages
            .iter()
            .find(|def| def.shebangs.iter().any(|name| *name == interpreter))
            .and_then(|def| def.mime_types.first().cloned())
    }
}

fn read_shebang_interpreter(path: &Path) -> Option<String> {
    let mut head = [0u8; 128];
    let mut file = std::fs::File::open(path).ok()?;
    let len = file.read(&mut head).ok()?;
    parse_shebang(&head[..len])
}

/// `#!/usr/bin/env python3 -u` -> `python3`, `#!/bin/node` -> `node`.
fn parse_shebang(head: &[u8]) -> Option<String> {
    let rest = head.strip_prefix(b"#!")?;
    let line_end = rest.iter().position(|&b| b == b'\n').unwrap_or(rest.len());
    let line = std::str::from_utf8(&rest[..line_end]).ok()?;
    let mut words = line.split_whitespace();
    let program = words.next()?;
    let program = program.rsplit('/').next().unwrap_or(program);
    let interpreter = if program == "env" {
        words.find(|word| !word.starts_with('-'))?
    } else {
        program
    };
    Some(interpreter.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn globs_resolve_content_type() {
        let catalog = LanguageCatalog::builtin().unwrap();
        assert_eq!(
            catalog.content_type_for(Path::new("/p/src/main.py")).as_deref(),
            Some("text/x-python")
        );
        assert_eq!(
            catalog.content_type_for(Path::new("/p/lib.rs")).as_deref(),
            Some("text/rust")
        );
        assert_eq!(catalog.content_type_for(Path::new("/p/README.md")), None);
    }

    #[test]
    fn shebang_resolves_extensionless_scripts() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("run-tests");
        std::fs::write(&script, "#!/usr/bin/env python3\nprint('hi')\n").unwrap();

        let catalog = LanguageCatalog::builtin().unwrap();
        assert_eq!(
            catalog.content_type_for(&script).as_deref(),
            Some("text/x-python")
        );
    }

    #[test]
    fn parse_shebang_variants() {
        assert_eq!(parse_shebang(b"#!/bin/node\n"), Some("node".to_string()));
        assert_eq!(
            parse_shebang(b"#!/usr/bin/env -S python3 -u\n"),
            Some("python3".to_string())
        );
        assert_eq!(parse_shebang(b"print('no shebang')"), None);
    }

    #[test]
    fn overrides_replace_by_id() {
        let custom = LanguageDefinition {
            id: "python".to_string(),
            globs: vec!["*.pyx".to_string()],
            mime_types: vec!["text/x-cython".to_string()],
            shebangs: Vec::new(),
        };
        let catalog = LanguageCatalog::with_overrides(&[custom]).unwrap();
        assert_eq!(
            catalog.content_type_for(Path::new("a.pyx")).as_deref(),
            Some("text/x-cython")
        );
        assert_eq!(catalog.content_type_for(Path::new("a.py")), None);
    }
}
