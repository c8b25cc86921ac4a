use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

pub type BuildFlags = HashMap<PathBuf, Vec<String>>;

/// Source of per-file compiler flags.
#[async_trait]
pub trait BuildSystem: Send + Sync {
    /// Flags for as many of `files` as the build system knows about. Files it
    /// does not know are simply absent from the result.
    async fn build_flags_for_files(&self, files: &[PathBuf]) -> Result<BuildFlags>;
}

/// Build system that knows no flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBuildSystem;

#[async_trait]
impl BuildSystem for NoBuildSystem {
    async fn build_flags_for_files(&self, _files: &[PathBuf]) -> Result<BuildFlags> {
        Ok(BuildFlags::new())
    }
}

#[derive(Debug, Deserialize)]
struct CompileCommand {
    directory: PathBuf,
    file: PathBuf,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// Flags read from a `compile_commands.json` compilation database.
#[derive(Debug, Default, Clone)]
pub struct CompileCommands {
    flags: BuildFlags,
}

impl CompileCommands {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let commands: Vec<CompileCommand> = serde_json::from_slice(bytes)?;
        let mut flags = BuildFlags::with_capacity(commands.len());
        for cmd in commands {
            let file = normalize_lexically(&cmd.directory.join(&cmd.file));
            let argv = match (cmd.arguments, cmd.command) {
                (Some(arguments), _) => arguments,
                (None, Some(command)) => split_command_line(&command),
                (None, None) => continue,
            };
            flags.insert(file.clone(), compiler_flags(&argv, &file));
        }
        Ok(Self { flags })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

#[async_trait]
impl BuildSystem for CompileCommands {
    async fn build_flags_for_files(&self, files: &[PathBuf]) -> Result<BuildFlags> {
        Ok(files
            .iter()
            .filter_map(|file| {
                self.flags
                    .get(file)
                    .map(|flags| (file.clone(), flags.clone()))
            })
            .collect())
    }
}

/// Resolve `.` and `..` without touching the filesystem. Entries such as
/// `{"directory": "/p/build", "file": "../src/a.c"}` must key on `/p/src/a.c`,
/// the path the plan looks up.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(".."),
            },
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Drop the compiler itself, the output argument, `-c` and the source file.
fn compiler_flags(argv: &[String], file: &Path) -> Vec<String> {
    let file_name = file.file_name();
    let mut flags = Vec::new();
    let mut args = argv.iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => {
                args.next();
            }
            "-c" => {}
            _ if file_name.is_some() && Path::new(arg).file_name() == file_name => {}
            _ if arg.starts_with("-o") && arg.len() > 2 => {}
            _ => flags.push(arg.clone()),
        }
    }
    flags
}

/// Split a shell command line on whitespace, honouring quotes and backslashes.
fn split_command_line(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"') | None, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                    in_word = true;
                }
            }
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_quoted_command_lines() {
        assert_eq!(
            split_command_line(r#"cc -DNAME="a b" -I 'inc dir' x\ y.c"#),
            vec!["cc", "-DNAME=a b", "-I", "inc dir", "x y.c"]
        );
    }

    #[tokio::test]
    async fn reads_command_and_arguments_forms() {
        let db = br#"[
            {"directory": "/p/build", "file": "../src/a.c",
             "command": "gcc -Iinclude -DDEBUG -c ../src/a.c -o a.o"},
            {"directory": "/p", "file": "/p/src/b.c",
             "arguments": ["clang", "-std=c11", "-c", "/p/src/b.c", "-ob.o"]}
        ]"#;
        let commands = CompileCommands::from_json(db).unwrap();
        assert_eq!(commands.len(), 2);

        let a = PathBuf::from("/p/src/a.c");
        let b = PathBuf::from("/p/src/b.c");
        let missing = PathBuf::from("/p/src/c.c");
        let flags = commands
            .build_flags_for_files(&[a.clone(), b.clone(), missing.clone()])
            .await
            .unwrap();

        assert_eq!(flags.get(&a).unwrap(), &vec!["-Iinclude".to_string(), "-DDEBUG".to_string()]);
        assert_eq!(flags.get(&b).unwrap(), &vec!["-std=c11".to_string()]);
        assert!(!flags.contains_key(&missing));
    }

    #[test]
    fn normalizes_relative_entries() {
        assert_eq!(
            normalize_lexically(Path::new("/p/build/./../src/a.c")),
            PathBuf::from("/p/src/a.c")
        );
        assert_eq!(
            normalize_lexically(Path::new("/../p/a.c")),
            PathBuf::from("/p/a.c")
        );
        assert_eq!(
            normalize_lexically(Path::new("build/../../a.c")),
            PathBuf::from("../a.c")
        );
    }

    #[tokio::test]
    async fn no_build_system_knows_nothing() {
        let flags = NoBuildSystem
            .build_flags_for_files(&[PathBuf::from("/p/a.c")])
            .await
            .unwrap();
        assert!(flags.is_empty());
    }
}
