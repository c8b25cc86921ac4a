use crate::config::PROJECT_DIR_NAME;
use crate::error::Result;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Version-control view of the project: which paths are ignored, and where
/// the VCS keeps the state whose changes should trigger a full re-plan.
pub trait Vcs: Send + Sync {
    fn working_directory(&self) -> &Path;

    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool;

    /// Directory whose modification means "the VCS state changed".
    fn state_dir(&self) -> Option<&Path> {
        None
    }
}

/// `.gitignore`-driven [`Vcs`].
///
/// Reads the root `.gitignore` and `.git/info/exclude`; `.git` and the
/// `.codeindex` directory are always ignored.
#[derive(Debug)]
pub struct GitignoreVcs {
    root: PathBuf,
    git_dir: PathBuf,
    rules: Gitignore,
}

impl GitignoreVcs {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let git_dir = root.join(".git");

        let mut builder = GitignoreBuilder::new(&root);
        for file in [root.join(".gitignore"), git_dir.join("info").join("exclude")] {
            if file.is_file() {
                if let Some(err) = builder.add(&file) {
                    log::warn!("Ignoring malformed rules in {}: {err}", file.display());
                }
            }
        }
        builder.add_line(None, ".git/")?;
        builder.add_line(None, &format!("{PROJECT_DIR_NAME}/"))?;
        let rules = builder.build()?;

        Ok(Self {
            root,
            git_dir,
            rules,
        })
    }
}

impl Vcs for GitignoreVcs {
    fn working_directory(&self) -> &Path {
        &self.root
    }

    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        // The matcher only accepts paths below its root.
        if !path.starts_with(&self.root) {
            return false;
        }
        self.rules
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }

    fn state_dir(&self) -> Option<&Path> {
        Some(&self.git_dir)
    }
}
