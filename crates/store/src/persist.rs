use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Version stamped into every persisted index file.
pub const FORMAT_VERSION: u32 = 1;

pub(crate) fn check_version(found: u32) -> Result<()> {
    if found != FORMAT_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found,
            expected: FORMAT_VERSION,
        });
    }
    Ok(())
}

fn tmp_path_for(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| StoreError::InvalidPath(path.display().to_string()))?;
    let mut tmp = name.to_os_string();
    tmp.push(".tmp");
    Ok(path.with_file_name(tmp))
}

/// A complete temp file waiting to be renamed over its target. Dropping it
/// without [`commit`](Self::commit) or [`discard`](Self::discard) leaves the
/// temp file behind; the next stage of the same target overwrites it.
#[derive(Debug)]
#[must_use = "a staged file only replaces its target once committed"]
pub struct StagedFile {
    tmp: PathBuf,
    target: PathBuf,
}

impl StagedFile {
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Rename the temp file over the target.
    pub async fn commit(self) -> Result<()> {
        if let Err(err) = tokio::fs::rename(&self.tmp, &self.target).await {
            let _ = tokio::fs::remove_file(&self.tmp).await;
            return Err(err.into());
        }
        log::debug!("Wrote index file {}", self.target.display());
        Ok(())
    }

    /// Remove the temp file; the target is left untouched.
    pub async fn discard(self) {
        let _ = tokio::fs::remove_file(&self.tmp).await;
    }
}

/// Serialize `value` into the temp file next to `path` without touching `path`.
/// Committing the result gives readers either the previous file or the
/// complete new one.
pub(crate) async fn stage<T: Serialize>(path: &Path, value: &T) -> Result<StagedFile> {
    let bytes = serde_json::to_vec(value)?;
    let tmp = tmp_path_for(path)?;
    if let Err(err) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(StagedFile {
        tmp,
        target: path.to_path_buf(),
    })
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub(crate) fn read_json_blocking<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Newest modification time among `paths`; `None` if any of them is missing.
pub fn newest_mtime<P: AsRef<Path>>(paths: &[P]) -> Option<SystemTime> {
    let mut newest: Option<SystemTime> = None;
    for path in paths {
        let modified = std::fs::metadata(path.as_ref()).ok()?.modified().ok()?;
        newest = Some(match newest {
            Some(current) if current >= modified => current,
            _ => modified,
        });
    }
    newest
}
