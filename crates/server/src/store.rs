//! Filesystem-backed baseline store
//!
//! Layout under the root directory:
//! - `<context>/<context> - <name>.html|.css` for scenarios declared in a context
//! - `<name>.html|.css` for root scenarios
//! - `lastAcceptedBrowserData.json` for the metadata blob
//!
//! A missing baseline is a normal `None` result. Writes stage every file
//! next to its destination and only rename once all staging succeeded. The
//! rename replaces the live file in place, so readers always see either the
//! previous or the new baseline.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shotdiff_common::{Error, Result, ScenarioKey, SnapshotKind};

/// Separator between context and scenario name in baseline file names
pub const CONTEXT_DELIMITER: &str = " - ";

/// Metadata file name under the store root
pub const META_FILE: &str = "lastAcceptedBrowserData.json";

/// Baseline store rooted at a directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File name of a baseline, without directory
    pub fn file_name(key: &ScenarioKey, kind: SnapshotKind) -> String {
        let stem = match &key.context {
            Some(context) => format!("{}{}{}", context, CONTEXT_DELIMITER, key.name),
            None => key.name.clone(),
        };
        format!("{}.{}", sanitize_component(&stem), kind.extension())
    }

    /// Directory holding the baselines of a context
    pub fn context_dir(&self, context: Option<&str>) -> PathBuf {
        match context {
            Some(context) => self.root.join(sanitize_component(context)),
            None => self.root.clone(),
        }
    }

    /// Full path of a baseline file
    pub fn baseline_path(&self, key: &ScenarioKey, kind: SnapshotKind) -> PathBuf {
        self.context_dir(key.context.as_deref())
            .join(Self::file_name(key, kind))
    }

    /// Read a baseline. `Ok(None)` when there is no baseline yet.
    pub async fn read(&self, key: &ScenarioKey, kind: SnapshotKind) -> Result<Option<String>> {
        let path = self.baseline_path(key, kind);
        match fs::read(&path).await {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Ok(Some(text)),
                Err(e) => {
                    warn!("Baseline {} is not valid UTF-8, reading lossily", path.display());
                    Ok(Some(String::from_utf8_lossy(e.as_bytes()).into_owned()))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No {} baseline for {}", kind.label(), key);
                Ok(None)
            }
            Err(source) => Err(Error::BaselineRead { path, source }),
        }
    }

    /// Write a single baseline file
    pub async fn write(&self, key: &ScenarioKey, kind: SnapshotKind, text: &str) -> Result<()> {
        self.write_all(key, &[(kind, text)]).await
    }

    /// Write the markup baseline and, if given, the style baseline together
    pub async fn write_baseline(&self, key: &ScenarioKey, markup: &str, style: Option<&str>) -> Result<()> {
        match style {
            Some(style) => {
                self.write_all(key, &[(SnapshotKind::Markup, markup), (SnapshotKind::Style, style)])
                    .await
            }
            None => self.write_all(key, &[(SnapshotKind::Markup, markup)]).await,
        }
    }

    async fn write_all(&self, key: &ScenarioKey, files: &[(SnapshotKind, &str)]) -> Result<()> {
        let dir = self.context_dir(key.context.as_deref());
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| Error::BaselineWrite {
                path: dir.clone(),
                source,
            })?;

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
        for (kind, text) in files {
            let path = self.baseline_path(key, *kind);
            if fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
                discard(&staged).await;
                return Err(Error::BaselineWrite {
                    source: std::io::Error::new(ErrorKind::Other, "destination is a directory"),
                    path,
                });
            }
            let tmp = staging_path(&path);
            if let Err(source) = fs::write(&tmp, text).await {
                discard(&staged).await;
                let _ = fs::remove_file(&tmp).await;
                return Err(Error::BaselineWrite { path, source });
            }
            staged.push((tmp, path));
        }

        // Previous baselines are linked aside, never moved, so the live path
        // stays populated until the staged file replaces it
        let mut committed: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(staged.len());
        for (i, (tmp, path)) in staged.iter().enumerate() {
            let backup = match preserve(path).await {
                Ok(backup) => backup,
                Err(source) => {
                    rollback(&committed).await;
                    discard(&staged[i..]).await;
                    return Err(Error::BaselineWrite {
                        path: path.clone(),
                        source,
                    });
                }
            };
            if let Err(source) = fs::rename(tmp, path).await {
                committed.push((path.clone(), backup));
                rollback(&committed).await;
                discard(&staged[i..]).await;
                return Err(Error::BaselineWrite {
                    path: path.clone(),
                    source,
                });
            }
            committed.push((path.clone(), backup));
        }

        for (_, backup) in &committed {
            if let Some(backup) = backup {
                let _ = fs::remove_file(backup).await;
            }
        }

        info!("Accepted baseline for {} ({} file(s))", key, files.len());
        Ok(())
    }

    /// Path of the metadata blob
    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }

    /// Read the metadata blob. `Ok(None)` when none was written yet.
    pub async fn read_meta(&self) -> Result<Option<serde_json::Value>> {
        let path = self.meta_path();
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::BaselineRead { path, source }),
        }
    }

    /// Replace the metadata blob
    pub async fn write_meta(&self, value: &serde_json::Value) -> Result<()> {
        let path = self.meta_path();
        let write_err = |source| Error::BaselineWrite {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.root).await.map_err(write_err)?;
        let body = format!("{}\n", serde_json::to_string_pretty(value)?);
        let tmp = staging_path(&path);
        if let Err(e) = fs::write(&tmp, body).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(write_err(e));
        }
        debug!("Wrote baseline metadata to {}", path.display());
        Ok(())
    }
}

/// Hidden sibling used to stage a write before the rename
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4()))
}

/// Keep a copy of the current baseline at `path` for rollback.
///
/// Hard links are tried first; filesystems without them get a plain copy.
async fn preserve(path: &Path) -> std::io::Result<Option<PathBuf>> {
    let backup = staging_path(path);
    match fs::hard_link(path, &backup).await {
        Ok(()) => Ok(Some(backup)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => {
            debug!("Hard link for {} failed ({}), copying", path.display(), e);
            match fs::copy(path, &backup).await {
                Ok(_) => Ok(Some(backup)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => {
                    let _ = fs::remove_file(&backup).await;
                    Err(e)
                }
            }
        }
    }
}

/// Put previous baselines back in place after a failed commit
async fn rollback(committed: &[(PathBuf, Option<PathBuf>)]) {
    for (path, backup) in committed.iter().rev() {
        let restored = match backup {
            Some(backup) => fs::rename(backup, path).await,
            None => match fs::remove_file(path).await {
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = restored {
            warn!("Failed to restore baseline {}: {}", path.display(), e);
        }
    }
}

async fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if let Err(e) = fs::remove_file(tmp).await {
            warn!("Failed to remove staged baseline {}: {}", tmp.display(), e);
        }
    }
}

/// Keep names inside their directory.
///
/// Separators and `%` are percent-escaped so distinct names never share a
/// file; dot-only names have their dots escaped and the empty name becomes `%`.
fn sanitize_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }
    let dots_only = raw.chars().all(|c| c == '.');
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            '\0' => out.push_str("%00"),
            '.' if dots_only => out.push_str("%2E"),
            c => out.push(c),
        }
    }
    out
}
