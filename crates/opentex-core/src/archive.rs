//! ZIP archive import into a new project
//!
//! The archive is validated in full before anything is written, extracted
//! into a hidden staging directory, and only then renamed into place. A
//! failed import leaves no project behind.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::ZipArchive;

use crate::error::{ProjectError, Result};
use crate::name::SafeName;
use crate::store::ProjectStore;

/// Default cap on the total uncompressed size of an import
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 512 * 1024 * 1024;

/// Archive entries that are never worth extracting
const IGNORED_COMPONENTS: &[&str] = &["__MACOSX", ".DS_Store", "Thumbs.db"];

/// Unpacks uploaded archives as new projects
#[derive(Debug, Clone, Copy)]
pub struct ArchiveImporter {
    max_extracted_bytes: u64,
}

impl Default for ArchiveImporter {
    fn default() -> Self {
        Self {
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }
}

/// One archive entry scheduled for extraction
#[derive(Debug)]
struct PlannedEntry {
    index: usize,
    path: PathBuf,
    is_dir: bool,
}

impl ArchiveImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_extracted_bytes(mut self, bytes: u64) -> Self {
        self.max_extracted_bytes = bytes;
        self
    }

    /// Import `archive` as a new project called `project`
    pub async fn import(
        &self,
        store: &ProjectStore,
        project: &str,
        archive: Vec<u8>,
    ) -> Result<SafeName> {
        let name = SafeName::parse(project)?;
        let _guard = store.locks().acquire(&name).await;

        let target = store.project_dir(&name);
        if tokio::fs::try_exists(&target).await? {
            return Err(ProjectError::AlreadyExists(format!("project '{}'", name)));
        }

        let staging = store
            .root()
            .join(format!(".import-{}", Uuid::new_v4().simple()));
        let limit = self.max_extracted_bytes;

        let extracted = {
            let staging = staging.clone();
            tokio::task::spawn_blocking(move || extract_into(&archive, &staging, limit)).await
        };

        let outcome = match extracted {
            Ok(Ok(files)) => promote(&staging, &target, &name).await.map(|_| files),
            Ok(Err(e)) => Err(e),
            Err(join) => Err(join.into()),
        };

        match outcome {
            Ok(files) => {
                info!("Imported project {} ({} files)", name, files);
                Ok(name)
            }
            Err(e) => {
                discard(&staging).await;
                warn!("Import of {} failed: {}", name, e);
                Err(e)
            }
        }
    }
}

/// Rename a finished staging directory onto the project path
async fn promote(staging: &Path, target: &Path, name: &SafeName) -> Result<()> {
    // rename(2) silently replaces an empty directory, so check again
    if tokio::fs::try_exists(target).await? {
        return Err(ProjectError::AlreadyExists(format!("project '{}'", name)));
    }
    tokio::fs::rename(staging, target).await?;
    Ok(())
}

async fn discard(staging: &Path) {
    match tokio::fs::remove_dir_all(staging).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove staging dir {}: {}", staging.display(), e),
    }
}

/// Validate every entry, then extract into `dest`; returns the file count
fn extract_into(bytes: &[u8], dest: &Path, limit: u64) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut plan = Vec::with_capacity(archive.len());
    let mut seen = HashSet::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        let Some(path) = entry_path(entry.name())? else {
            continue;
        };
        if is_ignored(&path) {
            continue;
        }
        let Some(path) = normalized_path(&path) else {
            debug!("Skipping archive entry '{}'", entry.name());
            continue;
        };
        if !entry.is_dir() && !seen.insert(path.clone()) {
            return Err(ProjectError::UnsafeArchive(format!(
                "entry '{}' collides with another entry as '{}'",
                entry.name(),
                path.display()
            )));
        }
        plan.push(PlannedEntry {
            index,
            path,
            is_dir: entry.is_dir(),
        });
    }

    if !plan.iter().any(|e| !e.is_dir) {
        return Err(ProjectError::UnsafeArchive(
            "archive contains no files".to_string(),
        ));
    }
    strip_shared_root(&mut plan);

    std::fs::create_dir(dest)?;

    let mut remaining = limit;
    let mut files = 0;
    for planned in &plan {
        let out = dest.join(&planned.path);
        if planned.is_dir {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entry = archive.by_index(planned.index)?;
        let mut writer = File::create(&out)?;
        let written = std::io::copy(&mut entry.take(remaining.saturating_add(1)), &mut writer)?;
        if written > remaining {
            return Err(ProjectError::UnsafeArchive(format!(
                "archive expands beyond {} bytes",
                limit
            )));
        }
        remaining -= written;
        files += 1;
    }

    Ok(files)
}

/// Relative path an entry extracts to, or `None` for the archive root
///
/// Absolute paths, `..` and drive prefixes reject the whole archive.
fn entry_path(raw: &str) -> Result<Option<PathBuf>> {
    if raw.contains('\0') {
        return Err(ProjectError::UnsafeArchive(format!(
            "entry '{}' contains NUL",
            raw.escape_default()
        )));
    }

    // Archives written on Windows may use backslashes
    let normalized = raw.replace('\\', "/");
    let mut path = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ProjectError::UnsafeArchive(format!(
                    "entry '{}' escapes the project directory",
                    raw
                )));
            }
        }
    }

    Ok((!path.as_os_str().is_empty()).then_some(path))
}

/// Rewrite every component as a [`SafeName`], so extracted files stay
/// reachable through the store; `None` if any component is not a valid name
fn normalized_path(path: &Path) -> Option<PathBuf> {
    path.components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .and_then(|part| SafeName::parse(part).ok())
        })
        .collect::<Option<Vec<_>>>()
        .map(|names| names.iter().collect())
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(part) => part
            .to_str()
            .is_some_and(|p| IGNORED_COMPONENTS.contains(&p)),
        _ => false,
    })
}

/// Drop a top-level directory that every entry shares (a zipped folder)
fn strip_shared_root(plan: &mut Vec<PlannedEntry>) {
    let Some(first) = plan.first().and_then(|e| e.path.components().next()) else {
        return;
    };
    let root = PathBuf::from(first.as_os_str());

    let shared = plan.iter().all(|e| {
        e.path.starts_with(&root) && (e.is_dir || e.path.components().count() > 1)
    });
    if !shared {
        return;
    }

    plan.retain_mut(|e| {
        let rest = match e.path.strip_prefix(&root) {
            Ok(rest) => rest.to_path_buf(),
            Err(_) => return false,
        };
        if rest.as_os_str().is_empty() {
            return false;
        }
        e.path = rest;
        true
    });
}
