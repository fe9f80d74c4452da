//! Filesystem-backed project store
//!
//! One directory per project under the projects root. All names are parsed
//! into [`SafeName`] before a path is built from them.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ProjectError, Result};
use crate::lock::ProjectLocks;
use crate::name::SafeName;

/// Source file every new project starts with
pub const DEFAULT_DOCUMENT: &str = "document.tex";

/// Project directories on disk, plus the writer locks guarding them
#[derive(Debug)]
pub struct ProjectStore {
    root: PathBuf,
    locks: ProjectLocks,
}

impl ProjectStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("Project store at {}", root.display());
        Ok(Self {
            root,
            locks: ProjectLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locks(&self) -> &ProjectLocks {
        &self.locks
    }

    /// Directory a project lives in, whether or not it exists yet
    pub fn project_dir(&self, project: &SafeName) -> PathBuf {
        self.root.join(project)
    }

    /// Resolve a raw project name to its existing directory
    pub async fn existing_project(&self, project: &str) -> Result<(SafeName, PathBuf)> {
        let name = SafeName::parse(project)?;
        let dir = self.project_dir(&name);
        if !is_dir(&dir).await {
            return Err(ProjectError::NotFound(format!("project '{}'", name)));
        }
        Ok((name, dir))
    }

    /// Names of all projects, sorted
    pub async fn list_projects(&self) -> Result<Vec<String>> {
        let mut projects = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            // Skips staging directories and anything not created through the store
            if let Some(name) = entry.file_name().to_str() {
                if SafeName::parse(name).is_ok_and(|n| n.as_str() == name) {
                    projects.push(name.to_string());
                }
            }
        }
        projects.sort();
        Ok(projects)
    }

    /// Create a project with a starter document titled `display_name`
    pub async fn create_project(&self, display_name: &str) -> Result<SafeName> {
        let name = SafeName::parse(display_name)?;
        let _guard = self.locks.acquire(&name).await;

        let dir = self.project_dir(&name);
        if tokio::fs::try_exists(&dir).await? {
            return Err(ProjectError::AlreadyExists(format!("project '{}'", name)));
        }

        tokio::fs::create_dir(&dir).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                ProjectError::AlreadyExists(format!("project '{}'", name))
            }
            _ => e.into(),
        })?;
        tokio::fs::write(
            dir.join(DEFAULT_DOCUMENT),
            default_document(display_name.trim(), &name),
        )
        .await?;

        info!("Created project {}", name);
        Ok(name)
    }

    /// Recursively remove a project
    pub async fn delete_project(&self, project: &str) -> Result<SafeName> {
        let name = SafeName::parse(project)?;
        let _guard = self.locks.acquire(&name).await;

        let (name, dir) = self.existing_project(name.as_str()).await?;
        tokio::fs::remove_dir_all(&dir).await?;

        info!("Deleted project {}", name);
        Ok(name)
    }

    /// Top-level files of a project: `.tex` sources first, then the rest
    pub async fn list_files(&self, project: &str) -> Result<Vec<String>> {
        let (_, dir) = self.existing_project(project).await?;

        let mut sources = Vec::new();
        let mut others = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // Only files the other operations can address are listed
            let Some(raw) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let name = match SafeName::parse(&raw) {
                Ok(name) if name.as_str() == raw => name,
                _ => continue,
            };
            if name.has_extension("tex") {
                sources.push(raw);
            } else {
                others.push(raw);
            }
        }

        sources.sort();
        others.sort();
        sources.extend(others);
        Ok(sources)
    }

    pub async fn read_file(&self, project: &str, file: &str) -> Result<String> {
        let path = self.existing_file(project, file).await?;
        tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::InvalidData => {
                ProjectError::InvalidRequest(format!("'{}' is not a UTF-8 text file", file))
            }
            ErrorKind::NotFound => ProjectError::NotFound(format!("file '{}'", file)),
            _ => e.into(),
        })
    }

    /// Create or overwrite a file with `content`
    pub async fn write_file(&self, project: &str, file: &str, content: &str) -> Result<SafeName> {
        let file_name = SafeName::parse(file)?;
        let _guard = self.locks.acquire(&SafeName::parse(project)?).await;
        let (project_name, dir) = self.existing_project(project).await?;

        let path = dir.join(&file_name);
        if is_dir(&path).await {
            return Err(ProjectError::InvalidName(format!(
                "'{}' is a directory",
                file_name
            )));
        }
        tokio::fs::write(&path, content).await?;

        debug!(
            "Saved {}/{} ({} bytes)",
            project_name,
            file_name,
            content.len()
        );
        Ok(file_name)
    }

    /// Create a new file, failing if one with that name exists
    pub async fn create_file(&self, project: &str, file: &str, content: &str) -> Result<SafeName> {
        let file_name = SafeName::parse(file)?;
        let _guard = self.locks.acquire(&SafeName::parse(project)?).await;
        let (project_name, dir) = self.existing_project(project).await?;

        let path = dir.join(&file_name);
        let mut handle = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    ProjectError::AlreadyExists(format!("file '{}'", file_name))
                }
                _ => e.into(),
            })?;
        handle.write_all(content.as_bytes()).await?;
        handle.flush().await?;

        info!("Created file {}/{}", project_name, file_name);
        Ok(file_name)
    }

    pub async fn delete_file(&self, project: &str, file: &str) -> Result<SafeName> {
        let file_name = SafeName::parse(file)?;
        let _guard = self.locks.acquire(&SafeName::parse(project)?).await;

        let path = self.existing_file(project, file).await?;
        tokio::fs::remove_file(&path).await?;

        info!("Deleted file {}/{}", project, file_name);
        Ok(file_name)
    }

    /// Path of the compiled PDF for `entry`, if a compile has produced one
    pub async fn pdf_path(&self, project: &str, entry: &str) -> Result<PathBuf> {
        let entry = SafeName::parse(entry)?;
        let (_, dir) = self.existing_project(project).await?;

        let pdf = dir.join(entry.with_extension("pdf"));
        if !is_file(&pdf).await {
            return Err(ProjectError::NotFound(format!(
                "PDF for '{}'; compile first",
                entry
            )));
        }
        Ok(pdf)
    }

    async fn existing_file(&self, project: &str, file: &str) -> Result<PathBuf> {
        let file_name = SafeName::parse(file)?;
        let (_, dir) = self.existing_project(project).await?;

        let path = dir.join(&file_name);
        if !is_file(&path).await {
            return Err(ProjectError::NotFound(format!("file '{}'", file_name)));
        }
        Ok(path)
    }
}

pub(crate) async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

pub(crate) async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Starter article for a new project
fn default_document(title: &str, name: &SafeName) -> String {
    format!(
        "\\documentclass{{article}}\n\
         \\title{{{}}}\n\
         \\author{{OpenTeX Editor}}\n\
         \\date{{\\today}}\n\
         \n\
         \\begin{{document}}\n\
         \\maketitle\n\
         \\section{{Intro}}\n\
         This is a new project: {}\n\
         \\end{{document}}\n",
        escape_latex(title),
        escape_latex(name.as_str())
    )
}

/// Escape characters that are special in LaTeX text mode
fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '{' | '}' | '$' | '&' | '#' | '_' | '%' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            _ => out.push(c),
        }
    }
    out
}
