//! Application state for the OpenTeX server

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use opentex_core::{ArchiveImporter, CompileInvoker, CompilerConfig, GitPublisher, ProjectStore};

/// Resolved server settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Holds `projects/` and `git_config/`
    pub data_dir: PathBuf,
    pub compiler: CompilerConfig,
    /// Request body limit, which bounds archive uploads
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            compiler: CompilerConfig::default(),
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }

    pub fn git_config_dir(&self) -> PathBuf {
        self.data_dir.join("git_config")
    }

    pub fn compile_timeout(&self) -> Duration {
        self.compiler.timeout
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProjectStore>,
    pub importer: ArchiveImporter,
    pub compiler: Arc<CompileInvoker>,
    pub git: Arc<GitPublisher>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub async fn new(config: &ServerConfig) -> opentex_core::Result<Self> {
        tracing::info!("Data directory: {}", config.data_dir.display());

        let store = ProjectStore::open(config.projects_dir()).await?;

        Ok(Self {
            store: Arc::new(store),
            importer: ArchiveImporter::new(),
            compiler: Arc::new(CompileInvoker::new(config.compiler.clone())),
            git: Arc::new(GitPublisher::new(config.git_config_dir())),
            max_upload_bytes: config.max_upload_bytes,
        })
    }
}
