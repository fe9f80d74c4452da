//! Publishing projects to a Git host over SSH
//!
//! One global configuration (host, user, key pair) is stored under the
//! data directory. A push initializes the project as a repository if
//! needed, commits everything and pushes `main` to
//! `git@<host>:<user>/<project>-tex.git`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{ProjectError, Result};
use crate::name::SafeName;
use crate::store::ProjectStore;

const CONFIG_FILE: &str = "config.json";
const PRIVATE_KEY_FILE: &str = "id_rsa";
const PUBLIC_KEY_FILE: &str = "id_rsa.pub";

/// Per-command limit for git invocations
pub const GIT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Return code recorded when a git step could not run at all
const STEP_NOT_RUN: i32 = 99;

/// Stored publisher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitConfig {
    pub host: String,
    pub username: String,
    pub private_key_path: PathBuf,
    pub public_key_path: Option<PathBuf>,
}

/// Outcome of a single git command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitStep {
    pub cmd: Vec<String>,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

impl GitStep {
    pub fn succeeded(&self) -> bool {
        self.returncode == 0
    }
}

/// Result of a push: every step that ran, and whether the push landed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushReport {
    pub ok: bool,
    pub remote: String,
    pub steps: Vec<GitStep>,
}

/// Git configuration storage and the push workflow
#[derive(Debug, Clone)]
pub struct GitPublisher {
    config_dir: PathBuf,
    git_bin: PathBuf,
}

impl GitPublisher {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            git_bin: PathBuf::from("git"),
        }
    }

    /// Use a different git executable
    pub fn with_git_bin(mut self, git_bin: impl Into<PathBuf>) -> Self {
        self.git_bin = git_bin.into();
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Store host, user and key pair, replacing any previous configuration
    pub async fn save_config(
        &self,
        host: &str,
        username: &str,
        private_key: &str,
        public_key: Option<&str>,
    ) -> Result<GitConfig> {
        let host = host.trim();
        let username = username.trim();
        if host.is_empty() || username.is_empty() || private_key.trim().is_empty() {
            return Err(ProjectError::InvalidRequest(
                "host, username and private_key required".to_string(),
            ));
        }
        // Both end up inside an ssh URL and a git config value
        let valid = |s: &str| {
            s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        };
        if !valid(host) || !valid(username) {
            return Err(ProjectError::InvalidRequest(
                "host and username may only contain letters, digits, '.', '-' and '_'"
                    .to_string(),
            ));
        }

        tokio::fs::create_dir_all(&self.config_dir).await?;

        let private_key_path = self.config_dir.join(PRIVATE_KEY_FILE);
        write_private(&private_key_path, normalize_key(private_key).as_bytes()).await?;

        let public_key_path = match public_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                let path = self.config_dir.join(PUBLIC_KEY_FILE);
                tokio::fs::write(&path, normalize_key(key)).await?;
                Some(path)
            }
            None => None,
        };

        let config = GitConfig {
            host: host.to_string(),
            username: username.to_string(),
            private_key_path,
            public_key_path,
        };
        tokio::fs::write(
            self.config_dir.join(CONFIG_FILE),
            serde_json::to_vec_pretty(&config)?,
        )
        .await?;

        info!("Saved git config for {}@{}", config.username, config.host);
        Ok(config)
    }

    /// Stored configuration, or `None` if never configured
    pub async fn load_config(&self) -> Result<Option<GitConfig>> {
        match tokio::fs::read(self.config_dir.join(CONFIG_FILE)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Commit the project and push it to its remote
    pub async fn push(&self, store: &ProjectStore, project: &str) -> Result<PushReport> {
        let _guard = store.locks().acquire(&SafeName::parse(project)?).await;
        let (name, dir) = store.existing_project(project).await?;
        let config = self
            .load_config()
            .await?
            .ok_or(ProjectError::GitNotConfigured)?;

        let remote = format!("git@{}:{}/{}-tex.git", config.host, config.username, name);
        let ssh_command = format!(
            "ssh -i {} -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null",
            config.private_key_path.display()
        );
        let mut report = PushReport {
            ok: false,
            remote: remote.clone(),
            steps: Vec::new(),
        };

        info!("Pushing {} to {}", name, remote);

        if tokio::fs::try_exists(dir.join(".git")).await? {
            self.run(&dir, &ssh_command, &["branch", "-M", "main"]).await;
        } else {
            let init = self.run(&dir, &ssh_command, &["init", "-b", "main"]).await;
            let failed = !init.succeeded();
            report.steps.push(init);
            if failed {
                return Ok(report);
            }
        }

        let email = format!("{}@{}", config.username, config.host);
        self.run(&dir, &ssh_command, &["config", "user.name", &config.username])
            .await;
        self.run(&dir, &ssh_command, &["config", "user.email", &email])
            .await;

        report
            .steps
            .push(self.run(&dir, &ssh_command, &["add", "."]).await);

        let message = format!("Auto commit from OpenTeX Editor ({})", Utc::now().to_rfc3339());
        report.steps.push(
            self.run(&dir, &ssh_command, &["commit", "-m", &message])
                .await,
        );

        self.run(&dir, &ssh_command, &["remote", "remove", "origin"])
            .await;
        report.steps.push(
            self.run(&dir, &ssh_command, &["remote", "add", "origin", &remote])
                .await,
        );

        let push = self
            .run(&dir, &ssh_command, &["push", "-u", "origin", "main"])
            .await;
        report.ok = push.succeeded();
        report.steps.push(push);

        if report.ok {
            info!("Pushed {} to {}", name, remote);
        } else {
            warn!("Push of {} to {} failed", name, remote);
        }
        Ok(report)
    }

    /// Run one git command; failures are recorded, not raised
    async fn run(&self, dir: &Path, ssh_command: &str, args: &[&str]) -> GitStep {
        let mut cmd = vec![self.git_bin.display().to_string()];
        cmd.extend(args.iter().map(|a| a.to_string()));

        let output = Command::new(&self.git_bin)
            .args(args)
            .current_dir(dir)
            .env("GIT_SSH_COMMAND", ssh_command)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(GIT_STEP_TIMEOUT, output).await {
            Ok(Ok(output)) => GitStep {
                cmd,
                returncode: output.status.code().unwrap_or(STEP_NOT_RUN),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Ok(Err(e)) => GitStep {
                cmd,
                returncode: STEP_NOT_RUN,
                stdout: String::new(),
                stderr: e.to_string(),
            },
            Err(_) => GitStep {
                cmd,
                returncode: STEP_NOT_RUN,
                stdout: String::new(),
                stderr: format!("timed out after {}s", GIT_STEP_TIMEOUT.as_secs()),
            },
        }
    }
}

/// Keys pasted through a browser often lose their trailing newline
fn normalize_key(key: &str) -> String {
    let mut key = key.replace("\r\n", "\n");
    if !key.ends_with('\n') {
        key.push('\n');
    }
    key
}

#[cfg(unix)]
async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::write(path, contents).await?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}
