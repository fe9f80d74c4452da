//! LaTeX compilation through an external compiler binary, with timeout

pub mod diagnostics;

pub use diagnostics::{has_errors, parse_log, CompileDiagnostic, DiagnosticSeverity};

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ProjectError, Result};
use crate::name::SafeName;
use crate::store::{is_file, ProjectStore, DEFAULT_DOCUMENT};

/// Entry files tried, in order, when the caller names none
const PREFERRED_ENTRIES: &[&str] = &[DEFAULT_DOCUMENT, "main.tex"];

/// How long to wait for output pipes after killing a timed-out compiler
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Compiler settings
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Compiler executable, looked up on PATH if not absolute
    pub latex_bin: PathBuf,
    /// Hard limit for one compiler pass
    pub timeout: Duration,
    /// Passes to run; later passes only run if the previous one succeeded
    pub passes: u8,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            latex_bin: PathBuf::from("pdflatex"),
            timeout: Duration::from_secs(30),
            passes: 2,
        }
    }
}

/// Result of a successful compile
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub entry: SafeName,
    pub pdf_path: PathBuf,
    pub log_path: PathBuf,
    pub log: String,
    /// Warnings from the log (a successful compile has no errors)
    pub warnings: Vec<CompileDiagnostic>,
    pub elapsed: Duration,
}

/// Runs the compiler against a project's entry file
#[derive(Debug, Clone, Default)]
pub struct CompileInvoker {
    config: CompilerConfig,
}

enum PassOutcome {
    Exited(ExitStatus),
    TimedOut,
}

impl CompileInvoker {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `project`, using `entry` or the project's default entry file
    pub async fn compile(
        &self,
        store: &ProjectStore,
        project: &str,
        entry: Option<&str>,
    ) -> Result<CompileOutput> {
        let project_name = SafeName::parse(project)?;
        let entry = entry.map(SafeName::parse).transpose()?;
        let _guard = store.locks().acquire(&project_name).await;

        let (_, dir) = store.existing_project(project).await?;
        let entry = match entry {
            Some(entry) => {
                if !is_file(&dir.join(&entry)).await {
                    return Err(ProjectError::NotFound(format!("file '{}'", entry)));
                }
                entry
            }
            None => default_entry(store, project).await?,
        };

        let pdf_path = dir.join(entry.with_extension("pdf"));
        let log_path = dir.join(format!("{}.compile.log", entry.stem()));

        // A stale PDF must not pass for this compile's output
        match tokio::fs::remove_file(&pdf_path).await {
            Ok(()) => debug!("Removed stale {}", pdf_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!("Compiling {}/{}", project_name, entry);
        let started = Instant::now();
        let mut log = String::new();

        for pass in 1..=self.config.passes.max(1) {
            let outcome = self.run_pass(&dir, &entry, pass, &mut log).await?;
            match outcome {
                PassOutcome::Exited(status) if status.success() => continue,
                PassOutcome::Exited(status) => {
                    tokio::fs::write(&log_path, &log).await?;
                    warn!(
                        "Compile of {}/{} failed on pass {} ({})",
                        project_name, entry, pass, status
                    );
                    return Err(ProjectError::CompileFailed {
                        diagnostics: parse_log(&log),
                        log,
                    });
                }
                PassOutcome::TimedOut => {
                    tokio::fs::write(&log_path, &log).await?;
                    warn!(
                        "Compile of {}/{} timed out on pass {}",
                        project_name, entry, pass
                    );
                    return Err(ProjectError::Timeout(self.config.timeout.as_secs()));
                }
            }
        }

        tokio::fs::write(&log_path, &log).await?;

        if !is_file(&pdf_path).await {
            log.push_str(&format!(
                "\n{} was not produced\n",
                entry.with_extension("pdf")
            ));
            tokio::fs::write(&log_path, &log).await?;
            return Err(ProjectError::CompileFailed {
                diagnostics: parse_log(&log),
                log,
            });
        }

        let elapsed = started.elapsed();
        info!(
            "Compiled {}/{} in {}ms",
            project_name,
            entry,
            elapsed.as_millis()
        );

        Ok(CompileOutput {
            entry,
            pdf_path,
            log_path,
            warnings: parse_log(&log),
            log,
            elapsed,
        })
    }

    /// Run one compiler pass, appending its output to `log`
    async fn run_pass(
        &self,
        dir: &Path,
        entry: &SafeName,
        pass: u8,
        log: &mut String,
    ) -> Result<PassOutcome> {
        let mut command = Command::new(&self.config.latex_bin);
        command
            .arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg("-file-line-error")
            .arg("-output-directory=.")
            .arg(entry.as_str())
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log.push_str(&format!(
            "$ {} {} (pass {})\n",
            self.config.latex_bin.display(),
            entry,
            pass
        ));

        let mut child = command.spawn().map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "failed to start compiler '{}': {}",
                    self.config.latex_bin.display(),
                    e
                ),
            )
        })?;

        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let outcome = match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(status) => PassOutcome::Exited(status?),
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill compiler: {}", e);
                }
                PassOutcome::TimedOut
            }
        };

        let grace = match outcome {
            PassOutcome::Exited(_) => None,
            PassOutcome::TimedOut => Some(PIPE_DRAIN_GRACE),
        };
        log.push_str(&String::from_utf8_lossy(&drain(stdout, grace).await));
        log.push_str(&String::from_utf8_lossy(&drain(stderr, grace).await));

        match &outcome {
            PassOutcome::Exited(status) => {
                log.push_str(&format!("\n[pass {} exited with {}]\n", pass, status));
            }
            PassOutcome::TimedOut => {
                log.push_str(&format!(
                    "\n[pass {} killed after {}s timeout]\n",
                    pass,
                    self.config.timeout.as_secs()
                ));
            }
        }

        Ok(outcome)
    }
}

/// Pick the entry file when the caller did not name one
async fn default_entry(store: &ProjectStore, project: &str) -> Result<SafeName> {
    let files: Vec<SafeName> = store
        .list_files(project)
        .await?
        .iter()
        .filter_map(|f| SafeName::parse(f).ok())
        .collect();

    PREFERRED_ENTRIES
        .iter()
        .find_map(|preferred| files.iter().find(|f| f.as_str() == *preferred))
        .or_else(|| files.iter().find(|f| f.has_extension("tex")))
        .cloned()
        .ok_or_else(|| {
            ProjectError::NotFound(format!("no .tex file in project '{}'", project))
        })
}

fn spawn_reader<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_end(&mut buf).await {
                debug!("Compiler pipe closed with error: {}", e);
            }
        }
        buf
    })
}

/// Collect a reader's output; a grandchild may hold the pipe open after a kill
async fn drain(reader: JoinHandle<Vec<u8>>, grace: Option<Duration>) -> Vec<u8> {
    let result = match grace {
        Some(grace) => match tokio::time::timeout(grace, reader).await {
            Ok(joined) => joined,
            Err(_) => return Vec::new(),
        },
        None => reader.await,
    };
    result.unwrap_or_default()
}
