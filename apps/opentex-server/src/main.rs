//! OpenTeX Server
//!
//! A self-hosted LaTeX editor backend. Projects live as directories on
//! disk; the server provides:
//!
//! - The dashboard and editor pages
//! - Project and file management over a JSON API
//! - ZIP upload of whole projects
//! - Compilation through an external LaTeX toolchain (pdflatex by default)
//! - Publishing projects to a Git host
//!
//! ## Architecture
//!
//! All filesystem and subprocess work lives in `opentex-core`; this binary
//! maps HTTP requests onto it and its errors onto status codes.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use opentex_core::CompilerConfig;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod error;
mod pages;
mod state;
#[cfg(test)]
mod tests;

use api::{
    handle_compile, handle_create_file, handle_create_project, handle_delete_file,
    handle_delete_project, handle_download_pdf, handle_get_git_config, handle_git_push,
    handle_health, handle_list_files, handle_list_projects, handle_read_file,
    handle_save_file, handle_save_git_config, handle_test_method, handle_upload_zip,
};
use pages::{handle_dashboard, handle_editor, handle_favicon};
pub use state::{AppState, ServerConfig};

/// Command-line arguments for the OpenTeX server
#[derive(Parser, Debug)]
#[command(name = "opentex-server")]
#[command(version, about = "Self-hosted LaTeX editor backend")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "OPENTEX_PORT", default_value = "5000")]
    port: u16,

    /// Host address to bind to
    #[arg(long, env = "OPENTEX_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Directory holding projects and the Git configuration
    #[arg(long, env = "OPENTEX_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// LaTeX compiler executable
    #[arg(long, env = "OPENTEX_LATEX_BIN", default_value = "pdflatex")]
    latex_bin: PathBuf,

    /// Compile timeout per pass, in seconds
    #[arg(long, env = "OPENTEX_COMPILE_TIMEOUT_SECS", default_value = "30")]
    compile_timeout_secs: u64,

    /// Compiler passes per compile
    #[arg(long, env = "OPENTEX_COMPILE_PASSES", default_value = "2")]
    compile_passes: u8,

    /// Maximum request body (and ZIP upload) size in megabytes
    #[arg(long, env = "OPENTEX_MAX_UPLOAD_MB", default_value = "64")]
    max_upload_mb: usize,

    /// Enable verbose logging
    #[arg(short, long, env = "OPENTEX_VERBOSE")]
    verbose: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            compiler: CompilerConfig {
                latex_bin: self.latex_bin.clone(),
                timeout: Duration::from_secs(self.compile_timeout_secs),
                passes: self.compile_passes,
            },
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
            ..ServerConfig::new(&self.data_dir)
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Pages
        .route("/", get(handle_dashboard))
        .route("/editor", get(handle_editor))
        .route("/favicon.ico", get(handle_favicon))
        // Diagnostics
        .route("/health", get(handle_health))
        .route(
            "/api/test_method",
            get(handle_test_method)
                .post(handle_test_method)
                .put(handle_test_method)
                .delete(handle_test_method),
        )
        // Projects
        .route(
            "/api/projects",
            get(handle_list_projects).post(handle_create_project),
        )
        .route(
            "/api/projects/:project",
            get(handle_list_files)
                .delete(handle_delete_project)
                .post(handle_delete_project),
        )
        .route("/api/projects/:project/delete", post(handle_delete_project))
        .route("/api/projects/:project/git_push", post(handle_git_push))
        // Files
        .route(
            "/api/projects/:project/files",
            get(handle_list_files)
                .post(handle_create_file)
                .delete(handle_delete_file),
        )
        .route(
            "/api/projects/:project/:file",
            get(handle_read_file)
                .post(handle_save_file)
                .put(handle_save_file),
        )
        // Upload, compile, download
        .route("/api/upload_zip", post(handle_upload_zip))
        .route("/api/compile", post(handle_compile))
        .route("/api/download_pdf", get(handle_download_pdf))
        // Git
        .route(
            "/api/git/config",
            get(handle_get_git_config).post(handle_save_git_config),
        )
        // Apply middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(state.max_upload_bytes)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("opentex_server={}", log_level).parse()?)
                .add_directive(format!("opentex_core={}", log_level).parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting OpenTeX server on {}:{}", args.host, args.port);

    let config = args.server_config();
    let state = AppState::new(&config).await?;
    let app = build_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "Compiler: {} ({} passes, {}s timeout)",
        config.compiler.latex_bin.display(),
        config.compiler.passes,
        config.compile_timeout().as_secs()
    );
    info!("Upload limit: {} bytes", config.max_upload_bytes);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
