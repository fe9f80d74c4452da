//! API handlers for the OpenTeX server
//!
//! Provides REST endpoints for:
//! - Project listing, creation and deletion
//! - Reading, saving, creating and deleting project files
//! - ZIP upload as a new project
//! - Compilation and PDF download
//! - Git publishing

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, ConnectInfo, Multipart, Path,
        Query, State,
    },
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use opentex_core::store::DEFAULT_DOCUMENT;
use opentex_core::{CompileDiagnostic, GitConfig, PushReport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServerError;
use crate::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "opentex-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Echo of what reached the server, for checking reverse proxy setups
#[derive(Serialize)]
pub struct TestMethodResponse {
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
    pub remote_addr: Option<String>,
}

/// Handler: GET/POST/PUT/DELETE /api/test_method
pub async fn handle_test_method(
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Json<TestMethodResponse> {
    Json(TestMethodResponse {
        method: method.to_string(),
        path: uri.path().to_string(),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        remote_addr: connect_info.map(|ConnectInfo(addr)| addr.to_string()),
    })
}

/// Generic success message
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// A project was created, uploaded or deleted
#[derive(Debug, Serialize, Deserialize)]
pub struct ProjectResponse {
    pub success: bool,
    pub message: String,
    pub project: String,
}

/// Files of one project
#[derive(Debug, Serialize, Deserialize)]
pub struct FileListResponse {
    pub project: String,
    pub files: Vec<String>,
}

/// Request body for POST /api/projects
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: Option<String>,
}

/// Handler: GET /api/projects
pub async fn handle_list_projects(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ServerError> {
    Ok(Json(state.store.list_projects().await?))
}

/// Handler: POST /api/projects
pub async fn handle_create_project(
    State(state): State<AppState>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ProjectResponse>), ServerError> {
    let Json(request) = payload?;
    let name = request
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ServerError::InvalidRequest("Project name required".to_string()))?;

    let project = state.store.create_project(&name).await?;
    info!("Created project {}", project);

    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse {
            success: true,
            message: "Project created".to_string(),
            project: project.to_string(),
        }),
    ))
}

/// Handler: DELETE /api/projects/:project, POST /api/projects/:project[/delete]
pub async fn handle_delete_project(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<ProjectResponse>, ServerError> {
    let project = state.store.delete_project(&project).await?;
    info!("Deleted project {}", project);

    Ok(Json(ProjectResponse {
        success: true,
        message: "Project deleted".to_string(),
        project: project.to_string(),
    }))
}

/// Handler: GET /api/projects/:project[/files]
pub async fn handle_list_files(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<FileListResponse>, ServerError> {
    let files = state.store.list_files(&project).await?;
    Ok(Json(FileListResponse { project, files }))
}

/// Request body for POST /api/projects/:project/files
#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// Handler: POST /api/projects/:project/files
pub async fn handle_create_file(
    State(state): State<AppState>,
    Path(project): Path<String>,
    payload: Result<Json<CreateFileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ServerError> {
    let Json(request) = payload?;
    let name = request
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ServerError::InvalidRequest("File name required".to_string()))?;

    let file = state
        .store
        .create_file(&project, &name, &request.content)
        .await?;

    Ok((
        StatusCode::CREATED,
        MessageResponse::new(format!("Created {}", file)),
    ))
}

/// Query for DELETE /api/projects/:project/files
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
}

/// Handler: DELETE /api/projects/:project/files?file=
pub async fn handle_delete_file(
    State(state): State<AppState>,
    Path(project): Path<String>,
    Query(query): Query<FileQuery>,
) -> Result<Json<MessageResponse>, ServerError> {
    let name = query
        .file
        .ok_or_else(|| ServerError::InvalidRequest("Query parameter 'file' required".to_string()))?;

    let file = state.store.delete_file(&project, &name).await?;
    Ok(MessageResponse::new(format!("Deleted {}", file)))
}

/// Handler: GET /api/projects/:project/:file
pub async fn handle_read_file(
    State(state): State<AppState>,
    Path((project, file)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let content = state.store.read_file(&project, &file).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    )
        .into_response())
}

/// Handler: POST/PUT /api/projects/:project/:file
///
/// The raw request body becomes the file's content.
pub async fn handle_save_file(
    State(state): State<AppState>,
    Path((project, file)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<MessageResponse>, ServerError> {
    let content = String::from_utf8(body.to_vec())
        .map_err(|_| ServerError::InvalidRequest("File content must be UTF-8".to_string()))?;

    let file = state.store.write_file(&project, &file, &content).await?;
    debug!("Saved {}/{} ({} bytes)", project, file, content.len());

    Ok(MessageResponse::new("File saved"))
}

/// Handler: POST /api/upload_zip
///
/// Multipart form with a `project_zip` file and an optional `project`
/// field naming the new project.
pub async fn handle_upload_zip(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ProjectResponse>), ServerError> {
    let mut multipart = multipart?;
    let mut archive: Option<(String, Bytes)> = None;
    let mut project: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("project_zip") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                archive = Some((file_name, field.bytes().await?));
            }
            Some("project") => project = Some(field.text().await?),
            _ => debug!("Ignoring upload field {:?}", field_name),
        }
    }

    let (file_name, bytes) = archive
        .ok_or_else(|| ServerError::InvalidRequest("No file part 'project_zip'".to_string()))?;
    if file_name.is_empty() {
        return Err(ServerError::InvalidRequest("No selected file".to_string()));
    }
    let base_name = file_name.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = base_name
        .to_ascii_lowercase()
        .strip_suffix(".zip")
        .map(|lower| base_name[..lower.len()].to_string())
        .ok_or_else(|| {
            ServerError::InvalidRequest("Invalid file type, upload a .zip archive".to_string())
        })?;

    let requested = project
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(stem);

    info!("Importing {} ({} bytes) as {}", file_name, bytes.len(), requested);
    let project = state
        .importer
        .import(&state.store, &requested, bytes.to_vec())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse {
            success: true,
            message: "Project uploaded".to_string(),
            project: project.to_string(),
        }),
    ))
}

/// Request body for POST /api/compile
#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub project: Option<String>,
    pub file: Option<String>,
}

/// Handler: POST /api/compile
///
/// Returns the PDF inline. Failures carry the compiler log.
pub async fn handle_compile(
    State(state): State<AppState>,
    payload: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Response, ServerError> {
    let Json(request) = payload?;
    let project = request
        .project
        .ok_or_else(|| ServerError::InvalidRequest("Project name required".to_string()))?;

    let output = state
        .compiler
        .compile(&state.store, &project, request.file.as_deref())
        .await?;
    let pdf = tokio::fs::read(&output.pdf_path)
        .await
        .map_err(|e| ServerError::Internal(format!("reading compiled PDF: {}", e)))?;

    Ok(pdf_response(
        pdf,
        &format!("inline; filename=\"{}\"", output.entry.with_extension("pdf")),
        &output.warnings,
    ))
}

/// Query for GET /api/download_pdf
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub project: Option<String>,
    pub file: Option<String>,
}

/// Handler: GET /api/download_pdf?project=&file=
pub async fn handle_download_pdf(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ServerError> {
    let project = query.project.ok_or_else(|| {
        ServerError::InvalidRequest("Query parameter 'project' required".to_string())
    })?;
    let entry = query.file.unwrap_or_else(|| DEFAULT_DOCUMENT.to_string());

    let path = state.store.pdf_path(&project, &entry).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pdf = tokio::fs::read(&path)
        .await
        .map_err(|e| ServerError::Internal(format!("reading {}: {}", path.display(), e)))?;

    Ok(pdf_response(
        pdf,
        &format!("attachment; filename=\"{}\"", file_name),
        &[],
    ))
}

fn pdf_response(pdf: Vec<u8>, disposition: &str, warnings: &[CompileDiagnostic]) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE.as_str(), "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION.as_str(), disposition.to_string()),
            ("x-compile-warnings", warnings.len().to_string()),
        ],
        pdf,
    )
        .into_response()
}

/// Current Git publisher configuration (without key material)
#[derive(Debug, Serialize, Deserialize)]
pub struct GitConfigResponse {
    pub configured: bool,
    pub host: Option<String>,
    pub username: Option<String>,
    pub has_public_key: bool,
}

impl From<Option<GitConfig>> for GitConfigResponse {
    fn from(config: Option<GitConfig>) -> Self {
        match config {
            Some(config) => Self {
                configured: true,
                host: Some(config.host),
                username: Some(config.username),
                has_public_key: config.public_key_path.is_some(),
            },
            None => Self {
                configured: false,
                host: None,
                username: None,
                has_public_key: false,
            },
        }
    }
}

/// Handler: GET /api/git/config
pub async fn handle_get_git_config(
    State(state): State<AppState>,
) -> Result<Json<GitConfigResponse>, ServerError> {
    Ok(Json(state.git.load_config().await?.into()))
}

/// Handler: POST /api/git/config
///
/// Multipart form with `host`, `username`, `private_key` and an optional
/// `public_key`; keys may be sent as files or text.
pub async fn handle_save_git_config(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GitConfigResponse>, ServerError> {
    let mut multipart = multipart?;
    let mut host = String::new();
    let mut username = String::new();
    let mut private_key = String::new();
    let mut public_key: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("host") => host = field.text().await?,
            Some("username") => username = field.text().await?,
            Some("private_key") => private_key = field.text().await?,
            Some("public_key") => public_key = Some(field.text().await?),
            _ => debug!("Ignoring git config field {:?}", field_name),
        }
    }

    let config = state
        .git
        .save_config(&host, &username, &private_key, public_key.as_deref())
        .await?;

    Ok(Json(Some(config).into()))
}

/// Handler: POST /api/projects/:project/git_push
pub async fn handle_git_push(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> Result<Json<PushReport>, ServerError> {
    let report = state.git.push(&state.store, &project).await?;
    Ok(Json(report))
}
