//! The dashboard and editor pages
//!
//! Both are static documents driving the JSON API from the browser.

use axum::{http::StatusCode, response::Html};

const DASHBOARD_HTML: &str = include_str!("../static/dashboard.html");
const EDITOR_HTML: &str = include_str!("../static/editor.html");

/// Handler: GET /
pub async fn handle_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// Handler: GET /editor
///
/// The project to open is read from `?project=` by the page itself.
pub async fn handle_editor() -> Html<&'static str> {
    Html(EDITOR_HTML)
}

/// Handler: GET /favicon.ico
pub async fn handle_favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}
