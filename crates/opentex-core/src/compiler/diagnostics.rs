//! Error and warning extraction from LaTeX compiler output

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// `./main.tex:12: Undefined control sequence.` (from -file-line-error)
    static ref FILE_LINE_ERROR: Regex =
        Regex::new(r"^(?P<file>[^:\s][^:]*\.(?:tex|sty|cls|bib|ltx)):(?P<line>\d+): (?P<msg>.+)$").unwrap();
    /// `! LaTeX Error: File `x.sty' not found.`
    static ref BANG_ERROR: Regex = Regex::new(r"^! (?P<msg>.+)$").unwrap();
    /// `l.12 \foo` context line following a `!` error
    static ref LINE_CONTEXT: Regex = Regex::new(r"^l\.(?P<line>\d+)").unwrap();
    /// `LaTeX Warning: ...` and `Package hyperref Warning: ...`
    static ref WARNING: Regex =
        Regex::new(r"^(?:LaTeX|Package \S+|Class \S+) Warning: (?P<msg>.+?)(?: on input line (?P<line>\d+))?\.?$").unwrap();
}

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// One error or warning found in the compile log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileDiagnostic {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number (1-indexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub severity: DiagnosticSeverity,
}

impl CompileDiagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
            severity: DiagnosticSeverity::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            ..Self::error(message)
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

/// Scan a compile log; errors come first, duplicates across passes dropped
pub fn parse_log(log: &str) -> Vec<CompileDiagnostic> {
    let mut errors: Vec<CompileDiagnostic> = Vec::new();
    let mut warnings: Vec<CompileDiagnostic> = Vec::new();
    // A `!` error waiting for its `l.N` context line
    let mut pending: Option<CompileDiagnostic> = None;

    for line in log.lines() {
        let line = line.trim_end();

        if let Some(caps) = FILE_LINE_ERROR.captures(line) {
            flush(&mut pending, &mut errors);
            let diag = CompileDiagnostic::error(&caps["msg"])
                .with_file(&caps["file"])
                .with_line(caps["line"].parse().unwrap_or_default());
            push_unique(&mut errors, diag);
        } else if let Some(caps) = BANG_ERROR.captures(line) {
            flush(&mut pending, &mut errors);
            pending = Some(CompileDiagnostic::error(&caps["msg"]));
        } else if let Some(caps) = LINE_CONTEXT.captures(line) {
            if let Some(mut diag) = pending.take() {
                diag.line = caps["line"].parse().ok();
                push_unique(&mut errors, diag);
            }
        } else if let Some(caps) = WARNING.captures(line) {
            let mut diag = CompileDiagnostic::warning(&caps["msg"]);
            if let Some(n) = caps.name("line") {
                diag.line = n.as_str().parse().ok();
            }
            push_unique(&mut warnings, diag);
        }
    }
    flush(&mut pending, &mut errors);

    errors.extend(warnings);
    errors
}

/// True if the log contains any error marker
pub fn has_errors(log: &str) -> bool {
    parse_log(log).iter().any(CompileDiagnostic::is_error)
}

fn flush(pending: &mut Option<CompileDiagnostic>, errors: &mut Vec<CompileDiagnostic>) {
    if let Some(diag) = pending.take() {
        push_unique(errors, diag);
    }
}

fn push_unique(list: &mut Vec<CompileDiagnostic>, diag: CompileDiagnostic) {
    if !list.contains(&diag) {
        list.push(diag);
    }
}
