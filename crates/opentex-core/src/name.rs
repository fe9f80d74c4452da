//! Filesystem-safe names for projects and files
//!
//! Validation is lexical only, so it runs before any path is built.

use std::fmt;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{ProjectError, Result};

/// Longest name accepted (most filesystems cap a path component at 255 bytes)
pub const MAX_NAME_LEN: usize = 255;

lazy_static! {
    /// Whitespace runs collapsed to a single underscore
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref ALLOWED: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

/// A single path component that cannot escape its parent directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SafeName(String);

impl SafeName {
    /// Normalize whitespace and validate a user-supplied name
    ///
    /// Runs of whitespace become `_`. Any other character outside
    /// `[A-Za-z0-9_.-]` rejects the name instead of being stripped.
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = WHITESPACE.replace_all(raw.trim(), "_").into_owned();

        if normalized.is_empty() {
            return Err(ProjectError::InvalidName("name is empty".to_string()));
        }
        if normalized.len() > MAX_NAME_LEN {
            return Err(ProjectError::InvalidName(format!(
                "name longer than {} bytes",
                MAX_NAME_LEN
            )));
        }
        if !ALLOWED.is_match(&normalized) {
            return Err(ProjectError::InvalidName(format!(
                "'{}' may only contain letters, digits, '_', '.' and '-'",
                raw
            )));
        }
        if normalized.starts_with('.') || normalized.contains("..") {
            return Err(ProjectError::InvalidName(format!(
                "'{}' must not start with '.' or contain '..'",
                raw
            )));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name without its final extension
    pub fn stem(&self) -> &str {
        Path::new(&self.0)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.0)
    }

    pub fn has_extension(&self, ext: &str) -> bool {
        Path::new(&self.0)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Sibling name sharing this stem, e.g. `paper.tex` -> `paper.pdf`
    pub fn with_extension(&self, ext: &str) -> SafeName {
        SafeName(format!("{}.{}", self.stem(), ext))
    }
}

impl fmt::Display for SafeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for SafeName {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}
