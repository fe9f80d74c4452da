//! Core of the OpenTeX editor backend
//!
//! This crate owns everything that touches the filesystem or spawns
//! processes:
//! - Project storage (one directory per project)
//! - ZIP archive import into new projects
//! - LaTeX compilation through an external compiler, with timeout
//! - Publishing projects to a Git host
//!
//! Every project or file name passes through [`SafeName`] before a path is
//! built from it, and every mutation of a project holds that project's
//! writer lock (see [`lock::ProjectLocks`]).

pub mod archive;
pub mod compiler;
pub mod error;
pub mod git;
pub mod lock;
pub mod name;
pub mod store;

pub use archive::ArchiveImporter;
pub use compiler::{CompileDiagnostic, CompileInvoker, CompileOutput, CompilerConfig};
pub use error::{ProjectError, Result};
pub use git::{GitConfig, GitPublisher, PushReport};
pub use name::SafeName;
pub use store::ProjectStore;
