//! Endpoint classification: program stage or pipe reference.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::namespace;

/// Looks up executables by name.
pub trait PathResolver: Send + Sync {
    /// Full path of `program` if it names an executable.
    fn resolve(&self, program: &str) -> Option<PathBuf>;
}

/// Resolves programs against a colon-separated search path.
#[derive(Debug, Clone)]
pub struct SearchPath {
    path_var: String,
}

impl SearchPath {
    pub fn new(path_var: impl Into<String>) -> Self {
        Self {
            path_var: path_var.into(),
        }
    }

    /// Uses the process's `PATH`.
    pub fn from_env() -> Self {
        Self::new(std::env::var("PATH").unwrap_or_default())
    }
}

impl Default for SearchPath {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PathResolver for SearchPath {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        if program.contains('/') {
            let path = Path::new(program);
            return is_executable(path).then(|| path.to_path_buf());
        }
        resolve_in_path(program, &self.path_var)
    }
}

/// Find `name` in a colon-separated list of directories.
pub fn resolve_in_path(name: &str, path_var: &str) -> Option<PathBuf> {
    path_var
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new(dir).join(name))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        path.metadata()
            .map(|m| m.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        true
    }
}

/// One classified pipeline endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A fully qualified pipe name.
    Pipe(String),
    /// An external program stage.
    Program {
        /// Resolved executable.
        path: PathBuf,
        /// Words as given, program name first.
        argv: Vec<String>,
    },
}

impl Endpoint {
    pub fn pipe_name(&self) -> Option<&str> {
        match self {
            Endpoint::Pipe(name) => Some(name),
            Endpoint::Program { .. } => None,
        }
    }

    pub fn is_program(&self) -> bool {
        matches!(self, Endpoint::Program { .. })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Pipe(name) => f.write_str(name),
            Endpoint::Program { argv, .. } => f.write_str(&shell_words::join(argv)),
        }
    }
}

/// Classify a raw endpoint string.
///
/// The endpoint is split into shell words, and if the first word resolves
/// to an executable it is a program, whatever its arguments contain. Anything
/// else is a pipe, qualified into `ns` unless it already names a namespace.
/// A bare pipe name that happens to match an executable is therefore treated
/// as a program.
pub fn classify(ns: &str, raw: &str, resolver: &dyn PathResolver) -> Endpoint {
    if let Ok(argv) = shell_words::split(raw)
        && let Some(first) = argv.first()
        && let Some(path) = resolver.resolve(first)
    {
        tracing::debug!(endpoint = raw, path = %path.display(), "endpoint is a program");
        return Endpoint::Program { path, argv };
    }

    Endpoint::Pipe(namespace::qualify(ns, raw))
}
