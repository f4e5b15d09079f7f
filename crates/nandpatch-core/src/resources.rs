//! Payload file lookup
//!
//! The core never decides where payload files live. Callers hand it a
//! [`PayloadResolver`]; [`BundledResources`] covers the usual case of
//! payloads shipped next to the executable or in the working directory.

use std::env;
use std::path::{Path, PathBuf};

/// Maps a payload file name to a path on disk
pub trait PayloadResolver {
    fn resolve(&self, file_name: &str) -> PathBuf;
}

impl<F> PayloadResolver for F
where
    F: Fn(&str) -> PathBuf,
{
    fn resolve(&self, file_name: &str) -> PathBuf {
        self(file_name)
    }
}

/// Resolver for payloads bundled with the application
///
/// Lookup order:
/// 1. the explicit directory, if one was configured
/// 2. the directory holding the running executable, if the file exists there
/// 3. the current working directory
#[derive(Debug, Clone, Default)]
pub struct BundledResources {
    dir: Option<PathBuf>,
}

impl BundledResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always resolve inside `dir`
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn exe_dir() -> Option<PathBuf> {
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
    }
}

impl PayloadResolver for BundledResources {
    fn resolve(&self, file_name: &str) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.join(file_name);
        }

        if let Some(candidate) = Self::exe_dir().map(|dir| dir.join(file_name)) {
            if candidate.is_file() {
                return candidate;
            }
        }

        match env::current_dir() {
            Ok(cwd) => cwd.join(file_name),
            Err(_) => PathBuf::from(file_name),
        }
    }
}
