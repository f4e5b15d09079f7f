//! Precondition checks run before any output is written

use crate::error::ValidationError;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};

/// Check that `input` may be patched into `output`
///
/// Checks run in a fixed order and stop at the first failure:
/// input exists and is readable, output is given, the two paths differ,
/// output does not exist yet, input has exactly `expected_size` bytes.
pub fn validate(input: &Path, output: &Path, expected_size: u64) -> Result<(), ValidationError> {
    let metadata = fs::metadata(input)
        .ok()
        .filter(|m| m.is_file() && File::open(input).is_ok())
        .ok_or_else(|| ValidationError::InputNotFound(input.to_path_buf()))?;

    if output.as_os_str().is_empty() {
        return Err(ValidationError::OutputNotSpecified);
    }

    if same_file_path(input, output) {
        return Err(ValidationError::SourceEqualsTarget);
    }

    // symlink_metadata so a dangling link at the output path still counts
    if fs::symlink_metadata(output).is_ok() {
        return Err(ValidationError::OutputAlreadyExists(output.to_path_buf()));
    }

    let actual = metadata.len();
    if actual != expected_size {
        return Err(ValidationError::InvalidInputSize {
            expected: expected_size,
            actual,
        });
    }

    Ok(())
}

/// Whether two paths name the same file once made absolute
pub fn same_file_path(a: &Path, b: &Path) -> bool {
    resolve_path(a) == resolve_path(b)
}

/// Absolute form of a path that may not exist yet
///
/// Existing paths are canonicalized. Otherwise the path is made absolute and
/// `.`/`..` are folded lexically, and the parent directory is canonicalized
/// when it exists so symlinked directories still compare equal.
fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }

    let absolute = std::path::absolute(path)
        .map(|p| normalize(&p))
        .unwrap_or_else(|_| normalize(path));

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => fs::canonicalize(parent)
            .map(|p| p.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
