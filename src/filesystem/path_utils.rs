use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::protocol::{ErrorCode, ForgeError};

use super::security::Sandbox;
use super::validation;

/// Syntactic check followed by the sandbox pipeline
pub fn resolve_path(sandbox: &Sandbox, raw: &str) -> Result<PathBuf, ForgeError> {
    validation::validate_path_input(raw)?;
    sandbox.validate_path(raw)
}

/// Classify an I/O failure on `path`
pub fn map_io_error(err: io::Error, path: &Path) -> ForgeError {
    let shown = path.display();
    match err.kind() {
        io::ErrorKind::NotFound => {
            ForgeError::not_found(format!("File or directory not found: {}", shown))
        }
        io::ErrorKind::PermissionDenied => ForgeError::new(
            ErrorCode::PermissionDenied,
            format!("Permission denied: {}", shown),
        ),
        io::ErrorKind::AlreadyExists => {
            ForgeError::already_exists(format!("File or directory already exists: {}", shown))
        }
        io::ErrorKind::DirectoryNotEmpty => ForgeError::new(
            ErrorCode::DirectoryNotEmpty,
            format!("Directory is not empty: {}", shown),
        ),
        io::ErrorKind::IsADirectory => {
            ForgeError::invalid_path(format!("Expected a file but got a directory: {}", shown))
        }
        io::ErrorKind::NotADirectory => {
            ForgeError::invalid_path(format!("Expected a directory but got a file: {}", shown))
        }
        _ => ForgeError::unknown(format!("Unexpected error: {}", err))
            .with_detail("path", shown.to_string()),
    }
}

/// Check if a path component exists and is a file (not a directory)
/// This catches a path like /path/to/file.txt/newdir before any mkdir
pub async fn validate_parent_components(path: &Path) -> Result<(), ForgeError> {
    let mut current = PathBuf::new();

    for component in path.components() {
        current.push(component);

        match tokio::fs::metadata(&current).await {
            Ok(meta) if meta.is_file() => {
                return Err(ForgeError::invalid_path(format!(
                    "Expected a directory but got a file: {}",
                    current.display()
                )));
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    Ok(())
}

/// Create the parent directories of `path`, refusing to tunnel through a file
pub async fn create_parent_dirs_safe(path: &Path) -> Result<(), ForgeError> {
    if let Some(parent) = path.parent() {
        validate_parent_components(parent).await?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| map_io_error(e, parent))?;
    }
    Ok(())
}

/// `name.ext` -> `name.ext.<suffix>` in the same directory
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("file"));
    file_name.push(".");
    file_name.push(suffix);
    path.with_file_name(file_name)
}
