use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use tokio::fs;
use walkdir::WalkDir;

use crate::protocol::{
    Comparison, DirectoryEntry, DiskUsage, ErrorCode, ExistsKind, ExistsResult, FileStat,
    FileSummary, ForgeError, OperationOutcome, ReadResult, UsageEntry,
};

use super::path_utils::{self, map_io_error, resolve_path, sibling_with_suffix};
use super::platform;
use super::read_only::ReadOnlyGate;
use super::security::Sandbox;
use super::validation::{self, format_bytes};

/// Per-file cap used by `read_multiple`, in KiB
pub const READ_MULTIPLE_MAX_KB: u64 = 10_240;

const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Clone)]
pub struct FileOperations {
    sandbox: Arc<Sandbox>,
    gate: Arc<ReadOnlyGate>,
}

impl FileOperations {
    pub fn new(sandbox: Arc<Sandbox>, gate: Arc<ReadOnlyGate>) -> Self {
        Self { sandbox, gate }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Read a file as text, optionally sliced to a 1-based inclusive line range
    pub async fn read_file(
        &self,
        path: &str,
        encoding: &str,
        start_line: Option<u64>,
        end_line: Option<u64>,
        max_size_kb: u64,
    ) -> Result<String, ForgeError> {
        validation::validate_path_input(path)?;
        let encoding = validation::validate_encoding(encoding)?;
        validation::validate_line_range(start_line, end_line)?;
        let path = self.sandbox.validate_path(path)?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| map_io_error(e, &path))?;
        if !metadata.is_file() {
            return Err(ForgeError::invalid_path(format!(
                "Path is not a file: {}",
                path.display()
            )));
        }

        let size = metadata.len();
        self.sandbox.validate_file_size(size)?;
        let limit = max_size_kb.saturating_mul(1024);
        if size > limit {
            return Err(ForgeError::new(
                ErrorCode::FileTooLarge,
                format!("File size {} bytes exceeds limit of {} bytes", size, limit),
            )
            .with_detail("size", size)
            .with_detail("limit", limit));
        }

        let bytes = fs::read(&path).await.map_err(|e| map_io_error(e, &path))?;
        let content = encoding.decode(&bytes);

        if start_line.is_none() && end_line.is_none() {
            return Ok(content);
        }
        Ok(slice_lines(&content, start_line, end_line))
    }

    /// List a directory, optionally recursing up to `max_depth` levels
    pub async fn read_directory(
        &self,
        path: &str,
        recursive: bool,
        max_depth: u32,
        include_hidden: bool,
        pattern: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, ForgeError> {
        let pattern = match pattern {
            Some(raw) => Some(Pattern::new(raw).map_err(|e| {
                ForgeError::invalid_path(format!("Invalid name pattern: {}", e))
                    .with_detail("pattern", raw)
            })?),
            None => None,
        };

        let depth = if recursive {
            self.sandbox.validate_depth(max_depth)?;
            if max_depth == 0 {
                return Err(ForgeError::new(
                    ErrorCode::DepthExceeded,
                    "Maximum recursion depth 0 exceeded",
                ));
            }
            max_depth as usize
        } else {
            1
        };

        let root = resolve_path(&self.sandbox, path)?;
        let metadata = fs::metadata(&root)
            .await
            .map_err(|e| map_io_error(e, &root))?;
        if !metadata.is_dir() {
            return Err(ForgeError::invalid_path(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        let sandbox = self.sandbox.clone();
        tokio::task::spawn_blocking(move || {
            let walker = WalkDir::new(&root)
                .min_depth(1)
                .max_depth(depth)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| {
                    entry.depth() == 0
                        || ((include_hidden || !platform::is_hidden(entry.path()))
                            && !sandbox.is_denied(entry.path()))
                });

            let mut entries = Vec::new();
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::debug!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some(pattern) = &pattern {
                    if !pattern.matches_with(&name, NAME_MATCH) {
                        continue;
                    }
                }
                let file_type = entry.file_type();
                let size = if file_type.is_file() {
                    entry.metadata().ok().map(|m| m.len())
                } else {
                    None
                };
                entries.push(DirectoryEntry {
                    name,
                    path: entry.path().display().to_string(),
                    is_file: file_type.is_file(),
                    is_directory: file_type.is_dir(),
                    size,
                });
            }
            entries
        })
        .await
        .map_err(|e| ForgeError::unknown(format!("Directory listing failed: {}", e)))
    }

    /// Read several files; failures are reported per path unless `fail_on_error`
    pub async fn read_multiple(
        &self,
        paths: &[String],
        encoding: &str,
        fail_on_error: bool,
    ) -> Result<Vec<ReadResult>, ForgeError> {
        let mut results = Vec::with_capacity(paths.len());
        for path in paths {
            match self
                .read_file(path, encoding, None, None, READ_MULTIPLE_MAX_KB)
                .await
            {
                Ok(content) => results.push(ReadResult {
                    path: path.clone(),
                    success: true,
                    content: Some(content),
                    error: None,
                }),
                Err(e) if fail_on_error => return Err(e),
                Err(e) => {
                    tracing::debug!("read_multiple: {} failed: {}", path, e);
                    results.push(ReadResult {
                        path: path.clone(),
                        success: false,
                        content: None,
                        error: Some(e),
                    });
                }
            }
        }
        Ok(results)
    }

    /// Write through a temp file and rename into place
    pub async fn write_file(
        &self,
        path: &str,
        content: &str,
        encoding: &str,
        create_dirs: bool,
        overwrite: bool,
        backup: bool,
    ) -> Result<OperationOutcome, ForgeError> {
        self.gate.validate_write_allowed()?;
        validation::validate_path_input(path)?;
        let encoding = validation::validate_encoding(encoding)?;
        let path = self.sandbox.validate_path(path)?;

        let bytes = encoding.encode(content)?;
        self.sandbox.validate_file_size(bytes.len() as u64)?;

        let existing = fs::metadata(&path).await.ok();
        if let Some(meta) = &existing {
            if meta.is_dir() {
                return Err(ForgeError::invalid_path(format!(
                    "Expected a file but got a directory: {}",
                    path.display()
                )));
            }
            if !overwrite {
                return Err(ForgeError::already_exists(format!(
                    "File already exists and overwrite is false: {}",
                    path.display()
                )));
            }
        }

        if create_dirs {
            path_utils::create_parent_dirs_safe(&path).await?;
        }

        let mut outcome = OperationOutcome::at(path.display().to_string());

        if existing.is_some() && backup {
            let backup_path = sibling_with_suffix(&path, "bak");
            let backup_path = self
                .sandbox
                .validate_path(&backup_path.to_string_lossy())?;
            fs::copy(&path, &backup_path)
                .await
                .map_err(|e| map_io_error(e, &backup_path))?;
            outcome.backup = Some(backup_path.display().to_string());
        }

        let temp_path = sibling_with_suffix(&path, &format!("tmp-{}", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(map_io_error(e, &path));
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(map_io_error(e, &path));
        }

        tracing::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        outcome.bytes_written = Some(bytes.len() as u64);
        Ok(outcome)
    }

    /// Create directory; an existing directory is reported as success
    pub async fn create_directory(
        &self,
        path: &str,
        recursive: bool,
    ) -> Result<OperationOutcome, ForgeError> {
        self.gate.validate_write_allowed()?;
        let path = resolve_path(&self.sandbox, path)?;
        let shown = path.display().to_string();

        if let Ok(meta) = fs::metadata(&path).await {
            if meta.is_dir() {
                return Ok(OperationOutcome::at(shown).with_note("Directory already exists"));
            }
            return Err(ForgeError::already_exists(format!(
                "A file already exists at: {}",
                shown
            )));
        }

        if recursive {
            path_utils::validate_parent_components(&path).await?;
            fs::create_dir_all(&path)
                .await
                .map_err(|e| map_io_error(e, &path))?;
        } else {
            fs::create_dir(&path)
                .await
                .map_err(|e| map_io_error(e, &path))?;
        }

        Ok(OperationOutcome::at(shown))
    }

    /// Copy file or directory
    pub async fn copy_file(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
        recursive: bool,
    ) -> Result<OperationOutcome, ForgeError> {
        self.gate.validate_write_allowed()?;
        let source = resolve_path(&self.sandbox, source)?;
        let destination = resolve_path(&self.sandbox, destination)?;

        let metadata = fs::metadata(&source)
            .await
            .map_err(|e| map_io_error(e, &source))?;

        if !overwrite && fs::symlink_metadata(&destination).await.is_ok() {
            return Err(ForgeError::already_exists(format!(
                "Destination already exists and overwrite is false: {}",
                destination.display()
            )));
        }

        if metadata.is_dir() {
            if !recursive {
                return Err(ForgeError::invalid_path(
                    "Source is a directory but recursive is false",
                ));
            }
            if destination.starts_with(&source) {
                return Err(ForgeError::invalid_path(
                    "Cannot copy a directory into itself",
                ));
            }
            self.copy_dir_recursive(source.clone(), destination.clone(), 1)
                .await?;
        } else {
            path_utils::create_parent_dirs_safe(&destination).await?;
            fs::copy(&source, &destination)
                .await
                .map_err(|e| map_io_error(e, &source))?;
        }

        Ok(OperationOutcome::transfer(
            source.display().to_string(),
            destination.display().to_string(),
        ))
    }

    /// Move or rename file or directory
    pub async fn move_file(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<OperationOutcome, ForgeError> {
        self.gate.validate_write_allowed()?;
        let source = resolve_path(&self.sandbox, source)?;
        let destination = resolve_path(&self.sandbox, destination)?;

        fs::symlink_metadata(&source)
            .await
            .map_err(|e| map_io_error(e, &source))?;

        if !overwrite && fs::symlink_metadata(&destination).await.is_ok() {
            return Err(ForgeError::already_exists(format!(
                "Destination already exists and overwrite is false: {}",
                destination.display()
            )));
        }

        path_utils::create_parent_dirs_safe(&destination).await?;
        fs::rename(&source, &destination)
            .await
            .map_err(|e| map_io_error(e, &source))?;

        Ok(OperationOutcome::transfer(
            source.display().to_string(),
            destination.display().to_string(),
        ))
    }

    /// Delete file or directory. `force` swallows I/O failures only.
    pub async fn delete_file(
        &self,
        path: &str,
        recursive: bool,
        force: bool,
    ) -> Result<OperationOutcome, ForgeError> {
        self.gate.validate_write_allowed()?;
        let path = resolve_path(&self.sandbox, path)?;
        let shown = path.display().to_string();

        let metadata = match fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if force => {
                tracing::debug!("delete_file: ignoring {} ({})", shown, e);
                return Ok(OperationOutcome::at(shown).with_note("Force mode - errors ignored"));
            }
            Err(e) => return Err(map_io_error(e, &path)),
        };

        if metadata.is_dir() && !recursive {
            let mut read_dir = fs::read_dir(&path)
                .await
                .map_err(|e| map_io_error(e, &path))?;
            let has_entries = read_dir
                .next_entry()
                .await
                .map_err(|e| map_io_error(e, &path))?
                .is_some();
            if has_entries {
                return Err(ForgeError::new(
                    ErrorCode::DirectoryNotEmpty,
                    format!("Directory is not empty and recursive is false: {}", shown),
                ));
            }
        }

        let removed = if metadata.is_dir() {
            if recursive {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_dir(&path).await
            }
        } else {
            fs::remove_file(&path).await
        };

        match removed {
            Ok(()) => Ok(OperationOutcome::at(shown)),
            Err(e) if force => {
                tracing::debug!("delete_file: ignoring {} ({})", shown, e);
                Ok(OperationOutcome::at(shown).with_note("Force mode - errors ignored"))
            }
            Err(e) => Err(map_io_error(e, &path)),
        }
    }

    pub async fn file_stat(&self, path: &str) -> Result<FileStat, ForgeError> {
        let path = resolve_path(&self.sandbox, path)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| map_io_error(e, &path))?;
        let is_symlink = fs::symlink_metadata(&path)
            .await
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let epoch = std::time::UNIX_EPOCH;

        Ok(FileStat {
            path: path.display().to_string(),
            name,
            size: metadata.len(),
            size_formatted: format_bytes(metadata.len()),
            is_file: metadata.is_file(),
            is_directory: metadata.is_dir(),
            is_symlink,
            created: metadata.created().ok().map(platform::format_timestamp),
            modified: platform::format_timestamp(metadata.modified().unwrap_or(epoch)),
            accessed: platform::format_timestamp(metadata.accessed().unwrap_or(epoch)),
            permissions: Some(platform::format_permissions(&metadata)),
        })
    }

    pub async fn file_exists(
        &self,
        path: &str,
        kind: ExistsKind,
    ) -> Result<ExistsResult, ForgeError> {
        let path = resolve_path(&self.sandbox, path)?;
        let shown = path.display().to_string();

        let Ok(metadata) = fs::metadata(&path).await else {
            return Ok(ExistsResult {
                exists: false,
                path: shown,
                is_file: None,
                is_directory: None,
                reason: None,
                actual_type: None,
            });
        };

        let mismatch = match kind {
            ExistsKind::File if !metadata.is_file() => Some("Path exists but is not a file"),
            ExistsKind::Directory if !metadata.is_dir() => {
                Some("Path exists but is not a directory")
            }
            _ => None,
        };

        Ok(match mismatch {
            Some(reason) => ExistsResult {
                exists: false,
                path: shown,
                is_file: None,
                is_directory: None,
                reason: Some(reason.to_string()),
                actual_type: Some(platform::kind_of(&metadata).to_string()),
            },
            None => ExistsResult {
                exists: true,
                path: shown,
                is_file: Some(metadata.is_file()),
                is_directory: Some(metadata.is_dir()),
                reason: None,
                actual_type: None,
            },
        })
    }

    /// Total size of a tree plus a per-entry breakdown down to `max_depth`
    pub async fn get_disk_usage(&self, path: &str, max_depth: u32) -> Result<DiskUsage, ForgeError> {
        let root = resolve_path(&self.sandbox, path)?;
        let metadata = fs::metadata(&root)
            .await
            .map_err(|e| map_io_error(e, &root))?;

        if !metadata.is_dir() {
            return Ok(DiskUsage {
                path: root.display().to_string(),
                total_size: metadata.len(),
                total_size_formatted: format_bytes(metadata.len()),
                file_count: 1,
                directory_count: 0,
                breakdown: Vec::new(),
            });
        }

        let walk_limit = self.sandbox.config().max_depth as usize;
        let breakdown_depth = (max_depth as usize).min(walk_limit);
        let sandbox = self.sandbox.clone();

        tokio::task::spawn_blocking(move || {
            usage_of(&root, walk_limit, breakdown_depth, &sandbox)
        })
        .await
        .map_err(|e| ForgeError::unknown(format!("Disk usage walk failed: {}", e)))
    }

    pub async fn compare_files(&self, path1: &str, path2: &str) -> Result<Comparison, ForgeError> {
        let first = resolve_path(&self.sandbox, path1)?;
        let second = resolve_path(&self.sandbox, path2)?;

        let meta1 = fs::metadata(&first).await.map_err(|_| {
            ForgeError::not_found(format!("First path not found: {}", path1))
        })?;
        let meta2 = fs::metadata(&second).await.map_err(|_| {
            ForgeError::not_found(format!("Second path not found: {}", path2))
        })?;

        let epoch = std::time::UNIX_EPOCH;
        let modified1 = meta1.modified().unwrap_or(epoch);
        let modified2 = meta2.modified().unwrap_or(epoch);
        let difference = meta1.len() as i64 - meta2.len() as i64;

        Ok(Comparison {
            path1: first.display().to_string(),
            path2: second.display().to_string(),
            same_type: meta1.is_file() == meta2.is_file(),
            same_size: meta1.len() == meta2.len(),
            file1: summarize(&meta1, modified1),
            file2: summarize(&meta2, modified2),
            newer_file: if modified1 > modified2 { "path1" } else { "path2" }.to_string(),
            size_difference: difference,
            size_difference_formatted: format_bytes(difference.unsigned_abs()),
        })
    }

    /// Copy a tree entry by entry; each source entry is re-validated so a
    /// symlink inside the tree cannot pull outside content in.
    fn copy_dir_recursive<'a>(
        &'a self,
        source: PathBuf,
        destination: PathBuf,
        depth: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ForgeError>> + Send + 'a>>
    {
        Box::pin(async move {
            self.sandbox.validate_depth(depth)?;
            fs::create_dir_all(&destination)
                .await
                .map_err(|e| map_io_error(e, &destination))?;

            let mut read_dir = fs::read_dir(&source)
                .await
                .map_err(|e| map_io_error(e, &source))?;

            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| map_io_error(e, &source))?
            {
                let entry_path = entry.path();
                if let Err(e) = self.sandbox.validate_path(&entry_path.to_string_lossy()) {
                    tracing::debug!("copy_file: skipping {}: {}", entry_path.display(), e);
                    continue;
                }

                let dest_path = destination.join(entry.file_name());
                let meta = fs::metadata(&entry_path)
                    .await
                    .map_err(|e| map_io_error(e, &entry_path))?;
                if meta.is_dir() {
                    self.copy_dir_recursive(entry_path, dest_path, depth + 1)
                        .await?;
                } else {
                    fs::copy(&entry_path, &dest_path)
                        .await
                        .map_err(|e| map_io_error(e, &entry_path))?;
                }
            }

            Ok(())
        })
    }
}

fn slice_lines(content: &str, start_line: Option<u64>, end_line: Option<u64>) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let start = start_line.unwrap_or(1).saturating_sub(1) as usize;
    let end = end_line
        .map(|end| (end as usize).min(lines.len()))
        .unwrap_or(lines.len());
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}

fn summarize(metadata: &std::fs::Metadata, modified: std::time::SystemTime) -> FileSummary {
    FileSummary {
        is_file: metadata.is_file(),
        size: metadata.len(),
        size_formatted: format_bytes(metadata.len()),
        modified: platform::format_timestamp(modified),
    }
}

fn usage_of(root: &Path, walk_limit: usize, breakdown_depth: usize, sandbox: &Sandbox) -> DiskUsage {
    let mut total_size = 0u64;
    let mut file_count = 0u64;
    let mut directory_count = 0u64;
    // breakdown candidates: path -> (label, size)
    let mut listed: HashMap<PathBuf, (String, u64)> = HashMap::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(walk_limit.max(1))
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !sandbox.is_denied(entry.path()));

    for entry in walker.filter_map(Result::ok) {
        let file_type = entry.file_type();
        let name = entry.file_name().to_string_lossy().to_string();

        if file_type.is_dir() {
            directory_count += 1;
            if entry.depth() <= breakdown_depth {
                listed.insert(entry.path().to_path_buf(), (format!("{}/", name), 0));
            }
        } else if file_type.is_file() {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            total_size += size;
            file_count += 1;
            if entry.depth() <= breakdown_depth {
                listed.insert(entry.path().to_path_buf(), (name, size));
            }
            for ancestor in entry.path().ancestors().skip(1) {
                if ancestor == root {
                    break;
                }
                if let Some((_, dir_size)) = listed.get_mut(ancestor) {
                    *dir_size += size;
                }
            }
        }
    }

    let mut breakdown: Vec<UsageEntry> = listed
        .into_values()
        .map(|(name, size)| UsageEntry {
            name,
            size,
            size_formatted: format_bytes(size),
        })
        .collect();
    breakdown.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));

    DiskUsage {
        path: root.display().to_string(),
        total_size,
        total_size_formatted: format_bytes(total_size),
        file_count,
        directory_count,
        breakdown,
    }
}
