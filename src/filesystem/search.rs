use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use ignore::WalkBuilder;
use regex::Regex;

use crate::protocol::{
    ForgeError, GlobHit, GlobResults, GrepMatch, GrepResults, MatchContext,
};

use super::path_utils::{map_io_error, resolve_path};
use super::security::Sandbox;
use super::validation;

/// Bytes inspected when sniffing for binary content
const BINARY_SNIFF_LEN: usize = 8192;

const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Clone)]
pub struct FileSearch {
    sandbox: Arc<Sandbox>,
}

impl FileSearch {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }

    /// Find entries under `base_path` whose relative path matches `pattern`
    pub async fn glob_search(
        &self,
        pattern: &str,
        base_path: Option<&str>,
        max_results: usize,
        include_dirs: bool,
    ) -> Result<GlobResults, ForgeError> {
        validation::validate_glob_pattern(pattern)?;
        let pattern = compile_glob(pattern)?;
        let (base, metadata) = self.search_root(base_path).await?;
        if !metadata.is_dir() {
            return Err(ForgeError::invalid_path(format!(
                "Base path is not a directory: {}",
                base.display()
            )));
        }

        let sandbox = self.sandbox.clone();
        tokio::task::spawn_blocking(move || {
            let matches = walk_matching(&sandbox, &base, &pattern, include_dirs);
            let total_matches = matches.len();

            let results: Vec<GlobHit> = matches
                .into_iter()
                .take(max_results)
                .filter_map(|path| {
                    let meta = std::fs::metadata(&path).ok()?;
                    Some(GlobHit {
                        name: path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                        path: path.display().to_string(),
                        is_file: meta.is_file(),
                        is_directory: meta.is_dir(),
                        size: meta.len(),
                    })
                })
                .collect();

            GlobResults {
                count: results.len(),
                total_matches,
                truncated: total_matches > max_results,
                results,
            }
        })
        .await
        .map_err(|e| ForgeError::unknown(format!("Glob search failed: {}", e)))
    }

    /// Regex search over a file, or over the files of a directory matching `glob`
    pub async fn grep_search(
        &self,
        pattern: &str,
        path: Option<&str>,
        glob: Option<&str>,
        case_sensitive: bool,
        max_results: usize,
        context_lines: usize,
    ) -> Result<GrepResults, ForgeError> {
        let regex = validation::validate_regex_pattern(pattern, case_sensitive)?;
        let file_glob = match glob {
            Some(glob) => {
                validation::validate_glob_pattern(glob)?;
                compile_glob(glob)?
            }
            None => compile_glob("**/*")?,
        };

        let (root, metadata) = self.search_root(path).await?;

        let sandbox = self.sandbox.clone();
        let pattern = pattern.to_string();
        tokio::task::spawn_blocking(move || {
            let files = if metadata.is_file() {
                vec![root]
            } else {
                walk_matching(&sandbox, &root, &file_glob, false)
            };
            let max_size = sandbox.config().max_file_size;

            let mut matches = Vec::new();
            for file in files {
                if matches.len() >= max_results {
                    break;
                }
                let Some(text) = read_text(&file, max_size) else {
                    continue;
                };
                grep_text(
                    &file,
                    &text,
                    &regex,
                    context_lines,
                    max_results,
                    &mut matches,
                );
            }

            GrepResults {
                pattern,
                count: matches.len(),
                truncated: matches.len() >= max_results,
                matches,
            }
        })
        .await
        .map_err(|e| ForgeError::unknown(format!("Grep search failed: {}", e)))
    }

    /// Literal text search
    pub async fn find_by_content(
        &self,
        text: &str,
        path: Option<&str>,
        file_pattern: Option<&str>,
        max_results: usize,
    ) -> Result<GrepResults, ForgeError> {
        self.grep_search(&regex::escape(text), path, file_pattern, true, max_results, 0)
            .await
    }

    async fn search_root(
        &self,
        path: Option<&str>,
    ) -> Result<(PathBuf, std::fs::Metadata), ForgeError> {
        let root = resolve_path(&self.sandbox, path.unwrap_or("."))?;
        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| map_io_error(e, &root))?;
        Ok((root, metadata))
    }
}

fn compile_glob(pattern: &str) -> Result<Pattern, ForgeError> {
    Pattern::new(pattern).map_err(|e| {
        ForgeError::invalid_path(format!("Invalid glob pattern: {}", e)).with_detail("pattern", pattern)
    })
}

/// Walk `root` (bounded by the sandbox depth limit, denied subtrees pruned)
/// and return every entry whose root-relative path matches `pattern`.
fn walk_matching(
    sandbox: &Arc<Sandbox>,
    root: &Path,
    pattern: &Pattern,
    include_dirs: bool,
) -> Vec<PathBuf> {
    let filter_sandbox = sandbox.clone();
    let walker = WalkBuilder::new(root)
        .max_depth(Some(sandbox.config().max_depth as usize))
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .follow_links(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .filter_entry(move |entry| !filter_sandbox.is_denied(entry.path()))
        .build();

    let mut matches = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if !pattern.matches_with(&relative, PATH_MATCH) {
            continue;
        }

        // Re-validate so a symlinked entry cannot leak outside the sandbox
        let resolved = match sandbox.validate_path(&path.to_string_lossy()) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::debug!("Search skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let is_dir = resolved.is_dir();
        if is_dir && !include_dirs {
            continue;
        }
        if !is_dir && !resolved.is_file() {
            continue;
        }
        matches.push(resolved);
    }
    matches
}

/// UTF-8 contents of a regular text file; binary, oversized or unreadable files yield None
fn read_text(path: &Path, max_size: u64) -> Option<String> {
    let meta = std::fs::metadata(path).ok()?;
    if !meta.is_file() || meta.len() > max_size {
        return None;
    }
    let bytes = std::fs::read(path).ok()?;
    let sniff = &bytes[..bytes.len().min(BINARY_SNIFF_LEN)];
    if sniff.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

fn grep_text(
    file: &Path,
    text: &str,
    regex: &Regex,
    context_lines: usize,
    max_results: usize,
    matches: &mut Vec<GrepMatch>,
) {
    let lines: Vec<&str> = text.split('\n').collect();
    for (i, line) in lines.iter().enumerate() {
        if matches.len() >= max_results {
            return;
        }
        let Some(found) = regex.find(line) else {
            continue;
        };

        let context = if context_lines > 0 {
            let before_start = i.saturating_sub(context_lines);
            let after_end = (i + context_lines + 1).min(lines.len());
            Some(MatchContext {
                before: lines[before_start..i].iter().map(|l| l.trim().to_string()).collect(),
                after: lines[i + 1..after_end]
                    .iter()
                    .map(|l| l.trim().to_string())
                    .collect(),
            })
        } else {
            None
        };

        matches.push(GrepMatch {
            file: file.display().to_string(),
            line: i + 1,
            column: line[..found.start()].chars().count() + 1,
            matched: line.trim().to_string(),
            context,
        });
    }
}
