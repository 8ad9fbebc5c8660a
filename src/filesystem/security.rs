use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glob_match::glob_match;
use path_clean::PathClean;
use serde_json::Value;

use crate::protocol::{ErrorCode, ForgeError};

use super::config::{SandboxConfig, SandboxConfigPatch};

/// Absolute allow-list roots derived from `SandboxConfig::allowed_paths`.
///
/// Roots that exist also contribute their canonical form. Aliases only
/// admit the real location of an already admitted path, never a caller path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAllowSet {
    roots: Vec<PathBuf>,
    aliases: Vec<PathBuf>,
}

impl ResolvedAllowSet {
    fn resolve(allowed_paths: &[String]) -> Self {
        let mut roots = Vec::with_capacity(allowed_paths.len());
        let mut aliases = Vec::new();

        for entry in allowed_paths {
            let Some(root) = absolutize(&expand_home(entry)) else {
                tracing::warn!("Cannot resolve allowed path without a working directory: {}", entry);
                continue;
            };

            match std::fs::canonicalize(&root) {
                Ok(real) if real != root => aliases.push(real),
                Ok(_) => {}
                Err(_) => tracing::debug!("Allowed path does not exist yet: {}", root.display()),
            }
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        Self { roots, aliases }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Component-wise containment: `/data-evil` is not inside `/data`
    pub fn contains(&self, candidate: &Path) -> bool {
        self.roots.iter().any(|root| candidate.starts_with(root))
    }

    /// Containment of a symlink-resolved location; canonical roots count too
    pub fn contains_real(&self, real: &Path) -> bool {
        self.contains(real) || self.aliases.iter().any(|root| real.starts_with(root))
    }
}

struct SandboxState {
    config: Arc<SandboxConfig>,
    resolved: Option<Arc<ResolvedAllowSet>>,
}

struct Snapshot {
    config: Arc<SandboxConfig>,
    allow: Arc<ResolvedAllowSet>,
}

/// Access-control gate every file operation passes through before I/O.
///
/// Readers work on an `Arc` snapshot of the policy and resolved roots, so a
/// concurrent `update_config` is never observed half-applied.
pub struct Sandbox {
    state: RwLock<SandboxState>,
}

impl Sandbox {
    pub fn new(mut config: SandboxConfig) -> Self {
        if config.allowed_paths.is_empty() {
            config.allowed_paths = vec![".".to_string()];
        }
        Self {
            state: RwLock::new(SandboxState {
                config: Arc::new(config),
                resolved: None,
            }),
        }
    }

    /// Resolve the allow-list. Resolution happens on the first call and
    /// again after `update_config` changes `allowed_paths`.
    pub fn initialize(&self) {
        let snapshot = self.snapshot();
        tracing::debug!(
            "Sandbox initialized with roots: {:?}",
            snapshot.allow.roots()
        );
    }

    pub fn config(&self) -> SandboxConfig {
        self.read_state().config.as_ref().clone()
    }

    pub fn allowed_paths(&self) -> Vec<PathBuf> {
        self.snapshot().allow.roots().to_vec()
    }

    /// Merge a partial policy; changed roots are re-resolved on next use
    pub fn update_config(&self, patch: SandboxConfigPatch) {
        let mut state = self.write_state();
        let mut config = state.config.as_ref().clone();
        if config.apply(patch) {
            state.resolved = None;
        }
        state.config = Arc::new(config);
        tracing::info!("Sandbox configuration updated");
    }

    /// Full validation pipeline; returns the absolute, normalized path
    pub fn validate_path(&self, target: &str) -> Result<PathBuf, ForgeError> {
        if has_path_traversal(target) {
            tracing::debug!("Path traversal rejected: {}", target);
            return Err(ForgeError::outside_sandbox("Path traversal detected")
                .with_detail("path", target));
        }

        let snapshot = self.snapshot();

        let resolved = absolutize(Path::new(target)).ok_or_else(|| {
            ForgeError::outside_sandbox("Path cannot be resolved without a working directory")
                .with_detail("path", target)
        })?;

        if !self.permits(&snapshot, &resolved) {
            tracing::debug!("Path outside sandbox: {}", resolved.display());
            return Err(
                ForgeError::outside_sandbox("Path is outside allowed directories")
                    .with_detail("path", display(&resolved))
                    .with_detail(
                        "allowed_paths",
                        Value::Array(
                            snapshot
                                .allow
                                .roots()
                                .iter()
                                .map(|root| Value::from(display(root)))
                                .collect(),
                        ),
                    ),
            );
        }

        if !snapshot.config.follow_symlinks {
            if let Some(real) = real_location(&resolved) {
                if real != resolved && !self.permits_real(&snapshot, &real) {
                    tracing::debug!(
                        "Symlink escape rejected: {} -> {}",
                        resolved.display(),
                        real.display()
                    );
                    return Err(ForgeError::outside_sandbox(
                        "Symlink points outside allowed directories",
                    )
                    .with_detail("symlink", display(&resolved))
                    .with_detail("target", display(&real)));
                }
            }
        }

        Ok(resolved)
    }

    /// Containment and deny-list check without touching symlinks
    pub fn is_path_allowed(&self, target: &Path) -> bool {
        let snapshot = self.snapshot();
        match absolutize(target) {
            Some(candidate) => self.permits(&snapshot, &candidate),
            None => false,
        }
    }

    /// Deny-list check alone, for filtering entries of an already validated tree
    pub fn is_denied(&self, target: &Path) -> bool {
        let snapshot = self.snapshot();
        match absolutize(target) {
            Some(candidate) => matches_denied(snapshot.config.denied_paths.as_deref(), &candidate),
            None => true,
        }
    }

    pub fn validate_file_size(&self, size: u64) -> Result<(), ForgeError> {
        let limit = self.read_state().config.max_file_size;
        if size > limit {
            return Err(ForgeError::new(
                ErrorCode::FileTooLarge,
                format!("File size {} bytes exceeds limit of {} bytes", size, limit),
            )
            .with_detail("size", size)
            .with_detail("limit", limit));
        }
        Ok(())
    }

    pub fn validate_depth(&self, depth: u32) -> Result<(), ForgeError> {
        let limit = self.read_state().config.max_depth;
        if depth > limit {
            return Err(ForgeError::new(
                ErrorCode::DepthExceeded,
                format!("Recursion depth {} exceeds limit of {}", depth, limit),
            )
            .with_detail("depth", depth)
            .with_detail("limit", limit));
        }
        Ok(())
    }

    fn permits(&self, snapshot: &Snapshot, candidate: &Path) -> bool {
        snapshot.allow.contains(candidate)
            && !matches_denied(snapshot.config.denied_paths.as_deref(), candidate)
    }

    fn permits_real(&self, snapshot: &Snapshot, real: &Path) -> bool {
        snapshot.allow.contains_real(real)
            && !matches_denied(snapshot.config.denied_paths.as_deref(), real)
    }

    fn snapshot(&self) -> Snapshot {
        {
            let state = self.read_state();
            if let Some(allow) = &state.resolved {
                return Snapshot {
                    config: state.config.clone(),
                    allow: allow.clone(),
                };
            }
        }

        let mut state = self.write_state();
        let allow = match &state.resolved {
            Some(allow) => allow.clone(),
            None => {
                let allow = Arc::new(ResolvedAllowSet::resolve(&state.config.allowed_paths));
                state.resolved = Some(allow.clone());
                allow
            }
        };
        Snapshot {
            config: state.config.clone(),
            allow,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SandboxState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SandboxState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// True when `..` segments climb above the path's own base after
/// lexical normalization.
pub fn has_path_traversal(target: &str) -> bool {
    let normalized = Path::new(target).clean();
    let mut depth: i64 = 0;
    for component in normalized.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    false
}

/// Glob test used by the deny list: case-insensitive, dot-files included
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let pattern = pattern.replace('\\', "/").to_lowercase();
    let path = path.to_lowercase();
    if glob_match(&pattern, &path) {
        return true;
    }
    // A trailing `/**` also covers the directory itself
    pattern
        .strip_suffix("/**")
        .is_some_and(|dir| !dir.is_empty() && glob_match(dir, &path))
}

fn matches_denied(patterns: Option<&[String]>, candidate: &Path) -> bool {
    let Some(patterns) = patterns else {
        return false;
    };
    if patterns.is_empty() {
        return false;
    }

    let absolute = normalize_for_match(candidate);
    let relative = std::env::current_dir()
        .ok()
        .map(|cwd| normalize_for_match(&relative_to(&cwd, candidate)));

    patterns.iter().any(|pattern| {
        pattern_matches(pattern, &absolute)
            || relative
                .as_deref()
                .is_some_and(|relative| pattern_matches(pattern, relative))
    })
}

/// Absolute, lexically normalized form of `path` against the working directory
pub fn absolutize(path: &Path) -> Option<PathBuf> {
    if path.is_absolute() {
        return Some(path.clean());
    }
    let cwd = std::env::current_dir().ok()?;
    Some(cwd.join(path).clean())
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// `target` expressed relative to `base`, `..` included
pub fn relative_to(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component> = base.components().collect();
    let target: Vec<Component> = target.components().collect();
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base.len() {
        relative.push("..");
    }
    for component in &target[common..] {
        relative.push(component.as_os_str());
    }
    relative
}

/// Where `path` physically lives once every existing symlink on it is
/// resolved. Dangling links resolve lexically against their parent.
fn real_location(path: &Path) -> Option<PathBuf> {
    let existing = path
        .ancestors()
        .find(|ancestor| std::fs::symlink_metadata(ancestor).is_ok())?;
    let rest = path.strip_prefix(existing).ok()?;

    let real = match std::fs::canonicalize(existing) {
        Ok(real) => real,
        Err(_) => dangling_target(existing)?,
    };
    Some(real.join(rest))
}

fn dangling_target(link: &Path) -> Option<PathBuf> {
    let target = std::fs::read_link(link).ok()?;
    let parent = link.parent()?;
    let parent = std::fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
    Some(parent.join(target).clean())
}

fn normalize_for_match(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
