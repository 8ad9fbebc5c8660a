use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_DEPTH: u32 = 20;

/// Sandbox policy for file system access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Allowed root directories, as given (relative, absolute or `~`-prefixed)
    pub allowed_paths: Vec<String>,

    /// Denied glob patterns, matched against absolute and cwd-relative forms
    pub denied_paths: Option<Vec<String>>,

    /// When false, a symlink's real target must itself be inside the sandbox
    pub follow_symlinks: bool,

    /// Maximum file size in bytes
    pub max_file_size: u64,

    /// Maximum recursion depth for recursive directory operations
    pub max_depth: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![".".to_string()],
            denied_paths: None,
            follow_symlinks: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl SandboxConfig {
    pub fn with_allowed_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_paths: paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Merge a partial update; returns true when `allowed_paths` changed
    pub fn apply(&mut self, patch: SandboxConfigPatch) -> bool {
        let mut roots_changed = false;
        if let Some(allowed) = patch.allowed_paths {
            roots_changed = allowed != self.allowed_paths;
            self.allowed_paths = allowed;
        }
        if let Some(denied) = patch.denied_paths {
            self.denied_paths = Some(denied);
        }
        if let Some(follow) = patch.follow_symlinks {
            self.follow_symlinks = follow;
        }
        if let Some(size) = patch.max_file_size {
            self.max_file_size = size;
        }
        if let Some(depth) = patch.max_depth {
            self.max_depth = depth;
        }
        if self.allowed_paths.is_empty() {
            self.allowed_paths = vec![".".to_string()];
        }
        roots_changed
    }
}

/// Partial sandbox policy; unset fields leave the current value alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfigPatch {
    pub allowed_paths: Option<Vec<String>>,
    pub denied_paths: Option<Vec<String>>,
    pub follow_symlinks: Option<bool>,
    pub max_file_size: Option<u64>,
    pub max_depth: Option<u32>,
}

impl SandboxConfigPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Where project templates are looked up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    pub paths: Vec<String>,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            paths: vec!["./templates".to_string()],
        }
    }
}
