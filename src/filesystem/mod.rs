//! Sandboxed file system service

pub mod config;
pub mod operations;
pub mod path_utils;
pub mod platform;
pub mod read_only;
pub mod scaffold;
pub mod search;
pub mod security;
pub mod validation;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use config::{SandboxConfig, TemplateConfig};
use operations::FileOperations;
use read_only::ReadOnlyGate;
use scaffold::Scaffolder;
use search::FileSearch;
use security::Sandbox;

/// Owns the sandbox, the read-only gate and every handler object.
/// Built once at startup and shared as `Arc<FileSystemService>`.
pub struct FileSystemService {
    sandbox: Arc<Sandbox>,
    gate: Arc<ReadOnlyGate>,
    ops: FileOperations,
    search: FileSearch,
    scaffold: Scaffolder,
}

impl FileSystemService {
    pub fn new(sandbox: SandboxConfig, templates: &TemplateConfig, read_only: bool) -> Self {
        let sandbox = Arc::new(Sandbox::new(sandbox));
        sandbox.initialize();
        let gate = Arc::new(ReadOnlyGate::new(read_only));
        let ops = FileOperations::new(sandbox.clone(), gate.clone());
        let search = FileSearch::new(sandbox.clone());
        let scaffold = Scaffolder::new(sandbox.clone(), gate.clone(), templates);
        Self {
            sandbox,
            gate,
            ops,
            search,
            scaffold,
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        self.sandbox.as_ref()
    }

    pub fn gate(&self) -> &ReadOnlyGate {
        self.gate.as_ref()
    }

    pub fn ops(&self) -> &FileOperations {
        &self.ops
    }

    pub fn search(&self) -> &FileSearch {
        &self.search
    }

    pub fn scaffold(&self) -> &Scaffolder {
        &self.scaffold
    }
}
