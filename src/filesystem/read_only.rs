use std::sync::atomic::{AtomicBool, Ordering};

use crate::protocol::{ErrorCode, ForgeError};

/// Tools that mutate the filesystem
pub const WRITE_TOOLS: &[&str] = &[
    "write_file",
    "create_directory",
    "copy_file",
    "move_file",
    "delete_file",
    "scaffold_project",
];

pub fn is_write_tool(name: &str) -> bool {
    WRITE_TOOLS.contains(&name)
}

/// Process-wide switch that blocks every write tool
#[derive(Debug, Default)]
pub struct ReadOnlyGate {
    state: AtomicBool,
}

impl ReadOnlyGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: AtomicBool::new(enabled),
        }
    }

    pub fn enable(&self) {
        self.state.store(true, Ordering::SeqCst);
        tracing::info!("Read-only mode enabled");
    }

    pub fn disable(&self) {
        self.state.store(false, Ordering::SeqCst);
        tracing::info!("Read-only mode disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.state.load(Ordering::SeqCst)
    }

    pub fn validate_write_allowed(&self) -> Result<(), ForgeError> {
        if self.is_enabled() {
            return Err(ForgeError::new(
                ErrorCode::WriteDisabled,
                "Write operations are disabled in read-only mode",
            )
            .with_detail("mode", "read-only")
            .with_detail(
                "hint",
                "Set MCP_FILE_FORGE_READ_ONLY=false to enable write operations",
            ));
        }
        Ok(())
    }
}
