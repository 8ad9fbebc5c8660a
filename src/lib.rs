//! Sandboxed file operations and project scaffolding served over MCP stdio.

pub mod config;
pub mod filesystem;
pub mod protocol;
pub mod server;
