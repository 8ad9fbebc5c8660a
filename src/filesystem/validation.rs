//! Syntactic input checks that run before any path reaches the sandbox

use std::fmt::Write as _;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::protocol::{ErrorCode, ForgeError};

/// Longest accepted path, in characters
pub const MAX_PATH_LENGTH: usize = 32_767;

/// Most `**` wildcards a glob may carry
pub const MAX_GLOBSTARS: usize = 5;

pub const SUPPORTED_ENCODINGS: &[&str] = &[
    "utf-8", "utf8", "utf-16le", "utf16le", "latin1", "binary", "ascii", "base64", "hex",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEncoding {
    Utf8,
    Utf16Le,
    Latin1,
    Binary,
    Ascii,
    Base64,
    Hex,
}

impl FileEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileEncoding::Utf8 => "utf-8",
            FileEncoding::Utf16Le => "utf-16le",
            FileEncoding::Latin1 => "latin1",
            FileEncoding::Binary => "binary",
            FileEncoding::Ascii => "ascii",
            FileEncoding::Base64 => "base64",
            FileEncoding::Hex => "hex",
        }
    }

    /// Render raw file bytes as text in this encoding
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            FileEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            FileEncoding::Utf16Le => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            FileEncoding::Latin1 | FileEncoding::Binary => {
                bytes.iter().map(|&b| char::from(b)).collect()
            }
            FileEncoding::Ascii => bytes.iter().map(|&b| char::from(b & 0x7f)).collect(),
            FileEncoding::Base64 => BASE64.encode(bytes),
            FileEncoding::Hex => {
                let mut out = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    let _ = write!(out, "{:02x}", b);
                }
                out
            }
        }
    }

    /// Turn caller-supplied text into the bytes to write
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, ForgeError> {
        match self {
            FileEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            FileEncoding::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            FileEncoding::Latin1 | FileEncoding::Binary | FileEncoding::Ascii => {
                Ok(text.chars().map(|c| (u32::from(c) & 0xff) as u8).collect())
            }
            FileEncoding::Base64 => BASE64.decode(text.trim()).map_err(|e| {
                ForgeError::new(
                    ErrorCode::InvalidEncoding,
                    format!("Content is not valid base64: {}", e),
                )
            }),
            FileEncoding::Hex => decode_hex(text.trim()),
        }
    }
}

fn decode_hex(text: &str) -> Result<Vec<u8>, ForgeError> {
    let invalid = || ForgeError::new(ErrorCode::InvalidEncoding, "Content is not valid hex");
    if text.len() % 2 != 0 {
        return Err(invalid());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(invalid)
        })
        .collect()
}

/// Case- and hyphen-insensitive encoding lookup
pub fn validate_encoding(encoding: &str) -> Result<FileEncoding, ForgeError> {
    let normalized = encoding.to_lowercase().replace('-', "");
    let parsed = match normalized.as_str() {
        "utf8" => FileEncoding::Utf8,
        "utf16le" => FileEncoding::Utf16Le,
        "latin1" => FileEncoding::Latin1,
        "binary" => FileEncoding::Binary,
        "ascii" => FileEncoding::Ascii,
        "base64" => FileEncoding::Base64,
        "hex" => FileEncoding::Hex,
        _ => {
            return Err(ForgeError::new(
                ErrorCode::InvalidEncoding,
                format!("Unsupported encoding: {}", encoding),
            )
            .with_detail(
                "supported",
                Value::Array(SUPPORTED_ENCODINGS.iter().map(|&e| Value::from(e)).collect()),
            ))
        }
    };
    Ok(parsed)
}

pub fn validate_path_input(path: &str) -> Result<(), ForgeError> {
    if path.trim().is_empty() {
        return Err(ForgeError::invalid_path("Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(ForgeError::invalid_path("Path contains null bytes"));
    }
    let length = path.chars().count();
    if length > MAX_PATH_LENGTH {
        return Err(ForgeError::invalid_path("Path is too long")
            .with_detail("length", length)
            .with_detail("max_length", MAX_PATH_LENGTH));
    }
    Ok(())
}

/// Absolute, normalized form of `path`; no access checks
pub fn sanitize_path(path: &str) -> PathBuf {
    super::security::absolutize(std::path::Path::new(path))
        .unwrap_or_else(|| PathBuf::from(path))
}

pub fn validate_glob_pattern(pattern: &str) -> Result<(), ForgeError> {
    if pattern.trim().is_empty() {
        return Err(ForgeError::invalid_path("Glob pattern cannot be empty"));
    }
    let count = pattern.matches("**").count();
    if count > MAX_GLOBSTARS {
        return Err(
            ForgeError::invalid_path("Glob pattern has too many ** wildcards")
                .with_detail("count", count)
                .with_detail("max", MAX_GLOBSTARS),
        );
    }
    Ok(())
}

pub fn validate_regex_pattern(pattern: &str, case_sensitive: bool) -> Result<Regex, ForgeError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| {
            ForgeError::invalid_path(format!("Invalid regex pattern: {}", e))
                .with_detail("pattern", pattern)
        })
}

/// 1-based, inclusive line bounds
pub fn validate_line_range(start: Option<u64>, end: Option<u64>) -> Result<(), ForgeError> {
    if let Some(start) = start {
        if start < 1 {
            return Err(ForgeError::invalid_path("Start line must be 1 or greater")
                .with_detail("start_line", start));
        }
    }
    if let Some(end) = end {
        if end < 1 {
            return Err(ForgeError::invalid_path("End line must be 1 or greater")
                .with_detail("end_line", end));
        }
    }
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(
                ForgeError::invalid_path("Start line cannot be greater than end line")
                    .with_detail("start_line", start)
                    .with_detail("end_line", end),
            );
        }
    }
    Ok(())
}

/// Human-readable byte count, e.g. `1.5 KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["Bytes", "KB", "MB", "GB", "TB", "PB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
