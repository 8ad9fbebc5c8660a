use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

#[cfg(unix)]
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(windows)]
pub fn is_hidden(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    if let Ok(metadata) = path.symlink_metadata() {
        const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
        if metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0 {
            return true;
        }
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(unix)]
pub fn format_permissions(metadata: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;

    let mode = metadata.permissions().mode();
    let user = format_rwx((mode >> 6) & 0o7);
    let group = format_rwx((mode >> 3) & 0o7);
    let other = format_rwx(mode & 0o7);

    format!("{}{}{}", user, group, other)
}

#[cfg(windows)]
pub fn format_permissions(metadata: &std::fs::Metadata) -> String {
    let readonly = metadata.permissions().readonly();
    if readonly { "r--" } else { "rw-" }.to_string()
}

#[cfg(unix)]
fn format_rwx(bits: u32) -> String {
    format!(
        "{}{}{}",
        if bits & 4 != 0 { "r" } else { "-" },
        if bits & 2 != 0 { "w" } else { "-" },
        if bits & 1 != 0 { "x" } else { "-" },
    )
}

/// "file", "directory" or "other"
pub fn kind_of(metadata: &std::fs::Metadata) -> &'static str {
    if metadata.is_file() {
        "file"
    } else if metadata.is_dir() {
        "directory"
    } else {
        "other"
    }
}

/// ISO-8601 UTC with millisecond precision
pub fn format_timestamp(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn timestamps_are_iso8601() {
        let time = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(format_timestamp(time), "1970-01-01T00:00:01.500Z");
    }

    #[cfg(unix)]
    #[test]
    fn dotfiles_are_hidden() {
        assert!(is_hidden(Path::new("/a/.env")));
        assert!(!is_hidden(Path::new("/a/env")));
    }

    #[cfg(windows)]
    #[test]
    fn dot_names_are_hidden_without_metadata() {
        assert!(is_hidden(Path::new(r"C:\missing\.env")));
        assert!(!is_hidden(Path::new(r"C:\missing\env")));
    }

    #[cfg(unix)]
    #[test]
    fn permissions_render_rwx() {
        use std::os::unix::fs::PermissionsExt;
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o640)).unwrap();
        let meta = std::fs::metadata(temp.path()).unwrap();
        assert_eq!(format_permissions(&meta), "rw-r-----");
        assert_eq!(kind_of(&meta), "file");
    }
}
