use std::collections::HashMap;
use std::path::Path;

use tempfile::TempDir;

use crate::protocol::{ErrorCode, ExistsKind};

use super::config::{SandboxConfig, TemplateConfig};
use super::FileSystemService;

fn service_in(temp: &TempDir) -> FileSystemService {
    service_with(temp, SandboxConfig::with_allowed_paths([path_str(temp.path())]))
}

fn service_with(temp: &TempDir, sandbox: SandboxConfig) -> FileSystemService {
    let templates = TemplateConfig {
        paths: vec![path_str(&temp.path().join("templates"))],
    };
    FileSystemService::new(sandbox, &templates, false)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[test]
fn test_path_validation_blocks_traversal() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);
    let attempted = format!("{}/../blocked", temp.path().display());
    let err = fs.sandbox().validate_path(&attempted).unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);
}

#[test]
fn test_path_validation_allows_valid_paths() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);
    let file_path = temp.path().join("test.txt");
    std::fs::write(&file_path, "content").unwrap();
    assert!(fs.sandbox().validate_path(&path_str(&file_path)).is_ok());
    // Not-yet-existing targets validate too
    assert!(fs
        .sandbox()
        .validate_path(&path_str(&temp.path().join("new/dir/file.txt")))
        .is_ok());
}

#[cfg(unix)]
#[test]
fn test_symlink_escape_rejected() {
    let temp = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("secret.txt"), "s").unwrap();
    std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).unwrap();

    let fs = service_in(&temp);
    let err = fs
        .sandbox()
        .validate_path(&path_str(&temp.path().join("link")))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);
    assert!(err.detail("symlink").is_some());
    assert!(err.detail("target").is_some());

    // Through the link as an intermediate directory
    let err = fs
        .sandbox()
        .validate_path(&path_str(&temp.path().join("link/secret.txt")))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);
}

#[cfg(unix)]
#[test]
fn test_symlinked_root_admits_only_its_configured_form() {
    let temp = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    std::fs::create_dir(outside.path().join("secret")).unwrap();
    std::fs::write(outside.path().join("secret/key"), "k").unwrap();
    std::fs::write(outside.path().join("notes.txt"), "n").unwrap();
    let root = temp.path().join("proj");
    std::os::unix::fs::symlink(outside.path(), &root).unwrap();

    let mut sandbox = SandboxConfig::with_allowed_paths([path_str(&root)]);
    sandbox.denied_paths = Some(vec![format!("{}/secret/**", path_str(&root))]);
    let fs = service_with(&temp, sandbox);

    // Files reached through the configured root resolve inside its real location
    assert!(fs
        .sandbox()
        .validate_path(&path_str(&root.join("notes.txt")))
        .is_ok());

    let err = fs
        .sandbox()
        .validate_path(&path_str(&root.join("secret/key")))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);

    // The real directory is not itself an allowed root
    let real_key = outside.path().join("secret/key");
    let err = fs.sandbox().validate_path(&path_str(&real_key)).unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);
    assert!(!fs.sandbox().is_path_allowed(&real_key));
    assert!(!fs
        .sandbox()
        .is_path_allowed(&outside.path().join("notes.txt")));
    assert_eq!(fs.sandbox().allowed_paths(), vec![root.clone()]);
}

#[tokio::test]
async fn test_denied_directories_are_not_listed() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join(".git/objects")).unwrap();
    std::fs::create_dir_all(temp.path().join("node_modules/pkg")).unwrap();
    std::fs::create_dir(temp.path().join("src")).unwrap();

    let mut sandbox = SandboxConfig::with_allowed_paths([path_str(temp.path())]);
    sandbox.denied_paths = Some(vec![
        "**/node_modules/**".to_string(),
        "**/.git/**".to_string(),
    ]);
    let fs = service_with(&temp, sandbox);

    let err = fs
        .sandbox()
        .validate_path(&path_str(&temp.path().join(".git")))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);
    assert!(!fs.sandbox().is_path_allowed(&temp.path().join("node_modules")));

    let entries = fs
        .ops()
        .read_directory(&path_str(temp.path()), false, 1, true, None)
        .await
        .unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["src"]);

    let results = fs
        .search()
        .glob_search("*", Some(path_str(temp.path()).as_str()), 100, true)
        .await
        .unwrap();
    let names: Vec<&str> = results.results.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, vec!["src"]);
}

#[cfg(unix)]
#[test]
fn test_symlink_allowed_when_following() {
    let temp = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).unwrap();

    let mut sandbox = SandboxConfig::with_allowed_paths([path_str(temp.path())]);
    sandbox.follow_symlinks = true;
    let fs = service_with(&temp, sandbox);
    assert!(fs
        .sandbox()
        .validate_path(&path_str(&temp.path().join("link")))
        .is_ok());
}

#[tokio::test]
async fn test_read_file_line_range() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("lines.txt");
    std::fs::write(&file, "one\ntwo\nthree\nfour\n").unwrap();

    let fs = service_in(&temp);
    let slice = fs
        .ops()
        .read_file(&path_str(&file), "utf-8", Some(2), Some(3), 10240)
        .await
        .unwrap();
    assert_eq!(slice, "two\nthree");

    let tail = fs
        .ops()
        .read_file(&path_str(&file), "utf-8", Some(4), None, 10240)
        .await
        .unwrap();
    assert_eq!(tail, "four\n");
}

#[tokio::test]
async fn test_read_file_rejects_bad_range_and_directories() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("a.txt");
    std::fs::write(&file, "a").unwrap();
    let fs = service_in(&temp);

    let err = fs
        .ops()
        .read_file(&path_str(&file), "utf-8", Some(3), Some(2), 10240)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPath);

    let err = fs
        .ops()
        .read_file(&path_str(temp.path()), "utf-8", None, None, 10240)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPath);
}

#[tokio::test]
async fn test_read_file_respects_size_limit() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("big.txt");
    std::fs::write(&file, vec![b'x'; 2048]).unwrap();

    let mut sandbox = SandboxConfig::with_allowed_paths([path_str(temp.path())]);
    sandbox.max_file_size = 1024;
    let fs = service_with(&temp, sandbox);

    let err = fs
        .ops()
        .read_file(&path_str(&file), "utf-8", None, None, 10240)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FileTooLarge);
    assert_eq!(err.detail("limit").and_then(|v| v.as_u64()), Some(1024));
}

#[tokio::test]
async fn test_write_file_respects_overwrite_flag() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("note.txt");
    std::fs::write(&file, "original").unwrap();
    let fs = service_in(&temp);

    let err = fs
        .ops()
        .write_file(&path_str(&file), "new", "utf-8", true, false, false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyExists);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");

    let outcome = fs
        .ops()
        .write_file(&path_str(&file), "new", "utf-8", true, true, true)
        .await
        .unwrap();
    assert_eq!(outcome.bytes_written, Some(3));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "new");
    let backup = outcome.backup.unwrap();
    assert_eq!(std::fs::read_to_string(backup).unwrap(), "original");
}

#[tokio::test]
async fn test_write_file_fails_when_parent_is_file() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);

    let file_path = temp.path().join("existing_file.txt");
    std::fs::write(&file_path, "content").unwrap();

    let invalid_path = file_path.join("subdir").join("new_file.txt");
    let err = fs
        .ops()
        .write_file(&path_str(&invalid_path), "x", "utf-8", true, false, false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPath);
}

#[tokio::test]
async fn test_write_file_creates_parents_and_decodes_base64() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);
    let target = temp.path().join("deep/nested/data.bin");

    fs.ops()
        .write_file(&path_str(&target), "aGVsbG8=", "base64", true, false, false)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"hello");
}

#[tokio::test]
async fn test_write_outside_sandbox_rejected() {
    let temp = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let fs = service_in(&temp);

    let target = outside.path().join("escape.txt");
    let err = fs
        .ops()
        .write_file(&path_str(&target), "x", "utf-8", true, false, false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);
    assert!(!target.exists());
}

#[tokio::test]
async fn test_read_only_blocks_writes() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);
    fs.gate().enable();

    let err = fs
        .ops()
        .create_directory(&path_str(&temp.path().join("d")), true)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::WriteDisabled);
    assert!(!temp.path().join("d").exists());

    fs.gate().disable();
    fs.ops()
        .create_directory(&path_str(&temp.path().join("d")), true)
        .await
        .unwrap();
    assert!(temp.path().join("d").is_dir());
}

#[tokio::test]
async fn test_create_directory_existing_is_success() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);
    let dir = temp.path().join("already");
    std::fs::create_dir(&dir).unwrap();

    let outcome = fs.ops().create_directory(&path_str(&dir), false).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.note.as_deref(), Some("Directory already exists"));
}

#[tokio::test]
async fn test_delete_non_empty_directory_requires_recursive() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);
    let dir = temp.path().join("full");
    std::fs::create_dir(&dir).unwrap();
    std::fs::write(dir.join("f.txt"), "x").unwrap();

    let err = fs
        .ops()
        .delete_file(&path_str(&dir), false, false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DirectoryNotEmpty);

    // force does not override the emptiness check
    let err = fs
        .ops()
        .delete_file(&path_str(&dir), false, true)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DirectoryNotEmpty);

    fs.ops().delete_file(&path_str(&dir), true, false).await.unwrap();
    assert!(!dir.exists());
}

#[tokio::test]
async fn test_delete_missing_file_with_force() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);
    let missing = temp.path().join("missing.txt");

    let err = fs
        .ops()
        .delete_file(&path_str(&missing), false, false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FileNotFound);

    let outcome = fs
        .ops()
        .delete_file(&path_str(&missing), false, true)
        .await
        .unwrap();
    assert!(outcome.success);
}

#[tokio::test]
async fn test_copy_and_move() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);

    let src = temp.path().join("src");
    std::fs::create_dir_all(src.join("inner")).unwrap();
    std::fs::write(src.join("a.txt"), "a").unwrap();
    std::fs::write(src.join("inner/b.txt"), "b").unwrap();

    let dst = temp.path().join("dst");
    let err = fs
        .ops()
        .copy_file(&path_str(&src), &path_str(&dst), false, false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPath);

    fs.ops()
        .copy_file(&path_str(&src), &path_str(&dst), false, true)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(dst.join("inner/b.txt")).unwrap(), "b");
    assert!(src.join("a.txt").exists());

    let err = fs
        .ops()
        .copy_file(&path_str(&src), &path_str(&src.join("inner/copy")), true, true)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPath);

    let moved = temp.path().join("moved/a.txt");
    fs.ops()
        .move_file(&path_str(&dst.join("a.txt")), &path_str(&moved), false)
        .await
        .unwrap();
    assert!(moved.exists());
    assert!(!dst.join("a.txt").exists());

    let err = fs
        .ops()
        .move_file(&path_str(&src.join("a.txt")), &path_str(&moved), false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyExists);
}

#[tokio::test]
async fn test_read_directory_filters_hidden_and_denied() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("sub")).unwrap();
    std::fs::write(temp.path().join("sub/inner.rs"), "").unwrap();
    std::fs::write(temp.path().join("visible.rs"), "").unwrap();
    std::fs::write(temp.path().join(".hidden"), "").unwrap();
    std::fs::write(temp.path().join("keys.secret"), "").unwrap();

    let mut sandbox = SandboxConfig::with_allowed_paths([path_str(temp.path())]);
    sandbox.denied_paths = Some(vec!["**/*.secret".to_string()]);
    let fs = service_with(&temp, sandbox);

    let entries = fs
        .ops()
        .read_directory(&path_str(temp.path()), false, 1, false, None)
        .await
        .unwrap();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"visible.rs"));
    assert!(names.contains(&"sub"));
    assert!(!names.contains(&".hidden"));
    assert!(!names.contains(&"keys.secret"));
    assert!(!names.contains(&"inner.rs"));

    let entries = fs
        .ops()
        .read_directory(&path_str(temp.path()), true, 3, true, Some("*.rs"))
        .await
        .unwrap();
    let mut names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["inner.rs", "visible.rs"]);
}

#[tokio::test]
async fn test_read_multiple_reports_failures_per_path() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("ok.txt"), "fine").unwrap();
    let fs = service_in(&temp);

    let paths = vec![
        path_str(&temp.path().join("ok.txt")),
        path_str(&temp.path().join("missing.txt")),
    ];
    let results = fs.ops().read_multiple(&paths, "utf-8", false).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].content.as_deref(), Some("fine"));
    assert!(!results[1].success);
    assert_eq!(
        results[1].error.as_ref().map(|e| e.code),
        Some(ErrorCode::FileNotFound)
    );

    let err = fs.ops().read_multiple(&paths, "utf-8", true).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::FileNotFound);
}

#[tokio::test]
async fn test_file_exists_and_stat() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("here.txt");
    std::fs::write(&file, "12345").unwrap();
    let fs = service_in(&temp);

    let found = fs
        .ops()
        .file_exists(&path_str(&file), ExistsKind::File)
        .await
        .unwrap();
    assert!(found.exists);

    let wrong_kind = fs
        .ops()
        .file_exists(&path_str(&file), ExistsKind::Directory)
        .await
        .unwrap();
    assert!(!wrong_kind.exists);
    assert_eq!(wrong_kind.actual_type.as_deref(), Some("file"));

    let missing = fs
        .ops()
        .file_exists(&path_str(&temp.path().join("nope")), ExistsKind::Any)
        .await
        .unwrap();
    assert!(!missing.exists);

    let stat = fs.ops().file_stat(&path_str(&file)).await.unwrap();
    assert_eq!(stat.size, 5);
    assert_eq!(stat.name, "here.txt");
    assert!(stat.is_file);
    assert!(!stat.is_symlink);
}

#[tokio::test]
async fn test_disk_usage_totals_and_breakdown() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("big")).unwrap();
    std::fs::write(temp.path().join("big/a.bin"), vec![0u8; 300]).unwrap();
    std::fs::write(temp.path().join("big/b.bin"), vec![0u8; 200]).unwrap();
    std::fs::write(temp.path().join("small.txt"), vec![0u8; 10]).unwrap();
    let fs = service_in(&temp);

    let usage = fs.ops().get_disk_usage(&path_str(temp.path()), 1).await.unwrap();
    assert_eq!(usage.total_size, 510);
    assert_eq!(usage.file_count, 3);
    assert_eq!(usage.directory_count, 1);
    assert_eq!(usage.breakdown.len(), 2);
    assert_eq!(usage.breakdown[0].name, "big/");
    assert_eq!(usage.breakdown[0].size, 500);
    assert_eq!(usage.breakdown[1].name, "small.txt");
}

#[tokio::test]
async fn test_compare_files() {
    let temp = TempDir::new().unwrap();
    let first = temp.path().join("one.txt");
    let second = temp.path().join("two.txt");
    std::fs::write(&first, "aaaa").unwrap();
    std::fs::write(&second, "a").unwrap();
    let fs = service_in(&temp);

    let comparison = fs
        .ops()
        .compare_files(&path_str(&first), &path_str(&second))
        .await
        .unwrap();
    assert!(comparison.same_type);
    assert!(!comparison.same_size);
    assert_eq!(comparison.size_difference, 3);

    let err = fs
        .ops()
        .compare_files(&path_str(&first), &path_str(&temp.path().join("gone")))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FileNotFound);
}

#[tokio::test]
async fn test_grep_finds_matches_and_skips_denied() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("src")).unwrap();
    std::fs::write(temp.path().join("src/lib.rs"), "fn main() {}\n// TODO: token\n").unwrap();
    std::fs::write(temp.path().join("creds.secret"), "token = abc\n").unwrap();

    let mut sandbox = SandboxConfig::with_allowed_paths([path_str(temp.path())]);
    sandbox.denied_paths = Some(vec!["**/*.secret".to_string()]);
    let fs = service_with(&temp, sandbox);

    let results = fs
        .search()
        .grep_search("token", Some(path_str(temp.path()).as_str()), None, true, 100, 1)
        .await
        .unwrap();
    assert_eq!(results.count, 1);
    let hit = &results.matches[0];
    assert!(hit.file.ends_with("lib.rs"));
    assert_eq!(hit.line, 2);
    assert_eq!(hit.matched, "// TODO: token");
    assert!(!results.truncated);

    let results = fs
        .search()
        .grep_search("TOKEN", Some(path_str(temp.path()).as_str()), Some("**/*.rs"), false, 100, 0)
        .await
        .unwrap();
    assert_eq!(results.count, 1);
}

#[tokio::test]
async fn test_find_by_content_is_literal() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.txt"), "price: $5 (approx)\n").unwrap();
    std::fs::write(temp.path().join("b.txt"), "price: 5\n").unwrap();
    let fs = service_in(&temp);

    let results = fs
        .search()
        .find_by_content("$5 (approx)", Some(path_str(temp.path()).as_str()), None, 10)
        .await
        .unwrap();
    assert_eq!(results.count, 1);
    assert!(results.matches[0].file.ends_with("a.txt"));
}

#[tokio::test]
async fn test_glob_search_matches_relative_paths() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir_all(temp.path().join("src/bin")).unwrap();
    std::fs::write(temp.path().join("src/lib.rs"), "").unwrap();
    std::fs::write(temp.path().join("src/bin/tool.rs"), "").unwrap();
    std::fs::write(temp.path().join("README.md"), "").unwrap();
    let fs = service_in(&temp);

    let results = fs
        .search()
        .glob_search("**/*.rs", Some(path_str(temp.path()).as_str()), 100, false)
        .await
        .unwrap();
    assert_eq!(results.total_matches, 2);

    let results = fs
        .search()
        .glob_search("**/*.rs", Some(path_str(temp.path()).as_str()), 1, false)
        .await
        .unwrap();
    assert_eq!(results.count, 1);
    assert!(results.truncated);

    let results = fs
        .search()
        .glob_search("src/*", Some(path_str(temp.path()).as_str()), 100, true)
        .await
        .unwrap();
    let mut names: Vec<&str> = results.results.iter().map(|h| h.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["bin", "lib.rs"]);
}

fn write_template(temp: &TempDir) {
    let root = temp.path().join("templates/basic");
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(
        root.join("template.json"),
        r#"{
            "name": "basic",
            "description": "Minimal project",
            "category": "starter",
            "variables": [{ "name": "AUTHOR", "default": "nobody" }]
        }"#,
    )
    .unwrap();
    std::fs::write(
        root.join("README.md"),
        "# {{PROJECT_NAME}}\nby {{ AUTHOR }} (c) ${CURRENT_YEAR} {{UNKNOWN}}\n",
    )
    .unwrap();
    std::fs::write(root.join("src/__PROJECT_NAME__.rs"), "// {{PROJECT_NAME}}\n").unwrap();
}

#[tokio::test]
async fn test_scaffold_substitutes_variables() {
    let temp = TempDir::new().unwrap();
    write_template(&temp);
    let fs = service_in(&temp);

    let destination = temp.path().join("out/demo");
    let mut variables = HashMap::new();
    variables.insert("AUTHOR".to_string(), "ana".to_string());

    let report = fs
        .scaffold()
        .scaffold_project("basic", &path_str(&destination), &variables, false)
        .await
        .unwrap();
    assert_eq!(report.files_created, 2);
    assert_eq!(report.template.name, "basic");
    assert_eq!(report.variables_used["PROJECT_NAME"], "demo");

    let readme = std::fs::read_to_string(destination.join("README.md")).unwrap();
    let year = chrono::Utc::now().format("%Y").to_string();
    assert_eq!(readme, format!("# demo\nby ana (c) {} {{{{UNKNOWN}}}}\n", year));
    assert_eq!(
        std::fs::read_to_string(destination.join("src/demo.rs")).unwrap(),
        "// demo\n"
    );
    assert!(!destination.join("template.json").exists());

    // Destination now has content
    let err = fs
        .scaffold()
        .scaffold_project("basic", &path_str(&destination), &variables, false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyExists);
}

#[tokio::test]
async fn test_scaffold_refuses_destination_outside_sandbox() {
    let temp = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    write_template(&temp);
    let fs = service_in(&temp);

    let destination = outside.path().join("demo");
    let err = fs
        .scaffold()
        .scaffold_project("basic", &path_str(&destination), &HashMap::new(), false)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::PathOutsideSandbox);
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_scaffold_unknown_template() {
    let temp = TempDir::new().unwrap();
    let fs = service_in(&temp);

    let err = fs
        .scaffold()
        .scaffold_project(
            "missing",
            &path_str(&temp.path().join("out")),
            &HashMap::new(),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::FileNotFound);
    assert!(err.detail("searched_paths").is_some());

    let err = fs
        .scaffold()
        .scaffold_project(
            "a/../../etc",
            &path_str(&temp.path().join("out")),
            &HashMap::new(),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPath);
}

#[tokio::test]
async fn test_list_templates_by_category() {
    let temp = TempDir::new().unwrap();
    write_template(&temp);
    let fs = service_in(&temp);

    let listing = fs.scaffold().list_templates(None).await.unwrap();
    assert_eq!(listing.templates.len(), 1);
    assert_eq!(listing.templates[0].name, "basic");

    let listing = fs.scaffold().list_templates(Some("other")).await.unwrap();
    assert!(listing.templates.is_empty());
}
