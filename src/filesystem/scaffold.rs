//! Project generation from template directories
//!
//! A template is a directory tree, optionally described by a `template.json`
//! manifest. File contents may reference variables as `{{ NAME }}` or
//! `${NAME}`; file and directory names as `__NAME__`.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use regex::{Captures, Regex};
use tokio::fs;
use walkdir::WalkDir;

use crate::protocol::{
    ErrorCode, ForgeError, ScaffoldReport, TemplateInfo, TemplateListing, TemplateMetadata,
    TemplateRef,
};

use super::config::TemplateConfig;
use super::path_utils::{self, map_io_error, resolve_path};
use super::read_only::ReadOnlyGate;
use super::security::{self, Sandbox};

pub const TEMPLATE_MANIFEST: &str = "template.json";

const CONTENT_VARIABLE: &str = r"\{\{\s*([^{}\s]+)\s*\}\}|\$\{([^{}\s]+)\}";

#[derive(Clone)]
pub struct Scaffolder {
    sandbox: Arc<Sandbox>,
    gate: Arc<ReadOnlyGate>,
    template_paths: Vec<PathBuf>,
}

struct TemplateEntry {
    relative: PathBuf,
    source: PathBuf,
    is_dir: bool,
}

impl Scaffolder {
    pub fn new(sandbox: Arc<Sandbox>, gate: Arc<ReadOnlyGate>, config: &TemplateConfig) -> Self {
        let mut template_paths: Vec<PathBuf> = config
            .paths
            .iter()
            .filter_map(|p| security::absolutize(&security::expand_home(p)))
            .collect();
        if let Some(home) = dirs_next::home_dir() {
            let user_templates = home.join(".mcp-file-forge").join("templates");
            if !template_paths.contains(&user_templates) {
                template_paths.push(user_templates);
            }
        }
        Self {
            sandbox,
            gate,
            template_paths,
        }
    }

    pub fn template_paths(&self) -> &[PathBuf] {
        &self.template_paths
    }

    /// Locate a template by path (sandbox-checked) or by name in the template roots
    pub async fn find_template(
        &self,
        name_or_path: &str,
    ) -> Result<Option<(PathBuf, TemplateMetadata)>, ForgeError> {
        if Path::new(name_or_path).is_absolute() || name_or_path.starts_with('.') {
            let path = resolve_path(&self.sandbox, name_or_path)?;
            return Ok(match fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => {
                    let metadata = read_manifest(&path).await;
                    Some((path, metadata))
                }
                _ => None,
            });
        }

        let name = Path::new(name_or_path);
        if name
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ForgeError::invalid_path(format!(
                "Invalid template name: {}",
                name_or_path
            )));
        }

        for root in &self.template_paths {
            let candidate = root.join(name);
            if let Ok(meta) = fs::metadata(&candidate).await {
                if meta.is_dir() {
                    let metadata = read_manifest(&candidate).await;
                    return Ok(Some((candidate, metadata)));
                }
            }
        }
        Ok(None)
    }

    pub async fn scaffold_project(
        &self,
        template: &str,
        destination: &str,
        variables: &HashMap<String, String>,
        overwrite: bool,
    ) -> Result<ScaffoldReport, ForgeError> {
        self.gate.validate_write_allowed()?;
        let destination = resolve_path(&self.sandbox, destination)?;

        let Some((template_path, metadata)) = self.find_template(template).await? else {
            return Err(
                ForgeError::not_found(format!("Template not found: {}", template)).with_detail(
                    "searched_paths",
                    self.template_paths
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>(),
                ),
            );
        };

        if !overwrite {
            if let Ok(meta) = fs::metadata(&destination).await {
                if !meta.is_dir() || directory_has_entries(&destination).await? {
                    return Err(ForgeError::already_exists(format!(
                        "Destination directory is not empty: {}",
                        destination.display()
                    )));
                }
            }
        }

        let variables = resolve_variables(&destination, &metadata, variables);
        let entries = self.collect_entries(template_path.clone()).await?;
        let renderer = Renderer::new(&variables)?;

        fs::create_dir_all(&destination)
            .await
            .map_err(|e| map_io_error(e, &destination))?;

        let mut files_created = 0;
        let mut files_skipped = 0;
        for entry in entries {
            let target = destination.join(renderer.path(&entry.relative));
            let target = self.sandbox.validate_path(&target.to_string_lossy())?;

            if entry.is_dir {
                fs::create_dir_all(&target)
                    .await
                    .map_err(|e| map_io_error(e, &target))?;
                continue;
            }

            if !overwrite && fs::symlink_metadata(&target).await.is_ok() {
                files_skipped += 1;
                continue;
            }

            let bytes = fs::read(&entry.source)
                .await
                .map_err(|e| map_io_error(e, &entry.source))?;
            let rendered = match std::str::from_utf8(&bytes) {
                Ok(text) => renderer.content(text).into_owned().into_bytes(),
                Err(_) => bytes,
            };
            self.sandbox.validate_file_size(rendered.len() as u64)?;

            path_utils::create_parent_dirs_safe(&target).await?;
            fs::write(&target, rendered)
                .await
                .map_err(|e| map_io_error(e, &target))?;
            files_created += 1;
        }

        tracing::info!(
            "Scaffolded {} from {} ({} created, {} skipped)",
            destination.display(),
            template_path.display(),
            files_created,
            files_skipped
        );

        Ok(ScaffoldReport {
            success: true,
            template: TemplateRef {
                name: metadata.name,
                path: template_path.display().to_string(),
            },
            destination: destination.display().to_string(),
            files_created,
            files_skipped,
            variables_used: variables,
        })
    }

    pub async fn list_templates(&self, category: Option<&str>) -> Result<TemplateListing, ForgeError> {
        let mut templates = Vec::new();

        for root in &self.template_paths {
            let Ok(mut read_dir) = fs::read_dir(root).await else {
                continue;
            };
            let mut found = Vec::new();
            while let Ok(Some(entry)) = read_dir.next_entry().await {
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    found.push(entry.path());
                }
            }
            found.sort();

            for path in found {
                let metadata = read_manifest(&path).await;
                if let Some(category) = category {
                    if metadata.category.as_deref() != Some(category) {
                        continue;
                    }
                }
                templates.push(TemplateInfo {
                    name: metadata.name,
                    path: path.display().to_string(),
                    description: metadata.description,
                    category: metadata.category,
                    variables: metadata.variables,
                });
            }
        }

        Ok(TemplateListing {
            template_paths: self
                .template_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            count: templates.len(),
            templates,
        })
    }

    /// Template tree in walk order, manifest and symlinks excluded
    async fn collect_entries(&self, root: PathBuf) -> Result<Vec<TemplateEntry>, ForgeError> {
        let limit = self.sandbox.config().max_depth;
        let sandbox = self.sandbox.clone();

        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            let walker = WalkDir::new(&root)
                .min_depth(1)
                .max_depth(limit as usize + 1)
                .follow_links(false)
                .sort_by_file_name();

            for entry in walker {
                let entry = entry.map_err(|e| {
                    ForgeError::unknown(format!("Failed to read template: {}", e))
                })?;
                sandbox.validate_depth(entry.depth() as u32)?;

                if entry.file_name() == TEMPLATE_MANIFEST {
                    continue;
                }
                let file_type = entry.file_type();
                if file_type.is_symlink() {
                    tracing::debug!("Template symlink skipped: {}", entry.path().display());
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                entries.push(TemplateEntry {
                    relative: relative.to_path_buf(),
                    source: entry.path().to_path_buf(),
                    is_dir: file_type.is_dir(),
                });
            }
            Ok(entries)
        })
        .await
        .map_err(|e| ForgeError::unknown(format!("Template walk failed: {}", e)))?
    }
}

/// Manifest of a template directory, or a stand-in named after the directory
async fn read_manifest(template: &Path) -> TemplateMetadata {
    let fallback = || TemplateMetadata {
        name: template
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        description: "Template directory".to_string(),
        version: None,
        author: None,
        category: None,
        variables: None,
    };

    match fs::read_to_string(template.join(TEMPLATE_MANIFEST)).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!("Ignoring invalid {} in {}: {}", TEMPLATE_MANIFEST, template.display(), e);
            fallback()
        }),
        Err(_) => fallback(),
    }
}

async fn directory_has_entries(path: &Path) -> Result<bool, ForgeError> {
    let mut read_dir = fs::read_dir(path).await.map_err(|e| map_io_error(e, path))?;
    Ok(read_dir
        .next_entry()
        .await
        .map_err(|e| map_io_error(e, path))?
        .is_some())
}

/// Built-ins, then manifest defaults, then caller values
fn resolve_variables(
    destination: &Path,
    metadata: &TemplateMetadata,
    provided: &HashMap<String, String>,
) -> BTreeMap<String, String> {
    let now = chrono::Utc::now();
    let mut variables = BTreeMap::new();
    variables.insert(
        "PROJECT_NAME".to_string(),
        destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    );
    variables.insert("CURRENT_YEAR".to_string(), now.format("%Y").to_string());
    variables.insert("CURRENT_DATE".to_string(), now.format("%Y-%m-%d").to_string());

    for variable in metadata.variables.iter().flatten() {
        if let Some(default) = &variable.default {
            variables.insert(variable.name.clone(), default.clone());
        }
    }
    for (key, value) in provided {
        variables.insert(key.clone(), value.clone());
    }
    variables
}

struct Renderer<'a> {
    variables: &'a BTreeMap<String, String>,
    content: Regex,
}

impl<'a> Renderer<'a> {
    fn new(variables: &'a BTreeMap<String, String>) -> Result<Self, ForgeError> {
        let content = Regex::new(CONTENT_VARIABLE)
            .map_err(|e| ForgeError::new(ErrorCode::UnknownError, e.to_string()))?;
        Ok(Self { variables, content })
    }

    /// Unknown variables are left as written
    fn content<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.content.replace_all(text, |caps: &Captures| {
            let key = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
            match key.and_then(|k| self.variables.get(k)) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
    }

    fn path(&self, relative: &Path) -> PathBuf {
        relative
            .components()
            .map(|component| {
                let mut name = component.as_os_str().to_string_lossy().to_string();
                for (key, value) in self.variables {
                    name = name.replace(&format!("__{}__", key), value);
                }
                name
            })
            .collect()
    }
}
