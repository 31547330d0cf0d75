use std::path::{Path, PathBuf};
use tracing::debug;

const UNKNOWN: &str = "Unknown";
const NAME_PLACEHOLDER: &str = "{model_name}";
const SIZE_PLACEHOLDER: &str = "{model_size}";

/// Name and human-readable size of the deployed model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub file_name: String,
    pub size: String,
}

impl ModelInfo {
    pub fn unknown() -> Self {
        Self {
            file_name: UNKNOWN.to_string(),
            size: UNKNOWN.to_string(),
        }
    }

    /// Describe the configured model file, or the first `.onnx` (then `.pt`)
    /// file in `models_dir` when the configured path does not exist.
    pub fn detect(model_path: &Path, models_dir: &Path) -> Self {
        let candidate =
            locate_model(model_path, models_dir).or_else(|| find_by_extension(models_dir, "pt"));

        let Some(path) = candidate else {
            debug!(models_dir = %models_dir.display(), "No model file found");
            return Self::unknown();
        };

        match std::fs::metadata(&path) {
            Ok(metadata) => Self {
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                size: format_size_mb(metadata.len()),
            },
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to stat model file");
                Self::unknown()
            }
        }
    }
}

/// The ONNX file to load: the configured path when it exists, else the
/// first `.onnx` file in `models_dir` by name
pub fn locate_model(model_path: &Path, models_dir: &Path) -> Option<PathBuf> {
    if model_path.is_file() {
        return Some(model_path.to_path_buf());
    }
    find_by_extension(models_dir, "onnx")
}

fn find_by_extension(dir: &Path, extension: &str) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == extension))
        .collect();
    matches.sort();
    matches.into_iter().next()
}

fn format_size_mb(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
}

/// Fill `{model_name}` and `{model_size}` into an info template.
///
/// A template without either placeholder gets the details appended on a
/// trailing line, so they are never dropped silently.
pub fn format_model_info(template: &str, model_name: &str, model_size: &str) -> String {
    let has_name = template.contains(NAME_PLACEHOLDER);
    let has_size = template.contains(SIZE_PLACEHOLDER);

    if !has_name && !has_size {
        return format!("{}\n{} ({})", template.trim_end(), model_name, model_size);
    }

    template
        .replace(NAME_PLACEHOLDER, model_name)
        .replace(SIZE_PLACEHOLDER, model_size)
}
