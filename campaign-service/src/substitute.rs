// Template Substitution
// Renders `@key@` placeholders in solver input templates

use indexmap::IndexMap;
use thiserror::Error;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Errors that can occur while rendering a template
#[derive(Debug, Error)]
pub enum SubstituteError {
    #[error("failed to read template '{path}': {source}")]
    ReadTemplate { path: PathBuf, source: io::Error },

    #[error("failed to write '{path}': {source}")]
    WriteOutput { path: PathBuf, source: io::Error },
}

/// Result of rendering text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Supplied keys that had no placeholder in the template
    pub unused_keys: Vec<String>,
}

/// Replace every `@key@` whose key is supplied; other `@...@` spans pass through
pub fn substitute_text(text: &str, substitutions: &IndexMap<String, String>) -> Rendered {
    let mut out = String::with_capacity(text.len());
    let mut used = vec![false; substitutions.len()];
    let mut rest = text;

    while let Some(start) = rest.find('@') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        match after.find('@') {
            Some(end) => {
                let key = &after[..end];
                if let Some((index, _, value)) = substitutions.get_full(key) {
                    used[index] = true;
                    out.push_str(value);
                    rest = &after[end + 1..];
                } else {
                    // Keep the opening '@' and rescan from the closing one
                    out.push('@');
                    rest = after;
                }
            }
            None => {
                out.push('@');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    let unused_keys = substitutions
        .keys()
        .zip(used)
        .filter(|(_, used)| !used)
        .map(|(key, _)| key.clone())
        .collect();

    Rendered {
        text: out,
        unused_keys,
    }
}

/// Output file name for a template: `model.inp.in` renders to `model.inp`
pub fn rendered_name(template: &Path) -> PathBuf {
    match template.file_name().and_then(|n| n.to_str()) {
        Some(name) => PathBuf::from(name.strip_suffix(".in").unwrap_or(name)),
        None => PathBuf::from("rendered"),
    }
}

/// Render `template` into `output`, creating parent directories as needed
pub fn apply_substitution(
    template: &Path,
    output: &Path,
    substitutions: &IndexMap<String, String>,
) -> Result<Rendered, SubstituteError> {
    let text = fs::read_to_string(template).map_err(|source| SubstituteError::ReadTemplate {
        path: template.to_path_buf(),
        source,
    })?;

    let rendered = substitute_text(&text, substitutions);
    for key in &rendered.unused_keys {
        tracing::warn!(
            template = %template.display(),
            key = %key,
            "substitution key has no placeholder in template"
        );
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SubstituteError::WriteOutput {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(output, &rendered.text).map_err(|source| SubstituteError::WriteOutput {
        path: output.to_path_buf(),
        source,
    })?;

    tracing::info!(output = %output.display(), "rendered template");
    Ok(rendered)
}
