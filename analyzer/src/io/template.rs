//! Task template loading.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::template::TaskTemplate;
use crate::error::ConfigError;

/// Read and validate the task template at `path`.
pub fn load_template(path: &Path) -> Result<TaskTemplate, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::TemplateUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let template =
        TaskTemplate::parse(&text).ok_or_else(|| ConfigError::MissingPlaceholder(path.to_path_buf()))?;
    debug!(path = %path.display(), bytes = text.len(), "task template loaded");
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_template_with_placeholder() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("TASK.md");
        fs::write(&path, "Review {{INPUT_FILE}}\n").expect("write");
        let template = load_template(&path).expect("load");
        assert_eq!(template.as_str(), "Review {{INPUT_FILE}}\n");
    }

    #[test]
    fn missing_placeholder_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("TASK.md");
        fs::write(&path, "Review the file\n").expect("write");
        let err = load_template(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPlaceholder(_)));
        assert!(err.to_string().contains("'{{INPUT_FILE}}' not found"));
    }

    #[test]
    fn missing_file_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_template(&temp.path().join("TASK.md")).unwrap_err();
        assert!(matches!(err, ConfigError::TemplateUnreadable { .. }));
    }
}
