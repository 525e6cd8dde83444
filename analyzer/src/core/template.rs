//! Task template validation and placeholder substitution.

use std::path::Path;

use crate::core::types::InputFile;

/// Placeholder replaced by the input path.
pub const INPUT_PLACEHOLDER: &str = "{{INPUT_FILE}}";
/// Legacy token replaced by the input file name.
const LEGACY_FILE_NAME: &str = "{input_file}";
/// Legacy token replaced by the input path.
const LEGACY_PATH: &str = "{input_path}";

/// A loaded task prompt. Construct with [`TaskTemplate::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskTemplate {
    text: String,
}

impl TaskTemplate {
    /// Accept `text` only if it contains the input placeholder.
    pub fn parse(text: &str) -> Option<Self> {
        if !text.contains(INPUT_PLACEHOLDER) {
            return None;
        }
        Some(Self {
            text: text.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Render the prompt for `input`.
    pub fn render(&self, input: &InputFile) -> String {
        let path = display_path(&input.path);
        self.text
            .replace(INPUT_PLACEHOLDER, &path)
            .replace(LEGACY_FILE_NAME, &input.file_name)
            .replace(LEGACY_PATH, &path)
    }
}

fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
