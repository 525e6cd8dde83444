//! Input enumeration in stable lexical order.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::types::InputFile;
use crate::error::ConfigError;

/// Enumerate the inputs for a run.
///
/// A file path yields exactly that file. A directory yields the regular files
/// directly under it (non-recursive), sorted by file name. Two inputs whose
/// stems coincide are rejected because they would share an output path.
pub fn list_input_files(input: &Path) -> Result<Vec<InputFile>, ConfigError> {
    let unreadable = |source| ConfigError::InputUnreadable {
        path: input.to_path_buf(),
        source,
    };
    let meta = fs::metadata(input).map_err(unreadable)?;

    let mut paths: Vec<PathBuf> = if meta.is_file() {
        vec![input.to_path_buf()]
    } else {
        let mut paths = Vec::new();
        for entry in fs::read_dir(input).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let path = entry.path();
            // Follows symlinks so linked files count as inputs.
            if path.is_file() {
                paths.push(path);
            }
        }
        paths
    };
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if paths.is_empty() {
        return Err(ConfigError::NoInputs(input.to_path_buf()));
    }

    let files: Vec<InputFile> = paths.into_iter().map(input_file).collect();
    check_unique_ids(&files)?;
    debug!(count = files.len(), input = %input.display(), "enumerated inputs");
    Ok(files)
}

fn input_file(path: PathBuf) -> InputFile {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());
    InputFile {
        path,
        file_name,
        id,
    }
}

fn check_unique_ids(files: &[InputFile]) -> Result<(), ConfigError> {
    let mut seen: BTreeMap<&str, &Path> = BTreeMap::new();
    for file in files {
        if let Some(first) = seen.insert(&file.id, &file.path) {
            return Err(ConfigError::OutputCollision {
                id: file.id.clone(),
                first: first.to_path_buf(),
                second: file.path.clone(),
            });
        }
    }
    Ok(())
}
