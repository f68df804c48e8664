//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use std::{fs, io, path::Path};
use tempfile::{tempdir, TempDir};

fn copy_dir_all(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> io::Result<()> {
    fs::create_dir_all(&dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            copy_dir_all(entry.path(), dst.as_ref().join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
        }
    }
    Ok(())
}

/// Copy the fixture network `tests/<name>` into a fresh temporary directory.
///
/// The fixture `network_1` holds a research blueprint referencing Markdown instructions, a
/// template (with an include) and JSON data, all of which share `memory/notes.md`.
#[allow(dead_code)]
pub fn generate_test_root(name: &str) -> TempDir {
    let temp_dir = tempdir().unwrap();
    let content_root = Path::new("tests").join(name);
    tracing::debug!("Copying content from {:?}", content_root);
    copy_dir_all(&content_root, temp_dir.path()).unwrap();
    temp_dir
}

/// Write `files` (root-relative path, content) under a fresh temporary directory.
#[allow(dead_code)]
pub fn write_network(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = tempdir().unwrap();
    for (path, content) in files {
        let target = temp_dir.path().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(target, content).unwrap();
    }
    temp_dir
}
