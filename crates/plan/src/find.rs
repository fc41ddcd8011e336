// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider file discovery

use std::path::{Path, PathBuf};

/// Recursively collect provider files (`.toml`) under `dir`.
///
/// Sorted by path so declaration order is stable across runs. A missing
/// directory yields no files.
pub fn collect_provider_files(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        for entry in std::fs::read_dir(&current)?.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_provider_file(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_provider_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("toml")
}

#[cfg(test)]
#[path = "find_tests.rs"]
mod tests;
