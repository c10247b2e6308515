//! Snapshot file paths.

use std::{
    env,
    path::{Path, PathBuf},
};

use eyre::{Result, WrapErr};

/// Resolve `path` against the working directory.
pub fn resolve(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().wrap_err("Failed to read the working directory")?;
    Ok(cwd.join(path))
}

/// Resolve an output path and create its missing parent directories.
/// An existing file at the path is left for the caller to overwrite.
pub async fn prepare_output(path: &Path) -> Result<PathBuf> {
    let path = resolve(path)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .wrap_err_with(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(path)
}
