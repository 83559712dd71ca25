//! Writes a run's generated files to disk
//!
//! Files land under `<out_dir>/<pipeline_id>/`. Shell scripts are made
//! executable on unix.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::PipelineError;

/// Resolve an artifact path under `root`, rejecting absolute and parent-relative paths (pure function)
fn resolve_target(root: &Path, relative: &str) -> Result<PathBuf, PipelineError> {
    let candidate = Path::new(relative);
    let escapes = candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if relative.is_empty() || escapes {
        return Err(PipelineError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Refusing to write outside the output directory: {relative}"),
        )));
    }
    Ok(root.join(candidate))
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    tokio::fs::set_permissions(path, permissions).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Write `files` under `<out_dir>/<pipeline_id>/` and return the project directory
pub async fn write_generated_files(
    files: &BTreeMap<String, String>,
    out_dir: &Path,
    pipeline_id: &str,
) -> Result<PathBuf, PipelineError> {
    let root = resolve_target(out_dir, pipeline_id)?;
    tokio::fs::create_dir_all(&root).await?;

    for (relative, content) in files {
        let target = resolve_target(&root, relative)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, content).await?;

        if relative.ends_with(".sh") {
            make_executable(&target).await?;
        }
        debug!(path = %target.display(), bytes = content.len(), "Wrote generated file");
    }

    info!(directory = %root.display(), files = files.len(), "Generated files written");
    Ok(root)
}
