//! Workspace provisioning: private per-scope copies of the website source.
//!
//! Every test scope gets its own copy of the site under a fresh `web_src`
//! subdirectory so that config mutation in one scope can never race another.
//! Provisioning is deliberately non-transactional: a failure mid-copy leaves a
//! partially populated workspace behind, and the owning fixture's teardown is
//! responsible for removing whatever exists.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the workspace subdirectory created under each destination root.
pub const WORKSPACE_DIR_NAME: &str = "web_src";

/// The entries copied from the website project into every workspace.
pub const WEBSITE_FILES: [&str; 4] = ["index.html", "config.json", "styles", "scripts"];

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace directory {0} already exists or cannot be created: {1}")]
    CreateDir(PathBuf, #[source] io::Error),

    #[error("missing source entry {0}")]
    MissingEntry(PathBuf),

    #[error("failed to copy {0}: {1}")]
    Copy(PathBuf, #[source] io::Error),
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// Create `dest_root/web_src` and populate it with the named entries from
/// `source`.
///
/// Directories are copied recursively, plain files singly. Returns the path of
/// the new workspace.
///
/// # Errors
///
/// Fails if the workspace subdirectory already exists, if a named entry is
/// absent from `source`, or on any underlying I/O failure. No cleanup is
/// attempted on failure.
pub fn provision(
    source: &Path,
    dest_root: &Path,
    entries: &[&str],
) -> Result<PathBuf, WorkspaceError> {
    let workspace = dest_root.join(WORKSPACE_DIR_NAME);

    // create_dir (not create_dir_all) so a pre-existing workspace is an error.
    fs::create_dir(&workspace).map_err(|e| WorkspaceError::CreateDir(workspace.clone(), e))?;

    for name in entries {
        let from = source.join(name);
        if !from.exists() {
            return Err(WorkspaceError::MissingEntry(from));
        }

        if from.is_dir() {
            copy_dir_recursive(&from, &workspace.join(name))
                .map_err(|e| WorkspaceError::Copy(from.clone(), e))?;
        } else {
            fs::copy(&from, workspace.join(name))
                .map_err(|e| WorkspaceError::Copy(from.clone(), e))?;
        }
    }

    tracing::debug!(workspace = %workspace.display(), "provisioned website workspace");
    Ok(workspace)
}

fn copy_dir_recursive(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
