//! Filesystem path-resolution for editor integrations (§6).
//!
//! Accepts `file://<abs-path>`, bare absolute paths, and paths relative to
//! the configured project root. Anything that resolves outside the root is
//! rejected (§8 property 7).

use std::path::{Path, PathBuf};

use buckley_core::{BuckleyError, BuckleyResult};

pub fn resolve(uri: &str, project_root: &Path) -> BuckleyResult<PathBuf> {
    let raw = if let Some(rest) = uri.strip_prefix("file://") {
        PathBuf::from(rest)
    } else if let Some((scheme, _)) = uri.split_once("://") {
        return Err(BuckleyError::invalid_argument(format!("unsupported URI scheme: {scheme}")));
    } else {
        let path = Path::new(uri);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            project_root.join(path)
        }
    };

    let cleaned = clean(&raw);
    let root = clean(project_root);

    if cleaned == root {
        return Ok(cleaned);
    }
    match cleaned.strip_prefix(&root) {
        Ok(rest) if !rest.as_os_str().is_empty() => Ok(cleaned),
        _ => Err(BuckleyError::invalid_argument("path escapes project root")),
    }
}

/// Lexically normalize `.` and `..` components without touching the
/// filesystem (the path need not exist yet, e.g. for a file about to be
/// created by an edit).
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
