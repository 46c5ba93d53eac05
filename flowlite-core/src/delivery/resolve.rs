//! Containment-checked path resolution.
//!
//! Both the requested path and the base directory are canonicalized before
//! they are compared, and the comparison is component-wise. A
//! [`ResolvedPath`] cannot be built any other way.

use super::{DeliveryKind, DirectoryLayout};
use crate::error::{FlowliteError, Result};
use std::path::{Component, Path, PathBuf};

/// An absolute path known to lie inside its kind's base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    path: PathBuf,
    base: PathBuf,
}

impl ResolvedPath {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canonical base directory the path was checked against.
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Resolve `subfolder/filename` under the base directory for `kind`.
///
/// Fails with `MissingFilename` for a blank filename (before touching the
/// filesystem), `PathEscape` when the result would leave the base, and
/// `NotFound` when the base directory itself does not exist. The target
/// file is not required to exist.
pub fn resolve_path(
    layout: &dyn DirectoryLayout,
    kind: DeliveryKind,
    subfolder: &str,
    filename: &str,
) -> Result<ResolvedPath> {
    if filename.trim().is_empty() {
        return Err(FlowliteError::MissingFilename);
    }

    // The filename names a file, never a route out of the directory.
    let requested = Path::new(filename);
    if requested
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return Err(FlowliteError::PathEscape {
            path: requested.to_path_buf(),
        });
    }

    let base_dir = layout.base_dir(kind);
    let base = std::fs::canonicalize(&base_dir).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlowliteError::NotFound {
            path: base_dir.clone(),
        },
        _ => FlowliteError::Io(e),
    })?;

    let mut candidate = base_dir;
    if !subfolder.trim().is_empty() {
        candidate.push(subfolder);
    }
    candidate.push(requested);

    let canonical = canonicalize_lenient(&candidate).ok_or_else(|| FlowliteError::PathEscape {
        path: candidate.clone(),
    })?;

    if !canonical.starts_with(&base) {
        return Err(FlowliteError::PathEscape { path: canonical });
    }

    Ok(ResolvedPath {
        path: canonical,
        base,
    })
}

/// Like [`resolve_path`], but the target must exist. The final path is
/// canonicalized strictly and checked against the base again, so a link
/// swapped in after the first check is still caught.
pub fn resolve_existing(
    layout: &dyn DirectoryLayout,
    kind: DeliveryKind,
    subfolder: &str,
    filename: &str,
) -> Result<ResolvedPath> {
    let resolved = resolve_path(layout, kind, subfolder, filename)?;
    let canonical = std::fs::canonicalize(resolved.path()).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FlowliteError::NotFound {
            path: resolved.path().to_path_buf(),
        },
        _ => FlowliteError::Io(e),
    })?;
    if !canonical.starts_with(resolved.base()) {
        return Err(FlowliteError::PathEscape { path: canonical });
    }
    Ok(ResolvedPath {
        path: canonical,
        base: resolved.base,
    })
}

/// Symlinks followed before giving up, matching the usual kernel limit.
const MAX_SYMLINK_HOPS: usize = 40;

/// Canonicalize a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the remainder is normalized lexically on
/// top of it. Symlinks in the remainder (dangling ones included) are
/// followed, so the result names what the link would open.
fn canonicalize_lenient(path: &Path) -> Option<PathBuf> {
    canonicalize_with_hops(path, MAX_SYMLINK_HOPS)
}

fn canonicalize_with_hops(path: &Path, hops: usize) -> Option<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Some(canonical);
    }

    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        let Ok(mut resolved) = std::fs::canonicalize(ancestor) else {
            continue;
        };
        let rest = path.strip_prefix(ancestor).ok()?;
        let mut components = rest.components();
        while let Some(component) = components.next() {
            match component {
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => {
                    resolved.push(part);
                    if let Ok(target) = std::fs::read_link(&resolved) {
                        // Symlink loop
                        if hops == 0 {
                            return None;
                        }
                        resolved.pop();
                        // An absolute target replaces the parent entirely.
                        let mut next = resolved.join(target);
                        next.extend(components);
                        return canonicalize_with_hops(&next, hops - 1);
                    }
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        return Some(resolved);
    }

    None
}
