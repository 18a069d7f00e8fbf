//! Output-path containment.
//!
//! Rendered file paths come from template text plus user variables, so
//! they are untrusted. [`resolve_within_root`] normalizes a rendered path
//! lexically (no filesystem access, no symlink resolution) and rejects
//! anything that would land outside the output root.

use std::path::{Component, Path, PathBuf};

use crate::core::GuidegenError;

/// Resolve a rendered relative path against `root`, rejecting escapes.
///
/// Normalization is purely lexical: `.` components drop, `..` pops a
/// previously accepted component and errors when there is nothing left to
/// pop. Absolute paths are accepted only when they already sit under
/// `root`.
///
/// # Errors
///
/// [`GuidegenError::PathEscapesRoot`] for empty paths, `..` escapes, and
/// absolute paths outside the root.
pub fn resolve_within_root(root: &Path, rendered: &str) -> Result<PathBuf, GuidegenError> {
    let rendered = rendered.trim();
    if rendered.is_empty() {
        return Err(GuidegenError::PathEscapesRoot {
            path: String::new(),
        });
    }

    let candidate = Path::new(rendered);
    let relative = if candidate.is_absolute() {
        candidate
            .strip_prefix(root)
            .map_err(|_| GuidegenError::PathEscapesRoot {
                path: rendered.to_string(),
            })?
    } else {
        candidate
    };

    let mut resolved = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    return Err(GuidegenError::PathEscapesRoot {
                        path: rendered.to_string(),
                    });
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(GuidegenError::PathEscapesRoot {
                    path: rendered.to_string(),
                });
            }
        }
    }

    if resolved.as_os_str().is_empty() {
        return Err(GuidegenError::PathEscapesRoot {
            path: rendered.to_string(),
        });
    }
    Ok(root.join(resolved))
}
