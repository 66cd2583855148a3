//! Shared path manipulation utilities.

use std::path::{Path, PathBuf};

/// The final component of a path as a `String`.
///
/// Empty for paths without a final normal component (e.g. `/`).
#[must_use]
pub fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// The containing directory of a path, if any.
#[must_use]
pub fn dirname(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Unicode-simple case-insensitive path equality.
///
/// Matches SQLite's NOCASE collation closely enough for the catalog's
/// case-change detection: ASCII case folding on the lossy string form.
#[must_use]
pub fn eq_ignore_case(a: &Path, b: &Path) -> bool {
    a.to_string_lossy()
        .eq_ignore_ascii_case(&b.to_string_lossy())
}

/// Rewrite `path` so that its `old_prefix` becomes `new_prefix`.
///
/// Returns `None` when `path` is not under `old_prefix`. A path equal to
/// `old_prefix` maps to `new_prefix` itself.
#[must_use]
pub fn rebase(path: &Path, old_prefix: &Path, new_prefix: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(old_prefix).ok()?;
    Some(new_prefix.join(rest))
}

/// Whether `candidate` lies strictly under `root` (not equal to it).
#[must_use]
pub fn is_descendant(candidate: &Path, root: &Path) -> bool {
    candidate != root && candidate.starts_with(root)
}
