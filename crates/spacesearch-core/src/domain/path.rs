//! In-space paths
//!
//! Every indexed path is relative to its space root and normalized to the
//! `./a/b` form. The root itself is `.`.

/// Path of a space root
pub const ROOT_PATH: &str = ".";

/// Normalize a path to the `./a/b` form.
///
/// Empty segments and `.` are dropped, `..` pops a segment and never
/// climbs above the root. The result has no trailing separator.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("{}/{}", ROOT_PATH, segments.join("/"))
    }
}

/// Last segment of a normalized path
pub fn base_name(path: &str) -> &str {
    if path == ROOT_PATH {
        return ROOT_PATH;
    }
    path.rsplit('/').next().unwrap_or(path)
}

/// Whether `path` equals `scope` or lies beneath it.
///
/// Comparison is segment-aware: `./docsx` is not within `./docs`.
pub fn is_within_scope(path: &str, scope: &str) -> bool {
    let path = path.strip_suffix('/').unwrap_or(path);
    let scope = scope.strip_suffix('/').unwrap_or(scope);

    if scope.is_empty() || scope == ROOT_PATH || path == scope {
        return true;
    }
    path.strip_prefix(scope)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

/// Rewrite `path` when it is `old_prefix` or lies beneath it.
///
/// Returns `None` for paths outside the subtree.
pub fn replace_path_prefix(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if path == old_prefix {
        return Some(new_prefix.to_string());
    }
    let rest = path.strip_prefix(old_prefix)?;
    if rest.starts_with('/') {
        Some(format!("{}{}", new_prefix, rest))
    } else {
        None
    }
}
