//! Path normalization and small path utilities shared by the mount table, the engine, and
//! the VFS facade.
//!
//! Every path handled by this crate is an absolute, `/`-separated, UTF-8 string — there is
//! no `Path`/`OsStr` platform dependence here, since the namespace this crate presents is a
//! virtual one, not the host OS's.

use smallvec::SmallVec;

/// Most paths this crate normalizes are a handful of segments deep; inline storage for the
/// first 8 avoids a heap allocation on the common case.
type SegmentStack<'a> = SmallVec<[&'a str; 8]>;

/// Collapse `.` and `..` segments and duplicate separators, returning a canonical absolute
/// path. `..` at the root is absorbed (it cannot go above `/`). The result never ends in
/// `/` unless it is exactly `"/"`.
pub fn normalize(path: &str) -> String {
    let mut stack: SegmentStack<'_> = SmallVec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        let mut out = String::with_capacity(path.len());
        for segment in stack {
            out.push('/');
            out.push_str(segment);
        }
        out
    }
}

/// Join a normalized absolute `base` with a (possibly relative) `rel` component, then
/// re-normalize. If `rel` is itself absolute, `base` is discarded.
pub fn join(base: &str, rel: &str) -> String {
    if rel.starts_with('/') {
        normalize(rel)
    } else if base == "/" {
        normalize(&format!("/{rel}"))
    } else {
        normalize(&format!("{base}/{rel}"))
    }
}

/// Split into `(parent, basename)`. The root's parent is itself and its basename is `""`.
pub fn split(path: &str) -> (&str, &str) {
    let normalized_is_root = path == "/";
    if normalized_is_root {
        return ("/", "");
    }
    match path.rfind('/') {
        Some(0) => ("/", &path[1..]),
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("/", path),
    }
}

/// The final path component, e.g. `basename("/a/b/c") == "c"`.
pub fn basename(path: &str) -> &str {
    split(path).1
}

/// Everything before the final path component, e.g. `dirname("/a/b/c") == "/a/b"`.
pub fn dirname(path: &str) -> &str {
    split(path).0
}

/// `true` iff `path` has a trailing `/` and is not itself `"/"` — callers use this before
/// normalizing to reject e.g. `open("/file/", ...)` against a regular file with `ENOTDIR`.
pub fn has_trailing_slash(path: &str) -> bool {
    path.len() > 1 && path.ends_with('/')
}

/// `true` iff `maybe_descendant` is `ancestor` itself or nested under it, using `/`-bounded
/// prefix comparison (so `/ab` is not considered a descendant of `/a`).
pub fn is_self_or_descendant(ancestor: &str, maybe_descendant: &str) -> bool {
    if ancestor == maybe_descendant {
        return true;
    }
    let prefix = if ancestor == "/" {
        "/".to_string()
    } else {
        format!("{ancestor}/")
    };
    maybe_descendant.starts_with(&prefix)
}
