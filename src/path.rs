//! Path resolution and output containment
//!
//! Everything that turns a string from an artifact into a location on disk
//! goes through [`write_file`], which refuses any target that does not
//! resolve inside the output directory.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::progress::Reporter;

/// Canonical absolute form of an existing path
pub fn canonicalize(path: &Path) -> io::Result<PathBuf> {
    dunce::canonicalize(path)
}

/// `path` relative to `base`, if `base` is a proper ancestor
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(base).ok()?;
    if rel.as_os_str().is_empty() || !is_clean_relative(rel) {
        return None;
    }
    Some(rel.to_path_buf())
}

/// True for a non-empty relative path made only of normal segments
pub fn is_clean_relative(rel: &Path) -> bool {
    !rel.as_os_str().is_empty()
        && rel.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Render a relative path with forward slashes
pub fn to_posix(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether a path string captured from an artifact is absolute on any platform
pub fn looks_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    Path::new(path).is_absolute()
}

/// Whether a path string contains a `..` segment
pub fn has_parent_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

/// Normalize a captured path: forward slashes, no empty or `.` segments
///
/// `..` segments are kept so the containment check sees them.
pub fn clean_relative(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve an absolute path that may not exist yet
///
/// Existing prefixes are canonicalized so symlinks are followed; the
/// remainder is appended lexically with `..` popping a segment.
pub fn resolve_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut on_disk = true;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
                // After popping we are back on an existing ancestor
                on_disk = resolved.exists();
            }
            Component::Normal(name) => {
                resolved.push(name);
                if on_disk {
                    if fs::symlink_metadata(&resolved).is_ok() {
                        resolved = canonicalize(&resolved)?;
                    } else {
                        on_disk = false;
                    }
                }
            }
        }
    }

    Ok(resolved)
}

/// Whether `target` is `dir` or lies beneath it, compared by components
pub fn is_within(target: &Path, dir: &Path) -> bool {
    target.starts_with(dir)
}

/// Canonical output directory, failing if it is gone or read-only
pub fn output_root(output_dir: &Path) -> Result<PathBuf> {
    let unavailable = || Error::OutputDirUnavailable {
        path: output_dir.to_path_buf(),
    };

    let meta = fs::metadata(output_dir).map_err(|_| unavailable())?;
    if !meta.is_dir() {
        return Err(unavailable());
    }
    let root = canonicalize(output_dir).map_err(|_| unavailable())?;

    // Writable means this process can create a file here, whatever the mode bits say
    tempfile::NamedTempFile::new_in(&root).map_err(|_| unavailable())?;
    Ok(root)
}

/// Write `content` to `relative` under `output_dir`
///
/// Returns the written path, or `None` when this one file was rejected or
/// failed. An `Err` means the output directory itself is unusable and the
/// caller should stop.
pub fn write_file(
    output_dir: &Path,
    relative: &str,
    content: &str,
    reporter: &Reporter,
) -> Result<Option<PathBuf>> {
    let cleaned = clean_relative(relative);
    if cleaned.is_empty() {
        reporter.warn(format!("relative path '{}' is empty after cleaning, skipping", relative));
        return Ok(None);
    }

    let root = output_root(output_dir)?;

    let target = match resolve_lenient(&root.join(&cleaned)) {
        Ok(target) => target,
        Err(e) => {
            reporter.error(format!("invalid path generated for '{}': {}, skipping", cleaned, e));
            return Ok(None);
        }
    };

    if !is_within(&target, &root) || target == root {
        reporter.security(format!(
            "path '{}' resolved to '{}', outside output directory '{}', skipping",
            cleaned,
            target.display(),
            root.display()
        ));
        return Ok(None);
    }

    if let Some(parent) = target.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            reporter.error(format!("could not create directory '{}': {}", parent.display(), e));
            return Ok(None);
        }
    }

    if let Err(e) = fs::write(&target, content.as_bytes()) {
        reporter.error(format!("could not write '{}': {}", target.display(), e));
        return Ok(None);
    }

    tracing::debug!(path = %target.display(), bytes = content.len(), "wrote file");
    Ok(Some(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CancelToken;
    use tempfile::TempDir;

    fn reporter() -> Reporter {
        Reporter::new(CancelToken::new())
    }

    #[test]
    fn test_clean_relative() {
        assert_eq!(clean_relative("a\\b\\c.txt"), "a/b/c.txt");
        assert_eq!(clean_relative("./a//b/./c.txt/"), "a/b/c.txt");
        assert_eq!(clean_relative("/leading/slash"), "leading/slash");
        assert_eq!(clean_relative(".gitignore"), ".gitignore");
        assert_eq!(clean_relative("../../etc/passwd"), "../../etc/passwd");
        assert_eq!(clean_relative(" ./ "), "");
    }

    #[test]
    fn test_looks_absolute() {
        assert!(looks_absolute("/etc/passwd"));
        assert!(looks_absolute("\\\\server\\share"));
        assert!(looks_absolute("C:\\Windows"));
        assert!(looks_absolute("c:/x"));
        assert!(!looks_absolute("src/main.rs"));
        assert!(!looks_absolute("../x"));
    }

    #[test]
    fn test_has_parent_segment() {
        assert!(has_parent_segment("../x"));
        assert!(has_parent_segment("a\\..\\b"));
        assert!(!has_parent_segment("a..b/c"));
        assert!(!has_parent_segment("..hidden/file"));
    }

    #[test]
    fn test_to_posix() {
        let rel = Path::new("sub").join("dir").join("b.txt");
        assert_eq!(to_posix(&rel), "sub/dir/b.txt");
    }

    #[test]
    fn test_relative_to() {
        assert_eq!(
            relative_to(Path::new("/a/b/c.txt"), Path::new("/a")),
            Some(PathBuf::from("b/c.txt"))
        );
        assert_eq!(relative_to(Path::new("/a/b/c.txt"), Path::new("/x")), None);
        assert_eq!(relative_to(Path::new("/a"), Path::new("/a")), None);
    }

    #[test]
    fn test_resolve_lenient_missing_tail() {
        let dir = TempDir::new().unwrap();
        let root = canonicalize(dir.path()).unwrap();
        let resolved = resolve_lenient(&root.join("new/deeper/../file.txt")).unwrap();
        assert_eq!(resolved, root.join("new/file.txt"));
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let written = write_file(dir.path(), "sub/inner/b.txt", "world\n", &reporter())
            .unwrap()
            .unwrap();
        assert!(written.ends_with("sub/inner/b.txt"));
        assert_eq!(fs::read_to_string(dir.path().join("sub/inner/b.txt")).unwrap(), "world\n");
    }

    #[test]
    fn test_write_file_rejects_traversal() {
        let parent = TempDir::new().unwrap();
        let out = parent.path().join("out");
        fs::create_dir(&out).unwrap();

        let result = write_file(&out, "../escaped.txt", "x", &reporter()).unwrap();
        assert!(result.is_none());
        assert!(!parent.path().join("escaped.txt").exists());

        let result = write_file(&out, "a/../../escaped.txt", "x", &reporter()).unwrap();
        assert!(result.is_none());
        assert!(!parent.path().join("escaped.txt").exists());
        assert!(!out.join("a").exists());
    }

    #[test]
    fn test_write_file_inner_parent_allowed() {
        let dir = TempDir::new().unwrap();
        let written = write_file(dir.path(), "a/../b.txt", "ok", &reporter()).unwrap();
        assert!(written.is_some());
        assert_eq!(fs::read_to_string(dir.path().join("b.txt")).unwrap(), "ok");
    }

    #[test]
    fn test_write_file_rejects_output_root_itself() {
        let dir = TempDir::new().unwrap();
        let result = write_file(dir.path(), "a/..", "x", &reporter()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_write_file_missing_output_dir_is_fatal() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");
        let err = write_file(&missing, "a.txt", "x", &reporter()).unwrap_err();
        assert!(matches!(err, Error::OutputDirUnavailable { .. }));
    }

    #[test]
    fn test_output_root_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let root = output_root(dir.path()).unwrap();
        assert_eq!(root, canonicalize(dir.path()).unwrap());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_output_root_rejects_regular_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(output_root(&file), Err(Error::OutputDirUnavailable { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_output_dir_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::set_permissions(&out, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users write through any mode, nothing to check then
        let writable = fs::File::create(out.join("check")).is_ok();
        let result = write_file(&out, "a.txt", "x", &reporter());
        fs::set_permissions(&out, fs::Permissions::from_mode(0o755)).unwrap();
        if writable {
            return;
        }

        assert!(matches!(result, Err(Error::OutputDirUnavailable { .. })));
        assert!(!out.join("a.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_write_file_rejects_symlink_escape() {
        let parent = TempDir::new().unwrap();
        let out = parent.path().join("out");
        let outside = parent.path().join("outside");
        fs::create_dir(&out).unwrap();
        fs::create_dir(&outside).unwrap();
        std::os::unix::fs::symlink(&outside, out.join("link")).unwrap();

        let result = write_file(&out, "link/evil.txt", "x", &reporter()).unwrap();
        assert!(result.is_none());
        assert!(!outside.join("evil.txt").exists());
    }
}
