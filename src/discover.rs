//! File discovery
//!
//! Turns the caller's selection (single files and folder roots, each with
//! the base used for relative paths) into a deduplicated, sorted list of
//! files to merge.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::path::{canonicalize, is_clean_relative, relative_to, to_posix};
use crate::progress::Reporter;

/// What a selection entry points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// One item chosen by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEntry {
    pub kind: EntryKind,
    pub path: PathBuf,
    /// Anchor for relative paths; empty means the parent of `path`
    pub base: PathBuf,
}

impl SelectionEntry {
    pub fn file(path: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self { kind: EntryKind::File, path: path.into(), base: base.into() }
    }

    pub fn folder(path: impl Into<PathBuf>, base: impl Into<PathBuf>) -> Self {
        Self { kind: EntryKind::Folder, path: path.into(), base: base.into() }
    }
}

/// A file that will be merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Canonical location on disk
    pub absolute_path: PathBuf,
    /// Path inside the artifact, always forward slashes
    pub relative_path: String,
    /// Size in bytes, 0 if it could not be read
    pub size: u64,
}

/// Result of scanning a selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    pub total_size: u64,
    pub warnings: Vec<String>,
    /// Set when the scan stopped early; `files` is then empty
    pub cancelled: bool,
}

/// Scan `entries` into a sorted, deduplicated file list
///
/// Per-entry problems become warnings. Only an empty selection is an error.
pub fn discover(entries: &[SelectionEntry], reporter: &Reporter) -> Result<Discovery> {
    if entries.is_empty() {
        return Err(Error::EmptySelection);
    }

    let mut scan = Scan {
        reporter,
        seen: HashSet::new(),
        out: Discovery::default(),
    };

    reporter.info("Scanning files and folders based on input selections...");
    for entry in entries {
        if reporter.is_cancelled() {
            scan.out.cancelled = true;
            break;
        }
        match entry.kind {
            EntryKind::File => scan.file(entry),
            EntryKind::Folder => scan.folder(entry),
        }
        if scan.out.cancelled {
            break;
        }
    }

    let mut out = scan.out;
    if out.cancelled {
        reporter.warn("scan cancelled");
        out.files.clear();
        out.total_size = 0;
        return Ok(out);
    }

    out.files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    reporter.info(format!(
        "Found {} unique files. Total size: {} bytes.",
        out.files.len(),
        out.total_size
    ));
    Ok(out)
}

struct Scan<'r> {
    reporter: &'r Reporter,
    seen: HashSet<PathBuf>,
    out: Discovery,
}

impl Scan<'_> {
    fn warn(&mut self, message: String) {
        self.reporter.warn(message.clone());
        self.out.warnings.push(message);
    }

    fn file(&mut self, entry: &SelectionEntry) {
        let path = match canonicalize(&entry.path) {
            Ok(path) if path.is_file() => path,
            Ok(path) => {
                self.warn(format!("selected path is not a file: {}", path.display()));
                return;
            }
            Err(e) => {
                self.warn(format!("selected file not found: {} ({})", entry.path.display(), e));
                return;
            }
        };

        if self.seen.contains(&path) {
            tracing::debug!(path = %path.display(), "skipping duplicate file");
            return;
        }

        let base = self.base_for(entry, &path);
        let parent = path.parent().map(Path::to_path_buf);
        let anchors = [(base, "base"), (parent, "parent directory")];
        let relative = self.relative_with_fallbacks(&path, &path, &anchors);
        self.accept(path, relative);
    }

    fn folder(&mut self, entry: &SelectionEntry) {
        let root = match canonicalize(&entry.path) {
            Ok(root) if root.is_dir() => root,
            Ok(root) => {
                self.warn(format!("selected path is not a folder: {}", root.display()));
                return;
            }
            Err(e) => {
                self.warn(format!("selected folder not found: {} ({})", entry.path.display(), e));
                return;
            }
        };

        let base = self.base_for(entry, &root);
        let anchors = [(base, "base"), (Some(root.clone()), "scanned folder")];

        for item in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            if self.reporter.is_cancelled() {
                self.out.cancelled = true;
                return;
            }

            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    self.warn(format!("could not read entry under {}: {}", root.display(), e));
                    continue;
                }
            };

            // Symlinked files are merged; symlinked directories are never entered
            let file_type = item.file_type();
            let is_file = file_type.is_file() || (file_type.is_symlink() && item.path().is_file());
            if !is_file {
                continue;
            }

            let canonical = match canonicalize(item.path()) {
                Ok(path) => path,
                Err(e) => {
                    self.warn(format!("could not resolve {}: {}", item.path().display(), e));
                    continue;
                }
            };
            if self.seen.contains(&canonical) {
                continue;
            }

            let relative = self.relative_with_fallbacks(item.path(), &canonical, &anchors);
            self.accept(canonical, relative);
        }
    }

    /// Canonical base for `entry`, defaulting to the parent of `resolved`
    fn base_for(&mut self, entry: &SelectionEntry, resolved: &Path) -> Option<PathBuf> {
        if entry.base.as_os_str().is_empty() {
            return resolved.parent().map(Path::to_path_buf);
        }
        match canonicalize(&entry.base) {
            Ok(base) => Some(base),
            Err(e) => {
                self.warn(format!("could not resolve base '{}': {}", entry.base.display(), e));
                None
            }
        }
    }

    /// Try each anchor in turn, then the bare file name
    fn relative_with_fallbacks(
        &mut self,
        path: &Path,
        canonical: &Path,
        anchors: &[(Option<PathBuf>, &str)],
    ) -> Option<PathBuf> {
        for (i, (anchor, label)) in anchors.iter().enumerate() {
            let Some(anchor) = anchor else { continue };
            if let Some(relative) = relative_to(path, anchor) {
                if i > 0 {
                    self.warn(format!(
                        "could not make '{}' relative to its base, using path relative to {}: '{}'",
                        canonical.display(),
                        label,
                        to_posix(&relative)
                    ));
                }
                return Some(relative);
            }
        }

        match canonical.file_name().map(PathBuf::from) {
            Some(name) if is_clean_relative(&name) => {
                self.warn(format!(
                    "could not determine a relative path for '{}', using file name only",
                    canonical.display()
                ));
                Some(name)
            }
            _ => {
                self.warn(format!("dropping '{}': no usable relative path", canonical.display()));
                None
            }
        }
    }

    /// Record a file once it has a relative path; dropped files stay unclaimed
    fn accept(&mut self, canonical: PathBuf, relative: Option<PathBuf>) {
        let Some(relative) = relative else { return };
        if self.seen.insert(canonical.clone()) {
            self.add(canonical, relative);
        }
    }

    fn add(&mut self, absolute_path: PathBuf, relative: PathBuf) {
        let size = match fs::metadata(&absolute_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                self.warn(format!(
                    "could not get size for {}: {}, using size 0",
                    absolute_path.display(),
                    e
                ));
                0
            }
        };

        self.out.total_size += size;
        self.out.files.push(DiscoveredFile {
            absolute_path,
            relative_path: to_posix(&relative),
            size,
        });
    }
}
