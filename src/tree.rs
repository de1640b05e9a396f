//! ASCII hierarchy tree written ahead of the file blocks

use std::collections::{BTreeMap, BTreeSet};

use crate::discover::DiscoveredFile;
use crate::format::{TREE_END, TREE_START};

const BRANCH: &str = "├── ";
const LAST_BRANCH: &str = "└── ";
const INDENT: &str = "│   ";
const LAST_INDENT: &str = "    ";

#[derive(Debug, Default)]
struct Node {
    dirs: BTreeMap<String, Node>,
    files: BTreeSet<String>,
}

impl Node {
    fn insert(&mut self, segments: &[&str]) {
        match segments {
            [] => {}
            [file] => {
                self.files.insert((*file).to_string());
            }
            [dir, rest @ ..] => self.dirs.entry((*dir).to_string()).or_default().insert(rest),
        }
    }

    /// Children in display order: directories first, each group case-insensitive
    fn children(&self) -> Vec<(&str, Option<&Node>)> {
        let mut dirs: Vec<(&str, Option<&Node>)> =
            self.dirs.iter().map(|(k, v)| (k.as_str(), Some(v))).collect();
        let mut files: Vec<(&str, Option<&Node>)> = self.files.iter().map(|k| (k.as_str(), None)).collect();
        dirs.sort_by_key(|(name, _)| name.to_lowercase());
        files.sort_by_key(|(name, _)| name.to_lowercase());
        dirs.extend(files);
        dirs
    }

    fn render(&self, indent: &str, out: &mut Vec<String>) {
        let children = self.children();
        let count = children.len();
        for (i, (name, node)) in children.into_iter().enumerate() {
            let last = i + 1 == count;
            let branch = if last { LAST_BRANCH } else { BRANCH };
            match node {
                Some(dir) => {
                    out.push(format!("{indent}{branch}{name}/"));
                    let child_indent = format!("{indent}{}", if last { LAST_INDENT } else { INDENT });
                    dir.render(&child_indent, out);
                }
                None => out.push(format!("{indent}{branch}{name}")),
            }
        }
    }
}

/// Tree of relative paths
#[derive(Debug, Default)]
pub struct HierarchyTree {
    root: Node,
}

impl HierarchyTree {
    /// Build from forward-slash relative paths; duplicates collapse
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a str>) -> Self {
        let mut root = Node::default();
        for path in paths {
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            root.insert(&segments);
        }
        Self { root }
    }

    pub fn from_files(files: &[DiscoveredFile]) -> Self {
        Self::from_paths(files.iter().map(|f| f.relative_path.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.root.dirs.is_empty() && self.root.files.is_empty()
    }

    /// Number of distinct first segments
    ///
    /// More than one usually means the selection mixed unrelated bases.
    pub fn root_count(&self) -> usize {
        self.root.dirs.len() + self.root.files.len()
    }

    /// Render between the hierarchy sentinels; empty tree renders as ""
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut lines = Vec::new();
        self.root.render("", &mut lines);

        let mut output = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum::<usize>() + 64);
        output.push_str(TREE_START);
        output.push('\n');
        for line in lines {
            output.push_str(&line);
            output.push('\n');
        }
        output.push_str(TREE_END);
        output.push('\n');
        output
    }
}

/// Render the tree for `files`
pub fn render(files: &[DiscoveredFile]) -> String {
    HierarchyTree::from_files(files).render()
}
