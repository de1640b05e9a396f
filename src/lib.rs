//! # textpack
//!
//! Merge a selection of text files into one delimited artifact, and split such
//! an artifact back into a directory tree.
//!
//! ## Artifact Layout
//!
//! An artifact is an optional hierarchy tree followed by one block per file,
//! blocks joined by the format's separator:
//!
//! ```text
//! --- START FILE HIERARCHY ---
//! └── project/
//!     ├── src/
//!     │   └── main.rs
//!     └── README.md
//! --- END FILE HIERARCHY ---
//!
//! --- START FILE: project/README.md ---
//! # Hello
//! --- END FILE: project/README.md ---
//!
//! --- START FILE: project/src/main.rs ---
//! fn main() {}
//! --- END FILE: project/src/main.rs ---
//! ```
//!
//! ## Formats
//!
//! Block delimiters come from a [`FormatDescriptor`]. Three are built in
//! (see [`format::FORMATS`]):
//!
//! - `Default`: `--- START FILE: {filepath} ---` / `--- END FILE: {filepath} ---`
//! - `Markdown`: ``File: `{filepath}` `` followed by a fenced code block
//! - `Markdown_Fenced`: ```` ```{filepath} ```` closed by a bare fence
//!
//! The tree is format independent; the splitter skips it whenever the first
//! line is the hierarchy start sentinel.
//!
//! ## Safety
//!
//! Splitting never writes outside the output directory. Absolute block paths
//! and paths that resolve (symlinks included) outside the output root are
//! logged as security events and skipped.
//!
//! ## Example
//!
//! ```no_run
//! use textpack::{run_merge, run_split, FormatDescriptor, MergeTarget, Reporter, SelectionEntry};
//!
//! let format = FormatDescriptor::default_format();
//! let reporter = Reporter::default();
//!
//! let entries = [SelectionEntry::folder("project", "")];
//! let merged = run_merge(&entries, format, true, &MergeTarget::File("merged.txt".into()), &reporter);
//! assert!(merged.is_success());
//!
//! let split = run_split("merged.txt".as_ref(), "restored".as_ref(), format, &reporter);
//! println!("{}", split.message);
//! ```

pub mod decoder;
pub mod discover;
pub mod encoder;
pub mod error;
pub mod format;
pub mod path;
pub mod progress;
pub mod tree;
pub mod worker;

pub use decoder::{Block, ParseSummary, SplitParser, SplitStats};
pub use discover::{discover, DiscoveredFile, Discovery, EntryKind, SelectionEntry};
pub use encoder::{MergeStats, MergeWriter};
pub use error::{Error, Result};
pub use format::{EndDelimiter, FormatDescriptor, FORMATS};
pub use progress::{CancelToken, Event, LogLevel, LogLine, Outcome, Reporter, Status};
pub use tree::HierarchyTree;
pub use worker::{run_merge, run_split, spawn_merge, spawn_split, MergeTarget, Operation};
