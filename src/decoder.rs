//! Split parser
//!
//! A single pass over the artifact, one line at a time:
//!
//! ```text
//! TreeProbe ──(hierarchy start)──> TreeHeader ──(hierarchy end)──┐
//!     │                                                          v
//!     └──────────────(anything else, same line)──────────────> Outside <──┐
//!                                                                 │       │
//!                                                   (start line)  v       │ (end line)
//!                                                               Inside ───┘
//! ```
//!
//! Lines keep their terminators, so a block's content is byte-for-byte what
//! sat between its delimiters. Delimiter comparisons use the trimmed line.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::encoder::decode_latin1;
use crate::error::{Error, Result};
use crate::format::{FormatDescriptor, TREE_END, TREE_START};
use crate::path::{has_parent_segment, looks_absolute, write_file};
use crate::progress::Reporter;

/// A file block recovered from an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Relative path as captured from the start line, trimmed
    pub path: String,
    pub content: String,
    /// 1-based line number of the start line
    pub line: usize,
    /// False when the artifact ended before the end delimiter
    pub terminated: bool,
}

/// Counters from one parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseSummary {
    /// Blocks handed to the caller
    pub blocks: usize,
    /// Start lines refused because of an empty or absolute path
    pub rejected: usize,
    pub cancelled: bool,
}

/// Counters from one split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitStats {
    /// Files written to disk
    pub files_created: usize,
    /// Blocks found, including ones refused at write time
    pub blocks_found: usize,
    /// Start lines refused before a block was opened
    pub rejected: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    TreeProbe,
    TreeHeader,
    Outside,
    Inside,
}

#[derive(Debug)]
struct ParseState {
    phase: Phase,
    current_path: Option<String>,
    end_line: String,
    content: String,
    skip_next_line: bool,
    start_line: usize,
}

impl ParseState {
    fn new() -> Self {
        Self {
            phase: Phase::TreeProbe,
            current_path: None,
            end_line: String::new(),
            content: String::new(),
            skip_next_line: false,
            start_line: 0,
        }
    }

    /// `raw_path` is the untrimmed capture, which is what the writer used
    fn open(&mut self, path: &str, raw_path: &str, format: &FormatDescriptor, line: usize) {
        self.phase = Phase::Inside;
        self.end_line = format.end_line(raw_path).into_owned();
        self.current_path = Some(path.to_string());
        self.content.clear();
        self.skip_next_line = format.skip_line_after_start;
        self.start_line = line;
    }

    fn close(&mut self, terminated: bool) -> Option<Block> {
        self.phase = Phase::Outside;
        self.skip_next_line = false;
        let path = self.current_path.take()?;
        Some(Block {
            path,
            content: std::mem::take(&mut self.content),
            line: self.start_line,
            terminated,
        })
    }
}

/// Parses artifacts written with one format
#[derive(Debug, Clone)]
pub struct SplitParser {
    format: FormatDescriptor,
}

impl SplitParser {
    /// Create a parser for `format`
    pub fn new(format: &FormatDescriptor) -> Self {
        Self { format: format.clone() }
    }

    /// Run the state machine over `bytes`, handing each block to `on_block`
    ///
    /// An error from `on_block` stops the parse and is returned as is.
    pub fn parse<F>(&self, bytes: &[u8], reporter: &Reporter, mut on_block: F) -> Result<ParseSummary>
    where
        F: FnMut(Block) -> Result<()>,
    {
        let regex = self.format.validate()?;
        let total = bytes.len() as u64;
        let mut summary = ParseSummary::default();
        let mut state = ParseState::new();
        let mut consumed = 0u64;
        let mut tree_lines = 0usize;

        let (text, utf8) = match std::str::from_utf8(bytes) {
            Ok(text) => (Cow::Borrowed(text), true),
            Err(_) => {
                reporter.warn("merged file is not valid UTF-8, decoding as Latin-1");
                (Cow::Owned(decode_latin1(bytes)), false)
            }
        };

        reporter.progress(0);
        reporter.info("Checking for file hierarchy tree...");

        for (index, line) in text.split_inclusive('\n').enumerate() {
            if reporter.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let line_no = index + 1;
            // Latin-1 maps each raw byte to exactly one char
            let raw_len = if utf8 { line.len() } else { line.chars().count() };
            consumed += raw_len as u64;
            reporter.progress_ratio(consumed, total);

            let trimmed = line.trim();

            if state.phase == Phase::TreeProbe {
                if trimmed == TREE_START {
                    reporter.info(format!("Found '{}'. Skipping tree section...", TREE_START));
                    state.phase = Phase::TreeHeader;
                    tree_lines = 1;
                    continue;
                }
                reporter.info("No hierarchy tree section found at the beginning.");
                state.phase = Phase::Outside;
            }

            match state.phase {
                Phase::TreeHeader => {
                    tree_lines += 1;
                    if trimmed == TREE_END {
                        reporter.info(format!(
                            "Found '{}'. Skipped {} lines of tree header.",
                            TREE_END, tree_lines
                        ));
                        state.phase = Phase::Outside;
                    }
                }
                Phase::TreeProbe | Phase::Outside => {
                    self.scan_for_start(&regex, trimmed, line_no, &mut state, &mut summary, reporter);
                }
                Phase::Inside => {
                    if state.skip_next_line {
                        state.skip_next_line = false;
                        continue;
                    }
                    if trimmed == state.end_line {
                        if let Some(block) = state.close(true) {
                            summary.blocks += 1;
                            on_block(block)?;
                        }
                    } else {
                        state.content.push_str(line);
                    }
                }
            }
        }

        if summary.cancelled {
            return Ok(summary);
        }

        match state.phase {
            Phase::TreeHeader => reporter.warn(format!(
                "reached end of input while skipping tree, '{}' not found; tree section looks truncated",
                TREE_END
            )),
            Phase::Inside => {
                if let Some(block) = state.close(false) {
                    reporter.warn(format!(
                        "merged file ended before the end delimiter for '{}', saving remaining content",
                        block.path
                    ));
                    summary.blocks += 1;
                    on_block(block)?;
                }
            }
            Phase::TreeProbe | Phase::Outside => {}
        }

        reporter.progress(100);
        Ok(summary)
    }

    /// Handle one line while outside a block
    fn scan_for_start(
        &self,
        regex: &Regex,
        trimmed: &str,
        line_no: usize,
        state: &mut ParseState,
        summary: &mut ParseSummary,
        reporter: &Reporter,
    ) {
        let Some(caps) = regex.captures(trimmed) else {
            return;
        };
        let raw = caps.get(1).map_or("", |m| m.as_str());
        let captured = raw.trim();

        if captured.is_empty() {
            reporter.warn(format!("empty file path in start delimiter at line {}, skipping block", line_no));
            summary.rejected += 1;
            return;
        }
        if looks_absolute(captured) {
            reporter.security(format!(
                "absolute path '{}' in start delimiter at line {}, skipping block",
                captured, line_no
            ));
            summary.rejected += 1;
            return;
        }
        if has_parent_segment(captured) {
            reporter.warn(format!(
                "possible path traversal '{}' at line {}, checked again before writing",
                captured, line_no
            ));
        }

        state.open(captured, raw, &self.format, line_no);
    }

    /// Parse without writing anything
    pub fn list_bytes(&self, bytes: &[u8], reporter: &Reporter) -> Result<(Vec<Block>, ParseSummary)> {
        let mut blocks = Vec::new();
        let summary = self.parse(bytes, reporter, |block| {
            blocks.push(block);
            Ok(())
        })?;
        Ok((blocks, summary))
    }

    /// Parse the artifact at `artifact` without writing anything
    pub fn list_file(&self, artifact: &Path, reporter: &Reporter) -> Result<(Vec<Block>, ParseSummary)> {
        let bytes = read_artifact(artifact)?;
        self.list_bytes(&bytes, reporter)
    }

    /// Split the artifact at `artifact` into `output_dir`
    pub fn split_file(&self, artifact: &Path, output_dir: &Path, reporter: &Reporter) -> Result<SplitStats> {
        let bytes = read_artifact(artifact)?;
        self.split_bytes(&bytes, output_dir, reporter)
    }

    /// Split an in-memory artifact into `output_dir`
    pub fn split_bytes(&self, bytes: &[u8], output_dir: &Path, reporter: &Reporter) -> Result<SplitStats> {
        self.split_observed(bytes, output_dir, reporter, |_| {})
    }

    /// Split, calling `after_write` with each file as it lands on disk
    pub(crate) fn split_observed<F>(
        &self,
        bytes: &[u8],
        output_dir: &Path,
        reporter: &Reporter,
        mut after_write: F,
    ) -> Result<SplitStats>
    where
        F: FnMut(&Path),
    {
        fs::create_dir_all(output_dir).map_err(|source| Error::CreateOutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let mut created: Vec<PathBuf> = Vec::new();
        let summary = self.parse(bytes, reporter, |block| {
            if let Some(written) = write_file(output_dir, &block.path, &block.content, reporter)? {
                after_write(&written);
                created.push(written);
            }
            Ok(())
        })?;

        let mut stats = SplitStats {
            files_created: created.len(),
            blocks_found: summary.blocks,
            rejected: summary.rejected,
            cancelled: summary.cancelled,
        };

        if summary.cancelled {
            remove_created(&created, reporter);
            stats.files_created = 0;
        }
        Ok(stats)
    }
}

pub(crate) fn read_artifact(artifact: &Path) -> Result<Vec<u8>> {
    fs::read(artifact).map_err(|source| Error::OpenArtifact {
        path: artifact.to_path_buf(),
        source,
    })
}

/// Best-effort removal of files written by a cancelled split
fn remove_created(created: &[PathBuf], reporter: &Reporter) {
    reporter.info(format!("Attempting cleanup of {} created files...", created.len()));
    let mut removed = 0usize;
    for path in created {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => reporter.warn(format!("could not remove '{}': {}", path.display(), e)),
        }
    }
    reporter.info(format!("Cleanup finished. Removed {} files.", removed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CancelToken;
    use tempfile::TempDir;

    const SCENARIO: &str = "\
--- START FILE: a.txt ---
hello
--- END FILE: a.txt ---

--- START FILE: sub/b.txt ---
world
--- END FILE: sub/b.txt ---
";

    fn reporter() -> Reporter {
        Reporter::new(CancelToken::new())
    }

    fn default_parser() -> SplitParser {
        SplitParser::new(FormatDescriptor::default_format())
    }

    fn list(parser: &SplitParser, input: &str) -> Vec<Block> {
        parser.list_bytes(input.as_bytes(), &reporter()).unwrap().0
    }

    #[test]
    fn test_split_scenario() {
        let dir = TempDir::new().unwrap();
        let stats = default_parser()
            .split_bytes(SCENARIO.as_bytes(), dir.path(), &reporter())
            .unwrap();

        assert_eq!(stats.files_created, 2);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hello\n");
        assert_eq!(fs::read_to_string(dir.path().join("sub/b.txt")).unwrap(), "world\n");
    }

    #[test]
    fn test_list_blocks() {
        let blocks = list(&default_parser(), SCENARIO);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].path, "a.txt");
        assert_eq!(blocks[0].line, 1);
        assert_eq!(blocks[1].path, "sub/b.txt");
        assert_eq!(blocks[1].line, 5);
        assert!(blocks.iter().all(|b| b.terminated));
    }

    #[test]
    fn test_skips_tree_header() {
        let input = format!(
            "{}\n└── p/\n    └── --- START FILE: fake.txt ---\n{}\n\n{}",
            TREE_START, TREE_END, SCENARIO
        );
        let blocks = list(&default_parser(), &input);
        let paths: Vec<&str> = blocks.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "sub/b.txt"]);
    }

    #[test]
    fn test_tree_sentinel_only_recognized_on_first_line() {
        let input = format!("\n{}\n--- START FILE: x ---\nbody\n--- END FILE: x ---\n", TREE_START);
        let blocks = list(&default_parser(), &input);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "body\n");
    }

    #[test]
    fn test_truncated_tree_header() {
        let input = format!("{}\n├── a\n--- START FILE: a ---\nx\n--- END FILE: a ---\n", TREE_START);
        let (blocks, summary) = default_parser().list_bytes(input.as_bytes(), &reporter()).unwrap();
        assert!(blocks.is_empty());
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_stray_lines_between_blocks_ignored() {
        let input = "preamble\n--- START FILE: a ---\nA\n--- END FILE: a ---\nnoise\n\n--- START FILE: b ---\nB\n--- END FILE: b ---\ntrailer";
        let blocks = list(&default_parser(), input);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].content, "B\n");
    }

    #[test]
    fn test_crlf_preserved_in_content() {
        let input = "--- START FILE: win.txt ---\r\nline one\r\nline two\r\n--- END FILE: win.txt ---\r\n";
        let blocks = list(&default_parser(), input);
        assert_eq!(blocks[0].content, "line one\r\nline two\r\n");
    }

    #[test]
    fn test_end_line_must_match_current_path() {
        let input = "--- START FILE: a ---\n--- END FILE: b ---\n--- END FILE: a ---\n";
        let blocks = list(&default_parser(), input);
        assert_eq!(blocks[0].content, "--- END FILE: b ---\n");
    }

    #[test]
    fn test_padded_path_closes_on_writer_end_line() {
        let input = "\
--- START FILE: x  ---
A
--- END FILE: x  ---
--- START FILE: y ---
B
--- END FILE: y ---
";
        let blocks = list(&default_parser(), input);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].path, "x");
        assert_eq!(blocks[0].content, "A\n");
        assert!(blocks[0].terminated);
        assert_eq!(blocks[1].path, "y");
        assert_eq!(blocks[1].content, "B\n");
    }

    #[test]
    fn test_markdown_skips_fence_after_header() {
        let parser = SplitParser::new(FormatDescriptor::lookup("Markdown").unwrap());
        let input = "File: `src/lib.rs`\n```\npub fn f() {}\n```\n\nFile: `empty.rs`\n```\n```\n";
        let blocks = list(&parser, input);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].content, "pub fn f() {}\n");
        assert_eq!(blocks[1].path, "empty.rs");
        assert_eq!(blocks[1].content, "");
    }

    #[test]
    fn test_fenced_format() {
        let parser = SplitParser::new(FormatDescriptor::lookup("Markdown_Fenced").unwrap());
        let input = "```x.py\nprint(1)\n```\n\n```y/z.py\npass\n```\n";
        let blocks = list(&parser, input);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].path, "y/z.py");
        assert_eq!(blocks[1].content, "pass\n");
    }

    #[test]
    fn test_rejects_empty_and_absolute_paths() {
        let input = "\
--- START FILE:  ---
ignored
--- START FILE: /etc/passwd ---
root
--- START FILE: ok.txt ---
fine
--- END FILE: ok.txt ---
";
        let (blocks, summary) = default_parser().list_bytes(input.as_bytes(), &reporter()).unwrap();
        assert_eq!(summary.rejected, 2);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].path, "ok.txt");
        assert_eq!(blocks[0].content, "fine\n");
    }

    #[test]
    fn test_traversal_rejected_at_write_and_split_continues() {
        let parent = TempDir::new().unwrap();
        let out = parent.path().join("out");
        let input = "\
--- START FILE: ../../escape.txt ---
bad
--- END FILE: ../../escape.txt ---
--- START FILE: good.txt ---
good
--- END FILE: good.txt ---
";
        let stats = default_parser()
            .split_bytes(input.as_bytes(), &out, &reporter())
            .unwrap();
        assert_eq!(stats.blocks_found, 2);
        assert_eq!(stats.files_created, 1);
        assert!(out.join("good.txt").exists());
        assert!(!parent.path().join("escape.txt").exists());
    }

    #[test]
    fn test_unterminated_block_flushed() {
        let input = "--- START FILE: a ---\nA\n--- END FILE: a ---\n--- START FILE: tail.txt ---\nlast\nlines";
        let blocks = list(&default_parser(), input);
        assert_eq!(blocks.len(), 2);
        assert!(!blocks[1].terminated);
        assert_eq!(blocks[1].content, "last\nlines");
    }

    #[test]
    fn test_latin1_artifact() {
        let mut input = b"--- START FILE: l.txt ---\ncaf".to_vec();
        input.push(0xe9);
        input.extend_from_slice(b"\n--- END FILE: l.txt ---\n");
        let (blocks, _) = default_parser().list_bytes(&input, &reporter()).unwrap();
        assert_eq!(blocks[0].content, "café\n");
    }

    #[test]
    fn test_invalid_format_is_fatal() {
        let broken = FormatDescriptor {
            start_pattern: "^(unclosed",
            ..FormatDescriptor::default_format().clone()
        };
        let result = SplitParser::new(&broken).list_bytes(SCENARIO.as_bytes(), &reporter());
        assert!(matches!(result, Err(Error::InvalidFormat { .. })));
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let result = default_parser().split_file(&dir.path().join("none.txt"), dir.path(), &reporter());
        assert!(matches!(result, Err(Error::OpenArtifact { .. })));
    }

    #[test]
    fn test_cancel_mid_split_removes_created_files() {
        let dir = TempDir::new().unwrap();
        let token = CancelToken::new();
        let reporter = Reporter::new(token.clone());

        let stats = default_parser()
            .split_observed(SCENARIO.as_bytes(), dir.path(), &reporter, |_| token.cancel())
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.files_created, 0);
        assert!(!dir.path().join("a.txt").exists());
        assert!(!dir.path().join("sub/b.txt").exists());
    }
}
