//! Delimiter formats
//!
//! A [`FormatDescriptor`] describes both halves of a merge/split round trip:
//! the lines the writer emits around every file, and the pattern the parser
//! uses to recognize them again. The set of formats is fixed and lives in
//! [`FORMATS`].

use std::borrow::Cow;
use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};

/// First line of the optional hierarchy tree section
pub const TREE_START: &str = "--- START FILE HIERARCHY ---";
/// Last line of the optional hierarchy tree section
pub const TREE_END: &str = "--- END FILE HIERARCHY ---";

/// Placeholder substituted with the relative path in templates
pub const FILEPATH_PLACEHOLDER: &str = "{filepath}";

const SAMPLE_PATH: &str = "dir/sample file.txt";

/// How the closing line of a file block is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDelimiter {
    /// Template that embeds the relative path via `{filepath}`
    PerFile(&'static str),
    /// The same closing line for every file
    Fixed(&'static str),
}

impl EndDelimiter {
    /// Render the exact end line for `relative_path`
    pub fn render<'a>(&self, relative_path: &str) -> Cow<'a, str> {
        match *self {
            EndDelimiter::PerFile(template) => {
                Cow::Owned(template.replace(FILEPATH_PLACEHOLDER, relative_path))
            }
            EndDelimiter::Fixed(line) => Cow::Borrowed(line),
        }
    }
}

/// A named delimiter format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    /// Registry key, e.g. `Markdown_Fenced`
    pub key: &'static str,
    /// Human readable name
    pub name: &'static str,
    /// Line written before each file; contains `{filepath}`
    pub start_template: &'static str,
    /// Line written after each file
    pub end: EndDelimiter,
    /// Text written between consecutive blocks
    pub file_separator: &'static str,
    /// Written verbatim right after the start line
    pub content_prefix: &'static str,
    /// Written verbatim right before the end line
    pub content_suffix: &'static str,
    /// Pattern matching a trimmed start line, one capture group for the path
    pub start_pattern: &'static str,
    /// Whether the line right after a start line is markup, not content
    pub skip_line_after_start: bool,
}

/// Built-in formats, the first entry is the default
pub static FORMATS: [FormatDescriptor; 3] = [
    FormatDescriptor {
        key: "Default",
        name: "Default",
        start_template: "--- START FILE: {filepath} ---",
        end: EndDelimiter::PerFile("--- END FILE: {filepath} ---"),
        file_separator: "\n",
        content_prefix: "",
        content_suffix: "",
        start_pattern: r"^--- START FILE: (.*?) ---$",
        skip_line_after_start: false,
    },
    FormatDescriptor {
        key: "Markdown",
        name: "Markdown",
        start_template: "File: `{filepath}`",
        end: EndDelimiter::Fixed("```"),
        file_separator: "\n",
        content_prefix: "```\n",
        content_suffix: "",
        start_pattern: r"^File: `(.*?)`$",
        skip_line_after_start: true,
    },
    FormatDescriptor {
        key: "Markdown_Fenced",
        name: "Markdown (Fenced)",
        start_template: "```{filepath}",
        end: EndDelimiter::Fixed("```"),
        file_separator: "\n",
        content_prefix: "",
        content_suffix: "",
        // A bare closing fence has no info string and must not open a block
        start_pattern: r"^```([^`].*)$",
        skip_line_after_start: false,
    },
];

impl FormatDescriptor {
    /// The format used when none is chosen
    pub fn default_format() -> &'static FormatDescriptor {
        &FORMATS[0]
    }

    /// Find a built-in format by key or display name, ignoring case
    pub fn lookup(name: &str) -> Option<&'static FormatDescriptor> {
        let name = name.trim();
        FORMATS
            .iter()
            .find(|f| f.key.eq_ignore_ascii_case(name) || f.name.eq_ignore_ascii_case(name))
    }

    /// Start line for `relative_path`
    pub fn start_line(&self, relative_path: &str) -> String {
        self.start_template.replace(FILEPATH_PLACEHOLDER, relative_path)
    }

    /// End line for `relative_path`
    pub fn end_line<'a>(&self, relative_path: &str) -> Cow<'a, str> {
        self.end.render(relative_path)
    }

    /// Compile the start pattern, checking it has exactly one capture group
    pub fn start_regex(&self) -> Result<Regex> {
        let regex = Regex::new(self.start_pattern).map_err(|e| self.invalid(e.to_string()))?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() != 2 {
            return Err(self.invalid(format!(
                "start pattern must have exactly one capture group, found {}",
                regex.captures_len() - 1
            )));
        }
        Ok(regex)
    }

    /// Check the writer/parser symmetry this descriptor promises
    pub fn validate(&self) -> Result<Regex> {
        if !self.start_template.contains(FILEPATH_PLACEHOLDER) {
            return Err(self.invalid(format!(
                "start template '{}' lacks {}",
                self.start_template, FILEPATH_PLACEHOLDER
            )));
        }

        let regex = self.start_regex()?;
        let start = self.start_line(SAMPLE_PATH);
        let captured = regex
            .captures(start.trim())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim());
        if captured != Some(SAMPLE_PATH) {
            return Err(self.invalid(format!(
                "start pattern does not recover the path from '{}'",
                start
            )));
        }

        if self.end_line(SAMPLE_PATH).trim().is_empty() {
            return Err(self.invalid("end delimiter renders empty".to_string()));
        }

        Ok(regex)
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidFormat {
            name: self.name.to_string(),
            reason,
        }
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
