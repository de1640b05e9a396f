//! Merge writer

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::discover::DiscoveredFile;
use crate::error::{Error, Result};
use crate::format::FormatDescriptor;
use crate::progress::Reporter;
use crate::tree::HierarchyTree;

/// Counters for one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Files whose block was written
    pub files_written: usize,
    /// Bytes of artifact produced
    pub bytes_written: u64,
    /// Set when the merge stopped early
    pub cancelled: bool,
}

/// Serializes discovered files into one artifact
#[derive(Debug, Clone)]
pub struct MergeWriter {
    format: FormatDescriptor,
    include_tree: bool,
}

impl MergeWriter {
    /// Create a writer for `format`
    pub fn new(format: &FormatDescriptor) -> Self {
        Self {
            format: format.clone(),
            include_tree: false,
        }
    }

    /// Prepend the hierarchy tree
    pub fn with_tree(mut self, include_tree: bool) -> Self {
        self.include_tree = include_tree;
        self
    }

    /// Encode `files` to a writer
    pub fn encode_to_writer<W: Write>(
        &self,
        files: &[DiscoveredFile],
        writer: W,
        reporter: &Reporter,
    ) -> Result<MergeStats> {
        self.encode_observed(files, writer, reporter, |_| {})
    }

    /// Encode, calling `after_block` with each file once its block is written
    pub(crate) fn encode_observed<W, F>(
        &self,
        files: &[DiscoveredFile],
        writer: W,
        reporter: &Reporter,
        mut after_block: F,
    ) -> Result<MergeStats>
    where
        W: Write,
        F: FnMut(&DiscoveredFile),
    {
        let mut sink = Sink { inner: writer, bytes: 0 };
        let mut stats = MergeStats::default();

        if reporter.is_cancelled() {
            stats.cancelled = true;
            return Ok(stats);
        }

        let separator = self.format.file_separator;

        if self.include_tree {
            let tree = HierarchyTree::from_files(files);
            if tree.root_count() > 1 {
                reporter.warn(format!(
                    "relative paths do not share a common root, rendering {} separate roots",
                    tree.root_count()
                ));
            }
            let rendered = tree.render();
            if rendered.is_empty() {
                reporter.info("No files to list, skipping hierarchy tree.");
            } else {
                reporter.info("Writing hierarchy tree...");
                sink.put(&rendered)?;
                if !files.is_empty() {
                    sink.put(separator)?;
                }
            }
        }

        reporter.progress(0);
        let total_size: u64 = files.iter().map(|f| f.size).sum();
        let total_files = files.len() as u64;
        let mut processed_size = 0u64;

        for (i, file) in files.iter().enumerate() {
            if reporter.is_cancelled() {
                stats.cancelled = true;
                break;
            }

            self.encode_file(&mut sink, file, reporter)?;
            if i + 1 < files.len() {
                sink.put(separator)?;
            }

            stats.files_written += 1;
            processed_size += file.size;
            if total_size > 0 {
                reporter.progress_ratio(processed_size, total_size);
            } else {
                reporter.progress_ratio(stats.files_written as u64, total_files);
            }
            after_block(file);
        }

        sink.inner.flush()?;
        stats.bytes_written = sink.bytes;

        if !stats.cancelled {
            reporter.progress(100);
        }
        Ok(stats)
    }

    /// Encode a single file block
    fn encode_file<W: Write>(
        &self,
        sink: &mut Sink<W>,
        file: &DiscoveredFile,
        reporter: &Reporter,
    ) -> Result<()> {
        let path = file.relative_path.as_str();

        sink.put(&self.format.start_line(path))?;
        sink.put("\n")?;
        sink.put(self.format.content_prefix)?;

        let content = read_content(file, reporter);
        sink.put(&content)?;
        // The end delimiter must start on its own line
        if !content.is_empty() && !content.ends_with('\n') {
            sink.put("\n")?;
        }

        sink.put(self.format.content_suffix)?;
        sink.put(&self.format.end_line(path))?;
        sink.put("\n")?;
        Ok(())
    }

    /// Encode `files` into memory
    pub fn encode_to_string(
        &self,
        files: &[DiscoveredFile],
        reporter: &Reporter,
    ) -> Result<(String, MergeStats)> {
        let mut buffer = Vec::new();
        let stats = self.encode_to_writer(files, &mut buffer, reporter)?;
        let text = String::from_utf8(buffer)
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        Ok((text, stats))
    }

    /// Encode `files` to `path`, removing the partial file on cancellation
    pub fn encode_to_file(
        &self,
        files: &[DiscoveredFile],
        path: &Path,
        reporter: &Reporter,
    ) -> Result<MergeStats> {
        self.encode_to_file_observed(files, path, reporter, |_| {})
    }

    pub(crate) fn encode_to_file_observed<F>(
        &self,
        files: &[DiscoveredFile],
        path: &Path,
        reporter: &Reporter,
        after_block: F,
    ) -> Result<MergeStats>
    where
        F: FnMut(&DiscoveredFile),
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| Error::CreateOutputDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = fs::File::create(path).map_err(|source| Error::CreateArtifact {
            path: path.to_path_buf(),
            source,
        })?;

        let stats = self.encode_observed(files, BufWriter::new(file), reporter, after_block)?;

        if stats.cancelled {
            match fs::remove_file(path) {
                Ok(()) => reporter.info(format!("Removed incomplete file: {}", path.display())),
                Err(e) => reporter.warn(format!(
                    "could not remove incomplete file '{}': {}",
                    path.display(),
                    e
                )),
            }
        }

        Ok(stats)
    }
}

/// Writer that counts what passes through it
struct Sink<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> Sink<W> {
    fn put(&mut self, text: &str) -> io::Result<()> {
        self.inner.write_all(text.as_bytes())?;
        self.bytes += text.len() as u64;
        Ok(())
    }
}

/// Read a file as text: UTF-8 first, then Latin-1, then an inline error note
fn read_content(file: &DiscoveredFile, reporter: &Reporter) -> String {
    let bytes = match fs::read(&file.absolute_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            reporter.error(format!(
                "could not read '{}': {}, inserting error message",
                file.absolute_path.display(),
                e
            ));
            return format!("Error reading file: {}", e);
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            reporter.warn(format!(
                "non-UTF-8 file detected: '{}', decoding as Latin-1",
                file.relative_path
            ));
            decode_latin1(e.as_bytes())
        }
    }
}

/// Map every byte to the code point of the same value
pub(crate) fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
