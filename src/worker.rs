//! Operation orchestration
//!
//! [`run_merge`] and [`run_split`] drive one operation to a terminal
//! [`Outcome`] on the calling thread. [`spawn_merge`] and [`spawn_split`] do
//! the same on a background thread and hand back an [`Operation`] to listen
//! to and cancel.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use crate::decoder::{read_artifact, SplitParser};
use crate::discover::{discover, SelectionEntry};
use crate::encoder::MergeWriter;
use crate::error::Result;
use crate::format::FormatDescriptor;
use crate::progress::{CancelToken, Event, Outcome, Reporter};

/// Where a merge writes its artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeTarget {
    File(PathBuf),
    /// Keep the artifact in [`Outcome::merged_text`]
    Memory,
}

/// Discover `entries` and merge them into `target`
pub fn run_merge(
    entries: &[SelectionEntry],
    format: &FormatDescriptor,
    include_tree: bool,
    target: &MergeTarget,
    reporter: &Reporter,
) -> Outcome {
    let outcome = merge(entries, format, include_tree, target, reporter).unwrap_or_else(|e| {
        reporter.error(e.to_string());
        Outcome::failed(format!("Merge failed: {}", e))
    });
    reporter.finish(outcome.clone());
    outcome
}

fn merge(
    entries: &[SelectionEntry],
    format: &FormatDescriptor,
    include_tree: bool,
    target: &MergeTarget,
    reporter: &Reporter,
) -> Result<Outcome> {
    format.validate()?;

    match target {
        MergeTarget::File(path) => reporter.info(format!(
            "Starting merge process -> {} (Format: {})",
            path.display(),
            format.name
        )),
        MergeTarget::Memory => reporter.info(format!("Starting merge process (Format: {})", format.name)),
    }
    if include_tree {
        reporter.info("File hierarchy tree will be included.");
    }

    let discovery = discover(entries, reporter)?;
    if discovery.cancelled {
        return Ok(Outcome::cancelled("Merge cancelled during scan."));
    }
    if discovery.files.is_empty() {
        reporter.warn("no valid, unique files found to merge after scanning");
        return Ok(Outcome::failed("No files to merge."));
    }

    let writer = MergeWriter::new(format).with_tree(include_tree);
    match target {
        MergeTarget::File(path) => {
            let stats = writer.encode_to_file(&discovery.files, path, reporter)?;
            if stats.cancelled {
                return Ok(Outcome::cancelled("Merge cancelled."));
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Outcome::success(format!(
                "Merge successful! {} files merged into '{}'.",
                stats.files_written, name
            )))
        }
        MergeTarget::Memory => {
            let (text, stats) = writer.encode_to_string(&discovery.files, reporter)?;
            if stats.cancelled {
                return Ok(Outcome::cancelled("Merge cancelled."));
            }
            let mut outcome =
                Outcome::success(format!("Merge successful! {} files merged.", stats.files_written));
            outcome.merged_text = Some(text);
            Ok(outcome)
        }
    }
}

/// Split the artifact at `artifact` into `output_dir`
pub fn run_split(
    artifact: &Path,
    output_dir: &Path,
    format: &FormatDescriptor,
    reporter: &Reporter,
) -> Outcome {
    run_split_observed(artifact, output_dir, format, reporter, |_| {})
}

fn run_split_observed<F>(
    artifact: &Path,
    output_dir: &Path,
    format: &FormatDescriptor,
    reporter: &Reporter,
    after_write: F,
) -> Outcome
where
    F: FnMut(&Path),
{
    let outcome = split(artifact, output_dir, format, reporter, after_write).unwrap_or_else(|e| {
        reporter.error(e.to_string());
        Outcome::failed(format!("Split failed: {}", e))
    });
    reporter.finish(outcome.clone());
    outcome
}

fn split<F>(
    artifact: &Path,
    output_dir: &Path,
    format: &FormatDescriptor,
    reporter: &Reporter,
    after_write: F,
) -> Result<Outcome>
where
    F: FnMut(&Path),
{
    reporter.info(format!("Starting split process for: {}", artifact.display()));
    reporter.info(format!("Output directory: {}", output_dir.display()));
    reporter.info(format!("Expecting format: {}", format.name));

    let bytes = read_artifact(artifact)?;
    let stats = SplitParser::new(format).split_observed(&bytes, output_dir, reporter, after_write)?;
    if stats.cancelled {
        return Ok(Outcome::cancelled("Split cancelled."));
    }
    if stats.files_created == 0 {
        return Ok(Outcome::failed(format!(
            "Split finished, but no valid file blocks matching format '{}' were found or extracted.",
            format.name
        )));
    }
    Ok(Outcome::success(format!(
        "Split successful! {} files created in '{}' (Format: {}).",
        stats.files_created,
        output_dir.display(),
        format.name
    )))
}

/// A merge or split running on its own thread
#[derive(Debug)]
pub struct Operation {
    events: Receiver<Event>,
    cancel: CancelToken,
    handle: JoinHandle<Outcome>,
}

impl Operation {
    /// Progress, log and the final `Finished` event, in emission order
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Ask the operation to stop at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the operation finishes
    pub fn wait(self) -> Outcome {
        self.handle
            .join()
            .unwrap_or_else(|_| Outcome::failed("worker thread panicked"))
    }
}

fn spawn<F>(name: &str, job: F) -> Result<Operation>
where
    F: FnOnce(&Reporter) -> Outcome + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let cancel = CancelToken::new();
    let token = cancel.clone();

    let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
        let reporter = Reporter::with_events(token, tx);
        job(&reporter)
    })?;

    Ok(Operation { events: rx, cancel, handle })
}

/// Run [`run_merge`] on a background thread
pub fn spawn_merge(
    entries: Vec<SelectionEntry>,
    format: &FormatDescriptor,
    include_tree: bool,
    target: MergeTarget,
) -> Result<Operation> {
    let format = format.clone();
    spawn("textpack-merge", move |reporter| {
        run_merge(&entries, &format, include_tree, &target, reporter)
    })
}

/// Run [`run_split`] on a background thread
pub fn spawn_split(
    artifact: PathBuf,
    output_dir: PathBuf,
    format: &FormatDescriptor,
) -> Result<Operation> {
    let format = format.clone();
    spawn("textpack-split", move |reporter| {
        run_split(&artifact, &output_dir, &format, reporter)
    })
}
