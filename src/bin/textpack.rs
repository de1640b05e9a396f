//! textpack CLI
//!
//! Merge files into one delimited text artifact and split it back.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use textpack::{
    run_merge, run_split, FormatDescriptor, MergeTarget, Reporter, SelectionEntry, SplitParser, Status,
    FORMATS,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "textpack")]
#[command(version)]
#[command(about = "Merge text files into one artifact and split it back")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge files and directories into one artifact
    Merge {
        /// Files and directories to merge
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output artifact (default: stdout)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,

        /// Block format, by key or display name
        #[arg(short = 'f', long, default_value = "Default")]
        format: String,

        /// Prepend the file hierarchy tree
        #[arg(long)]
        tree: bool,
    },

    /// Split an artifact back into files
    Split {
        /// Artifact to split (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Directory to write into (default: current directory)
        #[arg(short = 'C', long, default_value = ".")]
        directory: PathBuf,

        /// Block format, by key or display name
        #[arg(short = 'f', long, default_value = "Default")]
        format: String,
    },

    /// List the blocks of an artifact
    List {
        /// Artifact to list (default: stdin)
        #[arg(short = 'i', long)]
        input: Option<PathBuf>,

        /// Block format, by key or display name
        #[arg(short = 'f', long, default_value = "Default")]
        format: String,
    },

    /// Show the built-in formats
    Formats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Merge { inputs, output, format, tree } => {
            merge(inputs, output, &format, tree)?;
        }
        Commands::Split { input, directory, format } => {
            split(input, &directory, &format)?;
        }
        Commands::List { input, format } => {
            list(input, &format, cli.verbose > 0)?;
        }
        Commands::Formats => {
            for format in &FORMATS {
                println!("{:<16}{}", format.key, format.name);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn lookup_format(name: &str) -> Result<&'static FormatDescriptor> {
    FormatDescriptor::lookup(name).with_context(|| {
        let known: Vec<&str> = FORMATS.iter().map(|f| f.key).collect();
        format!("Unknown format '{}' (expected one of: {})", name, known.join(", "))
    })
}

fn merge(inputs: Vec<PathBuf>, output: Option<PathBuf>, format: &str, tree: bool) -> Result<()> {
    let format = lookup_format(format)?;

    let mut entries = Vec::with_capacity(inputs.len());
    for input in inputs {
        let meta = std::fs::metadata(&input)
            .with_context(|| format!("Failed to access: {}", input.display()))?;
        // Empty base anchors at the parent, so folders keep their own name
        let entry = if meta.is_dir() {
            SelectionEntry::folder(input, PathBuf::new())
        } else {
            SelectionEntry::file(input, PathBuf::new())
        };
        entries.push(entry);
    }

    let target = match &output {
        Some(path) => MergeTarget::File(path.clone()),
        None => MergeTarget::Memory,
    };
    let outcome = run_merge(&entries, format, tree, &target, &Reporter::default());

    if outcome.status != Status::Success {
        bail!("{}", outcome.message);
    }
    match outcome.merged_text {
        Some(text) => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
        None => eprintln!("{}", outcome.message),
    }

    Ok(())
}

fn split(input: Option<PathBuf>, directory: &Path, format: &str) -> Result<()> {
    let format = lookup_format(format)?;
    let reporter = Reporter::default();

    let outcome = match input {
        Some(path) => run_split(&path, directory, format, &reporter),
        None => {
            let bytes = read_stdin()?;
            let stats = SplitParser::new(format)
                .split_bytes(&bytes, directory, &reporter)
                .context("Failed to split stdin")?;
            if stats.files_created == 0 {
                bail!(
                    "Split finished, but no valid file blocks matching format '{}' were found or extracted.",
                    format.name
                );
            }
            eprintln!("Split successful! {} files created in '{}'.", stats.files_created, directory.display());
            return Ok(());
        }
    };

    if outcome.status != Status::Success {
        bail!("{}", outcome.message);
    }
    eprintln!("{}", outcome.message);

    Ok(())
}

fn list(input: Option<PathBuf>, format: &str, verbose: bool) -> Result<()> {
    let format = lookup_format(format)?;
    let parser = SplitParser::new(format);
    let reporter = Reporter::default();

    let (blocks, _) = match input {
        Some(path) => parser
            .list_file(&path, &reporter)
            .with_context(|| format!("Failed to read: {}", path.display()))?,
        None => parser.list_bytes(&read_stdin()?, &reporter)?,
    };

    for block in &blocks {
        if verbose {
            let state = if block.terminated { "" } else { "  (unterminated)" };
            println!("{}  {}{}", block.path, block.content.len(), state);
        } else {
            println!("{}", block.path);
        }
    }

    Ok(())
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin().read_to_end(&mut buffer).context("Failed to read stdin")?;
    Ok(buffer)
}
