//! mftpath CLI
//!
//! Lists every file path on an NTFS volume straight from the USN journal.

use clap::{ArgAction, Parser, Subcommand};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::HumanDuration;
use mftpath::ntfs::{self, UsnDevice};
use mftpath::{EnumConfig, EnumError, NamePattern, ResolvedPath, VolumeEnumerator, VolumeId};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

/// mftpath - every file path on an NTFS volume, without walking directories
///
/// Reads the volume's change journal directly. Needs administrator rights.
#[derive(Parser)]
#[command(name = "mftpath")]
#[command(author = "mftpath Contributors")]
#[command(version)]
#[command(about = "Enumerate NTFS file paths from the USN journal", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Write the log to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the full path of every file on a volume
    List {
        /// Volume to read (e.g., C, D:, \\?\Volume{...}\)
        #[arg(short, long)]
        drive: String,

        /// Keep files whose name matches this regular expression
        #[arg(long, conflicts_with = "glob", allow_hyphen_values = true)]
        name: Option<String>,

        /// Keep files whose name matches this wildcard (e.g., "*.mkv")
        #[arg(long, allow_hyphen_values = true)]
        glob: Option<String>,

        /// Keep paths under this prefix (repeatable, case-insensitive)
        #[arg(short, long = "prefix")]
        prefixes: Vec<String>,

        /// JSON config file with buffer_size / max_depth / threads
        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum directory depth before an entry is treated as corrupt
        #[arg(long)]
        max_depth: Option<usize>,

        /// Resolver threads (0 = one per core)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Bytes per FSCTL_ENUM_USN_DATA request
        #[arg(long)]
        buffer_size: Option<usize>,

        /// Print one JSON object per line
        #[arg(long)]
        json: bool,

        /// Only print how many paths matched
        #[arg(long, conflicts_with = "json")]
        count: bool,

        /// Hide the progress spinner
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the change journal state of a volume
    Journal {
        /// Volume to query
        #[arg(short, long)]
        drive: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List volumes that can be enumerated
    Volumes,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = mftpath::logging::init(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("{} cannot start logging: {}", style("Warning:").yellow().bold(), e);
    }
    log::info!("mftpath {} starting", mftpath::VERSION);

    let result = match cli.command {
        Commands::List {
            drive,
            name,
            glob,
            prefixes,
            config,
            max_depth,
            threads,
            buffer_size,
            json,
            count,
            quiet,
        } => {
            let options = ListOptions {
                name,
                glob,
                prefixes,
                config,
                max_depth,
                threads,
                buffer_size,
                json,
                count,
                quiet,
            };
            cmd_list(&drive, options)
        }

        Commands::Journal { drive, json } => cmd_journal(&drive, json),

        Commands::Volumes => cmd_volumes(),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

struct ListOptions {
    name: Option<String>,
    glob: Option<String>,
    prefixes: Vec<String>,
    config: Option<PathBuf>,
    max_depth: Option<usize>,
    threads: Option<usize>,
    buffer_size: Option<usize>,
    json: bool,
    count: bool,
    quiet: bool,
}

impl ListOptions {
    fn enum_config(&self) -> mftpath::Result<EnumConfig> {
        let mut config = match &self.config {
            Some(path) => EnumConfig::from_json_file(path)?,
            None => EnumConfig::default(),
        };
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        config.show_progress = !self.quiet && console::Term::stderr().is_term();
        config.validate()?;
        Ok(config)
    }

    fn name_pattern(&self) -> mftpath::Result<Option<NamePattern>> {
        match (&self.name, &self.glob) {
            (Some(regex), _) => Ok(Some(NamePattern::regex(regex)?)),
            (None, Some(glob)) => Ok(Some(NamePattern::glob(glob)?)),
            (None, None) => Ok(None),
        }
    }
}

/// List command implementation
fn cmd_list(drive: &str, options: ListOptions) -> mftpath::Result<()> {
    let start = Instant::now();
    let config = options.enum_config()?;
    let pattern = options.name_pattern()?;

    if !options.quiet {
        eprintln!(
            "{} Reading {}",
            style("→").cyan().bold(),
            style(drive).yellow()
        );
    }

    let enumeration = VolumeEnumerator::new(drive)
        .with_config(config)
        .with_name_pattern(pattern)
        .with_path_prefixes(&options.prefixes)
        .enumerate()?;

    let stats = enumeration.stats.clone();
    let mut paths = enumeration.paths;

    let mode = if options.count {
        OutputMode::Count
    } else if options.json {
        OutputMode::Json
    } else {
        OutputMode::Plain
    };
    let stdout = io::stdout();
    let printed = write_paths(BufWriter::new(stdout.lock()), paths.by_ref(), mode)
        .map_err(EnumError::Output)?;

    if !options.quiet {
        eprintln!();
        eprintln!(
            "{} {} paths in {}",
            style("✓").green().bold(),
            style(printed).cyan(),
            style(HumanDuration(start.elapsed())).cyan()
        );
        eprintln!(
            "  {} {} directories, {} files, {} records ({} in {} requests)",
            style("Read:").bold(),
            stats.directories,
            stats.files,
            stats.records,
            format_size(stats.bytes_decoded, BINARY),
            stats.requests
        );
        if stats.filtered_out > 0 {
            eprintln!("  {} {}", style("Name filtered:").bold(), stats.filtered_out);
        }
        if paths.skipped() > 0 {
            eprintln!(
                "  {} {}",
                style("Skipped (broken ancestry):").bold(),
                style(paths.skipped()).red()
            );
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Plain,
    Json,
    Count,
}

/// Write every path (or just their number) and return how many were seen.
/// A closed pipe (e.g. `| head`) ends the listing quietly.
fn write_paths<W, I>(mut out: W, paths: I, mode: OutputMode) -> io::Result<u64>
where
    W: Write,
    I: Iterator<Item = ResolvedPath>,
{
    let mut printed: u64 = 0;
    match write_all_paths(&mut out, paths, mode, &mut printed) {
        Ok(()) => Ok(printed),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(printed),
        Err(e) => Err(e),
    }
}

fn write_all_paths<W, I>(out: &mut W, paths: I, mode: OutputMode, printed: &mut u64) -> io::Result<()>
where
    W: Write,
    I: Iterator<Item = ResolvedPath>,
{
    for resolved in paths {
        match mode {
            OutputMode::Plain => writeln!(out, "{}", resolved.full_path)?,
            OutputMode::Json => {
                let line = serde_json::to_string(&resolved)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                writeln!(out, "{}", line)?;
            }
            OutputMode::Count => {}
        }
        *printed += 1;
    }

    if mode == OutputMode::Count {
        writeln!(out, "{}", printed)?;
    }
    out.flush()
}

/// Journal command implementation
fn cmd_journal(drive: &str, json: bool) -> mftpath::Result<()> {
    let volume = VolumeId::parse(drive)?;
    let mut handle = ntfs::open_volume(&volume)?;
    let journal = handle.query_journal()?;

    if json {
        let line = serde_json::to_string_pretty(&journal)
            .map_err(|e| EnumError::Config(e.to_string()))?;
        println!("{}", line);
        return Ok(());
    }

    println!(
        "{} USN journal on {}",
        style("→").cyan().bold(),
        style(&volume).yellow()
    );
    println!();
    println!("  {} 0x{:016X}", style("Journal ID:").bold(), journal.usn_journal_id);
    println!("  {} {}", style("First USN:").bold(), journal.first_usn);
    println!("  {} {}", style("Next USN:").bold(), journal.next_usn);
    println!("  {} {}", style("Lowest valid:").bold(), journal.lowest_valid_usn);
    println!(
        "  {} {}",
        style("Maximum size:").bold(),
        format_size(journal.maximum_size, BINARY)
    );
    println!(
        "  {} {}",
        style("Allocation delta:").bold(),
        format_size(journal.allocation_delta, BINARY)
    );

    Ok(())
}

/// Volumes command implementation
fn cmd_volumes() -> mftpath::Result<()> {
    println!("{} Detecting NTFS volumes...", style("→").cyan().bold());
    println!();

    let mut found = 0;
    for letter in 'A'..='Z' {
        let volume = VolumeId::from_letter(letter);
        match ntfs::open_volume(&volume) {
            Ok(mut handle) => {
                found += 1;
                match handle.query_journal() {
                    Ok(journal) => println!(
                        "  {} {} journal active, next USN {}",
                        style("•").green(),
                        volume,
                        journal.next_usn
                    ),
                    Err(e) => println!("  {} {} {}", style("•").yellow(), volume, style(e).dim()),
                }
            }
            Err(EnumError::Format(_)) => {
                log::debug!("{} is not NTFS", volume);
            }
            Err(e) => {
                log::debug!("{}: {}", volume, e);
            }
        }
    }

    if found == 0 {
        println!("  No NTFS volumes found (administrator rights are required).");
    }

    Ok(())
}
