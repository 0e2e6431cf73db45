use anyhow::{bail, Context};
use autopatch_common::{
    load_config, save_config, ChangeKind, DiffAlgorithm, DiffEngineKind, PatchOptions,
    PatchReport,
};
use autopatch_core::generate_patch_files_with_defaults;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autopatch")]
#[command(author = "AutoPatch Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Write one unified-diff patch file per changed file between two directory trees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two trees and write patch files for every changed file
    Generate(GenerateArgs),

    /// Write a config file with default settings
    InitConfig {
        /// Where to write the file (defaults to the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct GenerateArgs {
    /// Left ("before") directory
    left: PathBuf,

    /// Right ("after") directory
    right: PathBuf,

    /// Directory receiving the patch files (must exist)
    out: PathBuf,

    /// Text prepended to every patch file
    #[arg(long, conflicts_with = "header_file")]
    header: Option<String>,

    /// Read the patch header from a file
    #[arg(long)]
    header_file: Option<PathBuf>,

    /// Suffix appended to each patch file name
    #[arg(long)]
    suffix: Option<String>,

    /// Only compare this subdirectory of both trees
    #[arg(long)]
    scope: Option<PathBuf>,

    /// Drop file names and line numbers from the patches
    #[arg(long)]
    strip: bool,

    /// Report every processed file
    #[arg(short, long)]
    verbose: bool,

    /// Ignore patterns (can be specified multiple times)
    #[arg(short, long)]
    ignore: Vec<String>,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Diff files in parallel
    #[arg(long)]
    parallel: bool,

    /// Lines of context around each change
    #[arg(short = 'U', long)]
    context: Option<usize>,

    /// Use the patience diff algorithm
    #[arg(long)]
    patience: bool,

    /// Treat CRLF and LF line endings as equal
    #[arg(long)]
    ignore_cr_at_eol: bool,

    /// Run this external `diff -u` compatible program instead of the built-in diff
    #[arg(long)]
    external_diff: Option<String>,

    /// Environment for the external diff program, KEY=VALUE (repeatable)
    #[arg(long = "env", value_parser = parse_env_pair)]
    env: Vec<(String, String)>,

    /// Config file to load instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing to stderr (so JSON output can go cleanly to stdout)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter(cli.verbose()))
        .init();

    let result = match cli.command {
        Commands::Generate(args) => run_generate(args),
        Commands::InitConfig { path, force } => run_init_config(path, force),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

impl Cli {
    fn verbose(&self) -> bool {
        matches!(&self.command, Commands::Generate(args) if args.verbose)
    }
}

/// `RUST_LOG` or `info`; `--verbose` always lets per-file progress through
fn env_filter(verbose: bool) -> EnvFilter {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if verbose {
        if let Ok(directive) = "autopatch_core=info".parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

fn run_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let loaded = load_config(args.config.as_deref())?;
    if loaded.exists {
        info!("Using config {}", loaded.path.display());
    }

    let json = args.json;
    let (left, right, out) = (args.left.clone(), args.right.clone(), args.out.clone());
    let options = apply_overrides(loaded.options, args)?;

    let report = generate_patch_files_with_defaults(&left, &right, &out, &options)?;

    if json {
        let output = serde_json::to_string_pretty(&JsonReport {
            left: left.display().to_string(),
            right: right.display().to_string(),
            out: out.display().to_string(),
            report,
        })?;
        println!("{output}");
        return Ok(());
    }

    print_summary(&report, options.verbose);
    Ok(())
}

fn apply_overrides(mut options: PatchOptions, args: GenerateArgs) -> anyhow::Result<PatchOptions> {
    if let Some(header) = args.header {
        options.patch_header = header;
    }
    if let Some(path) = args.header_file {
        options.patch_header = fs::read_to_string(&path)
            .with_context(|| format!("reading header file {}", path.display()))?;
    }
    if let Some(suffix) = args.suffix {
        options.patch_file_name_suffix = suffix;
    }
    if args.scope.is_some() {
        options.scope_subdirectory = args.scope;
    }
    if args.strip {
        options.strip_file_names_and_line_numbers = true;
    }
    if args.verbose {
        options.verbose = true;
    }
    options.ignore_patterns.extend(args.ignore);
    if args.follow_symlinks {
        options.follow_symlinks = true;
    }
    if args.parallel {
        options.parallel = true;
    }
    if let Some(context) = args.context {
        options.diff.context_lines = context;
    }
    if args.patience {
        options.diff.algorithm = DiffAlgorithm::Patience;
    }
    if args.ignore_cr_at_eol {
        options.diff.ignore_cr_at_eol = true;
    }
    if let Some(program) = args.external_diff {
        options.diff.engine = DiffEngineKind::External { program };
    }
    options.environment.extend(args.env);

    if options.patch_file_name_suffix.is_empty() {
        bail!("Patch file name suffix must not be empty");
    }

    Ok(options)
}

fn run_init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => load_config(None)?.path,
    };

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    save_config(&path, &PatchOptions::default())?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn print_summary(report: &PatchReport, verbose: bool) {
    for patch in &report.written {
        match patch.change {
            ChangeKind::Modified => println!("{}", patch.patch_path.display()),
            ChangeKind::Added => println!("{} (added)", patch.patch_path.display()),
            ChangeKind::Removed => println!("{} (removed)", patch.patch_path.display()),
        }
    }
    if verbose {
        for path in &report.unchanged {
            println!("{}: no changes", path.display());
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!("  Files processed: {}", report.files_processed());
    println!("  Patches written: {}", report.written.len());
    println!("    Added:         {}", report.count(ChangeKind::Added));
    println!("    Removed:       {}", report.count(ChangeKind::Removed));
    println!("  Unchanged:       {}", report.unchanged.len());
    println!("{}", "=".repeat(80));
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[derive(Serialize)]
struct JsonReport {
    left: String,
    right: String,
    out: String,
    report: PatchReport,
}
