use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use space_patcher::config::{load_from_path, PatcherConfig};
use space_patcher::{
    patch_file, BaseDir, OffsetConvention, PatchError, PatchMode, Report, ReportFilter,
    SideMarkers, DEFAULT_RULE,
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "space-patcher.toml";
const DEFAULT_CHANGED_LIST: &str = "changed_components.txt";

#[derive(Parser)]
#[command(name = "space-patcher")]
#[command(about = "Insert missing spaces reported by a static analyzer", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply reported space insertions to files under a base directory
    Apply {
        #[command(flatten)]
        source: ReportArgs,

        /// Directory that component paths are relative to (default: current directory)
        #[arg(short, long)]
        base_dir: Option<PathBuf>,

        /// Dry run - rewrite and verify without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Where to write the list of changed files
        #[arg(long)]
        changed_list: Option<PathBuf>,
    },

    /// List the directives per file without touching anything
    List {
        #[command(flatten)]
        source: ReportArgs,
    },
}

#[derive(Args)]
struct ReportArgs {
    /// Exported issue search page (JSON); repeat for multiple pages
    #[arg(short, long = "report", required = true)]
    reports: Vec<PathBuf>,

    /// Config file (default: ./space-patcher.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project key prefixed to component keys
    #[arg(long)]
    project_key: Option<String>,

    /// Keep only issues whose rule key ends with this suffix (default: ":MissingSpace")
    #[arg(long)]
    rule: Option<String>,

    /// Report end offsets point at the last flagged character (default)
    #[arg(long, conflicts_with = "exclusive_end")]
    inclusive_end: bool,

    /// Report end offsets point one past the last flagged character
    #[arg(long)]
    exclusive_end: bool,
}

/// Report plus everything needed to turn it into directives.
struct Loaded {
    config: PatcherConfig,
    report: Report,
    markers: SideMarkers,
    convention: OffsetConvention,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Apply {
            source,
            base_dir,
            dry_run,
            diff,
            changed_list,
        } => cmd_apply(&source, base_dir, dry_run, diff, changed_list),

        Commands::List { source } => cmd_list(&source),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "space_patcher=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded; keep the existing one
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve config: explicit --config, then ./space-patcher.toml, then defaults.
fn load_config(explicit: Option<&Path>) -> Result<PatcherConfig> {
    if let Some(path) = explicit {
        return Ok(load_from_path(path)?);
    }

    let implicit = env::current_dir()?.join(DEFAULT_CONFIG);
    if implicit.exists() {
        println!(
            "{}",
            format!("Using config {}", implicit.display()).dimmed()
        );
        return Ok(load_from_path(&implicit)?);
    }

    Ok(PatcherConfig::default())
}

fn load(args: &ReportArgs) -> Result<Loaded> {
    let config = load_config(args.config.as_deref())?;

    let convention = if args.inclusive_end {
        OffsetConvention::Inclusive
    } else if args.exclusive_end {
        OffsetConvention::Exclusive
    } else {
        config.end_offset.unwrap_or_default()
    };

    let mut report = Report::new(ReportFilter {
        project_key: args.project_key.clone().or_else(|| config.project_key.clone()),
        rule: Some(
            args.rule
                .clone()
                .or_else(|| config.rule.clone())
                .unwrap_or_else(|| DEFAULT_RULE.to_string()),
        ),
    });
    for path in &args.reports {
        let added = report.add_page_path(path)?;
        println!("Loaded {} issues from {}", added, path.display());
    }
    if report.skipped() > 0 {
        println!(
            "{}",
            format!("  {} issues skipped (filtered or without a text range)", report.skipped())
                .dimmed()
        );
    }

    let markers = config.markers.side_markers();
    Ok(Loaded {
        config,
        report,
        markers,
        convention,
    })
}

/// Helper: Show unified diff between original and modified content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => continue,
        };
        print!("{}", sign);
    }
}

fn write_changed_list(path: &Path, changed: &[PathBuf]) -> Result<()> {
    let mut contents = String::new();
    for file in changed {
        contents.push_str(&file.display().to_string());
        contents.push('\n');
    }
    fs::write(path, contents)
        .with_context(|| format!("failed to write changed list {}", path.display()))
}

fn cmd_apply(
    args: &ReportArgs,
    base_dir: Option<PathBuf>,
    dry_run: bool,
    show_diff: bool,
    changed_list: Option<PathBuf>,
) -> Result<()> {
    let Loaded {
        config,
        report,
        markers,
        convention,
    } = load(args)?;

    let base_dir = match base_dir.or_else(|| config.base_dir.clone()) {
        Some(dir) => dir,
        None => env::current_dir()?,
    };
    let base = BaseDir::new(&base_dir)
        .with_context(|| format!("invalid base directory {}", base_dir.display()))?;
    let mode = if dry_run {
        PatchMode::DryRun
    } else {
        PatchMode::Commit
    };

    println!("Base directory: {}", base.root().display());
    if dry_run {
        println!("{}", "[DRY RUN - files will not be modified]".cyan());
    }
    println!();

    let total = report.len();
    let mut changed = Vec::new();
    let mut total_insertions = 0;
    let mut total_failed = 0;

    for (index, (component, _)) in report.components().enumerate() {
        let progress = format!("[{}/{}]", index + 1, total).dimmed();

        let directives = match report.directives(component, &markers, convention) {
            Ok(directives) => directives,
            Err(e) => {
                eprintln!("{} {} {}: Malformed issue - {}", progress, "✗".red(), component, e);
                total_failed += 1;
                continue;
            }
        };

        let path = match base.resolve(component) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{} {} {}: {}", progress, "✗".red(), component, e);
                total_failed += 1;
                continue;
            }
        };

        let before = if show_diff {
            fs::read_to_string(&path).ok()
        } else {
            None
        };

        match patch_file(&path, &directives, mode) {
            Ok(result) => {
                let verb = if result.committed { "Patched" } else { "Would patch" };
                println!(
                    "{} {} {}: {} {} space(s)",
                    progress,
                    "✓".green(),
                    component,
                    verb,
                    result.insertions
                );
                total_insertions += result.insertions;

                if show_diff {
                    let after = match &result.preview {
                        Some(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                        None => fs::read_to_string(&path).ok(),
                    };
                    if let (Some(before), Some(after)) = (&before, &after) {
                        if before != after {
                            display_diff(&path, before, after);
                        }
                    }
                }

                if result.committed {
                    changed.push(result.file);
                }
            }
            Err(e) => {
                eprintln!("{} {} {}: Failed - {}", progress, "✗".red(), component, e);
                if let PatchError::Verification { .. } = e {
                    eprintln!(
                        "  {}",
                        "Original left untouched; scratch files kept for inspection".yellow()
                    );
                }
                total_failed += 1;
            }
        }
    }

    if !dry_run {
        let list_path = changed_list
            .or_else(|| config.changed_list.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CHANGED_LIST));
        write_changed_list(&list_path, &changed)?;
        println!();
        println!("Changed files written to {}", list_path.display());
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} files", total);
    println!("  {} changed", format!("{}", changed.len()).green());
    println!("  {} spaces inserted", format!("{}", total_insertions).green());
    println!("  {} failed", format!("{}", total_failed).red());

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(args: &ReportArgs) -> Result<()> {
    let Loaded {
        report,
        markers,
        convention,
        ..
    } = load(args)?;

    println!();
    for (component, issues) in report.components() {
        println!("{} ({} issues)", component.bold(), issues.len());
        match report.directives(component, &markers, convention) {
            Ok(directives) => {
                for directive in &directives {
                    println!("  - {}", directive);
                }
            }
            Err(e) => println!("  {} {}", "✗".red(), e),
        }
    }

    Ok(())
}
