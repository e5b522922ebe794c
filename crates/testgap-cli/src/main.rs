//! testgap finds new or changed Java methods that no test executes, by
//! comparing two repository states and matching the changed methods
//! against JaCoCo coverage.
//!
//! This CLI tool gates pull requests on that test gap.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use testgap_app::{
    AppError, CheckRequest, Comparison, FailOn, SystemClock, UnresolvedBehavior, check_with_clock,
};
use testgap_config::{
    CliOverrides, ConfigError, Profile, discover_config_from, load_config, resolve_config,
};
use testgap_types::explain;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// testgap finds new or changed Java methods that no test executes.
#[derive(Parser)]
#[command(name = "testgap")]
#[command(
    about = "testgap finds new or changed Java methods that no test executes, by comparing two repository states and matching the changed methods against JaCoCo coverage."
)]
#[command(version)]
struct Cli {
    /// Log debug output to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI profile option
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProfile {
    Oss,
    Team,
    Strict,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the test gap of new or changed methods
    Check {
        /// Directory inside the repository to analyze (default: current directory)
        #[arg(long)]
        root: Option<String>,

        /// Compare the working tree with HEAD
        #[arg(long)]
        working_tree: bool,

        /// Compare HEAD with this revision (branch, tag, HEAD~1, object id)
        #[arg(long)]
        base: Option<String>,

        /// Compare HEAD with the previous tag whose name matches this regex
        #[arg(long)]
        previous_tag: Option<String>,

        /// Compare HEAD with the previous branch whose name matches this regex
        #[arg(long)]
        previous_branch: Option<String>,

        /// Path to a JaCoCo XML report (repeatable)
        #[arg(long)]
        jacoco: Vec<String>,

        /// Output path for report JSON
        #[arg(long, default_value = "artifacts/testgap/report.json")]
        out: String,

        /// Output path for markdown comment
        #[arg(long)]
        md: Option<String>,

        /// Path to config file (default: auto-discover testgap.toml)
        #[arg(long, short = 'c')]
        config: Option<String>,

        /// Configuration profile (overrides config file)
        #[arg(long, value_enum)]
        profile: Option<CliProfile>,

        /// Maximum test gap percentage (0-100, overrides config file)
        #[arg(long)]
        threshold: Option<f64>,

        /// Keep getters and setters in the analysis
        #[arg(long)]
        include_accessors: bool,
    },
    /// Explain an error code
    Explain {
        /// Error code to explain
        code: String,
    },
}

/// CLI errors
#[derive(Debug, Error)]
enum CliError {
    #[error(
        "Must provide one of --working-tree, --base, --previous-tag or --previous-branch"
    )]
    MissingComparison,

    #[error(
        "Only one of --working-tree, --base, --previous-tag and --previous-branch may be given"
    )]
    ConflictingComparison,

    #[error("--jacoco is required")]
    MissingJacoco,

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    App(#[from] AppError),
}

/// Exit codes:
/// - 0: Pass (or warn when not fail-configured)
/// - 1: Tool/runtime error (I/O, parse failure)
/// - 2: Policy fail (blocking findings)
const EXIT_CODE_ERROR: i32 = 1;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            EXIT_CODE_ERROR
        }
    };
    std::process::exit(exit_code);
}

/// Install the stderr log subscriber. `RUST_LOG` applies unless
/// `--verbose` is given.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Check {
            root,
            working_tree,
            base,
            previous_tag,
            previous_branch,
            jacoco,
            out,
            md,
            config,
            profile,
            threshold,
            include_accessors,
        } => {
            let comparison = select_comparison(working_tree, base, previous_tag, previous_branch)?;
            run_check(
                root,
                comparison,
                jacoco,
                out,
                md,
                config,
                profile,
                threshold,
                include_accessors,
            )
        }
        Commands::Explain { code } => run_explain(&code),
    }
}

/// Exactly one comparison flag must be set.
fn select_comparison(
    working_tree: bool,
    base: Option<String>,
    previous_tag: Option<String>,
    previous_branch: Option<String>,
) -> Result<Comparison, CliError> {
    let mut selected = Vec::new();
    if working_tree {
        selected.push(Comparison::WorkingTree);
    }
    if let Some(rev) = base {
        selected.push(Comparison::Revision(rev));
    }
    if let Some(pattern) = previous_tag {
        selected.push(Comparison::PreviousTag(pattern));
    }
    if let Some(pattern) = previous_branch {
        selected.push(Comparison::PreviousBranch(pattern));
    }

    match selected.len() {
        0 => Err(CliError::MissingComparison),
        1 => Ok(selected.remove(0)),
        _ => Err(CliError::ConflictingComparison),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_check(
    root: Option<String>,
    comparison: Comparison,
    jacoco: Vec<String>,
    out: String,
    md: Option<String>,
    config_path: Option<String>,
    profile: Option<CliProfile>,
    threshold: Option<f64>,
    include_accessors: bool,
) -> Result<i32, CliError> {
    if jacoco.is_empty() {
        return Err(CliError::MissingJacoco);
    }
    let root = PathBuf::from(root.unwrap_or_else(|| ".".to_string()));

    // Load configuration
    let loaded_config = match &config_path {
        Some(path) => Some(load_config(Path::new(path))?),
        None => discover_config_from(&root).map(|(path, config)| {
            debug!(path = %path.display(), "discovered config");
            config
        }),
    };

    let cli_overrides = CliOverrides {
        profile: profile.map(|p| match p {
            CliProfile::Oss => Profile::Oss,
            CliProfile::Team => Profile::Team,
            CliProfile::Strict => Profile::Strict,
        }),
        max_test_gap_pct: threshold,
        include_accessors: include_accessors.then_some(true),
        ..Default::default()
    };
    let effective = resolve_config(loaded_config.as_ref(), &cli_overrides)?;

    // Read JaCoCo contents
    let mut coverage_texts = Vec::with_capacity(jacoco.len());
    for path in &jacoco {
        let content = fs::read_to_string(path).map_err(|e| CliError::FileRead {
            path: path.clone(),
            source: e,
        })?;
        coverage_texts.push(content);
    }

    let request = CheckRequest {
        root,
        comparison,
        coverage_texts,
        coverage_paths: jacoco,
        fail_on: map_fail_on(effective.fail_on),
        max_test_gap_pct: effective.max_test_gap_pct,
        max_uncovered_methods: effective.max_uncovered_methods,
        unresolved: map_unresolved(effective.unresolved),
        include_accessors: effective.include_accessors,
        include_patterns: effective.include_patterns,
        exclude_patterns: effective.exclude_patterns,
        source_pattern: effective.source_pattern,
        test_patterns: effective.test_patterns,
        sub_directory: effective.sub_directory,
    };

    let result = check_with_clock(request, &SystemClock)?;

    ensure_parent_dir(&out)?;
    let report_json = serde_json::to_string_pretty(&result.report)?;
    fs::write(&out, &report_json).map_err(|e| CliError::FileWrite {
        path: out.clone(),
        source: e,
    })?;
    info!(path = %out, "wrote report");

    if let Some(md_path) = md {
        ensure_parent_dir(&md_path)?;
        fs::write(&md_path, &result.markdown).map_err(|e| CliError::FileWrite {
            path: md_path,
            source: e,
        })?;
    }

    // Print annotations to stdout
    if !result.annotations.is_empty() {
        print!("{}", result.annotations);
    }

    Ok(result.exit_code)
}

fn run_explain(code: &str) -> Result<i32, CliError> {
    if let Some(info) = explain(code) {
        println!("Code: {}", info.code);
        println!("Name: {}", info.name);
        println!("Meaning: {}", info.full_description);
        println!("Remediation: {}", info.remediation);
        println!("Docs: {}", info.help_uri);
        Ok(0)
    } else {
        eprintln!("Unknown code: {code}");
        Ok(1)
    }
}

fn map_fail_on(fail_on: testgap_config::FailOn) -> FailOn {
    match fail_on {
        testgap_config::FailOn::Error => FailOn::Error,
        testgap_config::FailOn::Warn => FailOn::Warn,
        testgap_config::FailOn::Never => FailOn::Never,
    }
}

fn map_unresolved(behavior: testgap_config::UnresolvedBehavior) -> UnresolvedBehavior {
    match behavior {
        testgap_config::UnresolvedBehavior::Skip => UnresolvedBehavior::Skip,
        testgap_config::UnresolvedBehavior::Warn => UnresolvedBehavior::Warn,
        testgap_config::UnresolvedBehavior::Fail => UnresolvedBehavior::Fail,
    }
}

/// Ensure the parent directory of a path exists
fn ensure_parent_dir(path: &str) -> Result<(), CliError> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| CliError::DirCreate {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}
