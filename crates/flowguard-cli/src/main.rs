//! CLI binary for checking CI workflow files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;

use flowguard_parse::{ParserConfig, Workflow, GITHUB_ACTIONS_TAB_WIDTH};
use flowguard_rules::{check_bytes, lint_bytes, CheckOptions, Policy, Report, Validator};
use flowguard_types::{FlowguardError, ViolationKind};

/// Workflow files picked up when a directory is given.
const DEFAULT_INCLUDE: &str = "**/*.{yml,yaml}";

#[derive(Parser)]
#[command(name = "flowguard", version, about = "Structural and security checks for CI workflow files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check workflow files; directories are searched recursively
    Check {
        /// Workflow files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// JSON policy file overriding the built-in GitHub Actions policy
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Columns counted for a tab in indentation
        #[arg(long, default_value_t = GITHUB_ACTIONS_TAB_WIDTH)]
        tab_width: usize,

        /// Report every finding instead of stopping at the first violation
        #[arg(long)]
        all: bool,

        /// Glob selecting files inside directories
        #[arg(long, default_value = DEFAULT_INCLUDE)]
        include: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the parsed structure of a workflow file
    Info {
        /// Path to the workflow file
        path: PathBuf,

        /// Columns counted for a tab in indentation
        #[arg(long, default_value_t = GITHUB_ACTIONS_TAB_WIDTH)]
        tab_width: usize,
    },

    /// Print the built-in policy as JSON
    Policy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check {
            paths,
            policy,
            tab_width,
            all,
            include,
            format,
        } => {
            let options = CheckOptions {
                parser: ParserConfig { tab_width },
                ..CheckOptions::default()
            };
            let validator = load_validator(policy.as_deref()).await?;
            let files = discover(&paths, &include).await?;
            if files.is_empty() {
                anyhow::bail!("No workflow files found matching '{include}'");
            }
            let outcomes = check_files(files, all, options, Arc::new(validator)).await;
            print_outcomes(&outcomes, format)?;
            let code = exit_code(&outcomes);
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Info { path, tab_width } => {
            cmd_info(&path, &ParserConfig { tab_width }).await?;
        }
        Commands::Policy => {
            println!("{}", serde_json::to_string_pretty(&Policy::github_actions())?);
        }
    }

    Ok(())
}

async fn load_validator(path: Option<&Path>) -> anyhow::Result<Validator> {
    let policy = match path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path).await?;
            tracing::debug!(path = %path.display(), "Loaded policy");
            Policy::from_json(&json)?
        }
        None => Policy::github_actions(),
    };
    Ok(Validator::new(policy)?)
}

// ---------------------------------------------------------------------------
// File discovery
// ---------------------------------------------------------------------------

/// Expand directories into the files matching `include`; explicit file paths
/// are kept as given.
async fn discover(paths: &[PathBuf], include: &str) -> anyhow::Result<Vec<PathBuf>> {
    let mut builder = GlobSetBuilder::new();
    builder.add(Glob::new(include)?);
    let set = builder.build()?;

    let mut files = Vec::new();
    for path in paths {
        if tokio::fs::metadata(path).await?.is_dir() {
            collect_matches(path, path, &set, &mut files).await?;
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    files.dedup();
    tracing::debug!(count = files.len(), "Discovered workflow files");
    Ok(files)
}

async fn collect_matches(
    base: &Path,
    current: &Path,
    set: &GlobSet,
    matches: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    let mut read_dir = tokio::fs::read_dir(current).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let path = entry.path();
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            Box::pin(collect_matches(base, &path, set, matches)).await?;
        } else if file_type.is_file() {
            if let Ok(rel) = path.strip_prefix(base) {
                if set.is_match(rel) {
                    matches.push(path);
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Checking
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct FileOutcome {
    path: PathBuf,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<Report>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<Rejection>,
}

#[derive(Debug, Serialize)]
struct Rejection {
    kind: Option<ViolationKind>,
    rule: Option<String>,
    message: String,
    #[serde(skip)]
    exit_code: i32,
}

impl FileOutcome {
    fn new(path: PathBuf, result: flowguard_types::Result<Report>) -> Self {
        match result {
            Ok(report) => Self {
                path,
                accepted: !report.has_errors(),
                report: Some(report),
                rejection: None,
            },
            Err(err) => Self {
                path,
                accepted: false,
                report: None,
                rejection: Some(Rejection {
                    kind: err.kind(),
                    rule: err.rule().map(str::to_string),
                    message: err.to_string(),
                    exit_code: err.exit_code(),
                }),
            },
        }
    }

    fn exit_code(&self) -> i32 {
        match &self.rejection {
            Some(rejection) => rejection.exit_code,
            None if self.accepted => 0,
            None => 1,
        }
    }
}

/// Read every file and check it on the blocking pool. Outcomes keep the
/// order of `files`.
async fn check_files(
    files: Vec<PathBuf>,
    all: bool,
    options: CheckOptions,
    validator: Arc<Validator>,
) -> Vec<FileOutcome> {
    let handles: Vec<_> = files
        .into_iter()
        .map(|path| {
            let options = options.clone();
            let validator = Arc::clone(&validator);
            let task_path = path.clone();
            let handle = tokio::spawn(async move {
                let result = check_file(&task_path, all, options, validator).await;
                FileOutcome::new(task_path, result)
            });
            (path, handle)
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (path, handle) in handles {
        outcomes.push(joined(path, handle.await));
    }
    outcomes
}

/// A task that panicked or was cancelled still yields a rejected outcome
/// for its file.
fn joined(path: PathBuf, result: Result<FileOutcome, tokio::task::JoinError>) -> FileOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Check task failed");
            FileOutcome::new(path, Err(FlowguardError::Other(format!("check task failed: {e}"))))
        }
    }
}

async fn check_file(
    path: &Path,
    all: bool,
    options: CheckOptions,
    validator: Arc<Validator>,
) -> flowguard_types::Result<Report> {
    let data = tokio::fs::read(path).await?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "Checking workflow");
    tokio::task::spawn_blocking(move || {
        if all {
            lint_bytes(&data, &options, &validator)
        } else {
            check_bytes(&data, &options, &validator)
        }
    })
    .await
    .map_err(|e| FlowguardError::Other(format!("check task failed: {e}")))?
}

fn exit_code(outcomes: &[FileOutcome]) -> i32 {
    outcomes.iter().map(FileOutcome::exit_code).max().unwrap_or(0)
}

fn print_outcomes(outcomes: &[FileOutcome], format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(outcomes)?);
        return Ok(());
    }

    for outcome in outcomes {
        let status = if outcome.accepted { "ok" } else { "rejected" };
        println!("{}: {status}", outcome.path.display());
        if let Some(rejection) = &outcome.rejection {
            println!("  [ERROR] {}", rejection.message);
        }
        if let Some(report) = &outcome.report {
            for diag in &report.findings {
                println!("  {diag}");
            }
        }
    }

    let rejected = outcomes.iter().filter(|o| !o.accepted).count();
    println!("\n{} file(s) checked, {rejected} rejected", outcomes.len());
    Ok(())
}

/// Parse a file the same way `check` sees it: invalid UTF-8 is replaced
/// rather than rejected.
async fn read_workflow(path: &Path, config: &ParserConfig) -> anyhow::Result<Workflow> {
    let data = tokio::fs::read(path).await?;
    let source = String::from_utf8_lossy(&data);
    Ok(flowguard_parse::parse_with(&source, config)?)
}

async fn cmd_info(path: &Path, config: &ParserConfig) -> anyhow::Result<()> {
    let workflow = read_workflow(path, config).await?;

    println!("Workflow: {}", workflow.name);
    let triggers: Vec<_> = workflow.on.keys().map(String::as_str).collect();
    println!("Triggers: {}", triggers.join(", "));
    if !workflow.permissions.is_empty() {
        let perms: Vec<_> = workflow
            .permissions
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        println!("Permissions: {}", perms.join(", "));
    }
    println!("Jobs: {}", workflow.jobs.len());
    println!("Steps: {}", workflow.step_count());

    for (id, job) in &workflow.jobs {
        println!(
            "\n  {id} [{}] timeout={}m",
            job.runs_on, job.timeout_minutes
        );
        if !job.needs.is_empty() {
            println!("    needs: {}", job.needs.join(", "));
        }
        for (i, step) in job.steps.iter().enumerate() {
            let kind = match (&step.uses, &step.run) {
                (Some(uses), _) => format!("uses {uses}"),
                (None, Some(_)) => "run".to_string(),
                (None, None) => "(empty)".to_string(),
            };
            println!("    {}. {} ({kind})", i + 1, step.label().lines().next().unwrap_or_default());
        }
    }

    Ok(())
}
