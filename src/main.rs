use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use conveyor::context::RunContext;
use conveyor::lockfile::generate_lock;
use conveyor::manifest::{FailurePolicy, Manifest};
use conveyor::observability::{MetricsCollector, log_snapshot};
use conveyor::presets::generate_preset;
use conveyor::runner::run_pipeline;
use conveyor::validation::validate_manifest;
use serde_json::to_writer_pretty;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Run {
            manifest,
            branch,
            tag,
            workdir,
            dry_run,
            print_metrics,
            metrics_json,
            metrics_prometheus,
            report_json,
        } => run_manifest(RunArgs {
            manifest_path: manifest,
            branch,
            tag,
            workdir,
            dry_run,
            print_metrics,
            metrics_json,
            metrics_prometheus,
            report_json,
        }),
        Commands::Validate { manifest } => validate_manifest_cmd(manifest),
        Commands::Lock { manifest, output } => lock_manifest(manifest, output),
        Commands::Manifest { action } => manifest_command(action),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "conveyor", &mut io::stdout());
            Ok(())
        }
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

struct RunArgs {
    manifest_path: PathBuf,
    branch: Option<String>,
    tag: Option<String>,
    workdir: Option<PathBuf>,
    dry_run: bool,
    print_metrics: bool,
    metrics_json: Option<PathBuf>,
    metrics_prometheus: Option<PathBuf>,
    report_json: Option<PathBuf>,
}

fn run_manifest(args: RunArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest_path)?;

    let report = validate_manifest(&manifest);
    for warning in &report.warnings {
        warn!(file = %args.manifest_path.display(), "{warning}");
    }
    if !report.is_ok() {
        for error_msg in &report.errors {
            error!(file = %args.manifest_path.display(), "{error_msg}");
        }
        bail!(
            "Manifest validation failed with {} error(s)",
            report.errors.len()
        );
    }

    if args.dry_run {
        print_plan(&manifest);
        return Ok(());
    }

    let workdir = match args.workdir {
        Some(dir) => dir,
        None => env::current_dir().context("Failed to determine current directory")?,
    };
    if !workdir.is_dir() {
        bail!("Working directory '{}' does not exist", workdir.display());
    }

    let ctx = RunContext::new(workdir)
        .with_branch(args.branch)
        .with_tag(args.tag);

    let metrics = MetricsCollector::new();
    let run_report = run_pipeline(&manifest, &ctx, &metrics)?;

    if let Some(path) = args.report_json {
        write_json(&path, &run_report, "run report")?;
        info!(report = %path.display(), "Run report written");
    }

    if args.print_metrics || args.metrics_json.is_some() || args.metrics_prometheus.is_some() {
        let snapshot = metrics.snapshot();
        if args.print_metrics {
            log_snapshot(&snapshot);
        }
        if let Some(path) = args.metrics_json {
            write_json(&path, &snapshot, "metrics")?;
            info!(metrics = %path.display(), "Metrics JSON written");
        }
        if let Some(path) = args.metrics_prometheus {
            ensure_parent(&path)?;
            fs::write(&path, snapshot.to_prometheus()).with_context(|| {
                format!("Failed to write Prometheus metrics: {}", path.display())
            })?;
            info!(metrics = %path.display(), "Prometheus metrics written");
        }
    }

    if run_report.gated {
        info!("Run skipped by branch filter");
        return Ok(());
    }

    for stage in &run_report.stages {
        info!(stage = stage.name.as_str(), status = %stage.status, "Stage result");
    }

    match run_report.failure() {
        Some(err) => Err(err.into()),
        None => {
            info!("Run succeeded");
            Ok(())
        }
    }
}

fn print_plan(manifest: &Manifest) {
    info!(
        stages = manifest.stages.len(),
        install_steps = manifest.install.len(),
        "Loaded manifest"
    );
    if let Some(runtime) = &manifest.runtime {
        info!(
            language = runtime.language.as_str(),
            version = runtime.version.as_deref().unwrap_or("any"),
            "Would provision runtime"
        );
    }
    for stage in &manifest.stages {
        let policy = match stage.policy {
            FailurePolicy::Required => "required",
            FailurePolicy::BestEffort => "best-effort",
        };
        info!(
            stage = stage.name.as_str(),
            policy,
            commands = stage.commands.len(),
            "Would run stage"
        );
    }
    if let Some(deploy) = &manifest.deploy {
        info!(
            provider = deploy.provider.as_str(),
            on_tags = deploy.on.tags,
            "Would deploy on trigger"
        );
    }
}

fn validate_manifest_cmd(manifest_path: PathBuf) -> Result<()> {
    let manifest = Manifest::load(&manifest_path)?;
    let report = validate_manifest(&manifest);

    for warning in &report.warnings {
        warn!(file = %manifest_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %manifest_path.display(), "Manifest validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %manifest_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Manifest validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn lock_manifest(manifest_path: PathBuf, output_path: PathBuf) -> Result<()> {
    let manifest = Manifest::load(&manifest_path)?;
    let report = validate_manifest(&manifest);

    for warning in &report.warnings {
        warn!(file = %manifest_path.display(), "{warning}");
    }

    if !report.is_ok() {
        for error_msg in &report.errors {
            error!(file = %manifest_path.display(), "{error_msg}");
        }
        return Err(anyhow!(
            "Cannot generate lockfile due to {} validation error(s)",
            report.errors.len()
        ));
    }

    ensure_parent(&output_path)?;
    generate_lock(&manifest, &output_path)?;
    info!(
        lockfile = %output_path.display(),
        "Lockfile generated successfully"
    );

    Ok(())
}

fn manifest_command(command: ManifestCommands) -> Result<()> {
    match command {
        ManifestCommands::New { preset, output } => {
            let destination =
                output.unwrap_or_else(|| PathBuf::from(format!("manifests/{preset}.yaml")));
            let generated = generate_preset(&preset, &destination)?;
            info!(
                preset = %preset,
                path = %generated.display(),
                "Preset manifest generated"
            );
            Ok(())
        }
        ManifestCommands::Lint { manifests } => lint_manifests(&manifests),
        ManifestCommands::Diff { lhs, rhs } => diff_manifests(&lhs, &rhs),
    }
}

fn lint_manifests(manifests: &[PathBuf]) -> Result<()> {
    if manifests.is_empty() {
        bail!("No manifest files supplied for linting");
    }

    let mut failures = 0usize;

    for manifest_path in manifests {
        match Manifest::load(manifest_path) {
            Ok(manifest) => {
                let report = validate_manifest(&manifest);
                for warning in &report.warnings {
                    warn!(file = %manifest_path.display(), "{warning}");
                }
                if report.is_ok() {
                    info!(file = %manifest_path.display(), "Lint passed");
                } else {
                    failures += 1;
                    for error_msg in &report.errors {
                        error!(file = %manifest_path.display(), "{error_msg}");
                    }
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %manifest_path.display(), "Failed to load manifest: {err}");
            }
        }
    }

    if failures > 0 {
        bail!("Lint failed for {failures} manifest(s)");
    }

    info!("All manifest lint checks passed");
    Ok(())
}

fn diff_manifests(lhs: &Path, rhs: &Path) -> Result<()> {
    let left = Manifest::load(lhs)?;
    let right = Manifest::load(rhs)?;

    let mut differences = Vec::new();

    if left.version != right.version {
        differences.push(format!(
            "Version mismatch: {} vs {}",
            left.version, right.version
        ));
    }

    let left_runtime = left
        .runtime
        .as_ref()
        .map(|r| format!("{} {}", r.language, r.version.as_deref().unwrap_or("any")));
    let right_runtime = right
        .runtime
        .as_ref()
        .map(|r| format!("{} {}", r.language, r.version.as_deref().unwrap_or("any")));
    if left_runtime != right_runtime {
        differences.push(format!(
            "Runtime differs: {:?} vs {:?}",
            left_runtime, right_runtime
        ));
    }

    let left_install: Vec<_> = left.install.iter().map(|s| s.command()).collect();
    let right_install: Vec<_> = right.install.iter().map(|s| s.command()).collect();
    if left_install != right_install {
        differences.push(format!(
            "Install commands differ: {:?} vs {:?}",
            left_install, right_install
        ));
    }

    let min_len = left.stages.len().min(right.stages.len());
    if left.stages.len() != right.stages.len() {
        differences.push(format!(
            "Stage count differs: {} vs {}",
            left.stages.len(),
            right.stages.len()
        ));
    }

    for (idx, (l_stage, r_stage)) in left
        .stages
        .iter()
        .take(min_len)
        .zip(right.stages.iter())
        .enumerate()
    {
        if l_stage.name != r_stage.name {
            differences.push(format!(
                "Stage {} name differs: '{}' vs '{}'",
                idx + 1,
                l_stage.name,
                r_stage.name
            ));
        }
        if l_stage.policy != r_stage.policy {
            differences.push(format!(
                "Stage {} ('{}') policy differs",
                idx + 1,
                l_stage.name
            ));
        }
        if l_stage.commands != r_stage.commands {
            differences.push(format!(
                "Stage {} ('{}') commands differ: {:?} vs {:?}",
                idx + 1,
                l_stage.name,
                l_stage.commands,
                r_stage.commands
            ));
        }
    }

    let left_deploy = left.deploy.as_ref().map(|d| (&d.provider, &d.upload));
    let right_deploy = right.deploy.as_ref().map(|d| (&d.provider, &d.upload));
    if left_deploy != right_deploy {
        differences.push(format!(
            "Deploy section differs: {:?} vs {:?}",
            left_deploy, right_deploy
        ));
    }

    if differences.is_empty() {
        info!(
            left = %lhs.display(),
            right = %rhs.display(),
            "Manifests are equivalent"
        );
        println!("Manifests match: {} == {}", lhs.display(), rhs.display());
        Ok(())
    } else {
        println!(
            "Manifest differences between '{}' and '{}':",
            lhs.display(),
            rhs.display()
        );
        for diff in &differences {
            println!("- {diff}");
        }
        bail!("Manifests differ ({} difference(s) found)", differences.len());
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path)
        .with_context(|| format!("Failed to create {what} file: {}", path.display()))?;
    to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write {what} JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "conveyor",
    version,
    about = "Declarative build/test/publish pipeline runner"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline manifest end to end
    Run {
        manifest: PathBuf,
        #[arg(long, env = "CONVEYOR_BRANCH")]
        branch: Option<String>,
        #[arg(long, env = "CONVEYOR_TAG")]
        tag: Option<String>,
        #[arg(long)]
        workdir: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        print_metrics: bool,
        #[arg(long = "metrics-json")]
        metrics_json: Option<PathBuf>,
        #[arg(long = "metrics-prometheus")]
        metrics_prometheus: Option<PathBuf>,
        #[arg(long = "report-json")]
        report_json: Option<PathBuf>,
    },
    /// Validate a manifest without running it
    Validate {
        manifest: PathBuf,
    },
    /// Write a deterministic fingerprint of a manifest
    Lock {
        manifest: PathBuf,
        output: PathBuf,
    },
    /// Manifest authoring helpers
    Manifest {
        #[command(subcommand)]
        action: ManifestCommands,
    },
    /// Emit shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ManifestCommands {
    New {
        #[arg(long)]
        preset: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Lint {
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
    },
    Diff {
        lhs: PathBuf,
        rhs: PathBuf,
    },
}
