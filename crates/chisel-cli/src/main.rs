use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use chisel_core::cache::ChangeMarker;
use chisel_core::config::{absolute_root, parse_repo_list};
use chisel_core::lint::{
    lint_repos, EslintEngine, InProcessLint, LintCacheRouter, LintOptions, LintUnit, SpawnedLint,
};
use chisel_core::{
    default_compiler, ChiselConfig, CliOverrides, LintAggregator, Transpiler, WatchLoop,
};

mod progress;

/// chisel - incremental transpile cache, watch loop and parallel lint dispatch
#[derive(Parser, Debug)]
#[command(name = "chisel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to chisel.yaml / chisel.json configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    project: Option<PathBuf>,

    /// Directory holding the checked-out repositories
    #[arg(long, value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Debug logging, and log why each file is recompiled
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transpile repository sources into the dist tree
    Transpile(TranspileArgs),

    /// Lint repositories in parallel
    Lint(LintArgs),

    /// Lint a single repository and print its results as JSON
    #[command(hide = true)]
    LintUnit {
        repo: String,

        #[arg(long)]
        disable_cache: bool,

        #[arg(long)]
        fix: bool,
    },

    /// Exit 0 if the process identified by KEY can be skipped, 1 if it must rerun
    CacheStatus { key: String },

    /// Record that the process identified by KEY just succeeded
    CacheSuccess { key: String },

    /// Write a default configuration file
    Init {
        #[arg(default_value = "chisel.yaml")]
        path: PathBuf,
    },
}

#[derive(Args, Debug)]
struct TranspileArgs {
    /// Keep watching and transpile on change
    #[arg(short, long)]
    watch: bool,

    /// Clear the status cache on startup
    #[arg(long)]
    clean: bool,

    /// Transpile every active repository
    #[arg(long)]
    all: bool,

    /// Additional repositories, comma-separated
    #[arg(long, value_delimiter = ',', value_name = "REPOS")]
    repos: Vec<String>,

    /// Extra brand folders to transpile, comma-separated
    #[arg(long, value_delimiter = ',', value_name = "BRANDS")]
    brands: Vec<String>,

    /// Minify shader sources
    #[arg(long)]
    minify_wgsl: bool,
}

#[derive(Args, Debug)]
struct LintArgs {
    /// Repositories to lint (default: the active repository list)
    #[arg(value_name = "REPO")]
    targets: Vec<String>,

    /// Repositories to lint, comma-separated
    #[arg(long, value_delimiter = ',', value_name = "REPOS")]
    repos: Vec<String>,

    /// Delete existing lint caches and lint from scratch
    #[arg(long)]
    disable_cache: bool,

    /// Write autofixes to disk
    #[arg(long)]
    fix: bool,

    /// Print a developer assignment checklist for failing repos
    #[arg(long)]
    chip_away: bool,

    /// Number of concurrent workers
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries reports and lint-unit JSON
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    if let Command::Init { path } = &cli.command {
        ChiselConfig::init_file(path)?;
        println!("Created {}", path.display());
        return Ok(());
    }

    let config = load_config(&cli)?;
    let root = absolute_root(&config.transpile.root)?;
    debug!("Root: {}", root.display());

    match &cli.command {
        Command::Transpile(args) => transpile(&config, &root, args.watch),
        Command::Lint(args) => lint(&cli, &config, &root, args),
        Command::LintUnit { repo, .. } => lint_unit(&config, &root, repo),
        Command::CacheStatus { key } => {
            let marker = ChangeMarker::new(config.transpile.marker_path(&root));
            if marker.is_cache_safe(key) {
                println!("fresh");
                Ok(())
            } else {
                println!("stale");
                std::process::exit(1);
            }
        }
        Command::CacheSuccess { key } => {
            ChangeMarker::new(config.transpile.marker_path(&root)).on_success(key)?;
            Ok(())
        }
        Command::Init { .. } => Ok(()),
    }
}

/// Load the config file (explicit, or discovered in the working directory)
/// and apply command-line overrides
fn load_config(cli: &Cli) -> anyhow::Result<ChiselConfig> {
    let mut config = if let Some(ref project_path) = cli.project {
        ChiselConfig::from_file(project_path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?
    } else {
        let discovered = ["chisel.yaml", "chisel.yml", "chisel.json"]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists());
        match discovered {
            Some(path) => ChiselConfig::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", path.display(), e))?,
            None => ChiselConfig::default(),
        }
    };

    let mut overrides = CliOverrides {
        root: cli.root.clone(),
        verbose: cli.verbose.then_some(true),
        ..Default::default()
    };
    match &cli.command {
        Command::Transpile(args) => {
            overrides.clean = args.clean.then_some(true);
            overrides.all = args.all.then_some(true);
            overrides.minify_wgsl = args.minify_wgsl.then_some(true);
            if !args.repos.is_empty() {
                overrides.repos = Some(args.repos.clone());
            }
            if !args.brands.is_empty() {
                overrides.brands = Some(args.brands.clone());
            }
        }
        Command::Lint(args) => {
            overrides.workers = args.workers;
            overrides.lint_cache = args.disable_cache.then_some(false);
            overrides.fix = args.fix.then_some(true);
            overrides.chip_away = args.chip_away.then_some(true);
            overrides.show_progress_bar = args.no_progress.then_some(false);
        }
        Command::LintUnit {
            disable_cache, fix, ..
        } => {
            overrides.lint_cache = disable_cache.then_some(false);
            overrides.fix = fix.then_some(true);
        }
        _ => {}
    }
    config.merge(&overrides);
    Ok(config)
}

fn transpile(config: &ChiselConfig, root: &Path, watch: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let settings = &config.transpile;
    let mut transpiler = Transpiler::new(root, settings, default_compiler(root, settings))?;

    if watch {
        let marker = ChangeMarker::new(settings.marker_path(root));
        let all = settings.all;
        let repos = settings.repos.clone();
        WatchLoop::new(transpiler, marker).run(move |t| t.transpile_selected(all, &repos))?;
        return Ok(());
    }

    let stats = transpiler.transpile_selected(settings.all, &settings.repos)?;
    info!(
        "Finished initial transpilation in {}ms: {} compiled, {} up to date, {} failed, {} removed",
        start.elapsed().as_millis(),
        stats.compiled,
        stats.fresh,
        stats.failed,
        stats.removed
    );
    Ok(())
}

fn lint(cli: &Cli, config: &ChiselConfig, root: &Path, args: &LintArgs) -> anyhow::Result<()> {
    let settings = &config.lint;

    let mut repos: Vec<String> = args.targets.clone();
    repos.extend(args.repos.iter().cloned());
    if repos.is_empty() {
        let list = root.join(&config.transpile.active_repos_file);
        let text = std::fs::read_to_string(&list)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", list.display(), e))?;
        repos = parse_repo_list(&text);
    }

    let cache_dir = root.join(&settings.cache_dir);
    let engine = Arc::new(EslintEngine::new(settings.engine_command.clone(), root));
    let cached: Arc<dyn LintUnit> = Arc::new(InProcessLint::new(engine, root, &cache_dir));
    let uncached: Arc<dyn LintUnit> = match &settings.spawn_command {
        Some(command) => Arc::new(SpawnedLint::new(command.clone())),
        None => Arc::new(SpawnedLint::forwarding(self_command(cli, root)?)),
    };
    let router = LintCacheRouter::new(&cache_dir, cached, uncached);

    let show_progress = settings.show_progress_bar;
    let report = lint_repos(root, settings, &repos, &router, |completed, total| {
        if show_progress {
            progress::show(completed, total);
        }
    })?;

    print!("{}", report.format());
    if settings.chip_away {
        let aggregator = LintAggregator::new(root, &settings.responsible_devs_file);
        println!("{}", aggregator.chip_away(&report));
    }

    if !report.ok {
        error!("Lint failed: {}", report.failed_repos().join(", "));
        std::process::exit(1);
    }
    info!("Linting completed successfully.");
    Ok(())
}

/// Command that re-invokes this binary as a lint child
fn self_command(cli: &Cli, root: &Path) -> anyhow::Result<Vec<String>> {
    let exe = std::env::current_exe()?;
    let mut command = vec![
        exe.to_string_lossy().into_owned(),
        "--root".to_string(),
        root.to_string_lossy().into_owned(),
    ];
    if let Some(project) = &cli.project {
        command.push("--project".to_string());
        command.push(project.to_string_lossy().into_owned());
    }
    command.push("lint-unit".to_string());
    command.push("{repo}".to_string());
    Ok(command)
}

fn lint_unit(config: &ChiselConfig, root: &Path, repo: &str) -> anyhow::Result<()> {
    let settings = &config.lint;
    let engine = Arc::new(EslintEngine::new(settings.engine_command.clone(), root));
    let unit = InProcessLint::new(engine, root, &root.join(&settings.cache_dir));
    let options = LintOptions {
        cache: settings.cache,
        fix: settings.fix,
        cache_file: None,
    };

    let outcome = unit.run(repo, &options);
    println!("{}", serde_json::to_string(&outcome.results)?);
    if !outcome.is_ok() {
        std::process::exit(outcome.exit_code);
    }
    Ok(())
}
