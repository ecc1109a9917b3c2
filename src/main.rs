mod cli;

use af_av::tools::{FFMPEG, FFPROBE};
use af_av::ToolRegistry;
use af_core::{CatalogEntry, Config};
use af_pipeline::{
    guard, DerivativeTask, ErrorSink, Orchestrator, Planner, RunSummary, Stamper, ToolRunner,
};
use archiveforge::{config, discover};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "archiveforge=trace,af_pipeline=trace,af_av=debug,af_core=debug".to_string()
        } else {
            "archiveforge=info,af_pipeline=info,af_av=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Derive {
            catalog,
            mode,
            jobs,
            log,
        } => {
            let overrides = config::Overrides { mode, jobs, log };
            derive(&catalog, config_path, &overrides)
        }
        Commands::Stamp { dir, jobs, log } => {
            let overrides = config::Overrides {
                mode: None,
                jobs,
                log,
            };
            stamp(&dir, config_path, &overrides)
        }
        Commands::Plan {
            catalog,
            mode,
            json,
        } => {
            let overrides = config::Overrides {
                mode,
                ..Default::default()
            };
            plan(&catalog, config_path, &overrides, json).map(|()| ExitCode::SUCCESS)
        }
        Commands::CheckTools => check_tools(config_path).map(|()| ExitCode::SUCCESS),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref()).map(|()| ExitCode::SUCCESS)
        }
        Commands::Version => {
            println!("archiveforge {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(config_path: Option<&Path>, overrides: &config::Overrides) -> Result<Config> {
    let mut config = config::load_config_or_default(config_path)?;
    overrides.apply(&mut config);
    Ok(config)
}

fn open_sink(config: &Config) -> Result<Arc<ErrorSink>> {
    let path = &config.log.error_log;
    let sink = ErrorSink::open(path, config.log.console)
        .with_context(|| format!("Failed to open error log: {:?}", path))?;
    Ok(Arc::new(sink))
}

fn finish(summary: &RunSummary, sink: &ErrorSink) -> ExitCode {
    println!("\n{summary}");
    if summary.has_failures() {
        if let Some(path) = sink.path() {
            println!("Failures were recorded in {}", path.display());
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn derive(
    catalog: &Path,
    config_path: Option<&Path>,
    overrides: &config::Overrides,
) -> Result<ExitCode> {
    let config = load(config_path, overrides)?;
    let entries = af_core::load_catalog(catalog)?;

    let registry = ToolRegistry::discover(&config.tools);
    let ffmpeg = registry.require(FFMPEG)?.to_path_buf();
    let sink = open_sink(&config)?;
    let runner = Arc::new(ToolRunner::new(config.derive.tool_timeout()));

    tracing::info!("Loaded {} catalog entries from {:?}", entries.len(), catalog);
    let orchestrator = Orchestrator::new(&config, ffmpeg, runner, Arc::clone(&sink));

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(orchestrator.run(entries));
    Ok(finish(&summary, &sink))
}

fn stamp(dir: &Path, config_path: Option<&Path>, overrides: &config::Overrides) -> Result<ExitCode> {
    let config = load(config_path, overrides)?;
    if !dir.is_dir() {
        anyhow::bail!("Directory does not exist: {:?}", dir);
    }

    let registry = ToolRegistry::discover(&config.tools);
    let ffmpeg = registry.require(FFMPEG)?.to_path_buf();
    let ffprobe = registry.require(FFPROBE)?.to_path_buf();
    let sink = open_sink(&config)?;
    let runner = Arc::new(ToolRunner::new(config.derive.tool_timeout()));

    let files = discover::stamp_candidates(dir, &config);
    tracing::info!("Found {} files to check under {:?}", files.len(), dir);
    let stamper = Stamper::new(&config, ffmpeg, ffprobe, runner, Arc::clone(&sink));

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(stamper.run(files));
    Ok(finish(&summary, &sink))
}

/// One catalog entry as shown by `plan`.
#[derive(Serialize)]
struct PlannedEntry {
    source: PathBuf,
    source_exists: bool,
    tasks: Vec<PlannedTask>,
}

#[derive(Serialize)]
struct PlannedTask {
    #[serde(flatten)]
    task: DerivativeTask,
    skip: bool,
    args: Vec<String>,
}

fn plan(
    catalog: &Path,
    config_path: Option<&Path>,
    overrides: &config::Overrides,
    json: bool,
) -> Result<()> {
    let config = load(config_path, overrides)?;
    let entries = af_core::load_catalog(catalog)?;

    let registry = ToolRegistry::discover(&config.tools);
    let ffmpeg = registry
        .require(FFMPEG)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(FFMPEG));
    let planner = Planner::new(&config, ffmpeg);

    let planned: Vec<PlannedEntry> = entries
        .iter()
        .map(|entry| plan_entry(&planner, entry, &config))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&planned)?);
        return Ok(());
    }

    println!("Mode: {}", config.derive.mode);
    for entry in &planned {
        if !entry.source_exists {
            println!("\n{} [source missing]", entry.source.display());
            continue;
        }
        println!("\n{}", entry.source.display());
        for planned in &entry.tasks {
            let status = if planned.skip { "exists, skip" } else { "run" };
            println!(
                "  {} ({:?}) -> {} [{}]",
                planned.task.kind.label(),
                planned.task.strategy,
                planned.task.output_path.display(),
                status
            );
            if !planned.skip {
                println!("      {} {}", planned.task.command.tool_name(), planned.args.join(" "));
            }
        }
    }

    let total: usize = planned.iter().map(|e| e.tasks.len()).sum();
    let to_run = planned
        .iter()
        .flat_map(|e| &e.tasks)
        .filter(|t| !t.skip)
        .count();
    println!("\n[DRY RUN] {to_run} of {total} tasks would run");
    Ok(())
}

fn plan_entry(planner: &Planner, entry: &CatalogEntry, config: &Config) -> PlannedEntry {
    let source = entry.source_path();
    let source_exists = source.is_file();
    let tasks = if source_exists {
        planner
            .plan(entry, config.derive.mode)
            .into_iter()
            .map(|task| PlannedTask {
                skip: guard::check_output(&task.output_path).should_skip(),
                args: task.command.to_args(),
                task,
            })
            .collect()
    } else {
        Vec::new()
    };
    PlannedEntry {
        source,
        source_exists,
        tasks,
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg (which provides ffprobe) to derive and stamp.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let (config, source) = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            (config::load_config(p)?, p.display().to_string())
        }
        None => match config::find_default_config() {
            Some(p) => {
                println!("Validating config: {:?}", p);
                (config::load_config(&p)?, p.display().to_string())
            }
            None => {
                println!("No config file found, using defaults");
                (Config::default(), "defaults".to_string())
            }
        },
    };

    let warnings = config.validate();
    println!("✓ Configuration is valid ({source})");
    println!("  Mode: {}", config.derive.mode);
    println!(
        "  Workers: {} (timeout: {})",
        config.derive.workers(),
        match config.derive.tool_timeout() {
            Some(t) => format!("{}s", t.as_secs()),
            None => "none".to_string(),
        }
    );
    println!(
        "  Master: {}/<name>{}.{} ({})",
        config.derive.master.directory,
        config.derive.master.suffix,
        config.derive.master.extension,
        config.derive.master.video_codec
    );
    println!(
        "  Proxy: {}/<name>{}.{} ({})",
        config.derive.proxy.directory,
        config.derive.proxy.suffix,
        config.derive.proxy.extension,
        config.derive.proxy.video_codec
    );
    println!("  Metadata fields: {}", config.metadata.fields().len());
    println!("  Error log: {}", config.log.error_log.display());
    for warning in &warnings {
        println!("  ! {warning}");
    }

    Ok(())
}
