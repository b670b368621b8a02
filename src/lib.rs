// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod status;
pub mod task;
pub mod types;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context as _, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigSection, load_and_validate};
use crate::engine::{PipelineExecutor, PipelineScheduler, RunOptions};
use crate::pipeline::{PipelineFactory, PipelineType};
use crate::registry::Registry;
use crate::status::{FileStatusStore, MemoryStatusStore, StatusManager};
use crate::task::TaskRegistry;
use crate::types::{SequenceNumber, StatusStorageMode};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    run_with_tasks(args, TaskRegistry::new()).await
}

/// Same as [`run`], with task factories registered in code.
///
/// Factories take precedence over `cmd` for tasks of the same name.
pub async fn run_with_tasks(args: CliArgs, tasks: TaskRegistry) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config))?;
    let status = status_manager(&cfg.config);
    let registry = Arc::new(Registry::from_config(&cfg, tasks)?);
    let factory = Arc::new(PipelineFactory::new(registry.clone(), status.clone()));

    match args.command {
        Command::Run { pipeline, dry_run } => {
            if dry_run {
                print_dry_run(&registry, &cfg.config);
                return Ok(());
            }
            run_schedulers(factory, pipeline.as_deref()).await
        }
        Command::Exec {
            pipeline,
            sequence,
            adhoc,
            overwrite,
            args,
        } => {
            let pipeline_type = registry.pipeline_type(&pipeline)?;
            let mut task_args: HashMap<String, BTreeMap<String, String>> = HashMap::new();
            for raw in &args {
                let (task, key, value) = parse_task_arg(raw)?;
                task_args.entry(task).or_default().insert(key, value);
            }
            let options = RunOptions {
                adhoc,
                overwrite,
                task_args,
            };
            exec_instance(&factory, &pipeline_type, sequence, options).await?;
            print_status(&pipeline_type, &status, sequence);
            Ok(())
        }
        Command::Status { pipeline, sequence } => {
            let pipeline_type = registry.pipeline_type(&pipeline)?;
            print_status(&pipeline_type, &status, sequence);
            Ok(())
        }
        Command::Clear { task, sequence } => {
            registry.task_type(&task)?;
            status.clear_task_status(&task, sequence)?;
            info!(task = %task, sequence_number = sequence, "cleared task status");
            Ok(())
        }
    }
}

/// Status manager over the backend selected in `[config]`.
pub fn status_manager(cfg: &ConfigSection) -> StatusManager {
    match cfg.storage {
        StatusStorageMode::File => {
            StatusManager::new(Arc::new(FileStatusStore::new(cfg.storage_root.clone())))
        }
        StatusStorageMode::Memory => StatusManager::new(Arc::new(MemoryStatusStore::new())),
    }
}

/// One scheduler per pipeline (or just `only`), until Ctrl-C.
async fn run_schedulers(factory: Arc<PipelineFactory>, only: Option<&str>) -> Result<()> {
    let pipelines: Vec<Arc<PipelineType>> = match only {
        Some(name) => vec![factory.registry().pipeline_type(name)?],
        None => factory.registry().pipelines().cloned().collect(),
    };

    let mut aborts = Vec::new();
    let mut handles = Vec::new();
    for pipeline_type in pipelines {
        let mut scheduler = PipelineScheduler::new(pipeline_type, factory.clone())?;
        aborts.push(scheduler.abort_handle());
        handles.push(tokio::spawn(async move {
            scheduler.run().await;
            scheduler.shutdown();
        }));
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; stopping schedulers");
    }
    info!("shutdown requested");
    for abort in &aborts {
        abort.abort();
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "pipeline scheduler task ended abnormally");
        }
    }
    Ok(())
}

/// Drive one instance in the foreground until it completes or Ctrl-C.
///
/// With `overwrite`, the instance's task markers are cleared first so every
/// task runs again.
pub async fn exec_instance(
    factory: &PipelineFactory,
    pipeline_type: &Arc<PipelineType>,
    sequence_number: SequenceNumber,
    options: RunOptions,
) -> Result<bool> {
    if options.overwrite {
        for task in &pipeline_type.tasks {
            factory.status().clear_task_status(task, sequence_number)?;
        }
        debug!(pipeline = %pipeline_type.name, sequence_number, "cleared task markers for overwrite run");
    }

    let executor = Arc::new(PipelineExecutor::new(
        factory,
        pipeline_type,
        sequence_number,
        options,
    )?);

    let run = executor.clone().run();
    tokio::pin!(run);
    tokio::select! {
        _ = &mut run => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            info!(pipeline = %pipeline_type.name, sequence_number, "interrupted; aborting instance");
            executor.abort();
        }
    }

    let completed = executor.pipeline().is_completed();
    if !completed {
        warn!(pipeline = %pipeline_type.name, sequence_number, "instance did not complete");
    }
    Ok(completed)
}

/// Split `task.key=value`.
fn parse_task_arg(raw: &str) -> Result<(String, String, String)> {
    let Some((target, value)) = raw.split_once('=') else {
        bail!("invalid --arg '{raw}': expected TASK.KEY=VALUE");
    };
    let Some((task, key)) = target.split_once('.') else {
        bail!("invalid --arg '{raw}': expected TASK.KEY=VALUE");
    };
    if task.is_empty() || key.is_empty() {
        bail!("invalid --arg '{raw}': task and key must be non-empty");
    }
    Ok((task.to_string(), key.to_string(), value.to_string()))
}

fn print_status(pipeline_type: &PipelineType, status: &StatusManager, sequence_number: SequenceNumber) {
    let pipeline_state = if status.is_pipeline_complete(&pipeline_type.name, sequence_number) {
        "SUCCESS"
    } else {
        "incomplete"
    };
    println!("{}:{} ({pipeline_state})", pipeline_type.name, sequence_number);
    for task in &pipeline_type.tasks {
        let state = status.task_status(task, sequence_number);
        match status.task_last_update_time(task, sequence_number) {
            Some(time) => println!("  {task:<24} {state:<12} {}", time.to_rfc3339()),
            None => println!("  {task:<24} {state}"),
        }
    }
}

fn print_dry_run(registry: &Registry, cfg: &ConfigSection) {
    println!("cadence dry-run");
    println!("  config.storage = {:?}", cfg.storage);
    println!("  config.storage_root = {}", cfg.storage_root.display());
    println!();

    for pipeline in registry.pipelines() {
        println!("pipeline {}", pipeline.name);
        println!("    interval: {:?}", pipeline.interval);
        println!("    lookback: {}", pipeline.lookback);
        println!("    threads: {}", pipeline.threads);
        println!("    iteration: {:?}", pipeline.iteration);
        if let Some(ref admin) = pipeline.admin {
            println!("    admin: {admin}");
        }
        for name in &pipeline.tasks {
            println!("  - {name}");
            if let Ok(task) = registry.task_type(name) {
                println!("      criticality: {:?}", task.criticality);
                if !task.dependencies.is_empty() {
                    println!("      after: {:?}", task.dependencies);
                }
                if !task.args.is_empty() {
                    println!("      args: {:?}", task.args);
                }
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
