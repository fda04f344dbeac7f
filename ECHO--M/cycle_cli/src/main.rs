use std::{path::PathBuf, sync::Arc};

use anyhow::{ensure, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use echobeats_scheduler::{
    CycleEvent, CycleScheduler, CycleState, SchedulerConfig, SchedulerTelemetry,
};
use serde::Serialize;
use serde_json::{json, Value};
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "echo-cycle", version, about = "Echobeats cycle scheduler host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drives a scheduler for a fixed number of ticks, printing events as JSON lines.
    Run(RunArgs),
    /// Prints the step table.
    Table {
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validates a configuration file.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of host frames to simulate.
    #[arg(long, default_value_t = 24)]
    ticks: u32,
    /// Seconds passed to each tick.
    #[arg(long, default_value_t = 1.0)]
    delta: f64,
    /// Overrides the step length so one cycle takes this many seconds.
    #[arg(long)]
    cycle_duration: Option<f64>,
    /// Jumps to this step before the first tick.
    #[arg(long)]
    jump_to: Option<u32>,
    #[arg(long)]
    event_log: Option<PathBuf>,
    #[arg(long)]
    log: Option<PathBuf>,
    /// Logs every step, not just lifecycle changes.
    #[arg(long)]
    verbose: bool,
    /// Pretty-prints the final state.
    #[arg(long)]
    pretty: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    run_id: String,
    started_at: DateTime<Utc>,
    ticks: u32,
    events: usize,
    state: CycleState,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => handle_run(&args),
        Commands::Table { config } => {
            let config = load_config(config.as_ref())?;
            for entry in config.step_table.entries() {
                println!(
                    "{:>2} | {:<11} | {:<10} | stream {} | level {} | triad {} |{}{}",
                    entry.step,
                    entry.kind.label(),
                    entry.mode.to_string(),
                    entry.primary_stream,
                    entry.nesting_level,
                    entry.triadic_group,
                    if entry.sync_point { " sync" } else { "" },
                    if entry.pivotal { " pivotal" } else { "" },
                );
            }
            Ok(())
        }
        Commands::Check { config } => {
            let loaded = SchedulerConfig::load(&config)?;
            println!("{}", serde_json::to_string_pretty(&summarize(&loaded))?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SchedulerConfig> {
    match path {
        Some(path) => SchedulerConfig::load(path),
        None => Ok(SchedulerConfig::default()),
    }
}

fn summarize(config: &SchedulerConfig) -> Value {
    json!({
        "valid": true,
        "step_duration": config.step_duration,
        "cycle_duration": config.cycle_duration(),
        "stream_count": config.stream_count,
        "partition_sequence": config.partition_sequence.terms(),
        "total_terms": config.partition_sequence.total_terms(),
        "sync_points": config.step_table.sync_points().collect::<Vec<_>>(),
        "triadic_sync": config.triadic_sync,
        "sync_coupling_strength": config.sync_coupling_strength,
    })
}

fn build_telemetry(args: &RunArgs) -> Result<Option<SchedulerTelemetry>> {
    if args.log.is_none() && args.event_log.is_none() {
        return Ok(None);
    }
    let mut builder = SchedulerTelemetry::builder("echobeats.cli").min_level(if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    if let Some(path) = &args.log {
        builder = builder.log_path(path);
    }
    if let Some(path) = &args.event_log {
        let publisher = FileEventPublisher::new(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        builder = builder.event_publisher(Arc::new(publisher));
    }
    builder.build().map(Some)
}

fn handle_run(args: &RunArgs) -> Result<()> {
    ensure!(
        args.delta.is_finite() && args.delta >= 0.0,
        "delta must be a non-negative number of seconds"
    );
    let mut config = load_config(args.config.as_ref())?;
    if let Some(seconds) = args.cycle_duration {
        config = config.with_cycle_duration(seconds);
    }
    let mut scheduler = CycleScheduler::new(config)?;
    let telemetry = build_telemetry(args)?;
    if let Some(telemetry) = &telemetry {
        scheduler = scheduler.with_telemetry(telemetry.clone());
    }
    let started_at = Utc::now();
    let lines = drive(&mut scheduler, args.jump_to, args.ticks, args.delta);
    if let Some(telemetry) = &telemetry {
        telemetry.flush().context("flushing event log")?;
    }
    for line in &lines {
        println!("{}", serde_json::to_string(line)?);
    }
    let summary = RunSummary {
        run_id: format!("run-{}", Uuid::new_v4()),
        started_at,
        ticks: args.ticks,
        events: lines.len(),
        state: scheduler.cycle_state(),
    };
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{rendered}");
    Ok(())
}

fn drive(
    scheduler: &mut CycleScheduler,
    jump_to: Option<u32>,
    ticks: u32,
    delta: f64,
) -> Vec<Value> {
    let mut lines = Vec::new();
    let mut record = |tick: Option<u32>, events: Vec<CycleEvent>| {
        lines.extend(events.into_iter().map(|event| json!({ "tick": tick, "event": event })));
    };
    if let Some(step) = jump_to {
        record(None, scheduler.jump_to_step(step));
    }
    for tick in 0..ticks {
        record(Some(tick), scheduler.tick(delta));
    }
    lines
}
