use anyhow::Context;
use clap::Parser;
use fusioncore::{ClassifierHistory, StreamRecord};
use generator::ScenarioGenerator;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{build_engine, Runner};
use workflow::runtime::LiveRuntime;
use workflow::sink::UdpCommandSink;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Fusion workflow driver: offline replay or live run")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Replay the synthetic scenario in simulated time and print a summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Keep the HTTP bridge alive for records from external decoders
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Classifier history CSV loaded at startup
    #[arg(long)]
    history: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
    /// Scenario length in seconds
    #[arg(long)]
    duration: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = match &args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    }
    .with_overrides(args.seed, args.duration, args.history.clone());
    workflow_config.validate()?;

    let history = workflow_config.load_history()?;
    let records = ScenarioGenerator::new(workflow_config.scenario.clone())?.generate();

    if args.offline {
        run_offline(&workflow_config, records, history)
    } else {
        run_live(workflow_config, records, history, args.serve)
    }
}

fn run_offline(
    config: &WorkflowConfig,
    records: Vec<StreamRecord>,
    history: ClassifierHistory,
) -> anyhow::Result<()> {
    let result = Runner::new(config.clone()).replay(records, history)?;
    if let Some(description) = &config.scenario.description {
        println!("Scenario: {}", description);
    }

    println!(
        "Offline run -> records {}, dropped {}, classified {}, commands {}, history rows {}",
        result.records,
        result.dropped,
        result.classified,
        result.frames.len(),
        result.history.len()
    );
    for frame in &result.frames {
        println!("  {}", frame);
    }
    if !result.targets.is_empty() || result.abandoned > 0 {
        println!(
            "  {} targets still live, {} abandoned at shutdown",
            result.targets.len(),
            result.abandoned
        );
    }

    let report = format!(
        "seed={} records={} dropped={} classified={} commands={} metrics={}\n",
        config.scenario.seed,
        result.records,
        result.dropped,
        result.classified,
        result.frames.len(),
        serde_json::to_string(&result.metrics).context("encoding metrics")?
    );
    let report_path = &config.runtime.report_path;
    if let Some(parent) = report_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating report directory {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(report_path)
        .with_context(|| format!("opening report {}", report_path.display()))?;
    file.write_all(report.as_bytes())?;

    if let Some(path) = &config.runtime.history_out {
        result
            .history
            .save_csv(path)
            .with_context(|| format!("exporting classifier history {}", path.display()))?;
    }
    Ok(())
}

fn run_live(
    config: WorkflowConfig,
    records: Vec<StreamRecord>,
    history: ClassifierHistory,
    serve: bool,
) -> anyhow::Result<()> {
    let sink = UdpCommandSink::connect(&config.runtime.trigger_addr)?;
    let engine = build_engine(&config, history, Box::new(sink))?;
    let feed_length = Duration::from_secs_f64(config.scenario.duration.max(0.0));

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating tokio runtime")?;
    let report = runtime.block_on(async {
        let stop = async move {
            if serve {
                println!("HTTP bridge running (Ctrl+C to stop)...");
                if let Err(err) = signal::ctrl_c().await {
                    log::warn!("waiting for Ctrl+C failed: {}", err);
                }
            } else {
                tokio::select! {
                    result = signal::ctrl_c() => {
                        if let Err(err) = result {
                            log::warn!("waiting for Ctrl+C failed: {}", err);
                        }
                    }
                    _ = tokio::time::sleep(feed_length) => {}
                }
            }
        };
        LiveRuntime::new(config)
            .run(engine, records, serve, stop)
            .await
    })?;

    println!(
        "Live run -> ingested {}, classified {}, abandoned at shutdown {}, commands {}",
        report.ingested,
        report.classified,
        report.shutdown.abandoned,
        report.metrics.commands_sent
    );
    Ok(())
}
