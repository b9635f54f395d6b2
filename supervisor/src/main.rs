// Forbid unwrap() in production code to prevent panics mid-run.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use supervisor::config::{RunConfig, RunMode};
use supervisor::controller::{RunController, RunReport, Sink};
use supervisor::game::ArenaSim;
use supervisor::sweep;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "supervisor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match RunConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    #[allow(clippy::disallowed_methods)] // Arc::clone shares the flag
    let ctrl_c = Arc::clone(&stop);
    stop_on_ctrl_c(ctrl_c);

    let mode = config.mode;
    let output = match mode {
        RunMode::Single => single(config, stop).await,
        RunMode::Sweep => sweep::run_sweep(&config, &stop)
            .await
            .map_err(BoxError::from)
            .and_then(|points| Ok(serde_json::to_string_pretty(&points)?)),
    };

    match output {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Raise `stop` on Ctrl-C; the run ends at the next step boundary.
fn stop_on_ctrl_c(stop: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping at the next step boundary");
            stop.store(true, Ordering::Relaxed);
        }
    });
}

async fn single(config: RunConfig, stop: Arc<AtomicBool>) -> Result<String, BoxError> {
    let report = tokio::task::spawn_blocking(move || run_arena(config, stop)).await??;
    Ok(serde_json::to_string_pretty(&report)?)
}

fn run_arena(config: RunConfig, stop: Arc<AtomicBool>) -> Result<RunReport, BoxError> {
    let run_log = open_sink(config.output.run_log.as_deref())?;
    let jsonl = open_sink(config.output.tier0_jsonl.as_deref())?;
    let fprime = open_sink(config.output.fprime_frames.as_deref())?;

    let sim = ArenaSim::new(config.arena);
    let mut controller = RunController::new(config, sim)
        .with_stop_signal(stop)
        .with_tier0(jsonl, fprime);
    if let Some(out) = run_log {
        controller = controller.with_run_log(out);
    }
    Ok(controller.run()?)
}

fn open_sink(path: Option<&Path>) -> std::io::Result<Option<Sink>> {
    path.map(|path| File::create(path).map(|file| Box::new(BufWriter::new(file)) as Sink))
        .transpose()
}
