use anyhow::{Context, Result};
use clap::Parser;
use linesieve::config::{Backend, PickerArgs, PickerConfig, load_dotenv};
use linesieve::io::cloud::{LocalObjectIO, ObjectIO};
use linesieve::output::{CsvSink, SchemaError};
use linesieve::runner::{RunContext, RunError, Runner};
use linesieve::summary::RunSummary;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let dotenv = load_dotenv();
    let args = PickerArgs::parse();
    init_tracing(args.debug);
    match dotenv {
        Ok(Some(path)) => debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(err) => warn!(error = %err, "ignoring unreadable .env"),
    }

    let config = match args.validate() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::from(2);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current line and writing output");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let outcome = match tokio::task::spawn_blocking(move || execute(&config, stop)).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(error = %err, "scan task panicked");
            return ExitCode::FAILURE;
        }
    };

    match outcome {
        Ok(summary) => {
            summary.print();
            ExitCode::SUCCESS
        }
        Err(err) if err.downcast_ref::<SchemaError>().is_some() => {
            error!(error = %format!("{err:#}"), "refusing to append to output");
            ExitCode::from(2)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "linesieve=debug" } else { "linesieve=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_store(config: &PickerConfig) -> Result<Box<dyn ObjectIO>> {
    match &config.backend {
        Backend::Local { root } => {
            info!(root = %root.display(), "reading local partitions");
            Ok(Box::new(LocalObjectIO::new(root.clone())))
        }
        #[cfg(feature = "http")]
        Backend::Http { endpoint, timeout } => {
            use linesieve::io::cloud::http::HttpObjectIO;
            use linesieve::runner::PartitionSource;

            let keys = match &config.source {
                PartitionSource::Keys(keys) => keys.clone(),
                PartitionSource::Listing { .. } => Vec::new(),
            };
            info!(%endpoint, objects = keys.len(), "reading remote partitions");
            let store = HttpObjectIO::new(endpoint.clone(), keys, *timeout)
                .with_context(|| format!("connect to {endpoint}"))?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "http"))]
        Backend::Http { endpoint, .. } => {
            anyhow::bail!("remote endpoint {endpoint} needs the `http` feature; use --local-dir")
        }
    }
}

fn execute(config: &PickerConfig, stop: Arc<AtomicBool>) -> Result<RunSummary> {
    let store = open_store(config)?;
    let mut sink = CsvSink::open(&config.outfile, config.overwrite)?;

    let runner = Runner::new(
        store.as_ref(),
        config.bucket.clone(),
        config.matcher.clone(),
        config.policy,
    )
    .with_source(config.source.clone())
    .with_chunk_size(config.chunk_size)
    .with_fallback(config.fallback);
    let mut ctx = RunContext::new(config.seed)
        .with_retry(config.retry)
        .with_stop_flag(stop);

    let summary = runner.run(&mut ctx, &mut sink).map_err(|err| match err {
        RunError::Output(inner) => inner.context(format!("write {}", config.outfile.display())),
        other => anyhow::Error::new(other),
    })?;

    if let Some(path) = &config.summary_json {
        summary.save_to_file(path)?;
        info!(path = %path.display(), "summary saved");
    }
    Ok(summary)
}
