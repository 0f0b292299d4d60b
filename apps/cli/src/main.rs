//! varlens - integrate variant annotations for one gene.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use varlens_integration::{OutputWriter, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "varlens")]
#[command(author, version, about = "Integrate variant annotations for a gene", long_about = None)]
struct Cli {
    /// Gene symbol, e.g. SESN2
    #[arg(long, short)]
    gene: String,

    /// JSON configuration file
    #[arg(long, short, env = "VARLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Result directory (defaults to <output_dir>/<GENE>)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Refetch every request, overwriting cached responses
    #[arg(long)]
    refresh: bool,

    /// Do not read or write the response cache
    #[arg(long)]
    no_cache: bool,

    /// Cancel outstanding work after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Adapters running at the same time
    #[arg(long)]
    workers: Option<usize>,

    /// Sources to query (repeatable); defaults to all
    #[arg(long = "source")]
    sources: Vec<String>,
}

impl Cli {
    fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if self.refresh {
            config.refresh = true;
        }
        if self.no_cache {
            config.acquisition.cache.enabled = false;
        }
        if let Some(secs) = self.timeout {
            config.run_timeout_secs = Some(secs);
        }
        if let Some(workers) = self.workers {
            config.worker_pool_size = workers;
        }
        if !self.sources.is_empty() {
            config.enabled_sources = self.sources.clone();
        }
        config
    }

    fn result_dir(&self, config: &PipelineConfig) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| config.output_dir.join(self.gene.trim().to_ascii_uppercase()))
    }
}

fn init_tracing() {
    let log_format = std::env::var("VARLENS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            token.cancel();
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    let config = cli.apply(config::load(cli.config.as_deref())?);
    config.validate()?;
    let result_dir = cli.result_dir(&config);

    let pipeline = Pipeline::new(config);
    cancel_on_interrupt(pipeline.cancellation_token());

    let report = pipeline.run(&cli.gene).await?;
    let written = OutputWriter::write(&result_dir, &report)?;

    tracing::info!(
        run_id = %report.run_id,
        variants = report.integration.stats.total_variants,
        gaps = report.gaps.len(),
        files = written.len(),
        "results written to {}",
        result_dir.display()
    );
    if report.cancelled {
        tracing::warn!("run was cancelled; results are partial");
    }
    Ok(())
}
