//! farewatch: drift monitor, model server and trainer
//!
//! ```text
//! farewatch monitor --reference ref.parquet --current cur.parquet --repo acme/fares
//! farewatch serve   --artifact models/model.json --bind 0.0.0.0:8000
//! farewatch train   --data train.parquet --output models/model.json --simulate-drift false
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use farewatch::dataset::ParquetLoader;
use farewatch::dispatch::{DispatchConfig, Dispatcher, RetryPolicy, SecretToken};
use farewatch::drift::{DetectorConfig, DEFAULT_COLUMNS, DEFAULT_THRESHOLD};
use farewatch::monitor::{run_monitor, RunStatus};
use farewatch::policy::OperatorAction;
use farewatch::schema::FeatureSchema;
use farewatch::serving::{router, AppState, ArtifactWatcher, ModelServer, ServeConfig};
use farewatch::training::{parse_simulate_drift, LinearTrainer, Trainer, TrainingConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "farewatch")]
#[command(about = "Drift-triggered retraining loop and hot-swapping fare model server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare reference and current data once and trigger retraining on drift
    Monitor {
        /// Reference (training-time) Parquet file
        #[arg(long)]
        reference: PathBuf,

        /// Current (production) Parquet file
        #[arg(long)]
        current: PathBuf,

        /// Columns to test
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_COLUMNS.map(String::from))]
        columns: Vec<String>,

        /// Significance level; drift when p < threshold
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        /// Force a retrain regardless of the drift verdict
        #[arg(long = "override", value_enum)]
        operator_override: Option<Override>,

        /// Write the run record as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        dispatch: DispatchArgs,
    },

    /// Serve predictions and hot-swap the model when the artifact changes
    Serve {
        /// Listen address
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: SocketAddr,

        /// Artifact file to load and watch
        #[arg(long, default_value = farewatch::artifact::DEFAULT_ARTIFACT_PATH)]
        artifact: PathBuf,

        /// Artifact poll interval in seconds
        #[arg(long, default_value_t = 30)]
        poll_secs: u64,

        #[command(flatten)]
        dispatch: DispatchArgs,
    },

    /// Fit the built-in linear fare model and write the artifact atomically
    Train {
        /// Training Parquet file
        #[arg(long)]
        data: PathBuf,

        /// Artifact output path
        #[arg(long, default_value = farewatch::artifact::DEFAULT_ARTIFACT_PATH)]
        output: PathBuf,

        /// Multiply fares by 1.5 before fitting ("true" or "false")
        #[arg(long, env = "SIMULATE_DRIFT", default_value = "false")]
        simulate_drift: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Override {
    /// Retrain on clean data
    ResetModel,
    /// Retrain with inflated fares
    SimulateDrift,
}

impl From<Override> for OperatorAction {
    fn from(value: Override) -> Self {
        match value {
            Override::ResetModel => Self::ResetModel,
            Override::SimulateDrift => Self::SimulateDrift,
        }
    }
}

#[derive(Args)]
struct DispatchArgs {
    /// Webhook URL for retrain triggers (takes precedence over --repo)
    #[arg(long, env = "FAREWATCH_DISPATCH_URL")]
    dispatch_url: Option<String>,

    /// GitHub repository (owner/name) receiving repository_dispatch events
    #[arg(long, env = "FAREWATCH_REPO")]
    repo: Option<String>,

    /// Bearer token for the webhook
    #[arg(long, env = "FAREWATCH_DISPATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Per-attempt timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout_secs: u64,

    /// Total dispatch attempts (1 = no retry)
    #[arg(long, default_value_t = 1)]
    max_attempts: u32,
}

impl DispatchArgs {
    fn config(&self) -> anyhow::Result<DispatchConfig> {
        let config = match (&self.dispatch_url, &self.repo) {
            (Some(url), _) => DispatchConfig::new(url.as_str()),
            (None, Some(repo)) => DispatchConfig::github(repo)?,
            (None, None) => DispatchConfig::new(""),
        };
        Ok(config
            .with_token(self.token.clone().and_then(SecretToken::new))
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_retry(RetryPolicy::exponential(
                self.max_attempts,
                Duration::from_secs(1),
                Duration::from_secs(30),
            )))
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Monitor {
            reference,
            current,
            columns,
            threshold,
            operator_override,
            report,
            dispatch,
        } => cmd_monitor(
            &ParquetLoader::new(reference, current),
            &DetectorConfig::new(columns).with_threshold(threshold),
            operator_override.map(OperatorAction::from),
            report,
            &dispatch,
        ),
        Commands::Serve {
            bind,
            artifact,
            poll_secs,
            dispatch,
        } => {
            let config = ServeConfig {
                bind,
                artifact_path: artifact,
                poll_interval: Duration::from_secs(poll_secs.max(1)),
            };
            cmd_serve(config, &dispatch)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Train {
            data,
            output,
            simulate_drift,
        } => {
            let inject = parse_simulate_drift(&simulate_drift)?;
            let config = TrainingConfig::new(data, output).with_inject_drift(inject);
            let artifact = LinearTrainer
                .train(&config)
                .with_context(|| format!("training from {}", config.data_path.display()))?;
            println!(
                "wrote {} (version {})",
                config.output_path.display(),
                artifact.version()
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_monitor(
    loader: &ParquetLoader,
    detector: &DetectorConfig,
    operator_override: Option<OperatorAction>,
    report: Option<PathBuf>,
    dispatch: &DispatchArgs,
) -> anyhow::Result<ExitCode> {
    let dispatcher = Dispatcher::new(dispatch.config()?);
    let run = run_monitor(loader, detector, operator_override, &dispatcher)
        .context("monitor run failed")?;

    for result in run.report().results() {
        println!(
            "{:<16} D={:.4} p={:.3e} {}",
            result.column,
            result.statistic,
            result.p_value,
            if result.is_drift { "DRIFT" } else { "ok" }
        );
    }
    if let Some(path) = report {
        run.write_report(&path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    Ok(match run.status() {
        RunStatus::Healthy | RunStatus::Dispatched => ExitCode::SUCCESS,
        RunStatus::DispatchFailed => ExitCode::from(2),
    })
}

#[tokio::main]
async fn cmd_serve(config: ServeConfig, dispatch: &DispatchArgs) -> anyhow::Result<()> {
    let dispatch_config = dispatch.config()?;
    if !dispatch_config.has_token() {
        warn!("FAREWATCH_DISPATCH_TOKEN is not set; operator endpoints will fail");
    }

    let server = Arc::new(ModelServer::new(FeatureSchema::fare()));
    let watcher = ArtifactWatcher::new(&config.artifact_path, Arc::clone(&server));
    if let Err(e) = watcher.poll().await {
        warn!(error = %e, "initial artifact load failed; serving unloaded");
    }
    if server.active_version().is_none() {
        warn!(path = %config.artifact_path.display(), "no model loaded; /predict answers 503");
    }
    tokio::spawn(watcher.run(config.poll_interval));

    let app = router(AppState::new(server, Dispatcher::new(dispatch_config)));
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!(addr = %config.bind, "serving fare predictions");
    axum::serve(listener, app).await.context("server error")
}
