use clap::{Parser, Subcommand};
use shared::telemetry::{TelemetryError, init_logging, init_metrics};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use view_loader::{LifecycleController, LoaderError, RenderPhase, ReqwestClient};

mod config;
mod view;

use config::{Config, ConfigError};
use view::ConfiguredView;

#[derive(Parser)]
#[command(about = "Loads every endpoint of a configured view and prints the result")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Load a view and print what it renders
    Fetch {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        view: String,
    },
    /// Check a config file without sending requests
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("could not build API client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("no view named {0} in config")]
    UnknownView(String),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        CliCommand::Fetch { config, view } => fetch(config, view),
        CliCommand::Validate { config } => validate(config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate(path: &Path) -> Result<ExitCode, CliError> {
    let config = Config::from_file(path)?;
    for (name, view) in &config.views {
        println!("{name}: {} endpoints", view.endpoints.len());
    }
    Ok(ExitCode::SUCCESS)
}

fn fetch(path: &Path, name: &str) -> Result<ExitCode, CliError> {
    let config = Config::from_file(path)?;

    let logging = config.common.logging.clone().unwrap_or_default();
    let _sentry = init_logging(&logging);
    if let Some(metrics) = &config.common.metrics {
        init_metrics(metrics, view_loader::metrics_defs::ALL_METRICS)?;
    }

    let view_config = config
        .views
        .get(name)
        .cloned()
        .ok_or_else(|| CliError::UnknownView(name.to_string()))?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let client = ReqwestClient::new(
            config.api.base_url.clone(),
            config.api.auth_token.as_deref(),
            Duration::from_secs(config.api.timeout_secs),
        )?;

        let view = Arc::new(ConfiguredView::new(name, view_config));
        let route = view.route();
        let mut controller = LifecycleController::mount(view, client, route)?;

        let state = controller.settled().await?;
        tracing::info!(
            view = name,
            failed = state.errors_by_key.len(),
            "View settled"
        );

        let code = match controller.phase() {
            RenderPhase::Body => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        };
        println!("{}", controller.render());
        controller.unmount();

        Ok::<_, CliError>(code)
    })
}
