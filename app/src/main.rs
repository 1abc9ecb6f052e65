use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::Parser;
use sqlpad_adapters::graphviz::DotCommandLoader;
use sqlpad_adapters::http::HttpQueryBackend;
use sqlpad_core::config::{
    default_config_dir, load_config, state_dir, ConfigError, ENDPOINT_ENV,
};
use sqlpad_core::persistence::{FileKeyValueStore, PersistedState};
use sqlpad_core::plan_render::PlanRenderer;
use sqlpad_core::query_runner::{QueryBackendError, QueryLifecycle};
use sqlpad_core::schema_cache::SchemaDirectory;
use sqlpad_core::share::snapshot_from_input;
use sqlpad_tui::{PlaygroundSession, TuiError};
use thiserror::Error;
use tokio::runtime::{Builder, Handle};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SQLPAD_LOG";
const LOG_FILE_NAME: &str = "sqlpad.log";
const SHARE_FILE_NAME: &str = "share-url.txt";

/// Terminal SQL playground for a remote query server.
#[derive(Debug, Parser)]
#[command(name = "sqlpad", version)]
struct Args {
    /// Server origin, e.g. http://localhost:3000
    #[arg(long, env = ENDPOINT_ENV)]
    endpoint: Option<String>,
    /// Start with distributed execution enabled.
    #[arg(long)]
    distributed: bool,
    /// Share link or bare share token to open.
    #[arg(long)]
    share: Option<String>,
    /// Directory holding config.toml, saved state and the log file.
    #[arg(long)]
    config_dir: Option<PathBuf>,
    /// Log to stderr instead of the log file.
    #[arg(long)]
    log_stderr: bool,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create query client: {0}")]
    Backend(#[from] QueryBackendError),
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to open log file at {path}: {source}")]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Tui(#[from] TuiError),
}

fn init_logging(config_dir: &Path, to_stderr: bool) -> Result<(), AppError> {
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV)
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(filter);

    if to_stderr {
        builder.with_writer(std::io::stderr).init();
        return Ok(());
    }

    let path = config_dir.join(LOG_FILE_NAME);
    let log_error = |source| AppError::Log {
        path: path.clone(),
        source,
    };
    fs::create_dir_all(config_dir).map_err(log_error)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(log_error)?;
    builder.with_writer(Mutex::new(file)).init();
    Ok(())
}

fn resolve_config_dir(args: &Args) -> Result<PathBuf, AppError> {
    match &args.config_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(default_config_dir()?),
    }
}

fn run_app(
    args: Args,
    config_dir: &Path,
    run_tui: impl FnOnce(
        PlaygroundSession<HttpQueryBackend, FileKeyValueStore>,
        Handle,
    ) -> Result<(), TuiError>,
) -> Result<(), AppError> {
    let mut config = load_config(config_dir)?.with_env_overrides();
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    let endpoint = config.endpoint_url()?;
    let share_base = config.share_base()?;

    let startup_share = args.share.as_deref().and_then(|input| {
        let snapshot = snapshot_from_input(input);
        if snapshot.is_none() {
            warn!("ignoring share link that could not be decoded");
        }
        snapshot
    });

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    let _guard = runtime.enter();

    let backend = HttpQueryBackend::new(endpoint.as_str())?;
    let renderer = Arc::new(PlanRenderer::new(DotCommandLoader::new(
        config.dot_binary.clone(),
    )));
    let persisted = PersistedState::new(Arc::new(FileKeyValueStore::new(state_dir(config_dir))))
        .with_debounce(config.debounce())
        .with_override_policy(config.override_policy);

    let session = PlaygroundSession {
        lifecycle: Arc::new(QueryLifecycle::new(backend.clone()).with_renderer(renderer)),
        schema: Arc::new(SchemaDirectory::new(backend)),
        persisted: Arc::new(persisted),
        share_base,
        share_file: config_dir.join(SHARE_FILE_NAME),
        export_dir: std::env::current_dir().unwrap_or_else(|_| config_dir.to_path_buf()),
        startup_share,
        distributed_override: (config.distributed || args.distributed).then_some(true),
    };

    info!(endpoint = %endpoint, "starting playground");
    run_tui(session, runtime.handle().clone())?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config_dir = resolve_config_dir(&args)?;
    init_logging(&config_dir, args.log_stderr)?;
    run_app(args, &config_dir, sqlpad_tui::run)?;
    Ok(())
}
