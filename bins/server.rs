use std::process::ExitCode;

use clap::Parser;
use configs::{AppConfig, LogFormat};
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

/// Stores one budget document per signed-in user.
#[derive(Debug, Parser)]
#[command(name = "usersave-server", version)]
struct Cli {
    /// Run without a client ID; token audience is not checked.
    #[arg(long)]
    development: bool,

    /// TOML configuration file. Defaults to `CONFIG_PATH` or `config.toml`.
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

fn init_logging(format: LogFormat) {
    common::utils::logging::init_logging(format == LogFormat::Json);
    info!(service = "usersave", event = "logger_init", "tracing subscriber initialized");
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    // .env first so RUST_LOG and USERSAVE_* apply below
    dotenv().ok();

    let cfg = match AppConfig::load_and_validate(cli.config.as_deref(), cli.development) {
        Ok(cfg) => cfg,
        Err(e) => {
            common::utils::logging::init_logging_default();
            error!(service = "usersave", event = "config_invalid", error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    init_logging(cfg.logging.format);

    let service_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(
            service = "usersave",
            event = "panic",
            %service_id,
            pid,
            message = %info,
            "unhandled panic occurred"
        );
    }));

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(w) = cfg.server.worker_threads {
        builder.worker_threads(w);
    }
    let rt = match builder.build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "usersave", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(
        service = "usersave",
        event = "start",
        %service_id,
        pid,
        version,
        addr = %cfg.server.addr,
        development = cfg.auth.development,
        threads = cfg.server.worker_threads.unwrap_or_default(),
        "usersave server starting"
    );

    rt.block_on(async move {
        let shutdown = CancellationToken::new();
        let watcher = common::shutdown::cancel_on_signal(shutdown.clone());

        let result = server::run(&cfg, shutdown.clone()).await;
        shutdown.cancel();
        let _ = watcher.await;

        match result {
            Ok(()) => {
                info!(service = "usersave", event = "stop", %service_id, pid, "server stopped normally");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(service = "usersave", event = "run_failed", error = %e, "server::run returned error");
                ExitCode::FAILURE
            }
        }
    })
}
