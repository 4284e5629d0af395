use ble_gateway::cli::Options;
use ble_gateway::config::GatewayConfig;
use ble_gateway::pipeline::{EXIT_ERROR, EXIT_SUCCESS, Pipeline, RealScanner, RunError};
use clap::Parser;
use std::io::Write;
use std::panic::{self, PanicHookInfo};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code after a panic
const EXIT_PANIC: i32 = 2;

fn init_logging(options: &Options) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve once Ctrl-C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

async fn run(options: Options) -> Result<i32, RunError> {
    let mut config = GatewayConfig::load(&options.config)?;
    options.apply(&mut config);

    if options.print_config {
        write!(std::io::stdout(), "{}", config.to_yaml()?)?;
        return Ok(EXIT_SUCCESS);
    }

    let scanner = RealScanner {
        options: options.scan_options(&config),
    };
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    let summary = Pipeline::new(&config)?.run(&scanner, cancel).await?;
    info!(
        reason = %summary.reason,
        received = summary.received,
        forwarded = summary.forwarded,
        "gateway stopped"
    );
    if !summary.failed_sinks.is_empty() {
        error!(sinks = ?summary.failed_sinks, "destinations failed during the run");
    }
    Ok(summary.exit_code())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Set up panic hook to ensure clean exit codes for process managers
    // (e.g., systemd) that monitor exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();
    init_logging(&options);

    match run(options).await {
        Ok(code) => std::process::exit(code),
        Err(why) => {
            error!("{}", why);
            std::process::exit(EXIT_ERROR);
        }
    }
}
