use std::process;

use clap::Parser;
use rendition_server::telemetry;
use rendition_server::{build_server, Cli};
use tracing::{dispatcher, error, info, Dispatch, Level};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        report_error(&err);
        process::exit(1);
    }
}

/// Logs through the installed subscriber, or a throwaway one if startup
/// failed before tracing was set up.
fn report_error(err: &anyhow::Error) {
    if dispatcher::has_been_set() {
        error!(error = %format!("{err:#}"), "rendition failed");
        return;
    }
    let subscriber = tracing_subscriber::fmt().with_max_level(Level::ERROR).finish();
    dispatcher::with_default(&Dispatch::new(subscriber), || {
        error!(error = %format!("{err:#}"), "rendition failed");
    });
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format)?;
    if let Some(addr) = cli.metrics_addr {
        telemetry::init_metrics(addr)?;
        info!(%addr, "metrics exporter listening");
    }

    let (network, config) = cli.into_configs()?;
    let mut server = build_server(network, config).await?;
    server.start().await?;
    server.serve(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received ctrl-c"),
        () = terminate => info!("received SIGTERM"),
    }
}
